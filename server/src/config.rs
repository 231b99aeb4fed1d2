//! Runtime configuration shared by the listener, the map repository and the
//! regeneration scheduler.

use crate::error::{Result, ServerError};
use serde::Deserialize;
use shared::Role;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the websocket listener binds to
    pub bind_addr: String,
    /// Directory holding one binary file per map identifier
    pub maps_dir: PathBuf,
    /// Number of distinct floor tiles; decoded tile indices must be below it
    pub floor_count: u16,
    /// Number of distinct items; decoded item indices must be below it
    pub item_count: u16,
    /// Wall-clock length of one regeneration time unit
    pub time_unit: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            maps_dir: PathBuf::from("maps"),
            floor_count: 64,
            item_count: 64,
            time_unit: Duration::from_secs(1),
        }
    }
}

impl ServerConfig {
    /// Rejects settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.time_unit.is_zero() {
            return Err(ServerError::Config(
                "regeneration time unit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// One entry of the optional account seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedAccount {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

pub fn parse_seed_accounts(json: &str) -> std::result::Result<Vec<SeedAccount>, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.time_unit, Duration::from_secs(1));
        assert!(config.floor_count > 0);
        assert!(config.item_count > 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_time_unit_is_rejected() {
        let config = ServerConfig {
            time_unit: Duration::ZERO,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));
    }

    #[test]
    fn test_seed_accounts_default_to_player_role() {
        let accounts = parse_seed_accounts(
            r#"[{"username": "root", "password": "pw", "role": "admin"},
                {"username": "guest", "password": "pw"}]"#,
        )
        .unwrap();

        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].role, Role::Admin);
        assert_eq!(accounts[1].role, Role::Player);
    }

    #[test]
    fn test_seed_accounts_reject_unknown_role() {
        let result = parse_seed_accounts(r#"[{"username": "x", "password": "y", "role": "god"}]"#);
        assert!(result.is_err());
    }
}
