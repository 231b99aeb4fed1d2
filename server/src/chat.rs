//! Chat validation, content filtering and admin commands.

use crate::error::GatewayError;
use crate::game::World;
use crate::gateway::PlayerPatch;
use crate::session::ConnectionHandle;
use log::{info, warn};
use regex::Regex;
use shared::{PlayerId, ServerMessage};
use std::sync::LazyLock;

pub const MAX_CHAT_CHARS: usize = 200;
pub const BAD_LANGUAGE_NOTICE: &str = "Your message was rejected: bad language.";
pub const NOT_AUTHORIZED_NOTICE: &str = "You are not authorized to use that command.";

static REFRESH_COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*-refresh\s+(\S+)\s*$").expect("Invalid refresh command pattern")
});

static DENYLIST: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("union select", r"(?i)\bunion\s+(all\s+)?select\b"),
        ("insert into", r"(?i)\binsert\s+into\b"),
        ("drop table", r"(?i)\bdrop\s+table\b"),
        ("terminated comment", r";\s*(--|#|/\*)"),
        ("comment delimiter", r"--|/\*|\*/"),
    ]
    .into_iter()
    .map(|(name, pattern)| {
        (
            name,
            Regex::new(pattern).expect("Invalid chat denylist pattern"),
        )
    })
    .collect()
});

type Predicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// One validation step: when `rejects` matches, the sender gets `notice`.
pub struct ContentRule {
    pub name: &'static str,
    pub notice: &'static str,
    rejects: Predicate,
}

/// Ordered list of content rules; the first matching rule wins.
#[derive(Default)]
pub struct ContentFilter {
    rules: Vec<ContentRule>,
}

impl ContentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Length limits followed by the injection denylist.
    pub fn standard() -> Self {
        let filter = Self::new().with_rule("length", BAD_LANGUAGE_NOTICE, |text| {
            text.trim().is_empty() || text.chars().count() > MAX_CHAT_CHARS
        });
        DENYLIST.iter().fold(filter, |filter, (name, pattern)| {
            filter.with_rule(*name, BAD_LANGUAGE_NOTICE, move |text| pattern.is_match(text))
        })
    }

    pub fn with_rule<F>(mut self, name: &'static str, notice: &'static str, rejects: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.rules.push(ContentRule {
            name,
            notice,
            rejects: Box::new(rejects),
        });
        self
    }

    /// Returns the first rule that rejects `text`.
    pub fn check(&self, text: &str) -> Option<&ContentRule> {
        self.rules.iter().find(|rule| (rule.rejects)(text))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Parses `-refresh <name>`, returning the target username.
pub fn parse_refresh(text: &str) -> Option<&str> {
    REFRESH_COMMAND
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|target| target.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    /// Failed a content rule; only the sender was told
    Rejected { rule: &'static str },
    /// Sender tried an admin command without the role
    Denied,
    /// Admin command target has no live session
    TargetOffline { target: String },
    /// Target's vitals were restored
    Refreshed { target: PlayerId },
    /// Ordinary chat, queued for this many sessions
    Broadcast { delivered: usize },
    /// Sender has no player record
    Ignored,
}

/// Validates and routes one chat line from `sender`.
pub async fn process_chat(
    world: &World,
    connection: &ConnectionHandle,
    sender: PlayerId,
    text: &str,
) -> Result<ChatOutcome, GatewayError> {
    if let Some(rule) = world.chat_filter.check(text) {
        warn!("Rejected chat from player {} ({})", sender, rule.name);
        world.bus.send(connection, ServerMessage::chat(rule.notice));
        return Ok(ChatOutcome::Rejected { rule: rule.name });
    }

    let Some(player) = world.gateway.get_by_id(sender).await? else {
        return Ok(ChatOutcome::Ignored);
    };

    if let Some(target) = parse_refresh(text) {
        if !player.is_admin() {
            warn!("{} tried -refresh without admin role", player.username);
            world
                .bus
                .send(connection, ServerMessage::chat(NOT_AUTHORIZED_NOTICE));
            return Ok(ChatOutcome::Denied);
        }
        return refresh(world, connection, &player.username, target).await;
    }

    let line = format!("{}: {}", player.username, text);
    let delivered = world.bus.broadcast(ServerMessage::chat(line), None).await;
    Ok(ChatOutcome::Broadcast { delivered })
}

async fn refresh(
    world: &World,
    connection: &ConnectionHandle,
    admin: &str,
    target: &str,
) -> Result<ChatOutcome, GatewayError> {
    let Some(session) = world.registry.find_session_by_username(target).await else {
        world
            .bus
            .send(connection, ServerMessage::chat(format!("{} is not online.", target)));
        return Ok(ChatOutcome::TargetOffline {
            target: target.to_string(),
        });
    };

    {
        let _guard = world.locks.lock(session.player_id).await;
        let player = world
            .gateway
            .get_by_id(session.player_id)
            .await?
            .ok_or(GatewayError::NotFound(session.player_id))?;

        let patch = PlayerPatch {
            stamina: Some(player.max_stamina),
            life: Some(player.max_life),
            magic: Some(player.max_magic),
            ..Default::default()
        };
        world.gateway.update_fields(player.id, &patch).await?;

        let mut restored = player;
        patch.apply(&mut restored);
        world
            .bus
            .send(&session.connection, ServerMessage::Vitals(restored.vitals()));
    }

    info!("{} refreshed the vitals of {}", admin, session.username);
    world.bus.send(
        connection,
        ServerMessage::chat(format!("Refreshed {}'s vitals.", session.username)),
    );
    Ok(ChatOutcome::Refreshed {
        target: session.player_id,
    })
}
