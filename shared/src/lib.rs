use serde::{Deserialize, Serialize};

pub const MAP_WIDTH: i32 = 52;
pub const MAP_HEIGHT: i32 = 100;
pub const DEFAULT_MAP: &str = "lev01";
pub const SPAWN_X: i32 = 5;
pub const SPAWN_Y: i32 = 5;
pub const DEFAULT_MAX_STAMINA: i32 = 100;
pub const DEFAULT_MAX_LIFE: i32 = 100;
pub const DEFAULT_MAX_MAGIC: i32 = 100;

pub type PlayerId = u32;

/// Messages a client may send. Anything that fails to parse is dropped by the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Login { username: String, password: String },
    Signup { username: String, password: String },
    Move { dx: i32, dy: i32 },
    Chat { text: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    LoginSuccess {
        player: Player,
        players: Vec<OnlinePlayer>,
        map: MapView,
    },
    LoginError {
        message: String,
    },
    SignupSuccess {
        player: Player,
        players: Vec<OnlinePlayer>,
        map: MapView,
    },
    SignupError {
        message: String,
    },
    PlayerJoined {
        player: OnlinePlayer,
    },
    PlayerMoved {
        id: PlayerId,
        x: i32,
        y: i32,
    },
    PlayerLeft {
        id: PlayerId,
    },
    Vitals(VitalsUpdate),
    Chat {
        text: String,
    },
    Disconnected {
        reason: String,
    },
}

impl ServerMessage {
    pub fn chat(text: impl Into<String>) -> Self {
        ServerMessage::Chat { text: text.into() }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Player,
    Admin,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Equipment {
    pub weapon: String,
    pub armor: String,
    pub shield: String,
    pub helmet: String,
}

/// Authoritative player record. The credential hash never leaves the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub map_id: String,
    pub pos_x: i32,
    pub pos_y: i32,
    pub stamina: i32,
    pub max_stamina: i32,
    pub life: i32,
    pub max_life: i32,
    pub magic: i32,
    pub max_magic: i32,
    pub gold: i64,
    #[serde(flatten)]
    pub equipment: Equipment,
    pub role: Role,
}

impl Player {
    /// A freshly signed-up player: spawn point on the default map with full vitals.
    pub fn new(id: PlayerId, username: &str, password_hash: &str) -> Self {
        Self {
            id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            map_id: DEFAULT_MAP.to_string(),
            pos_x: SPAWN_X,
            pos_y: SPAWN_Y,
            stamina: DEFAULT_MAX_STAMINA,
            max_stamina: DEFAULT_MAX_STAMINA,
            life: DEFAULT_MAX_LIFE,
            max_life: DEFAULT_MAX_LIFE,
            magic: DEFAULT_MAX_MAGIC,
            max_magic: DEFAULT_MAX_MAGIC,
            gold: 0,
            equipment: Equipment::default(),
            role: Role::Player,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn online_view(&self) -> OnlinePlayer {
        OnlinePlayer {
            id: self.id,
            username: self.username.clone(),
            pos_x: self.pos_x,
            pos_y: self.pos_y,
        }
    }

    pub fn vitals(&self) -> VitalsUpdate {
        VitalsUpdate {
            stamina: Some(self.stamina),
            max_stamina: Some(self.max_stamina),
            life: Some(self.life),
            max_life: Some(self.max_life),
            magic: Some(self.magic),
            max_magic: Some(self.max_magic),
        }
    }

    pub fn vitals_in_range(&self) -> bool {
        (0..=self.max_stamina).contains(&self.stamina)
            && (0..=self.max_life).contains(&self.life)
            && (0..=self.max_magic).contains(&self.magic)
    }
}

/// Entry of the online roster sent with login and join events.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OnlinePlayer {
    pub id: PlayerId,
    pub username: String,
    pub pos_x: i32,
    pub pos_y: i32,
}

/// Partial vitals payload; only the fields that changed are present on the wire.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct VitalsUpdate {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stamina: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_stamina: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub life: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_life: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub magic: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_magic: Option<i32>,
}

/// Map payload sent on login: grids indexed `[x][y]`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MapView {
    pub id: String,
    pub width: i32,
    pub height: i32,
    pub tiles: Vec<Vec<u16>>,
    pub items: Vec<Vec<u16>>,
}

pub fn in_bounds(x: i32, y: i32) -> bool {
    (0..MAP_WIDTH).contains(&x) && (0..MAP_HEIGHT).contains(&y)
}
