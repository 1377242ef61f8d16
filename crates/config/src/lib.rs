use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Application settings, layered from an optional config file and
/// `HIREWIRE_`-prefixed environment variables (`HIREWIRE_SERVER__PORT=9000`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub mongo: MongoSettings,
    pub auth: AuthSettings,
    pub ice: IceSettings,
    pub call: CallSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoSettings {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub access_token_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IceSettings {
    /// STUN URLs handed verbatim to joining peers.
    #[serde(default)]
    pub stun_servers: Vec<String>,
    #[serde(default)]
    pub turn: TurnSettings,
}

/// TURN relay configuration. When `shared_secret` is set, per-user ephemeral
/// credentials are derived at call start; otherwise the static
/// `username`/`password` pair is used as-is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TurnSettings {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub shared_secret: Option<String>,
    pub credential_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallSettings {
    pub default_max_participants: u32,
    /// Seconds after which a call that never got a join is swept and ended.
    /// Unset means pending calls never expire.
    pub pending_ttl_secs: Option<u64>,
    pub sweep_interval_secs: u64,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("mongo.uri", "mongodb://localhost:27017")?
            .set_default("mongo.database", "hirewire")?
            .set_default("auth.jwt_secret", "dev-secret-change-me")?
            .set_default("auth.access_token_ttl_minutes", 60)?
            .set_default(
                "ice.stun_servers",
                vec!["stun:stun.l.google.com:19302".to_string()],
            )?
            .set_default("call.default_max_participants", 15)?
            .set_default("call.sweep_interval_secs", 60)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("HIREWIRE").separator("__"))
            .build()?
            .try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            mongo: MongoSettings {
                uri: "mongodb://localhost:27017".to_string(),
                database: "hirewire".to_string(),
            },
            auth: AuthSettings {
                jwt_secret: "dev-secret-change-me".to_string(),
                access_token_ttl_minutes: 60,
            },
            ice: IceSettings {
                stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
                turn: TurnSettings::default(),
            },
            call: CallSettings {
                default_max_participants: 15,
                pending_ttl_secs: None,
                sweep_interval_secs: 60,
            },
        }
    }
}
