//! Client configuration.
//!
//! Layered with the `config` crate: an optional JSON file, then
//! `INKBOARD_*` environment variables (`INKBOARD_BROKER_URL`,
//! `INKBOARD_RECONNECT_DELAY_MS`, nested keys as `INKBOARD_CANVAS__WIDTH`).
//! Anything left unset keeps its default.

use crate::event::BoardId;
use ::config::builder::{ConfigBuilder, DefaultState};
use ::config::{Config, Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Prefix of the environment variables read by [`ClientConfig::load`].
pub const ENV_PREFIX: &str = "INKBOARD";

/// Placeholder substituted with the board id in destination templates.
const BOARD_PLACEHOLDER: &str = "{board}";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Source(#[from] ::config::ConfigError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Destination templates for one board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Destinations {
    pub draw_publish: String,
    pub draw_topic: String,
    pub cursor_publish: String,
    pub cursor_topic: String,
    pub history_request: String,
    /// Reply destination for history; usually per user, not per board.
    pub history_reply: String,
}

impl Default for Destinations {
    fn default() -> Self {
        Self {
            draw_publish: "/app/board/{board}/draw".to_string(),
            draw_topic: "/topic/board/{board}/draw".to_string(),
            cursor_publish: "/app/board/{board}/cursor".to_string(),
            cursor_topic: "/topic/board/{board}/cursor".to_string(),
            history_request: "/app/board/{board}/history".to_string(),
            history_reply: "/user/queue/history".to_string(),
        }
    }
}

impl Destinations {
    /// Resolve every template for a concrete board.
    pub fn for_board(&self, board_id: BoardId) -> BoardDestinations {
        let id = board_id.to_string();
        let fill = |template: &str| template.replace(BOARD_PLACEHOLDER, &id);
        BoardDestinations {
            draw_publish: fill(&self.draw_publish),
            draw_topic: fill(&self.draw_topic),
            cursor_publish: fill(&self.cursor_publish),
            cursor_topic: fill(&self.cursor_topic),
            history_request: fill(&self.history_request),
            history_reply: fill(&self.history_reply),
        }
    }
}

/// Destinations with the board id filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardDestinations {
    pub draw_publish: String,
    pub draw_topic: String,
    pub cursor_publish: String,
    pub cursor_topic: String,
    pub history_request: String,
    pub history_reply: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
    /// CSS color the canvas is cleared to and the eraser paints with.
    pub background: String,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 3840,
            height: 2160,
            background: "#ffffff".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket URL of the STOMP broker.
    pub broker_url: String,
    /// Base URL of the REST API.
    pub api_url: String,
    /// Fixed delay between reconnect attempts. 0 disables reconnecting.
    pub reconnect_delay_ms: u64,
    pub heartbeat_outgoing_ms: u64,
    pub heartbeat_incoming_ms: u64,
    pub auth_token: Option<String>,
    pub destinations: Destinations,
    pub canvas: CanvasConfig,
    /// Drop remote events whose id was already seen.
    pub dedup_remote_events: bool,
    /// Forget remote cursors not updated within this many milliseconds.
    pub cursor_ttl_ms: Option<u64>,
    /// Maximum number of backlog events requested on connect.
    pub history_limit: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            broker_url: "ws://localhost:8084/ws".to_string(),
            api_url: "http://localhost:8084/".to_string(),
            reconnect_delay_ms: 5000,
            heartbeat_outgoing_ms: 4000,
            heartbeat_incoming_ms: 4000,
            auth_token: None,
            destinations: Destinations::default(),
            canvas: CanvasConfig::default(),
            dedup_remote_events: true,
            cursor_ttl_ms: None,
            history_limit: None,
        }
    }
}

impl ClientConfig {
    /// Parse a JSON document. The environment is not consulted.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Self::build(Config::builder().add_source(File::from_str(json, FileFormat::Json)))
    }

    /// Load from an optional JSON file, then apply `INKBOARD_*` variables
    /// from the process environment.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        Self::load_with_env(path, None)
    }

    /// Same as [`ClientConfig::load`], reading variables from `vars` instead
    /// of the process environment when given.
    pub fn load_with_env(path: Option<&Path>, vars: Option<Map<String, String>>) -> ConfigResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            log::debug!("Loading config from {}", path.display());
            builder = builder.add_source(File::from(path).format(FileFormat::Json).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .ignore_empty(true)
                .source(vars),
        );
        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> ConfigResult<Self> {
        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn reconnect_delay(&self) -> Option<Duration> {
        (self.reconnect_delay_ms > 0).then(|| Duration::from_millis(self.reconnect_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> Map<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.broker_url, "ws://localhost:8084/ws");
        assert_eq!(config.reconnect_delay(), Some(Duration::from_secs(5)));
        assert_eq!(config.heartbeat_outgoing_ms, 4000);
        assert_eq!(config.canvas.width, 3840);
        assert_eq!(config.canvas.height, 2160);
        assert!(config.dedup_remote_events);
        assert!(config.cursor_ttl_ms.is_none());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ClientConfig::from_json(
            r#"{"broker_url": "ws://example.org/ws", "canvas": {"background": "black"}}"#,
        )
        .unwrap();
        assert_eq!(config.broker_url, "ws://example.org/ws");
        assert_eq!(config.canvas.background, "black");
        assert_eq!(config.canvas.width, 3840);
        assert_eq!(config.destinations, Destinations::default());
    }

    #[test]
    fn test_zero_delay_disables_reconnect() {
        let config = ClientConfig::from_json(r#"{"reconnect_delay_ms": 0}"#).unwrap();
        assert!(config.reconnect_delay().is_none());
    }

    #[test]
    fn test_env_overrides() {
        let env = vars(&[
            ("INKBOARD_BROKER_URL", "ws://broker:9000/ws"),
            ("INKBOARD_RECONNECT_DELAY_MS", "250"),
            ("INKBOARD_AUTH_TOKEN", "secret"),
            ("INKBOARD_CANVAS__WIDTH", "640"),
            ("OTHER_BROKER_URL", "ws://ignored/ws"),
        ]);
        let config = ClientConfig::load_with_env(None, Some(env)).unwrap();
        assert_eq!(config.broker_url, "ws://broker:9000/ws");
        assert_eq!(config.reconnect_delay_ms, 250);
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.canvas.width, 640);
        assert_eq!(config.canvas.height, 2160);
        assert_eq!(config.api_url, "http://localhost:8084/");
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"broker_url": "ws://file/ws", "history_limit": 50}}"#).unwrap();
        let env = vars(&[("INKBOARD_BROKER_URL", "ws://env/ws"), ("INKBOARD_AUTH_TOKEN", "")]);
        let config = ClientConfig::load_with_env(Some(file.path()), Some(env)).unwrap();
        assert_eq!(config.broker_url, "ws://env/ws");
        assert_eq!(config.history_limit, Some(50));
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn test_invalid_env_value_is_rejected() {
        let env = vars(&[("INKBOARD_RECONNECT_DELAY_MS", "soon")]);
        let result = ClientConfig::load_with_env(None, Some(env));
        assert!(matches!(result, Err(ConfigError::Source(_))));
    }

    #[test]
    fn test_no_sources_gives_defaults() {
        let config = ClientConfig::load_with_env(None, Some(Map::new())).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_destinations_for_board() {
        let resolved = Destinations::default().for_board(42);
        assert_eq!(resolved.draw_topic, "/topic/board/42/draw");
        assert_eq!(resolved.cursor_publish, "/app/board/42/cursor");
        assert_eq!(resolved.history_reply, "/user/queue/history");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"api_url": "http://api.local/", "history_limit": 200}}"#).unwrap();
        let config = ClientConfig::load_with_env(Some(file.path()), Some(Map::new())).unwrap();
        assert_eq!(config.api_url, "http://api.local/");
        assert_eq!(config.history_limit, Some(200));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ClientConfig::load(Some(Path::new("/definitely/not/here.json")));
        assert!(matches!(result, Err(ConfigError::Source(_))));
    }

    #[test]
    fn test_malformed_file() {
        assert!(matches!(
            ClientConfig::from_json("{not json"),
            Err(ConfigError::Source(_))
        ));
    }
}
