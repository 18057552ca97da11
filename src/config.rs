//! Peer configuration.
//!
//! Defaults < caller-set values (CLI flags) < environment (`TANDEM_*`).
//! The binary maps its flags onto this struct and then lets the
//! environment win, which is the convenient order for containerized nodes.

use std::path::PathBuf;

use rand::Rng;
use thiserror::Error;

use crate::crdt::position::NodeId;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_COLOR: &str = "blue";

/// Named colors a user may pick, mapped to ANSI codes for terminal
/// front-ends. Unknown names fall back to blue.
const NAMED_COLORS: &[(&str, &str)] = &[
    ("blue", "34"),
    ("green", "32"),
    ("red", "31"),
    ("yellow", "33"),
    ("cyan", "36"),
    ("magenta", "35"),
];

/// ANSI code for a named color, falling back to blue.
pub fn resolve_color(name: &str) -> &'static str {
    NAMED_COLORS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, code)| *code)
        .unwrap_or("34")
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerConfig {
    /// TCP port to listen on.
    pub port: u16,
    /// Node id; 0 asks for a random one at startup.
    pub node_id: NodeId,
    /// `host:port` of an existing peer to join, if any.
    pub join: Option<String>,
    /// Text file to load at startup and save at shutdown.
    pub file: Option<PathBuf>,
    /// Display name for presence.
    pub user_name: Option<String>,
    /// Named color for presence.
    pub color: String,
}

impl Default for PeerConfig {
    fn default() -> PeerConfig {
        PeerConfig {
            port: DEFAULT_PORT,
            node_id: NodeId(0),
            join: None,
            file: None,
            user_name: None,
            color: DEFAULT_COLOR.to_string(),
        }
    }
}

impl PeerConfig {
    /// Fold `TANDEM_*` environment variables over the current values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = env_var("TANDEM_PORT") {
            self.port = value.parse().map_err(|e| ConfigError::InvalidEnv {
                var: "TANDEM_PORT",
                value: value.clone(),
                reason: format!("{e}"),
            })?;
        }
        if let Some(value) = env_var("TANDEM_NODE") {
            let id = value.parse().map_err(|e| ConfigError::InvalidEnv {
                var: "TANDEM_NODE",
                value: value.clone(),
                reason: format!("{e}"),
            })?;
            self.node_id = NodeId(id);
        }
        if let Some(value) = env_var("TANDEM_JOIN") {
            self.join = Some(value);
        }
        if let Some(value) = env_var("TANDEM_FILE") {
            self.file = Some(PathBuf::from(value));
        }
        if let Some(value) = env_var("TANDEM_USER") {
            self.user_name = Some(value);
        }
        if let Some(value) = env_var("TANDEM_COLOR") {
            self.color = value;
        }
        Ok(())
    }

    /// The configured node id, or a fresh random one when unset.
    pub fn resolved_node_id(&self) -> NodeId {
        if self.node_id.0 != 0 {
            return self.node_id;
        }
        NodeId(rand::thread_rng().gen_range(1..=999_999))
    }

    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    /// Presence name, defaulting to `user-<id>`.
    pub fn display_name(&self, node_id: NodeId) -> String {
        self.user_name
            .clone()
            .unwrap_or_else(|| format!("user-{node_id}"))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
