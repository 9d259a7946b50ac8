//! JSON handshake bodies

use serde::{Deserialize, Serialize};

/// Server-advertised identity and capabilities, from the INFO frame.
///
/// Servers add and remove fields freely, so everything is optional and
/// unrecognized fields are kept in `extra`. One `ServerInfo` is produced
/// per connection and replaced wholesale on a new connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Client identity sent in the CONNECT handshake frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectInfo {
    pub name: String,
    pub verbose: bool,
    pub version: String,
}

impl ConnectInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verbose: false,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
