//! Client configuration — API endpoints and authenticated identity.
//!
//! User-level config: `~/.flowdesk/config.yaml` (endpoints, token, identity).
//! Resolution: config file → `FLOWDESK_*` env override → derived defaults.
//! The WebSocket URL, when not set explicitly, is derived from the API URL
//! by protocol substitution (`http → ws`, `https → wss`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The authenticated identity stamped onto create payloads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identity {
    pub member_id: String,
    pub business_id: String,
    pub display_name: String,
}

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FlowdeskConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Path to `~/.flowdesk/`.
fn config_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|p| PathBuf::from(p).join(".flowdesk"))
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME")
            .ok()
            .map(|p| PathBuf::from(p).join(".flowdesk"))
    }
}

/// Derive a WebSocket URL from an HTTP API URL by protocol substitution.
/// URLs with any other scheme pass through unchanged.
pub fn derive_ws_url(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_url.to_string()
    }
}

impl FlowdeskConfig {
    /// Load from the user config file, then apply env overrides.
    pub fn load() -> Self {
        let mut config = config_dir()
            .map(|dir| Self::load_from_path(&dir.join("config.yaml")))
            .unwrap_or_default();
        config.apply_env();
        config
    }

    /// Load one YAML file; missing or unreadable files yield the default.
    pub fn load_from_path(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_yaml::from_str(&text).ok())
            .unwrap_or_default()
    }

    /// `FLOWDESK_*` env vars take precedence over the file.
    fn apply_env(&mut self) {
        let overrides = [
            ("FLOWDESK_API_URL", &mut self.api_url),
            ("FLOWDESK_WS_URL", &mut self.ws_url),
            ("FLOWDESK_TOKEN", &mut self.token),
            ("FLOWDESK_MEMBER_ID", &mut self.member_id),
            ("FLOWDESK_BUSINESS_ID", &mut self.business_id),
            ("FLOWDESK_DISPLAY_NAME", &mut self.display_name),
        ];
        for (var, slot) in overrides {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    *slot = Some(value);
                }
            }
        }
    }

    /// The WebSocket endpoint: explicit setting wins, otherwise derived
    /// from the API URL.
    pub fn ws_url(&self) -> Option<String> {
        self.ws_url
            .clone()
            .or_else(|| self.api_url.as_deref().map(derive_ws_url))
    }

    /// Identity for payload stamping; unset fields come through empty.
    pub fn identity(&self) -> Identity {
        Identity {
            member_id: self.member_id.clone().unwrap_or_default(),
            business_id: self.business_id.clone().unwrap_or_default(),
            display_name: self.display_name.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_derivation() {
        assert_eq!(derive_ws_url("https://api.example.com"), "wss://api.example.com");
        assert_eq!(derive_ws_url("http://localhost:8080"), "ws://localhost:8080");
        assert_eq!(derive_ws_url("wss://already.ws"), "wss://already.ws");
    }

    #[test]
    fn explicit_ws_url_wins_over_derivation() {
        let config = FlowdeskConfig {
            api_url: Some("https://api.example.com".into()),
            ws_url: Some("wss://chat.example.com/stream".into()),
            ..Default::default()
        };
        assert_eq!(config.ws_url().as_deref(), Some("wss://chat.example.com/stream"));

        let derived = FlowdeskConfig {
            api_url: Some("https://api.example.com".into()),
            ..Default::default()
        };
        assert_eq!(derived.ws_url().as_deref(), Some("wss://api.example.com"));
    }

    #[test]
    fn loads_yaml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "api_url: https://api.example.com\nmember_id: u1\nbusiness_id: b1\ndisplay_name: Ada\n",
        )
        .unwrap();

        let config = FlowdeskConfig::load_from_path(&path);
        assert_eq!(config.api_url.as_deref(), Some("https://api.example.com"));
        let identity = config.identity();
        assert_eq!(identity.member_id, "u1");
        assert_eq!(identity.display_name, "Ada");
    }

    #[test]
    fn missing_or_garbled_file_yields_default() {
        let dir = tempfile::TempDir::new().unwrap();
        let absent = FlowdeskConfig::load_from_path(&dir.path().join("nope.yaml"));
        assert!(absent.api_url.is_none());

        let garbled = dir.path().join("bad.yaml");
        std::fs::write(&garbled, ":: not yaml ::\n- {").unwrap();
        let config = FlowdeskConfig::load_from_path(&garbled);
        assert!(config.api_url.is_none());
    }

    #[test]
    fn unset_identity_fields_come_through_empty() {
        let identity = FlowdeskConfig::default().identity();
        assert_eq!(identity.member_id, "");
        assert_eq!(identity.business_id, "");
    }
}
