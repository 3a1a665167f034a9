//! Host configuration from environment variables and CLI flags.
//!
//! Required values fail fast at startup with a message naming the
//! missing variable.

use secrecy::SecretString;
use std::path::PathBuf;

/// Resolved host configuration.
#[derive(Debug)]
pub struct Config {
    /// Control-plane WebSocket URL (`REMOTE_CONNECTOR_WS_URL`).
    pub ws_url: String,
    /// OAuth token endpoint (`OAUTH_TOKEN_URL`).
    pub token_url: String,
    /// OAuth client id (`OAUTH_CLIENT_ID`).
    pub client_id: String,
    /// OAuth client secret (`OAUTH_CLIENT_SECRET`).
    pub client_secret: SecretString,
    /// Optional OAuth scope (`OAUTH_SCOPE`).
    pub scope: Option<String>,
    /// Optional OAuth audience (`OAUTH_AUDIENCE`).
    pub audience: Option<String>,
    /// Optional OAuth resource (`OAUTH_RESOURCE`).
    pub resource: Option<String>,
    /// Connectors directory (`--connectors` flag or `CONNECTORS_DIR`).
    pub connectors_dir: PathBuf,
    /// Log filter fallback (`RUST_LOG`).
    pub rust_log: String,
}

impl Config {
    /// Load from the environment; the CLI flag wins over `CONNECTORS_DIR`.
    pub fn load(cli_connectors: Option<PathBuf>) -> Result<Self, String> {
        let connectors_dir = match cli_connectors {
            Some(dir) => dir,
            None => PathBuf::from(required("CONNECTORS_DIR")?),
        };

        Ok(Self {
            ws_url: required("REMOTE_CONNECTOR_WS_URL")?,
            token_url: required("OAUTH_TOKEN_URL")?,
            client_id: required("OAUTH_CLIENT_ID")?,
            client_secret: SecretString::new(required("OAUTH_CLIENT_SECRET")?),
            scope: optional("OAUTH_SCOPE"),
            audience: optional("OAUTH_AUDIENCE"),
            resource: optional("OAUTH_RESOURCE"),
            connectors_dir,
            rust_log: optional("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn required(name: &str) -> Result<String, String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("required environment variable {name} is not set"))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_env() {
        std::env::set_var("REMOTE_CONNECTOR_WS_URL", "wss://cp.example.com/session");
        std::env::set_var("OAUTH_TOKEN_URL", "https://auth.example.com/token");
        std::env::set_var("OAUTH_CLIENT_ID", "portico-host");
        std::env::set_var("OAUTH_CLIENT_SECRET", "shh");
        std::env::set_var("OAUTH_SCOPE", "connectors");
        std::env::remove_var("OAUTH_AUDIENCE");

        let config = Config::load(Some(PathBuf::from("/tmp/connectors"))).unwrap();
        assert_eq!(config.ws_url, "wss://cp.example.com/session");
        assert_eq!(config.scope.as_deref(), Some("connectors"));
        assert_eq!(config.audience, None);
        assert_eq!(config.connectors_dir, PathBuf::from("/tmp/connectors"));

        // The CLI flag is required when CONNECTORS_DIR is unset.
        std::env::remove_var("CONNECTORS_DIR");
        std::env::set_var("CONNECTORS_DIR", "/etc/portico/connectors");
        let config = Config::load(None).unwrap();
        assert_eq!(
            config.connectors_dir,
            PathBuf::from("/etc/portico/connectors")
        );
    }
}
