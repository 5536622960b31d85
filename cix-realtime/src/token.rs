//! Bearer token sources and endpoint URL construction.
//!
//! The connection manager asks a [`TokenProvider`] for the current token at
//! every explicit connect and appends it to the base endpoint as
//! `?token=...`. Automatic reconnects reuse the last full URL instead.

use std::path::PathBuf;

use tracing::{debug, warn};
use url::Url;

use cix_core::config::ServerConfig;
use cix_core::constants;
use cix_core::error::{CixError, CixResult};

/// Supplies the currently valid bearer token, if any.
pub trait TokenProvider: Send + Sync + 'static {
    fn token(&self) -> Option<String>;
}

/// No token at all. The server is expected to reject the connection.
#[derive(Debug, Clone, Default)]
pub struct NoToken;

impl TokenProvider for NoToken {
    fn token(&self) -> Option<String> {
        None
    }
}

/// A fixed token.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        non_empty(self.0.clone())
    }
}

/// Reads the token from an environment variable on every call.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvToken {
    fn default() -> Self {
        Self::new(constants::TOKEN_ENV_VAR)
    }
}

impl TokenProvider for EnvToken {
    fn token(&self) -> Option<String> {
        std::env::var(&self.var).ok().and_then(non_empty)
    }
}

/// Reads the token from a session file on every call, so a token refreshed
/// by another process is picked up at the next connect.
#[derive(Debug, Clone)]
pub struct FileToken {
    path: PathBuf,
}

impl FileToken {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenProvider for FileToken {
    fn token(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => non_empty(contents),
            Err(e) => {
                warn!("failed to read token file {}: {e}", self.path.display());
                None
            }
        }
    }
}

/// Tries each provider in order and returns the first token found.
#[derive(Default)]
pub struct TokenChain {
    providers: Vec<Box<dyn TokenProvider>>,
}

impl TokenChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl TokenProvider) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Token sources for a server config, highest priority first:
    /// the `CIX_TOKEN` environment variable, the token file, the inline token.
    pub fn from_config(server: &ServerConfig) -> Self {
        let mut chain = Self::new().with(EnvToken::default());
        if let Some(path) = &server.token_file {
            chain = chain.with(FileToken::new(path.clone()));
        }
        if let Some(token) = &server.token {
            chain = chain.with(StaticToken::new(token.clone()));
        }
        chain
    }
}

impl TokenProvider for TokenChain {
    fn token(&self) -> Option<String> {
        self.providers.iter().find_map(|p| p.token())
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Append the token to the base URL as a query parameter.
///
/// Without a token the base URL is returned unchanged (after validation).
pub fn with_token(base_url: &str, token: Option<&str>) -> CixResult<String> {
    let mut url = Url::parse(base_url).map_err(|e| CixError::InvalidUrl(format!("{base_url}: {e}")))?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(CixError::InvalidUrl(format!(
                "{base_url}: unsupported scheme '{other}'"
            )))
        }
    }
    match token {
        Some(token) => {
            url.query_pairs_mut()
                .append_pair(constants::TOKEN_QUERY_PARAM, token);
        }
        None => debug!("no token available, connecting without one"),
    }
    Ok(url.to_string())
}

/// Replace the token query parameter's value for logging.
pub fn redact(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if !parsed.query_pairs().any(|(k, _)| k == constants::TOKEN_QUERY_PARAM) {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == constants::TOKEN_QUERY_PARAM {
                "***".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();
    parsed.query_pairs_mut().clear().extend_pairs(pairs);
    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_token_appends_query() {
        let url = with_token("ws://localhost:8000/ws", Some("abc")).unwrap();
        assert_eq!(url, "ws://localhost:8000/ws?token=abc");

        let url = with_token("wss://intel.example.com/ws?client=cli", Some("a b")).unwrap();
        assert_eq!(url, "wss://intel.example.com/ws?client=cli&token=a+b");
    }

    #[test]
    fn test_with_token_without_token() {
        let url = with_token("ws://localhost:8000/ws", None).unwrap();
        assert_eq!(url, "ws://localhost:8000/ws");
    }

    #[test]
    fn test_with_token_rejects_bad_urls() {
        assert!(matches!(with_token("not a url", None), Err(CixError::InvalidUrl(_))));
        assert!(matches!(
            with_token("ftp://example.com", Some("t")),
            Err(CixError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_redact() {
        assert_eq!(
            redact("ws://localhost:8000/ws?client=cli&token=secret"),
            "ws://localhost:8000/ws?client=cli&token=***"
        );
        assert_eq!(redact("ws://localhost:8000/ws"), "ws://localhost:8000/ws");
    }

    #[test]
    fn test_file_token_is_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session");
        let provider = FileToken::new(&path);
        assert_eq!(provider.token(), None);

        std::fs::write(&path, "first\n").unwrap();
        assert_eq!(provider.token().as_deref(), Some("first"));

        std::fs::write(&path, "second").unwrap();
        assert_eq!(provider.token().as_deref(), Some("second"));
    }

    #[test]
    fn test_chain_priority() {
        let chain = TokenChain::new()
            .with(NoToken)
            .with(StaticToken::new("  "))
            .with(StaticToken::new("fallback"));
        assert_eq!(chain.token().as_deref(), Some("fallback"));
        assert_eq!(TokenChain::new().token(), None);
    }
}
