use url::Url;

use crate::OllamaError;

pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";

/// Where the local Ollama server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaConfig {
    base_url: Url,
}

impl OllamaConfig {
    /// Accepts a full URL or a bare `host:port`, which is taken as plain http.
    pub fn parse(raw: &str) -> Result<Self, OllamaError> {
        let trimmed = raw.trim();
        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };

        let mut base_url = Url::parse(&candidate).map_err(|err| OllamaError::InvalidUrl {
            url: raw.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(OllamaError::InvalidUrl {
                url: raw.to_string(),
                reason: format!("unsupported scheme '{}'", base_url.scheme()),
            });
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { base_url })
    }

    /// Explicit value first, then `OLLAMA_HOST`, then the default port on loopback.
    pub fn resolve(explicit: Option<&str>) -> Result<Self, OllamaError> {
        if let Some(raw) = explicit.filter(|raw| !raw.trim().is_empty()) {
            return Self::parse(raw);
        }
        match std::env::var(OLLAMA_HOST_ENV) {
            Ok(raw) if !raw.trim().is_empty() => Self::parse(&raw),
            _ => Self::parse(DEFAULT_OLLAMA_URL),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, OllamaError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| OllamaError::InvalidUrl {
                url: format!("{}{path}", self.base_url),
                reason: err.to_string(),
            })
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
