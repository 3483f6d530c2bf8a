//! Caller-supplied configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrellisError};
use crate::model::value::Iri;

/// Default page size applied when a query asks for `limit = 0`.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Default bound on retrieval rounds.
pub const DEFAULT_MAX_ROUNDS: usize = 64;

/// Engine configuration.
///
/// ```toml
/// page_size = 50
/// base = "https://example.org/"
/// max_rounds = 16
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rows per page when a query does not set a limit.
    pub page_size: usize,
    /// Base for resolving relative ids when the shape has none.
    pub base: Option<String>,
    /// Upper bound on dispatch rounds per retrieval.
    pub max_rounds: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            base: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

impl Config {
    /// Parses a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| TrellisError::Config(err.to_string()))
    }

    /// Sets the default page size; zero is coerced to one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sets the fallback base.
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Sets the round limit.
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Limit to apply for a requested one.
    pub fn page(&self, requested: usize) -> usize {
        if requested == 0 {
            self.page_size
        } else {
            requested
        }
    }

    /// Fallback base as an identifier.
    pub fn base_iri(&self) -> Option<Iri> {
        self.base.as_deref().map(Iri::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_keys() -> Result<()> {
        let config = Config::from_toml_str("max_rounds = 8")?;
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.max_rounds, 8);
        assert_eq!(config.page(0), 100);
        assert_eq!(config.page(7), 7);
        Ok(())
    }

    #[test]
    fn rejects_malformed_documents() {
        let err = Config::from_toml_str("page_size = \"many\"").unwrap_err();
        assert!(matches!(err, TrellisError::Config(_)));
    }

    #[test]
    fn builders_override_fields() {
        let config = Config::default()
            .with_page_size(0)
            .with_base("https://example.org/")
            .with_max_rounds(3);
        assert_eq!(config.page_size, 1);
        assert_eq!(config.base_iri(), Some(Iri::new("https://example.org/")));
        assert_eq!(config.max_rounds, 3);
    }
}
