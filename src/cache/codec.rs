//! Cache file name codec.
//!
//! Cache files are named `<prefix>.<key>.<epoch-millis>.cache`. Keys may not
//! contain `.` (or path separators), which keeps decoding unambiguous: the
//! timestamp is whatever follows the last dot before the `.cache` suffix.
//! Temp files (`<prefix>.<key>.tmp`) never decode.

use crate::clock::epoch_millis;
use crate::{MimirError, Result};

/// Default file name prefix.
pub const DEFAULT_PREFIX: &str = ".mimir";

const SUFFIX: &str = ".cache";
const TEMP_SUFFIX: &str = ".tmp";

/// Key and timestamp recovered from a cache file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedName {
    pub key: String,
    pub created_at_ms: u64,
}

/// Encodes and decodes cache file names for one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameCodec {
    prefix: String,
}

impl FilenameCodec {
    /// Create a codec, rejecting prefixes that could escape the cache dir.
    pub fn new(prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(MimirError::Configuration(
                "cache file prefix must not be empty".to_string(),
            ));
        }
        if prefix.contains(['/', '\\']) {
            return Err(MimirError::Configuration(format!(
                "cache file prefix '{prefix}' must not contain path separators"
            )));
        }
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Check that `key` can be embedded in a file name.
    pub fn validate_key(key: &str) -> Result<()> {
        let reason = if key.is_empty() {
            Some("key must not be empty")
        } else if key.contains('.') {
            Some("key must not contain '.'")
        } else if key.contains(['/', '\\']) {
            Some("key must not contain path separators")
        } else if key.chars().any(char::is_whitespace) {
            Some("key must not contain whitespace")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(MimirError::InvalidKey {
                key: key.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn encode(&self, key: &str, created_at_ms: u64) -> String {
        format!("{}.{key}.{created_at_ms}{SUFFIX}", self.prefix)
    }

    /// Encode with the current wall-clock time.
    pub fn encode_now(&self, key: &str) -> String {
        self.encode(key, epoch_millis())
    }

    /// Name of the scratch file a generation for `key` writes into.
    pub fn temp_name(&self, key: &str) -> String {
        format!("{}.{key}{TEMP_SUFFIX}", self.prefix)
    }

    /// Parse a file name; `None` if it is not a cache file for this prefix.
    pub fn decode(&self, name: &str) -> Option<DecodedName> {
        let rest = name.strip_prefix(self.prefix.as_str())?.strip_prefix('.')?;
        let (key, timestamp) = rest.strip_suffix(SUFFIX)?.rsplit_once('.')?;

        if Self::validate_key(key).is_err()
            || timestamp.is_empty()
            || !timestamp.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }

        Some(DecodedName {
            key: key.to_string(),
            created_at_ms: timestamp.parse().ok()?,
        })
    }
}

impl Default for FilenameCodec {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> FilenameCodec {
        FilenameCodec::default()
    }

    #[test]
    fn encode_uses_documented_pattern() {
        assert_eq!(codec().encode("sales", 1234), ".mimir.sales.1234.cache");
    }

    #[test]
    fn decode_inverts_encode() {
        let name = codec().encode("orders", 1_700_000_000_123);
        let decoded = codec().decode(&name).unwrap();
        assert_eq!(decoded.key, "orders");
        assert_eq!(decoded.created_at_ms, 1_700_000_000_123);
    }

    #[test]
    fn decode_allows_dashes_and_underscores_in_keys() {
        let decoded = codec().decode(".mimir.sales-eu_2.42.cache").unwrap();
        assert_eq!(decoded.key, "sales-eu_2");
        assert_eq!(decoded.created_at_ms, 42);
    }

    #[test]
    fn decode_rejects_non_matching_names() {
        let c = codec();
        for name in [
            "readme.md",
            ".mimir.sales.cache",
            ".mimir.sales.12a.cache",
            ".mimir.sales.123.cache.bak",
            ".mimir.sales.123",
            ".mimir..123.cache",
            ".mimir.a.b.123.cache",
            ".other.sales.123.cache",
            ".mimirx.sales.123.cache",
            ".mimir.sales.99999999999999999999999.cache",
        ] {
            assert!(c.decode(name).is_none(), "{name} should not decode");
        }
    }

    #[test]
    fn temp_name_never_decodes() {
        let c = codec();
        assert_eq!(c.temp_name("sales"), ".mimir.sales.tmp");
        assert!(c.decode(&c.temp_name("sales")).is_none());
    }

    #[test]
    fn custom_prefix_with_dots() {
        let c = FilenameCodec::new(".app.data").unwrap();
        let decoded = c.decode(&c.encode("inventory", 7)).unwrap();
        assert_eq!(decoded.key, "inventory");
        assert!(codec().decode(&c.encode("inventory", 7)).is_none());
    }

    #[test]
    fn prefix_validation() {
        assert!(FilenameCodec::new("").is_err());
        assert!(FilenameCodec::new("../escape").is_err());
        assert!(FilenameCodec::new("cache").is_ok());
    }

    #[test]
    fn key_validation() {
        assert!(FilenameCodec::validate_key("sales").is_ok());
        for bad in ["", "a.b", "a/b", "a\\b", "a b"] {
            let err = FilenameCodec::validate_key(bad).unwrap_err();
            assert!(matches!(err, MimirError::InvalidKey { .. }), "{bad:?}");
        }
    }
}
