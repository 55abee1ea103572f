//! Artifact serialization formats

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::MimirError;

/// CBOR self-describe tag (55799). Written ahead of every CBOR artifact so
/// readers can tell the two encodings apart without a file extension.
pub const CBOR_SELF_DESCRIBE_TAG: [u8; 3] = [0xd9, 0xd9, 0xf7];

/// How an artifact is encoded on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Streaming JSON text.
    #[default]
    Json,
    /// Compact CBOR binary.
    Cbor,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Cbor => "cbor",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = MimirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "cbor" | "binary" => Ok(OutputFormat::Cbor),
            other => Err(MimirError::Configuration(format!(
                "unknown output format '{other}' (expected json or cbor)"
            ))),
        }
    }
}
