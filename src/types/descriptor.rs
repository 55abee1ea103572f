//! Cache file descriptors

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::format::CBOR_SELF_DESCRIBE_TAG;
use crate::{MimirError, Result};

/// One published cache file.
///
/// `created_at_ms` comes from the file name, not the filesystem mtime, so it
/// survives copies and restores. This is also the wire format a
/// [`ProcessWorker`](crate::worker::ProcessWorker) child prints on success.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheFileDescriptor {
    pub key: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at_ms: u64,
}

impl CacheFileDescriptor {
    /// Age relative to `now_ms`; zero for timestamps in the future.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.created_at_ms)
    }

    /// Open the artifact for streaming.
    pub async fn open(&self) -> Result<tokio::fs::File> {
        tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| MimirError::filesystem(&self.path, e))
    }

    /// Read the whole artifact into memory.
    pub async fn read_bytes(&self) -> Result<Vec<u8>> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| MimirError::filesystem(&self.path, e))
    }

    /// Read and decode the artifact, whichever encoding it was written in.
    pub async fn read_value(&self) -> Result<serde_json::Value> {
        let bytes = self.read_bytes().await?;
        decode_artifact(&bytes)
    }
}

/// Decode artifact bytes: CBOR when the self-describe tag is present, JSON otherwise.
pub(crate) fn decode_artifact(bytes: &[u8]) -> Result<serde_json::Value> {
    match bytes.strip_prefix(&CBOR_SELF_DESCRIBE_TAG[..]) {
        Some(body) => Ok(ciborium::from_reader(body)?),
        None => Ok(serde_json::from_slice(bytes)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn age_saturates_for_future_timestamps() {
        let d = CacheFileDescriptor {
            key: "orders".into(),
            path: PathBuf::from("/tmp/x"),
            size_bytes: 0,
            created_at_ms: 2_000,
        };
        assert_eq!(d.age_ms(2_500), 500);
        assert_eq!(d.age_ms(1_000), 0);
    }

    #[test]
    fn decode_json_artifact() {
        let value = decode_artifact(br#"{"rows": [1, 2, 3]}"#).unwrap();
        assert_eq!(value, json!({"rows": [1, 2, 3]}));
    }

    #[test]
    fn decode_tagged_cbor_artifact() {
        let mut bytes = CBOR_SELF_DESCRIBE_TAG.to_vec();
        ciborium::into_writer(&json!({"total": 42, "name": "sales"}), &mut bytes).unwrap();

        let value = decode_artifact(&bytes).unwrap();
        assert_eq!(value, json!({"total": 42, "name": "sales"}));
    }

    #[test]
    fn decode_garbage_is_serialization_error() {
        let err = decode_artifact(b"\x00not json").unwrap_err();
        assert!(matches!(err, MimirError::Serialization(_)));
    }
}
