//! Claim checks let payloads too large for the workflow service's protocol travel out-of-band.
//! The content is written to a backing store and a small token describing where it lives is sent
//! in its place.

mod fs;
mod memory;
mod object_store;

pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;
pub use object_store::{
    ClaimCheckConfig, ClaimCheckConfigBuilder, ObjectBody, ObjectStore, ObjectStoreClaimCheck,
};

use crate::errors::ClaimCheckError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the marker field distinguishing a claim check token from an inline payload
pub const CLAIM_CHECK_MARKER: &str = "_claimCheck";

/// The token substituted for an externalized payload.
///
/// Only the marker is meaningful to the execution engine, everything else belongs to the backend
/// that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckFormat {
    #[serde(rename = "_claimCheck")]
    pub claim_check: bool,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CheckFormat {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            claim_check: true,
            key: key.into(),
            url: None,
            extra: Map::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Read a token out of a payload. Returns `Ok(None)` if the payload is inline content.
    pub fn from_value(value: &Value) -> Result<Option<Self>, ClaimCheckError> {
        if !is_claim_check(value) {
            return Ok(None);
        }
        Ok(Some(Self::deserialize(value)?))
    }

    /// Parse a token from its serialized text form
    pub fn from_json(s: &str) -> Result<Self, ClaimCheckError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn to_value(&self) -> Value {
        // A struct of strings and a json map cannot fail to serialize
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }
}

/// True if the payload is a claim check token which must be retrieved before use
pub fn is_claim_check(value: &Value) -> bool {
    value
        .get(CLAIM_CHECK_MARKER)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Externalizes content to a backing store and retrieves it again
#[async_trait::async_trait]
pub trait ClaimCheck: Send + Sync {
    /// Store `content` out-of-band and return the token locating it
    async fn build_check(&self, content: &str) -> Result<CheckFormat, ClaimCheckError>;

    /// Fetch the content a token (or any structurally compatible token) refers to
    async fn retrieve_check(&self, check: &CheckFormat) -> Result<String, ClaimCheckError>;
}

/// Replace `value` with the content it refers to if it is a claim check. Retrieved content that
/// is not itself JSON is returned as a JSON string.
pub async fn resolve_payload(
    claim_check: &dyn ClaimCheck,
    value: Value,
) -> Result<Value, ClaimCheckError> {
    let check = match CheckFormat::from_value(&value)? {
        Some(c) => c,
        None => return Ok(value),
    };
    let content = claim_check.retrieve_check(&check).await?;
    Ok(serde_json::from_str(&content).unwrap_or(Value::String(content)))
}

/// Externalize `value` if its serialized form is larger than `threshold` bytes, otherwise hand it
/// back untouched.
pub async fn externalize_payload(
    claim_check: &dyn ClaimCheck,
    value: Value,
    threshold: usize,
) -> Result<Value, ClaimCheckError> {
    let serialized = value.to_string();
    if serialized.len() <= threshold {
        return Ok(value);
    }
    debug!(
        size = serialized.len(),
        threshold, "Externalizing oversized payload"
    );
    Ok(claim_check.build_check(&serialized).await?.to_value())
}
