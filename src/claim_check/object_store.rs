use super::{CheckFormat, ClaimCheck};
use crate::errors::ClaimCheckError;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use url::Url;

/// Body of an object read back from an [ObjectStore]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectBody {
    Text(String),
    Binary(Vec<u8>),
}

/// Minimal object storage client the content-addressed claim check is written against. Hosts
/// inject whatever client they already run (S3, GCS, a local directory...).
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` under `key`, replacing anything already stored there
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> anyhow::Result<()>;

    async fn get_object(&self, bucket: &str, key: &str) -> anyhow::Result<ObjectBody>;

    /// A fully qualified locator for the object, if the store has one
    fn object_url(&self, bucket: &str, key: &str) -> Option<Url>;
}

/// Where content-addressed claim checks are written
#[derive(Debug, Clone, derive_builder::Builder)]
#[builder(setter(into))]
pub struct ClaimCheckConfig {
    bucket: String,
    /// Joined in front of every content digest to form the storage key
    #[builder(default)]
    prefix: String,
}

/// Claim check which stores each payload under the SHA-256 digest of its content, so identical
/// payloads collapse into one object and storing the same payload twice is harmless.
pub struct ObjectStoreClaimCheck<S> {
    config: ClaimCheckConfig,
    store: Arc<S>,
}

impl<S: ObjectStore> ObjectStoreClaimCheck<S> {
    pub fn new(config: ClaimCheckConfig, store: Arc<S>) -> Self {
        Self { config, store }
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// Storage key the given content would be written under
    pub fn key_for(&self, content: &str) -> String {
        let digest = hex::encode(Sha256::digest(content.as_bytes()));
        // Keys are always relative, with no empty segments
        let mut segments: Vec<&str> = self
            .config
            .prefix
            .split('/')
            .filter(|seg| !seg.is_empty())
            .collect();
        segments.push(&digest);
        segments.join("/")
    }
}

#[async_trait::async_trait]
impl<S: ObjectStore> ClaimCheck for ObjectStoreClaimCheck<S> {
    async fn build_check(&self, content: &str) -> Result<CheckFormat, ClaimCheckError> {
        let key = self.key_for(content);
        self.store
            .put_object(&self.config.bucket, &key, content.as_bytes().to_vec())
            .await?;
        debug!(bucket = %self.config.bucket, key = %key, "Stored claim check");
        let url = self.store.object_url(&self.config.bucket, &key);
        let mut check = CheckFormat::new(key);
        if let Some(url) = url {
            check = check.with_url(url.to_string());
        }
        Ok(check)
    }

    async fn retrieve_check(&self, check: &CheckFormat) -> Result<String, ClaimCheckError> {
        match self
            .store
            .get_object(&self.config.bucket, &check.key)
            .await?
        {
            ObjectBody::Text(s) => Ok(s),
            ObjectBody::Binary(bytes) => {
                String::from_utf8(bytes).map_err(|source| ClaimCheckError::InvalidUtf8 {
                    key: check.key.clone(),
                    source,
                })
            }
        }
    }
}
