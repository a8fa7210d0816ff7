use super::{ObjectBody, ObjectStore};
use dashmap::DashMap;
use url::Url;

/// Object store that keeps everything in process memory. Useful for tests and for hosts running
/// the whole system in one process.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: DashMap<(String, String), Vec<u8>>,
}

impl InMemoryObjectStore {
    /// Number of distinct objects stored, across all buckets
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait::async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> anyhow::Result<()> {
        self.objects
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> anyhow::Result<ObjectBody> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|body| ObjectBody::Binary(body.value().clone()))
            .ok_or_else(|| anyhow::anyhow!("No object {} in bucket {}", key, bucket))
    }

    fn object_url(&self, bucket: &str, key: &str) -> Option<Url> {
        Url::parse(&format!("mem://{}/{}", bucket, key)).ok()
    }
}
