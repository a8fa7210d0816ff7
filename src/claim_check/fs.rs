use super::{ObjectBody, ObjectStore};
use anyhow::Context;
use std::path::{Component, Path, PathBuf};
use url::Url;

/// Object store laid out on a local (or mounted) filesystem as `<root>/<bucket>/<key>`
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> anyhow::Result<PathBuf> {
        let mut path = self.root.clone();
        for part in [bucket, key] {
            let rel = Path::new(part);
            // Keys must stay inside the root
            if rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
            {
                anyhow::bail!("Refusing object path component {:?}", part);
            }
            path.push(rel);
        }
        Ok(path)
    }
}

#[async_trait::async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> anyhow::Result<()> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("writing {}", path.display()))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> anyhow::Result<ObjectBody> {
        let path = self.object_path(bucket, key)?;
        let body = tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(ObjectBody::Binary(body))
    }

    fn object_url(&self, bucket: &str, key: &str) -> Option<Url> {
        let path = self.object_path(bucket, key).ok()?;
        Url::from_file_path(path).ok()
    }
}
