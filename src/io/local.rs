use super::{ByteRange, ByteRangeSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Local filesystem source; paths are resolved against an optional root
#[derive(Debug, Default, Clone)]
pub struct LocalFileSource {
    root: Option<PathBuf>,
}

impl LocalFileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path),
            None => PathBuf::from(path),
        }
    }
}

#[async_trait]
impl ByteRangeSource for LocalFileSource {
    async fn read(&self, path: &str, range: ByteRange) -> Result<Bytes> {
        let full = self.resolve(path);
        let mut file = File::open(&full)
            .await
            .with_context(|| format!("open {}", full.display()))?;
        file.seek(SeekFrom::Start(range.offset)).await?;

        // Short only at end of file
        let mut buf = Vec::with_capacity(range.length as usize);
        file.take(range.length as u64).read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}
