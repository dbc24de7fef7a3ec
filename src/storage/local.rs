use super::{ByteRange, ByteStream, Storage};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, BufReader};
use url::Url;

/// Cap for a single ranged read
const MAX_RANGE_BYTES: u64 = 10 * 1024 * 1024;

/// Filesystem storage. Remote URLs are mapped onto `root` by path, so a
/// mirror of `https://host/a/b.bed.gz` lives at `root/a/b.bed.gz`.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn resolve(&self, location: &str) -> Result<PathBuf> {
        match Url::parse(location) {
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map_err(|_| Error::InvalidInput(format!("bad file URL: {}", location))),
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                Ok(self.root.join(url.path().trim_start_matches('/')))
            }
            _ => Ok(self.root.join(location)),
        }
    }

    async fn open_file(&self, location: &str) -> Result<fs::File> {
        let path = self.resolve(location)?;
        fs::File::open(&path)
            .await
            .map_err(|e| Error::TrackFetch(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn open(&self, location: &str) -> Result<ByteStream> {
        let file = self.open_file(location).await?;
        Ok(Box::pin(BufReader::new(file)))
    }

    async fn read_bytes(&self, location: &str, range: Option<ByteRange>) -> Result<Bytes> {
        let mut file = self.open_file(location).await?;

        let mut buf = Vec::new();
        match range {
            Some(r) => {
                file.seek(std::io::SeekFrom::Start(r.start)).await?;
                let len = r
                    .end
                    .map(|e| e.saturating_sub(r.start) + 1)
                    .unwrap_or(MAX_RANGE_BYTES)
                    .min(MAX_RANGE_BYTES);
                file.take(len).read_to_end(&mut buf).await?;
            }
            None => {
                file.read_to_end(&mut buf).await?;
            }
        }

        Ok(Bytes::from(buf))
    }

    async fn read_to_string(&self, location: &str) -> Result<String> {
        let path = self.resolve(location)?;
        fs::read_to_string(&path)
            .await
            .map_err(|e| Error::TrackFetch(format!("{}: {}", path.display(), e)))
    }
}
