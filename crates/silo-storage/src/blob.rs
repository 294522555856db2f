//! Blob store: object bytes on a POSIX-like filesystem
//!
//! Layout under the data root:
//!
//! ```text
//! <root>/<bucket>/<key>                      object data (key is a relative path)
//! <root>/<bucket>/.versions/<key>/<version>  versioned copies
//! <root>/.uploads/<upload-id>/<part-number>  multipart staging
//! ```
//!
//! Every write lands in a sibling `.tmp-*` file, is fully written and
//! synced, then renamed over the final name. The canonical file is never
//! left half-written; a failed write removes its temp file.

use bytes::Bytes;
use silo_core::{Error, Result};
use silo_crypto::Md5Stream;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

const UPLOADS_DIR: &str = ".uploads";
const VERSIONS_DIR: &str = ".versions";

const COPY_BUF_SIZE: usize = 64 * 1024;

pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        fs::create_dir_all(self.root.join(UPLOADS_DIR)).await?;
        debug!("Blob store initialized at {:?}", self.root);
        Ok(())
    }

    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }

    pub fn version_path(&self, bucket: &str, key: &str, version_id: &str) -> PathBuf {
        self.root
            .join(bucket)
            .join(VERSIONS_DIR)
            .join(key)
            .join(version_id)
    }

    pub fn staging_dir(&self, upload_id: &str) -> PathBuf {
        self.root.join(UPLOADS_DIR).join(upload_id)
    }

    pub fn part_path(&self, upload_id: &str, part_number: i32) -> PathBuf {
        self.staging_dir(upload_id).join(part_number.to_string())
    }

    pub async fn create_bucket_dir(&self, bucket: &str) -> Result<()> {
        fs::create_dir_all(self.root.join(bucket)).await?;
        Ok(())
    }

    pub async fn remove_bucket_dir(&self, bucket: &str) -> Result<()> {
        match fs::remove_dir_all(self.root.join(bucket)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn create_staging_dir(&self, upload_id: &str) -> Result<()> {
        fs::create_dir_all(self.staging_dir(upload_id)).await?;
        Ok(())
    }

    pub async fn remove_staging_dir(&self, upload_id: &str) -> Result<()> {
        match fs::remove_dir_all(self.staging_dir(upload_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn temp_sibling(path: &Path) -> PathBuf {
        let name = format!(".tmp-{}", uuid::Uuid::new_v4().simple());
        match path.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Write `data` to `path` atomically, returning the hex MD5 of the
    /// bytes written.
    pub async fn write(&self, path: &Path, data: &Bytes) -> Result<String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp = Self::temp_sibling(path);
        let result = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            fs::rename(&temp, path).await?;
            Ok::<_, Error>(())
        }
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&temp).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove temp file {:?}: {}", temp, cleanup);
                }
            }
            return Err(e);
        }

        let mut md5 = Md5Stream::new();
        md5.update(data);
        Ok(md5.finalize_hex())
    }

    /// Stream `reader` into `path` atomically, computing MD5 and size while
    /// copying.
    pub async fn write_from_reader<R>(&self, path: &Path, reader: &mut R) -> Result<(String, i64)>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp = Self::temp_sibling(path);
        let result = async {
            let mut file = fs::File::create(&temp).await?;
            let mut md5 = Md5Stream::new();
            let mut size: i64 = 0;
            let mut buf = vec![0u8; COPY_BUF_SIZE];

            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                md5.update(&buf[..n]);
                file.write_all(&buf[..n]).await?;
                size += n as i64;
            }

            file.sync_all().await?;
            fs::rename(&temp, path).await?;
            Ok::<_, Error>((md5.finalize_hex(), size))
        }
        .await;

        match result {
            Ok(out) => Ok(out),
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&temp).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove temp file {:?}: {}", temp, cleanup);
                    }
                }
                Err(e)
            }
        }
    }

    /// Concatenate `sources` in order into `path` atomically. Returns the
    /// total size written.
    pub async fn assemble(&self, path: &Path, sources: &[PathBuf]) -> Result<i64> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp = Self::temp_sibling(path);
        let result = async {
            let mut dest = fs::File::create(&temp).await?;
            let mut size: i64 = 0;

            for source in sources {
                let mut part = fs::File::open(source).await?;
                size += tokio::io::copy(&mut part, &mut dest).await? as i64;
            }

            dest.sync_all().await?;
            fs::rename(&temp, path).await?;
            Ok::<_, Error>(size)
        }
        .await;

        match result {
            Ok(size) => Ok(size),
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&temp).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove temp file {:?}: {}", temp, cleanup);
                    }
                }
                Err(e)
            }
        }
    }

    /// Copy the file at `from` to `to` atomically (versioned-write mirror).
    pub async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let mut source = fs::File::open(from).await?;
        self.write_from_reader(to, &mut source).await?;
        Ok(())
    }

    pub async fn open(&self, path: &Path) -> Result<fs::File> {
        match fs::File::open(path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NoSuchKey),
            Err(e) => Err(e.into()),
        }
    }

    /// Open a bounded reader over the inclusive byte range `[start, end]`.
    /// The returned reader hits EOF after exactly `end - start + 1` bytes.
    pub async fn open_range(
        &self,
        path: &Path,
        start: i64,
        end: i64,
    ) -> Result<tokio::io::Take<fs::File>> {
        let mut file = self.open(path).await?;
        file.seek(std::io::SeekFrom::Start(start as u64)).await?;
        Ok(file.take((end - start + 1) as u64))
    }

    /// Remove a file; absent files are fine.
    pub async fn remove(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the per-key version directory once its last version is gone.
    pub async fn remove_version_dir_if_empty(&self, bucket: &str, key: &str) {
        let dir = self.root.join(bucket).join(VERSIONS_DIR).join(key);
        let _ = fs::remove_dir(dir).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silo_crypto::md5_hex;

    async fn store() -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        store.init().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_write_read_round_trip() {
        let (_dir, store) = store().await;
        let path = store.object_path("b", "nested/key.txt");

        let etag = store.write(&path, &Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(etag, md5_hex(b"hello"));

        let mut file = store.open(&path).await.unwrap();
        let mut out = Vec::new();
        file.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let (_dir, store) = store().await;
        let path = store.object_path("b", "k");
        store.write(&path, &Bytes::from_static(b"data")).await.unwrap();

        let mut entries = fs::read_dir(path.parent().unwrap()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["k"]);
    }

    #[tokio::test]
    async fn test_range_reader_is_bounded() {
        let (_dir, store) = store().await;
        let path = store.object_path("b", "k");
        store
            .write(&path, &Bytes::from_static(b"0123456789ABCDEF"))
            .await
            .unwrap();

        let mut reader = store.open_range(&path, 2, 5).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"2345");
    }

    #[tokio::test]
    async fn test_assemble_concatenates_in_order() {
        let (_dir, store) = store().await;
        let p1 = store.part_path("up", 1);
        let p2 = store.part_path("up", 2);
        store.create_staging_dir("up").await.unwrap();
        store.write(&p1, &Bytes::from_static(b"aaa")).await.unwrap();
        store.write(&p2, &Bytes::from_static(b"bb")).await.unwrap();

        let dest = store.object_path("b", "joined");
        let size = store.assemble(&dest, &[p1, p2]).await.unwrap();
        assert_eq!(size, 5);

        let mut file = store.open(&dest).await.unwrap();
        let mut out = Vec::new();
        file.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"aaabb");
    }

    #[tokio::test]
    async fn test_missing_file_is_no_such_key() {
        let (_dir, store) = store().await;
        let path = store.object_path("b", "missing");
        assert!(matches!(store.open(&path).await, Err(Error::NoSuchKey)));
        // Removing an absent file is fine
        store.remove(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_staging_dir_removal_is_idempotent() {
        let (_dir, store) = store().await;
        store.create_staging_dir("up").await.unwrap();
        store.remove_staging_dir("up").await.unwrap();
        store.remove_staging_dir("up").await.unwrap();
    }
}
