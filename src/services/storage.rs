use std::collections::HashSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::models::job::Partition;

/// Local directory tree holding the two output partitions.
pub struct OutputStore {
    root: PathBuf,
}

impl OutputStore {
    /// Open (and create if needed) `<root>/dura_bulk` and `<root>/non_dura_bulk`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let store = Self { root: root.into() };
        for partition in Partition::ALL {
            tokio::fs::create_dir_all(store.dir(partition)).await?;
        }
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, partition: Partition) -> PathBuf {
        self.root.join(partition.to_string())
    }

    /// Directory holding the outputs of one batch within a partition.
    pub fn batch_dir(&self, job_id: &Uuid, partition: Partition) -> PathBuf {
        self.dir(partition).join(job_id.to_string())
    }

    /// Copy a classified image directly into its partition under `name`.
    /// Only for callers that own the whole output root, like the offline
    /// classifier.
    pub async fn place(&self, source: &Path, partition: Partition, name: &str) -> Result<PathBuf, StorageError> {
        copy_into(&self.dir(partition), source, name).await
    }

    /// Copy an image classified by batch `job_id` into
    /// `<partition>/<job_id>/<name>`. Batches write to disjoint directories.
    pub async fn place_for_batch(
        &self,
        source: &Path,
        job_id: &Uuid,
        partition: Partition,
        name: &str,
    ) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        let dir = self.batch_dir(job_id, partition);
        tokio::fs::create_dir_all(&dir).await?;
        copy_into(&dir, source, name).await
    }

    /// Path of a file stored by a batch, if it exists.
    pub async fn resolve(&self, job_id: &Uuid, partition: Partition, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        let path = self.batch_dir(job_id, partition).join(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(StorageError::NotFound(name.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Read a file stored by a batch.
    pub async fn read(&self, job_id: &Uuid, partition: Partition, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(job_id, partition, name).await?;
        Ok(tokio::fs::read(path).await?)
    }

    /// Both partition directories exist and are directories.
    pub async fn health_check(&self) -> Result<(), StorageError> {
        for partition in Partition::ALL {
            let meta = tokio::fs::metadata(self.dir(partition)).await?;
            if !meta.is_dir() {
                return Err(StorageError::NotFound(partition.to_string()));
            }
        }
        Ok(())
    }
}

async fn copy_into(dir: &Path, source: &Path, name: &str) -> Result<PathBuf, StorageError> {
    validate_name(name)?;
    let dest = dir.join(name);
    tokio::fs::copy(source, &dest).await?;
    Ok(dest)
}

/// Reject anything that is not a plain file name.
fn validate_name(name: &str) -> Result<(), StorageError> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0');
    if plain {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}

/// How output files are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputNaming {
    /// Keep the source file name.
    Preserve,
    /// `<prefix>_<index:04>.<ext>` from the image's position in the batch.
    Indexed { prefix: String },
}

/// Hands out output names that are unique within one batch.
pub struct BatchNamer {
    naming: OutputNaming,
    used: HashSet<String>,
}

impl BatchNamer {
    pub fn new(naming: OutputNaming) -> Self {
        Self {
            naming,
            used: HashSet::new(),
        }
    }

    pub fn name_for(&mut self, index: usize, source: &Path) -> String {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("image");
        let ext = source.extension().and_then(|e| e.to_str());

        let base = match &self.naming {
            OutputNaming::Preserve => stem.to_string(),
            OutputNaming::Indexed { prefix } => format!("{}_{:04}", prefix, index),
        };
        let with_ext = |s: &str| match ext {
            Some(ext) => format!("{}.{}", s, ext),
            None => s.to_string(),
        };

        let mut candidate = with_ext(&base);
        let mut n = 1;
        while self.used.contains(&candidate) {
            candidate = with_ext(&format!("{}_{}", base, n));
            n += 1;
        }
        self.used.insert(candidate.clone());
        candidate
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    #[error("File not found: {0}")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_partitions() {
        let root = tempfile::tempdir().unwrap();
        let store = OutputStore::open(root.path().join("out")).await.unwrap();
        assert!(store.dir(Partition::DuraBulk).is_dir());
        assert!(store.dir(Partition::NonDuraBulk).is_dir());
        assert!(store.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_place_for_batch_copies_and_reads_back() {
        let root = tempfile::tempdir().unwrap();
        let store = OutputStore::open(root.path()).await.unwrap();
        let src = root.path().join("src.jpg");
        std::fs::write(&src, b"pixels").unwrap();
        let job_id = Uuid::new_v4();

        let dest = store
            .place_for_batch(&src, &job_id, Partition::DuraBulk, "ship.jpg")
            .await
            .unwrap();

        assert!(src.exists());
        assert_eq!(dest, store.batch_dir(&job_id, Partition::DuraBulk).join("ship.jpg"));
        assert_eq!(store.read(&job_id, Partition::DuraBulk, "ship.jpg").await.unwrap(), b"pixels");
        assert!(matches!(
            store.read(&job_id, Partition::NonDuraBulk, "ship.jpg").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_batches_with_same_name_do_not_collide() {
        let root = tempfile::tempdir().unwrap();
        let store = OutputStore::open(root.path()).await.unwrap();
        let first = root.path().join("first.png");
        let second = root.path().join("second.png");
        std::fs::write(&first, b"first batch").unwrap();
        std::fs::write(&second, b"second batch").unwrap();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        store.place_for_batch(&first, &a, Partition::DuraBulk, "upload_0000.png").await.unwrap();
        store.place_for_batch(&second, &b, Partition::DuraBulk, "upload_0000.png").await.unwrap();

        assert_eq!(store.read(&a, Partition::DuraBulk, "upload_0000.png").await.unwrap(), b"first batch");
        assert_eq!(store.read(&b, Partition::DuraBulk, "upload_0000.png").await.unwrap(), b"second batch");
    }

    #[tokio::test]
    async fn test_flat_place_for_offline_runs() {
        let root = tempfile::tempdir().unwrap();
        let store = OutputStore::open(root.path()).await.unwrap();
        let src = root.path().join("src.jpg");
        std::fs::write(&src, b"pixels").unwrap();

        let dest = store.place(&src, Partition::NonDuraBulk, "ship.jpg").await.unwrap();
        assert_eq!(dest, store.dir(Partition::NonDuraBulk).join("ship.jpg"));
        assert!(matches!(
            store.place(&src, Partition::NonDuraBulk, "").await,
            Err(StorageError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_traversal_names_rejected() {
        let root = tempfile::tempdir().unwrap();
        let store = OutputStore::open(root.path()).await.unwrap();
        let job_id = Uuid::new_v4();
        for name in ["../secret", "a/b.jpg", "..", "", "a\\b"] {
            assert!(
                matches!(
                    store.resolve(&job_id, Partition::DuraBulk, name).await,
                    Err(StorageError::InvalidName(_))
                ),
                "{name:?} accepted"
            );
        }
    }

    #[test]
    fn test_preserve_naming_disambiguates() {
        let mut namer = BatchNamer::new(OutputNaming::Preserve);
        assert_eq!(namer.name_for(0, Path::new("a/ship.jpg")), "ship.jpg");
        assert_eq!(namer.name_for(1, Path::new("b/ship.jpg")), "ship_1.jpg");
        assert_eq!(namer.name_for(2, Path::new("c/ship.jpg")), "ship_2.jpg");
        assert_eq!(namer.name_for(3, Path::new("c/other.png")), "other.png");
    }

    #[test]
    fn test_indexed_naming() {
        let mut namer = BatchNamer::new(OutputNaming::Indexed { prefix: "upload".into() });
        assert_eq!(namer.name_for(0, Path::new("/tmp/x/IMG_77.JPG")), "upload_0000.JPG");
        assert_eq!(namer.name_for(12, Path::new("/tmp/x/noext")), "upload_0012");
    }
}
