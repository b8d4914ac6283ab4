use crate::config::CheckpointConfig;
use crate::error::{TrainingError, TrainingResult};
use crate::trainer::{SnapshotKind, SnapshotSource};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Durable, name-addressed storage for adapters and trainer checkpoints.
///
/// Writers never expose a partially written destination: both `save` and
/// `promote` land under a temporary name first and are renamed into place.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Path a name resolves to (whether or not it exists yet).
    fn locate(&self, name: &str) -> PathBuf;

    async fn save(&self, source: &dyn SnapshotSource, kind: SnapshotKind, name: &str) -> TrainingResult<PathBuf>;

    /// Copy `source` over `destination`, replacing it if present.
    async fn promote(&self, source: &str, destination: &str) -> TrainingResult<PathBuf>;

    async fn exists(&self, name: &str) -> bool;
}

/// Checkpoint store backed by a single directory.
#[derive(Debug, Clone)]
pub struct FsCheckpointStore {
    root: PathBuf,
}

impl FsCheckpointStore {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn from_config(config: &CheckpointConfig) -> Self {
        Self::new(config.dir.clone())
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> TrainingResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    fn staging_path(&self, name: &str) -> PathBuf {
        self.root.join(format!(".{name}.{}.tmp", Uuid::new_v4()))
    }

    async fn ensure_root(&self, name: &str) -> TrainingResult<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| TrainingError::storage(name, e))
    }
}

#[async_trait]
impl CheckpointStore for FsCheckpointStore {
    fn locate(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    async fn save(&self, source: &dyn SnapshotSource, kind: SnapshotKind, name: &str) -> TrainingResult<PathBuf> {
        let destination = self.resolve(name)?;
        self.ensure_root(name).await?;

        let staging = self.staging_path(name);
        if let Err(e) = source.write_snapshot(kind, &staging).await {
            discard(&staging).await;
            return Err(TrainingError::storage(name, e));
        }
        if let Err(e) = persist(&staging, &destination).await {
            discard(&staging).await;
            return Err(TrainingError::storage(name, e));
        }

        debug!(?kind, path = %destination.display(), "snapshot saved");
        Ok(destination)
    }

    async fn promote(&self, source: &str, destination: &str) -> TrainingResult<PathBuf> {
        let from = self.resolve(source)?;
        let to = self.resolve(destination)?;
        self.ensure_root(destination).await?;

        let staging = self.staging_path(destination);
        let result = async {
            tokio::fs::copy(&from, &staging).await?;
            persist(&staging, &to).await
        }
        .await;

        if let Err(e) = result {
            discard(&staging).await;
            return Err(TrainingError::storage(destination, e));
        }

        debug!(from = %from.display(), to = %to.display(), "snapshot promoted");
        Ok(to)
    }

    async fn exists(&self, name: &str) -> bool {
        match self.resolve(name) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}

/// Flush a staged file to disk, then move it over `destination`.
async fn persist(staging: &Path, destination: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(staging).await?.sync_all().await?;
    tokio::fs::rename(staging, destination).await
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %path.display(), "failed to remove staging file: {e}");
        }
    }
}

fn validate_name(name: &str) -> TrainingResult<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(TrainingError::storage(
            name,
            anyhow::anyhow!("snapshot names must be a single relative file name"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct BytesSource(Vec<u8>);

    #[async_trait]
    impl SnapshotSource for BytesSource {
        async fn write_snapshot(&self, _kind: SnapshotKind, destination: &Path) -> anyhow::Result<()> {
            tokio::fs::write(destination, &self.0).await?;
            Ok(())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl SnapshotSource for FailingSource {
        async fn write_snapshot(&self, _kind: SnapshotKind, destination: &Path) -> anyhow::Result<()> {
            tokio::fs::write(destination, b"half").await?;
            anyhow::bail!("disk full")
        }
    }

    /// Reports success without producing the snapshot file.
    struct SilentSource;

    #[async_trait]
    impl SnapshotSource for SilentSource {
        async fn write_snapshot(&self, _kind: SnapshotKind, _destination: &Path) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_save_writes_named_snapshot() {
        let temp = TempDir::new().unwrap();
        let store = FsCheckpointStore::new(temp.path().join("run"));

        let path = store.save(&BytesSource(b"weights".to_vec()), SnapshotKind::Adapter, "adapter.last.bin").await.unwrap();

        assert_eq!(path, store.locate("adapter.last.bin"));
        assert_eq!(std::fs::read(&path).unwrap(), b"weights");
        assert!(store.exists("adapter.last.bin").await);
        assert_eq!(entries(store.root()), vec!["adapter.last.bin"]);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_no_destination() {
        let temp = TempDir::new().unwrap();
        let store = FsCheckpointStore::new(temp.path().to_path_buf());

        let err = store.save(&FailingSource, SnapshotKind::TrainerCheckpoint, "checkpoint.recovery.bin").await.unwrap_err();

        assert!(matches!(err, TrainingError::Storage { .. }));
        assert!(!store.exists("checkpoint.recovery.bin").await);
        assert!(entries(store.root()).is_empty());
    }

    #[tokio::test]
    async fn test_save_fails_when_snapshot_cannot_be_flushed() {
        let temp = TempDir::new().unwrap();
        let store = FsCheckpointStore::new(temp.path().to_path_buf());
        store.save(&BytesSource(b"previous".to_vec()), SnapshotKind::Adapter, "adapter.last.bin").await.unwrap();

        let err = store.save(&SilentSource, SnapshotKind::Adapter, "adapter.last.bin").await.unwrap_err();

        assert!(matches!(err, TrainingError::Storage { ref name, .. } if name == "adapter.last.bin"));
        assert_eq!(std::fs::read(store.locate("adapter.last.bin")).unwrap(), b"previous");
        assert_eq!(entries(store.root()), vec!["adapter.last.bin"]);
    }

    #[test]
    fn test_from_config_uses_checkpoint_dir() {
        let config = CheckpointConfig { dir: PathBuf::from("runs/sentiment"), ..CheckpointConfig::default() };
        let store = FsCheckpointStore::from_config(&config);
        assert_eq!(store.locate("adapter.last.bin"), PathBuf::from("runs/sentiment/adapter.last.bin"));
    }

    #[tokio::test]
    async fn test_promote_overwrites_and_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = FsCheckpointStore::new(temp.path().to_path_buf());
        store.save(&BytesSource(b"old best".to_vec()), SnapshotKind::Adapter, "best.bin").await.unwrap();
        store.save(&BytesSource(b"candidate".to_vec()), SnapshotKind::Adapter, "last.bin").await.unwrap();

        store.promote("last.bin", "best.bin").await.unwrap();
        let once = std::fs::read(store.locate("best.bin")).unwrap();
        store.promote("last.bin", "best.bin").await.unwrap();
        let twice = std::fs::read(store.locate("best.bin")).unwrap();

        assert_eq!(once, b"candidate");
        assert_eq!(once, twice);
        assert_eq!(entries(store.root()), vec!["best.bin", "last.bin"]);
    }

    #[tokio::test]
    async fn test_promote_missing_source_keeps_destination() {
        let temp = TempDir::new().unwrap();
        let store = FsCheckpointStore::new(temp.path().to_path_buf());
        store.save(&BytesSource(b"keep".to_vec()), SnapshotKind::Adapter, "best.bin").await.unwrap();

        let err = store.promote("missing.bin", "best.bin").await.unwrap_err();

        assert!(matches!(err, TrainingError::Storage { ref name, .. } if name == "best.bin"));
        assert_eq!(std::fs::read(store.locate("best.bin")).unwrap(), b"keep");
        assert_eq!(entries(store.root()), vec!["best.bin"]);
    }

    #[tokio::test]
    async fn test_rejects_names_outside_root() {
        let temp = TempDir::new().unwrap();
        let store = FsCheckpointStore::new(temp.path().to_path_buf());
        for name in ["../escape.bin", "nested/adapter.bin", "", "/abs.bin"] {
            assert!(store.save(&BytesSource(vec![1]), SnapshotKind::Adapter, name).await.is_err(), "{name}");
            assert!(!store.exists(name).await);
        }
    }
}
