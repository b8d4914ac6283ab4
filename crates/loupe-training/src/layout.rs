use std::path::{Path, PathBuf};

/// File layout of one experiment directory.
///
/// Snapshot names are handed to the [`CheckpointStore`](crate::CheckpointStore),
/// which also holds the manifest. `root` is the store's directory when read back.
#[derive(Debug, Clone)]
pub struct ExperimentLayout {
    root: PathBuf,
}

impl ExperimentLayout {
    /// Adapter written on the evaluation cadence.
    pub const LATEST_ADAPTER: &'static str = "adapter.last.bin";
    /// Adapter written whenever the trainer reports a new best loss.
    pub const BEST_LOSS_ADAPTER: &'static str = "adapter.best_loss.bin";
    /// Adapter that scored the best accuracy so far.
    pub const BEST_ACCURACY_ADAPTER: &'static str = "adapter.best_accuracy.bin";
    /// Trainer checkpoint matching [`Self::BEST_ACCURACY_ADAPTER`].
    pub const BEST_CHECKPOINT: &'static str = "checkpoint.best.bin";
    /// Trainer checkpoint for resuming after an interruption.
    pub const RECOVERY_CHECKPOINT: &'static str = "checkpoint.recovery.bin";
    pub const MANIFEST: &'static str = "experiment_manifest.json";

    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(Self::MANIFEST)
    }
}
