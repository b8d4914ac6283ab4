use async_trait::async_trait;
use std::path::Path;

/// Materializes the final, directly deployable model.
///
/// Receives the best adapter and the scale it scored best at, and writes the
/// consolidated model (base weights with the adapter merged in) to `output`.
#[async_trait]
pub trait Finalizer: Send + Sync {
    async fn merge(&self, adapter: &Path, scale: f32, output: &Path) -> anyhow::Result<()>;
}
