use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid experiment config: {0}")]
    InvalidConfig(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    /// The artifact could not be turned into a scorable classifier.
    #[error("failed to load artifact {artifact}: {source}")]
    ArtifactLoad {
        artifact: String,
        #[source]
        source: anyhow::Error,
    },

    /// The artifact loaded but classification failed part way through.
    #[error("evaluation of {artifact} failed: {source}")]
    Evaluation {
        artifact: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("storage failure for '{name}': {source}")]
    Storage {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("baseline accuracy could not be computed: {0}")]
    Baseline(#[source] Box<TrainingError>),

    #[error("trainer error: {0}")]
    Trainer(#[source] anyhow::Error),

    #[error("finalization failed: {0}")]
    Finalize(#[source] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrainingError {
    pub(crate) fn storage(name: &str, source: impl Into<anyhow::Error>) -> Self {
        Self::Storage { name: name.to_string(), source: source.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_names_destination() {
        let err = TrainingError::storage(
            "adapter.best_accuracy.bin",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "storage failure for 'adapter.best_accuracy.bin': denied");
    }

    #[test]
    fn test_baseline_error_wraps_load_failure() {
        let inner = TrainingError::ArtifactLoad {
            artifact: "base".to_string(),
            source: anyhow::anyhow!("corrupt weights"),
        };
        let err = TrainingError::Baseline(Box::new(inner));
        assert!(err.to_string().contains("failed to load artifact base: corrupt weights"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
