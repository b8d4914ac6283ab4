use crate::policy::StopReason;
use crate::trainer::SnapshotKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Immutable snapshot of the trainer's progress at one reporting point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub iteration: u64,
    pub iteration_count: u64,
    #[serde(default)]
    pub epoch: u64,
    /// Completion in `[0, 100]`.
    pub percentage: f64,
    pub loss: f64,
    /// Best loss as reported by the trainer itself.
    pub best_loss: f64,
    #[serde(with = "secs")]
    pub elapsed: Duration,
    #[serde(default, with = "opt_secs", skip_serializing_if = "Option::is_none")]
    pub remaining: Option<Duration>,
    #[serde(default)]
    pub next_sample: u64,
    #[serde(default)]
    pub sample_count: u64,
}

impl ProgressEvent {
    /// True on the last event of a run that was not stopped early.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.percentage >= 100.0
    }
}

/// Cooperative cancellation handle shared between the controller and the trainer.
///
/// The controller calls [`StopToken::request`]; the trainer is expected to poll
/// [`StopToken::is_requested`] at its next natural boundary and wind down.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything the controller reports while an experiment runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExperimentEvent {
    BaselineMeasured { accuracy: f64, samples_per_second: f64 },
    Progress { event: ProgressEvent },
    BestLoss { loss: f64 },
    StopRequested { reason: StopReason },
    SnapshotSaved { name: String, kind: SnapshotKind },
    StorageFailed { name: String, message: String },
    CandidateEvaluated {
        candidate: String,
        scale: f32,
        accuracy: f64,
        best_accuracy: f64,
        best_scale: Option<f32>,
        initial_accuracy: f64,
        samples_per_second: f64,
    },
    Improved { candidate: String, scale: f32, accuracy: f64, samples_per_second: f64 },
    EvaluationFailed { candidate: String, scale: f32, message: String },
    Finalized { output: PathBuf },
    Failed { reason: String },
}

pub trait ExperimentReporter: Send + Sync {
    fn on_event(&self, event: ExperimentEvent);
}

/// Reports experiment events through `tracing`.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl ExperimentReporter for TracingReporter {
    fn on_event(&self, event: ExperimentEvent) {
        match event {
            ExperimentEvent::BaselineMeasured { accuracy, samples_per_second } => {
                info!("initial model accuracy is {accuracy:.2}% - {samples_per_second:.2} samples/s");
            }
            ExperimentEvent::Progress { event } => info!(
                iteration = event.iteration,
                iteration_count = event.iteration_count,
                epoch = event.epoch,
                next_sample = event.next_sample,
                sample_count = event.sample_count,
                "progress {:.2}% loss {:.2} elapsed {} remaining {}",
                event.percentage,
                event.loss,
                format_duration(event.elapsed),
                event.remaining.map_or_else(|| "#".to_string(), format_duration),
            ),
            ExperimentEvent::BestLoss { loss } => info!("best training loss is now {loss:.2}"),
            ExperimentEvent::StopRequested { reason } => info!("stopping training: {reason}"),
            ExperimentEvent::SnapshotSaved { name, kind } => debug!(?kind, "saved snapshot {name}"),
            ExperimentEvent::StorageFailed { name, message } => warn!("failed to persist {name}: {message}"),
            ExperimentEvent::CandidateEvaluated {
                candidate,
                scale,
                accuracy,
                best_accuracy,
                best_scale,
                initial_accuracy,
                samples_per_second,
            } => info!(
                candidate = %candidate,
                "adapter accuracy {accuracy:.2}% with scale {scale} - best {best_accuracy:.2}% with scale {} - initial {initial_accuracy:.2}% - {samples_per_second:.2} samples/s",
                best_scale.map_or_else(|| "-".to_string(), |s| s.to_string()),
            ),
            ExperimentEvent::Improved { candidate, scale, accuracy, samples_per_second } => info!(
                improvement = true,
                candidate = %candidate,
                "adapter best accuracy is now {accuracy:.2}% - scale {scale} - {samples_per_second:.2} samples/s"
            ),
            ExperimentEvent::EvaluationFailed { candidate, scale, message } => {
                warn!("evaluation of {candidate} at scale {scale} failed: {message}");
            }
            ExperimentEvent::Finalized { output } => info!("model created at {}", output.display()),
            ExperimentEvent::Failed { reason } => error!("experiment failed: {reason}"),
        }
    }
}

/// `dd.hh:mm:ss`
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    format!("{days:02}.{hours:02}:{minutes:02}:{seconds:02}")
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod opt_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}
