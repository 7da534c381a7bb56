//! Drive Sense - Streaming driving-behavior classification from motion sensors
//!
//! Drive Sense turns a live stream of 6-axis motion readings into driving
//! behavior labels through a deterministic pipeline: rolling history buffer →
//! feature synthesis (jerk, rolling mean, rolling std) → prediction gate →
//! injected classifier → verdict encoding.
//!
//! ## Modules
//!
//! - **Stream core**: `history`, `features`, `gate` keep one stream's window and
//!   decide when its features are complete enough to classify
//! - **Sessions**: `session` keeps one stream per vehicle, safe to share across threads
//! - **Classifier**: `classifier` defines the capability the pipeline consumes

pub mod classifier;
pub mod config;
pub mod encoder;
pub mod error;
pub mod features;
pub mod gate;
pub mod history;
pub mod pipeline;
pub mod session;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use classifier::{BehaviorClassifier, CentroidClassifier, ClassifierError};
pub use config::ExtractorConfig;
pub use error::ComputeError;
pub use gate::{PredictionGate, StreamExtractor, StreamPredictor};
pub use history::HistoryBuffer;
pub use pipeline::{readings_to_verdicts, DriveProcessor};
pub use types::{FeatureRow, FeatureVector, Label, Prediction, Reading, ReadingEvent, Verdict};

/// Drive Sense version embedded in all verdicts
pub const DRIVE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for verdict payloads
pub const PRODUCER_NAME: &str = "drive-sense";
