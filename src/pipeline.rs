//! Pipeline orchestration
//!
//! This module provides the public API for Drive Sense. It takes readings from
//! the wire through the per-vehicle sessions, the prediction gate and the
//! injected classifier, and encodes the outcome as a verdict.

use chrono::{DateTime, Utc};
use log::warn;
use std::sync::Arc;

use crate::classifier::{BehaviorClassifier, CentroidClassifier};
use crate::config::ExtractorConfig;
use crate::encoder::VerdictEncoder;
use crate::error::ComputeError;
use crate::gate::{ExtractionStep, PredictionGate, StreamExtractor};
use crate::history::HistoryBuffer;
use crate::session::{SessionInfo, SessionRegistry};
use crate::types::{FeatureRow, Prediction, Reading, ReadingEvent, Verdict};

/// Classify an NDJSON stream of reading events with a JSON model (stateless, one-shot).
///
/// # Arguments
/// * `ndjson` - One reading event per line
/// * `model_json` - Nearest-centroid model JSON
/// * `window_size` - Rolling window length
///
/// # Returns
/// Vector of verdict JSON payloads (one per reading)
///
/// # Example
/// ```ignore
/// let verdicts = readings_to_verdicts(&ndjson, &model_json, 60)?;
/// ```
pub fn readings_to_verdicts(
    ndjson: &str,
    model_json: &str,
    window_size: usize,
) -> Result<Vec<String>, ComputeError> {
    let classifier = CentroidClassifier::from_json(model_json)?;
    let processor =
        DriveProcessor::with_classifier(&ExtractorConfig::with_window_size(window_size), classifier)?;

    parse_ndjson(ndjson)?
        .into_iter()
        .map(|event| -> Result<String, ComputeError> {
            let verdict = processor.process_event(event)?;
            Ok(serde_json::to_string(&verdict)?)
        })
        .collect()
}

/// Feature rows for an ordered sequence of readings from one stream
pub fn synthesize_stream(
    readings: &[Reading],
    window_size: usize,
) -> Result<Vec<FeatureRow>, ComputeError> {
    let mut extractor = StreamExtractor::new(window_size)?;
    readings
        .iter()
        .map(|reading| extractor.ingest(*reading).map(|step| step.row))
        .collect()
}

/// Parse newline-delimited reading events, skipping blank lines
pub fn parse_ndjson(input: &str) -> Result<Vec<ReadingEvent>, ComputeError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            ReadingEvent::from_json(line.trim()).map_err(|e| {
                ComputeError::ParseError(format!("line {}: {}", idx + 1, e))
            })
        })
        .collect()
}

/// Parse a JSON array of reading events
pub fn parse_json_array(input: &str) -> Result<Vec<ReadingEvent>, ComputeError> {
    let events: Vec<ReadingEvent> = serde_json::from_str(input)?;
    for (idx, event) in events.iter().enumerate() {
        event
            .reading
            .validate()
            .map_err(|e| ComputeError::ParseError(format!("event {}: {}", idx, e)))?;
    }
    Ok(events)
}

/// Stateful processor serving any number of vehicle streams.
///
/// Shareable across threads; every method takes `&self`.
pub struct DriveProcessor {
    registry: SessionRegistry,
    classifier: Arc<dyn BehaviorClassifier>,
    encoder: VerdictEncoder,
}

impl DriveProcessor {
    pub fn new(
        config: &ExtractorConfig,
        classifier: Arc<dyn BehaviorClassifier>,
    ) -> Result<Self, ComputeError> {
        Ok(Self {
            registry: SessionRegistry::new(config)?,
            classifier,
            encoder: VerdictEncoder::new().include_features(config.include_features),
        })
    }

    pub fn with_classifier<C>(config: &ExtractorConfig, classifier: C) -> Result<Self, ComputeError>
    where
        C: BehaviorClassifier + 'static,
    {
        Self::new(config, Arc::new(classifier))
    }

    /// Push one reading for `vehicle_id` and return the gated prediction
    pub fn predict(&self, vehicle_id: &str, reading: Reading) -> Result<Prediction, ComputeError> {
        let (_, prediction) = self.run(vehicle_id, reading)?;
        Ok(prediction)
    }

    /// Push one reading and encode the outcome as a verdict
    pub fn process_reading(&self, vehicle_id: &str, reading: Reading) -> Result<Verdict, ComputeError> {
        let (step, prediction) = self.run(vehicle_id, reading)?;
        Ok(self
            .encoder
            .encode(vehicle_id, step.sequence, &prediction, &step.row))
    }

    pub fn process_event(&self, event: ReadingEvent) -> Result<Verdict, ComputeError> {
        self.process_reading(&event.vehicle_id, event.reading)
    }

    /// Process one JSON reading event and return the verdict JSON
    pub fn process_json(&self, json: &str) -> Result<String, ComputeError> {
        let event = ReadingEvent::from_json(json)?;
        let verdict = self.process_event(event)?;
        Ok(serde_json::to_string(&verdict)?)
    }

    fn run(&self, vehicle_id: &str, reading: Reading) -> Result<(ExtractionStep, Prediction), ComputeError> {
        // Session lock is released here; the classifier sees a captured vector
        let step = self.registry.ingest(vehicle_id, reading).map_err(|e| {
            if let ComputeError::MalformedReading(reason) = &e {
                warn!("Rejected reading for vehicle '{}': {}", vehicle_id, reason);
            }
            e
        })?;
        let prediction = PredictionGate::resolve(&step.decision, self.classifier.as_ref())?;
        Ok((step, prediction))
    }

    pub fn end_session(&self, vehicle_id: &str) -> bool {
        self.registry.end_session(vehicle_id)
    }

    pub fn expire_idle(&self, now: DateTime<Utc>) -> Vec<String> {
        self.registry.expire_idle(now)
    }

    pub fn session_count(&self) -> usize {
        self.registry.session_count()
    }

    pub fn session_info(&self, vehicle_id: &str) -> Option<SessionInfo> {
        self.registry.info(vehicle_id)
    }

    /// Save a vehicle's history to JSON
    pub fn save_session(&self, vehicle_id: &str) -> Result<String, ComputeError> {
        self.registry.snapshot(vehicle_id)?.to_json().map_err(ComputeError::from)
    }

    /// Restore a vehicle's history from JSON
    pub fn load_session(&self, vehicle_id: &str, json: &str) -> Result<(), ComputeError> {
        let history = HistoryBuffer::from_json(json)?;
        self.registry.restore(vehicle_id, history)
    }

    pub fn window_size(&self) -> usize {
        self.registry.window_size()
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }
}
