//! Prediction gate
//!
//! A feature row is only handed to the classifier when every feature is
//! defined. Anything less is reported as insufficient data rather than
//! guessed at.
//!
//! [`StreamExtractor`] owns one stream's history and performs the
//! append-then-synthesize step as a unit; [`StreamPredictor`] adds a classifier
//! on top for callers that own a single stream.

use log::{debug, info};

use crate::classifier::BehaviorClassifier;
use crate::error::ComputeError;
use crate::features::FeatureSynthesizer;
use crate::history::HistoryBuffer;
use crate::types::{FeatureRow, FeatureVector, Prediction, Reading, StreamPhase};

/// What the gate decided about one feature row
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Every feature is defined
    Classify(FeatureVector),
    /// At least one feature is missing; `readings` is the window length
    Insufficient { readings: usize },
}

pub struct PredictionGate;

impl PredictionGate {
    pub fn check(row: &FeatureRow, readings: usize) -> GateDecision {
        match row.to_vector() {
            Some(vector) => GateDecision::Classify(vector),
            None => GateDecision::Insufficient { readings },
        }
    }

    /// Run the classifier when the decision allows it.
    ///
    /// Classifier errors are returned unchanged and never retried.
    pub fn resolve(
        decision: &GateDecision,
        classifier: &dyn BehaviorClassifier,
    ) -> Result<Prediction, ComputeError> {
        match decision {
            GateDecision::Classify(vector) => {
                let label = classifier.classify(vector)?;
                Ok(Prediction::Label(label))
            }
            GateDecision::Insufficient { readings } => {
                debug!(
                    "Not enough data yet to compute features ({} reading(s) in window)",
                    readings
                );
                Ok(Prediction::InsufficientData {
                    readings: *readings,
                })
            }
        }
    }
}

/// Result of ingesting one reading
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionStep {
    /// 1-based position of the reading in this stream
    pub sequence: u64,
    pub row: FeatureRow,
    pub decision: GateDecision,
}

/// History and warm-up state of one stream
#[derive(Debug, Clone)]
pub struct StreamExtractor {
    history: HistoryBuffer,
    phase: StreamPhase,
    sequence: u64,
}

impl StreamExtractor {
    pub fn new(window_size: usize) -> Result<Self, ComputeError> {
        Ok(Self::from_history(HistoryBuffer::new(window_size)?))
    }

    /// Resume from a previously saved history
    pub fn from_history(history: HistoryBuffer) -> Self {
        let mut extractor = Self {
            history,
            phase: StreamPhase::WarmingUp,
            sequence: 0,
        };
        if FeatureSynthesizer::synthesize(&extractor.history).is_complete() {
            extractor.phase = StreamPhase::Ready;
        }
        extractor
    }

    /// Append `reading` and synthesize the newest feature row.
    ///
    /// A malformed reading leaves the history, phase and sequence untouched.
    pub fn ingest(&mut self, reading: Reading) -> Result<ExtractionStep, ComputeError> {
        self.history.append(reading)?;
        self.sequence += 1;

        let row = FeatureSynthesizer::synthesize(&self.history);
        let decision = PredictionGate::check(&row, self.history.len());

        if self.phase == StreamPhase::WarmingUp && matches!(decision, GateDecision::Classify(_)) {
            info!(
                "Stream ready after {} reading(s) (window {})",
                self.sequence,
                self.history.window_size()
            );
            self.phase = StreamPhase::Ready;
        }

        Ok(ExtractionStep {
            sequence: self.sequence,
            row,
            decision,
        })
    }

    /// Feature row for the current history, without appending anything
    pub fn synthesize(&self) -> FeatureRow {
        FeatureSynthesizer::synthesize(&self.history)
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Drop all history and return to warm-up
    pub fn reset(&mut self) {
        self.history.clear();
        self.phase = StreamPhase::WarmingUp;
        self.sequence = 0;
    }
}

/// Single-stream predictor: buffer, synthesizer, gate and classifier together
pub struct StreamPredictor<C: BehaviorClassifier> {
    extractor: StreamExtractor,
    classifier: C,
}

impl<C: BehaviorClassifier> StreamPredictor<C> {
    pub fn new(window_size: usize, classifier: C) -> Result<Self, ComputeError> {
        Ok(Self {
            extractor: StreamExtractor::new(window_size)?,
            classifier,
        })
    }

    /// Push one reading and return the label or an insufficient-data signal
    pub fn predict(&mut self, reading: Reading) -> Result<Prediction, ComputeError> {
        let step = self.extractor.ingest(reading)?;
        PredictionGate::resolve(&step.decision, &self.classifier)
    }

    pub fn synthesize(&self) -> FeatureRow {
        self.extractor.synthesize()
    }

    pub fn phase(&self) -> StreamPhase {
        self.extractor.phase()
    }

    pub fn extractor(&self) -> &StreamExtractor {
        &self.extractor
    }

    pub fn reset(&mut self) {
        self.extractor.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifierError;
    use crate::types::{Label, FEATURE_NAMES};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn reading(values: [f64; 6]) -> Reading {
        Reading::from_array(values).unwrap()
    }

    fn always(
        label: &'static str,
    ) -> impl Fn(&FeatureVector) -> Result<Label, ClassifierError> + Send + Sync {
        move |_: &FeatureVector| -> Result<Label, ClassifierError> { Ok(Label::from(label)) }
    }

    #[test]
    fn test_end_to_end_window_of_two() {
        let captured: Arc<parking_lot::Mutex<Vec<FeatureVector>>> = Arc::default();
        let sink = Arc::clone(&captured);
        let classifier = move |features: &FeatureVector| -> Result<Label, ClassifierError> {
            sink.lock().push(*features);
            Ok(Label::from("normal"))
        };
        let mut predictor = StreamPredictor::new(2, classifier).unwrap();

        let first = predictor.predict(reading([1.0, 1.0, 1.0, 0.0, 0.0, 0.0])).unwrap();
        assert_eq!(first, Prediction::InsufficientData { readings: 1 });
        assert_eq!(predictor.phase(), StreamPhase::WarmingUp);

        let second = predictor.predict(reading([3.0, 1.0, 1.0, 0.0, 0.0, 0.0])).unwrap();
        assert_eq!(second, Prediction::Label(Label::from("normal")));
        assert_eq!(predictor.phase(), StreamPhase::Ready);

        let seen = captured.lock();
        assert_eq!(seen.len(), 1);
        let v = seen[0];
        assert_eq!(v.get("AccX_jerk"), Some(2.0));
        assert_eq!(v.get("AccX_rolling_mean"), Some(2.0));
        assert!((v.get("AccX_rolling_std").unwrap() - 1.414_213_562).abs() < 1e-6);
        assert_eq!(v.get("AccY_jerk"), Some(0.0));
        assert_eq!(v.get("AccY_rolling_std"), Some(0.0));
        assert_eq!(v.as_slice().len(), FEATURE_NAMES.len());
    }

    #[test]
    fn test_short_sequences_never_classify() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let classifier = move |_: &FeatureVector| -> Result<Label, ClassifierError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Label::from("normal"))
        };

        for window in [2, 3, 60] {
            let mut predictor = StreamPredictor::new(window, &classifier).unwrap();
            let result = predictor.predict(reading([0.5, -0.5, 9.8, 0.1, 0.2, 0.3])).unwrap();
            assert!(result.is_insufficient());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_overflowing_features_never_reach_classifier() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let classifier = move |_: &FeatureVector| -> Result<Label, ClassifierError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Label::from("normal"))
        };
        let mut predictor = StreamPredictor::new(3, classifier).unwrap();

        predictor.predict(reading([1e308, 0.0, 0.0, 0.0, 0.0, 0.0])).unwrap();
        let p = predictor
            .predict(reading([-1e308, 0.0, 0.0, 0.0, 0.0, 0.0]))
            .unwrap();

        assert_eq!(p, Prediction::InsufficientData { readings: 2 });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(predictor.phase(), StreamPhase::WarmingUp);

        let row = predictor.synthesize();
        assert_eq!(row.acc_x_jerk, None);
        assert_eq!(row.acc_x_rolling_std, None);
    }

    #[test]
    fn test_ready_is_permanent() {
        let mut predictor = StreamPredictor::new(3, always("normal")).unwrap();
        predictor.predict(reading([0.0; 6])).unwrap();

        for i in 0..50 {
            let p = predictor
                .predict(reading([i as f64, 0.0, 9.8, 0.0, 0.0, 0.0]))
                .unwrap();
            assert_eq!(p.label().map(Label::as_str), Some("normal"));
            assert_eq!(predictor.phase(), StreamPhase::Ready);
        }
    }

    #[test]
    fn test_classifier_failure_is_surfaced() {
        let failing = |_: &FeatureVector| -> Result<Label, ClassifierError> {
            Err(ClassifierError::Inference("model exploded".to_string()))
        };
        let mut predictor = StreamPredictor::new(2, failing).unwrap();
        predictor.predict(reading([1.0; 6])).unwrap();

        let err = predictor.predict(reading([2.0; 6])).unwrap_err();
        match err {
            ComputeError::Classifier(ClassifierError::Inference(msg)) => {
                assert_eq!(msg, "model exploded")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The reading was still recorded
        assert_eq!(predictor.extractor().history().len(), 2);
    }

    #[test]
    fn test_malformed_reading_rejected_without_side_effects() {
        let mut predictor = StreamPredictor::new(3, always("normal")).unwrap();
        predictor.predict(reading([1.0; 6])).unwrap();

        let bad = Reading {
            acc_x: f64::NAN,
            ..reading([2.0; 6])
        };
        assert!(matches!(
            predictor.predict(bad),
            Err(ComputeError::MalformedReading(_))
        ));
        assert_eq!(predictor.extractor().history().len(), 1);
        assert_eq!(predictor.extractor().sequence(), 1);
        assert_eq!(predictor.phase(), StreamPhase::WarmingUp);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let readings: Vec<Reading> = (0..40)
            .map(|i| {
                let t = i as f64 * 0.1;
                reading([t.sin(), t.cos(), 9.8 + t * 0.01, 0.0, 0.1, -0.1])
            })
            .collect();

        let run = || {
            let mut extractor = StreamExtractor::new(7).unwrap();
            readings
                .iter()
                .map(|r| extractor.ingest(*r).unwrap())
                .collect::<Vec<_>>()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn test_synthesize_does_not_mutate() {
        let mut extractor = StreamExtractor::new(5).unwrap();
        extractor.ingest(reading([1.0; 6])).unwrap();
        let step = extractor.ingest(reading([4.0; 6])).unwrap();

        assert_eq!(extractor.synthesize(), step.row);
        assert_eq!(extractor.synthesize(), extractor.synthesize());
        assert_eq!(extractor.sequence(), 2);
    }

    #[test]
    fn test_reset_returns_to_warm_up() {
        let mut extractor = StreamExtractor::new(4).unwrap();
        extractor.ingest(reading([1.0; 6])).unwrap();
        extractor.ingest(reading([2.0; 6])).unwrap();
        assert_eq!(extractor.phase(), StreamPhase::Ready);

        extractor.reset();
        assert_eq!(extractor.phase(), StreamPhase::WarmingUp);
        assert!(extractor.history().is_empty());

        let step = extractor.ingest(reading([3.0; 6])).unwrap();
        assert_eq!(step.sequence, 1);
        assert_eq!(step.decision, GateDecision::Insufficient { readings: 1 });
    }

    #[test]
    fn test_from_history_restores_phase() {
        let mut history = HistoryBuffer::new(4).unwrap();
        history.append(reading([1.0; 6])).unwrap();
        assert_eq!(
            StreamExtractor::from_history(history.clone()).phase(),
            StreamPhase::WarmingUp
        );

        history.append(reading([2.0; 6])).unwrap();
        assert_eq!(
            StreamExtractor::from_history(history).phase(),
            StreamPhase::Ready
        );
    }
}
