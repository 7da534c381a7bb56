//! Verdict encoding
//!
//! This module turns a prediction for one reading into the JSON verdict sent
//! back to callers, with producer metadata attached.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ComputeError;
use crate::types::{FeatureRow, Prediction, Verdict, VerdictProducer, VerdictStatus};
use crate::{DRIVE_VERSION, PRODUCER_NAME};

/// Message attached to verdicts produced during warm-up
pub const WARMING_UP_MESSAGE: &str = "Waiting for more sensor data to build rolling features.";

/// Verdict encoder
pub struct VerdictEncoder {
    instance_id: String,
    include_features: bool,
}

impl Default for VerdictEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VerdictEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
            include_features: false,
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self {
            instance_id,
            include_features: false,
        }
    }

    /// Embed the feature row in every verdict
    pub fn include_features(mut self, include: bool) -> Self {
        self.include_features = include;
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn encode(
        &self,
        vehicle_id: &str,
        sequence: u64,
        prediction: &Prediction,
        row: &FeatureRow,
    ) -> Verdict {
        self.encode_at(vehicle_id, sequence, prediction, row, Utc::now())
    }

    pub fn encode_at(
        &self,
        vehicle_id: &str,
        sequence: u64,
        prediction: &Prediction,
        row: &FeatureRow,
        computed_at: DateTime<Utc>,
    ) -> Verdict {
        let (status, predicted_behavior, message) = match prediction {
            Prediction::Label(label) => (VerdictStatus::Predicted, Some(label.clone()), None),
            Prediction::InsufficientData { .. } => (
                VerdictStatus::InsufficientData,
                None,
                Some(WARMING_UP_MESSAGE.to_string()),
            ),
        };

        Verdict {
            drive_version: DRIVE_VERSION.to_string(),
            producer: VerdictProducer {
                name: PRODUCER_NAME.to_string(),
                version: DRIVE_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            vehicle_id: vehicle_id.to_string(),
            sequence,
            computed_at_utc: computed_at.to_rfc3339(),
            status,
            predicted_behavior,
            message,
            features: self.include_features.then_some(*row),
        }
    }

    /// Encode to JSON string
    pub fn encode_to_json(
        &self,
        vehicle_id: &str,
        sequence: u64,
        prediction: &Prediction,
        row: &FeatureRow,
    ) -> Result<String, ComputeError> {
        let verdict = self.encode(vehicle_id, sequence, prediction, row);
        Ok(serde_json::to_string(&verdict)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Label;
    use pretty_assertions::assert_eq;

    fn complete_row() -> FeatureRow {
        FeatureRow {
            acc_x_jerk: Some(2.0),
            acc_y_jerk: Some(0.0),
            acc_z_jerk: Some(0.0),
            acc_x_rolling_mean: Some(2.0),
            acc_x_rolling_std: Some(2f64.sqrt()),
            acc_y_rolling_mean: Some(1.0),
            acc_y_rolling_std: Some(0.0),
            acc_z_rolling_mean: Some(1.0),
            acc_z_rolling_std: Some(0.0),
        }
    }

    #[test]
    fn test_predicted_verdict() {
        let encoder = VerdictEncoder::with_instance_id("test-instance".to_string());
        let json = encoder
            .encode_to_json(
                "car-1",
                2,
                &Prediction::Label(Label::from("normal")),
                &complete_row(),
            )
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "predicted");
        assert_eq!(value["predicted_behavior"], "normal");
        assert_eq!(value["vehicle_id"], "car-1");
        assert_eq!(value["sequence"], 2);
        assert_eq!(value["producer"]["name"], "drive-sense");
        assert_eq!(value["producer"]["instance_id"], "test-instance");
        assert!(value.get("message").is_none());
        assert!(value.get("features").is_none());
    }

    #[test]
    fn test_insufficient_verdict() {
        let encoder = VerdictEncoder::new();
        let verdict = encoder.encode(
            "car-1",
            1,
            &Prediction::InsufficientData { readings: 1 },
            &FeatureRow::default(),
        );

        assert_eq!(verdict.status, VerdictStatus::InsufficientData);
        assert_eq!(verdict.predicted_behavior, None);
        assert_eq!(verdict.message.as_deref(), Some(WARMING_UP_MESSAGE));
    }

    #[test]
    fn test_features_embedded_on_request() {
        let encoder = VerdictEncoder::new().include_features(true);
        let verdict = encoder.encode(
            "car-1",
            2,
            &Prediction::Label(Label::from("braking")),
            &complete_row(),
        );

        let value = serde_json::to_value(&verdict).unwrap();
        assert_eq!(value["features"]["AccX_jerk"], 2.0);
        assert_eq!(value["features"]["AccZ_rolling_std"], 0.0);
    }

    #[test]
    fn test_instance_ids_are_unique() {
        assert_ne!(
            VerdictEncoder::new().instance_id(),
            VerdictEncoder::new().instance_id()
        );
    }
}
