//! Core types for the Drive Sense pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw readings, synthesized feature rows, the complete feature vector
//! handed to the classifier, and the verdict payloads emitted to callers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ComputeError;

/// Vehicle id assumed when a reading event does not name one
pub const DEFAULT_VEHICLE_ID: &str = "default";

/// Number of features handed to the classifier
pub const FEATURE_COUNT: usize = 9;

/// Feature column order the pretrained model was fitted on.
///
/// Jerk columns come first, then mean/std interleaved per axis.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "AccX_jerk",
    "AccY_jerk",
    "AccZ_jerk",
    "AccX_rolling_mean",
    "AccX_rolling_std",
    "AccY_rolling_mean",
    "AccY_rolling_std",
    "AccZ_rolling_mean",
    "AccZ_rolling_std",
];

/// Acceleration axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccelAxis {
    X,
    Y,
    Z,
}

impl AccelAxis {
    pub const ALL: [AccelAxis; 3] = [AccelAxis::X, AccelAxis::Y, AccelAxis::Z];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccelAxis::X => "AccX",
            AccelAxis::Y => "AccY",
            AccelAxis::Z => "AccZ",
        }
    }
}

/// One motion-sensor sample. Arrival order is the only timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(rename = "AccX")]
    pub acc_x: f64,
    #[serde(rename = "AccY")]
    pub acc_y: f64,
    #[serde(rename = "AccZ")]
    pub acc_z: f64,
    #[serde(rename = "GyroX")]
    pub gyro_x: f64,
    #[serde(rename = "GyroY")]
    pub gyro_y: f64,
    #[serde(rename = "GyroZ")]
    pub gyro_z: f64,
}

impl Reading {
    /// Build a reading from the six axes, rejecting non-finite values
    pub fn new(
        acc_x: f64,
        acc_y: f64,
        acc_z: f64,
        gyro_x: f64,
        gyro_y: f64,
        gyro_z: f64,
    ) -> Result<Self, ComputeError> {
        let reading = Self {
            acc_x,
            acc_y,
            acc_z,
            gyro_x,
            gyro_y,
            gyro_z,
        };
        reading.validate()?;
        Ok(reading)
    }

    /// Build a reading from `[AccX, AccY, AccZ, GyroX, GyroY, GyroZ]`
    pub fn from_array(values: [f64; 6]) -> Result<Self, ComputeError> {
        let [ax, ay, az, gx, gy, gz] = values;
        Self::new(ax, ay, az, gx, gy, gz)
    }

    /// Values in `[AccX, AccY, AccZ, GyroX, GyroY, GyroZ]` order
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.acc_x,
            self.acc_y,
            self.acc_z,
            self.gyro_x,
            self.gyro_y,
            self.gyro_z,
        ]
    }

    pub fn acc(&self, axis: AccelAxis) -> f64 {
        match axis {
            AccelAxis::X => self.acc_x,
            AccelAxis::Y => self.acc_y,
            AccelAxis::Z => self.acc_z,
        }
    }

    /// Check that every axis holds a finite value
    pub fn validate(&self) -> Result<(), ComputeError> {
        const AXES: [&str; 6] = ["AccX", "AccY", "AccZ", "GyroX", "GyroY", "GyroZ"];

        for (name, value) in AXES.iter().zip(self.to_array()) {
            if !value.is_finite() {
                return Err(ComputeError::MalformedReading(format!(
                    "{} is not finite ({})",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Wire form of a reading: the six axes plus the stream it belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingEvent {
    #[serde(default = "default_vehicle_id")]
    pub vehicle_id: String,
    #[serde(flatten)]
    pub reading: Reading,
}

fn default_vehicle_id() -> String {
    DEFAULT_VEHICLE_ID.to_string()
}

impl ReadingEvent {
    /// Parse a single JSON reading event and validate its values
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let event: ReadingEvent = serde_json::from_str(json)?;
        event.reading.validate()?;
        Ok(event)
    }
}

/// Synthesized features for the newest reading in a window.
///
/// `None` marks a feature the window cannot define yet.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureRow {
    #[serde(rename = "AccX_jerk")]
    pub acc_x_jerk: Option<f64>,
    #[serde(rename = "AccY_jerk")]
    pub acc_y_jerk: Option<f64>,
    #[serde(rename = "AccZ_jerk")]
    pub acc_z_jerk: Option<f64>,
    #[serde(rename = "AccX_rolling_mean")]
    pub acc_x_rolling_mean: Option<f64>,
    #[serde(rename = "AccX_rolling_std")]
    pub acc_x_rolling_std: Option<f64>,
    #[serde(rename = "AccY_rolling_mean")]
    pub acc_y_rolling_mean: Option<f64>,
    #[serde(rename = "AccY_rolling_std")]
    pub acc_y_rolling_std: Option<f64>,
    #[serde(rename = "AccZ_rolling_mean")]
    pub acc_z_rolling_mean: Option<f64>,
    #[serde(rename = "AccZ_rolling_std")]
    pub acc_z_rolling_std: Option<f64>,
}

impl FeatureRow {
    /// Features in `FEATURE_NAMES` order
    pub fn values(&self) -> [Option<f64>; FEATURE_COUNT] {
        [
            self.acc_x_jerk,
            self.acc_y_jerk,
            self.acc_z_jerk,
            self.acc_x_rolling_mean,
            self.acc_x_rolling_std,
            self.acc_y_rolling_mean,
            self.acc_y_rolling_std,
            self.acc_z_rolling_mean,
            self.acc_z_rolling_std,
        ]
    }

    pub fn jerk(&self, axis: AccelAxis) -> Option<f64> {
        match axis {
            AccelAxis::X => self.acc_x_jerk,
            AccelAxis::Y => self.acc_y_jerk,
            AccelAxis::Z => self.acc_z_jerk,
        }
    }

    pub fn rolling_mean(&self, axis: AccelAxis) -> Option<f64> {
        match axis {
            AccelAxis::X => self.acc_x_rolling_mean,
            AccelAxis::Y => self.acc_y_rolling_mean,
            AccelAxis::Z => self.acc_z_rolling_mean,
        }
    }

    pub fn rolling_std(&self, axis: AccelAxis) -> Option<f64> {
        match axis {
            AccelAxis::X => self.acc_x_rolling_std,
            AccelAxis::Y => self.acc_y_rolling_std,
            AccelAxis::Z => self.acc_z_rolling_std,
        }
    }

    /// Names of the features the window could not define
    pub fn missing_features(&self) -> Vec<&'static str> {
        FEATURE_NAMES
            .iter()
            .zip(self.values())
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.values().iter().all(|v| v.is_some())
    }

    /// The complete vector, or `None` while any feature is missing or non-finite
    pub fn to_vector(&self) -> Option<FeatureVector> {
        let mut out = [0.0; FEATURE_COUNT];
        for (slot, value) in out.iter_mut().zip(self.values()) {
            *slot = value.filter(|v| v.is_finite())?;
        }
        Some(FeatureVector(out))
    }
}

/// Complete, ordered feature vector accepted by a classifier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn as_array(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    /// Look up a feature by its column name
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|idx| self.0[idx])
    }
}

/// Categorical label produced by a classifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Outcome of pushing one reading through the prediction gate
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// The classifier's label, unchanged
    Label(Label),
    /// Window cannot define every feature yet; `readings` is the current window length
    InsufficientData { readings: usize },
}

impl Prediction {
    pub fn label(&self) -> Option<&Label> {
        match self {
            Prediction::Label(label) => Some(label),
            Prediction::InsufficientData { .. } => None,
        }
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, Prediction::InsufficientData { .. })
    }
}

/// Warm-up state of a single stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPhase {
    WarmingUp,
    Ready,
}

/// Verdict status as emitted on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Predicted,
    InsufficientData,
}

/// Producer metadata embedded in every verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Verdict payload for one processed reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub drive_version: String,
    pub producer: VerdictProducer,
    pub vehicle_id: String,
    /// 1-based position of the reading within its session
    pub sequence: u64,
    pub computed_at_utc: String,
    pub status: VerdictStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_behavior: Option<Label>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<FeatureRow>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reading_rejects_non_finite() {
        assert!(Reading::new(1.0, 2.0, 3.0, 0.0, 0.0, 0.0).is_ok());

        let err = Reading::new(1.0, f64::NAN, 3.0, 0.0, 0.0, 0.0).unwrap_err();
        assert!(err.to_string().contains("AccY"));

        let err = Reading::new(1.0, 2.0, 3.0, 0.0, 0.0, f64::INFINITY).unwrap_err();
        assert!(err.to_string().contains("GyroZ"));
    }

    #[test]
    fn test_reading_event_wire_names() {
        let event = ReadingEvent::from_json(
            r#"{"vehicle_id":"car-7","AccX":1.5,"AccY":-0.2,"AccZ":9.8,"GyroX":0.1,"GyroY":0.0,"GyroZ":-0.3}"#,
        )
        .unwrap();

        assert_eq!(event.vehicle_id, "car-7");
        assert_eq!(event.reading.to_array(), [1.5, -0.2, 9.8, 0.1, 0.0, -0.3]);
    }

    #[test]
    fn test_reading_event_default_vehicle() {
        let event = ReadingEvent::from_json(
            r#"{"AccX":1,"AccY":1,"AccZ":1,"GyroX":0,"GyroY":0,"GyroZ":0}"#,
        )
        .unwrap();
        assert_eq!(event.vehicle_id, DEFAULT_VEHICLE_ID);
    }

    #[test]
    fn test_reading_event_missing_axis() {
        let result = ReadingEvent::from_json(r#"{"AccX":1,"AccY":1,"AccZ":1,"GyroX":0}"#);
        assert!(matches!(result, Err(ComputeError::JsonError(_))));
    }

    #[test]
    fn test_feature_row_incomplete() {
        let row = FeatureRow {
            acc_x_rolling_mean: Some(1.0),
            acc_y_rolling_mean: Some(1.0),
            acc_z_rolling_mean: Some(1.0),
            ..Default::default()
        };

        assert!(!row.is_complete());
        assert!(row.to_vector().is_none());
        assert_eq!(
            row.missing_features(),
            vec![
                "AccX_jerk",
                "AccY_jerk",
                "AccZ_jerk",
                "AccX_rolling_std",
                "AccY_rolling_std",
                "AccZ_rolling_std",
            ]
        );
    }

    #[test]
    fn test_feature_vector_order() {
        let row = FeatureRow {
            acc_x_jerk: Some(1.0),
            acc_y_jerk: Some(2.0),
            acc_z_jerk: Some(3.0),
            acc_x_rolling_mean: Some(4.0),
            acc_x_rolling_std: Some(5.0),
            acc_y_rolling_mean: Some(6.0),
            acc_y_rolling_std: Some(7.0),
            acc_z_rolling_mean: Some(8.0),
            acc_z_rolling_std: Some(9.0),
        };

        let vector = row.to_vector().unwrap();
        assert_eq!(
            vector.as_slice(),
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]
        );
        assert_eq!(vector.get("AccY_rolling_std"), Some(7.0));
        assert_eq!(vector.get("GyroX"), None);
    }

    #[test]
    fn test_non_finite_row_has_no_vector() {
        let row = FeatureRow {
            acc_x_jerk: Some(1.0),
            acc_y_jerk: Some(1.0),
            acc_z_jerk: Some(1.0),
            acc_x_rolling_mean: Some(1.0),
            acc_x_rolling_std: Some(f64::INFINITY),
            acc_y_rolling_mean: Some(1.0),
            acc_y_rolling_std: Some(1.0),
            acc_z_rolling_mean: Some(f64::NAN),
            acc_z_rolling_std: Some(1.0),
        };

        assert!(row.to_vector().is_none());
    }

    #[test]
    fn test_feature_row_serializes_missing_as_null() {
        let row = FeatureRow {
            acc_x_rolling_mean: Some(2.0),
            ..Default::default()
        };
        let value = serde_json::to_value(row).unwrap();

        assert_eq!(value["AccX_rolling_mean"], 2.0);
        assert!(value["AccX_jerk"].is_null());
    }
}
