//! Rolling history buffer
//!
//! Holds the most recent readings of one stream in arrival order. When the
//! buffer is full the oldest reading is evicted before the new one is kept.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::{DEFAULT_WINDOW_SIZE, MIN_WINDOW_SIZE};
use crate::error::ComputeError;
use crate::types::{AccelAxis, Reading};

/// Bounded FIFO of recent readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredHistory")]
pub struct HistoryBuffer {
    readings: VecDeque<Reading>,
    window_size: usize,
}

/// Unchecked wire form of a [`HistoryBuffer`]
#[derive(Deserialize)]
struct StoredHistory {
    readings: VecDeque<Reading>,
    window_size: usize,
}

impl TryFrom<StoredHistory> for HistoryBuffer {
    type Error = ComputeError;

    fn try_from(stored: StoredHistory) -> Result<Self, Self::Error> {
        if stored.window_size < MIN_WINDOW_SIZE {
            return Err(ComputeError::InvalidConfig(format!(
                "stored window_size {} is below {}",
                stored.window_size, MIN_WINDOW_SIZE
            )));
        }
        if stored.readings.len() > stored.window_size {
            return Err(ComputeError::ParseError(format!(
                "stored buffer holds {} readings but window_size is {}",
                stored.readings.len(),
                stored.window_size
            )));
        }
        for reading in &stored.readings {
            reading.validate()?;
        }
        Ok(Self {
            readings: stored.readings,
            window_size: stored.window_size,
        })
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self {
            readings: VecDeque::with_capacity(DEFAULT_WINDOW_SIZE),
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}

impl HistoryBuffer {
    /// Create an empty buffer holding at most `window_size` readings
    pub fn new(window_size: usize) -> Result<Self, ComputeError> {
        if window_size < MIN_WINDOW_SIZE {
            return Err(ComputeError::InvalidConfig(format!(
                "window_size must be at least {} (got {})",
                MIN_WINDOW_SIZE, window_size
            )));
        }
        Ok(Self {
            readings: VecDeque::with_capacity(window_size),
            window_size,
        })
    }

    /// Append a reading, evicting the oldest when full.
    ///
    /// A non-finite reading is rejected and the buffer is left untouched.
    pub fn append(&mut self, reading: Reading) -> Result<(), ComputeError> {
        reading.validate()?;

        if self.readings.len() == self.window_size {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.readings.len() == self.window_size
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.readings.back()
    }

    /// Reading just before the latest one
    pub fn previous(&self) -> Option<&Reading> {
        let len = self.readings.len();
        if len < 2 {
            return None;
        }
        self.readings.get(len - 2)
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Reading> + '_ {
        self.readings.iter()
    }

    /// Acceleration values of one axis, oldest to newest
    pub fn acc_column(&self, axis: AccelAxis) -> impl Iterator<Item = f64> + '_ {
        self.readings.iter().map(move |r| r.acc(axis))
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }

    /// Load a buffer from JSON, checking it still satisfies its invariants
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let stored: StoredHistory = serde_json::from_str(json)?;
        Self::try_from(stored)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reading(acc_x: f64) -> Reading {
        Reading::new(acc_x, 0.0, 0.0, 0.0, 0.0, 0.0).unwrap()
    }

    #[test]
    fn test_rejects_tiny_window() {
        assert!(HistoryBuffer::new(0).is_err());
        assert!(HistoryBuffer::new(1).is_err());
        assert!(HistoryBuffer::new(2).is_ok());
    }

    #[test]
    fn test_fifo_eviction() {
        let mut buffer = HistoryBuffer::new(3).unwrap();

        for x in 1..=5 {
            buffer.append(reading(x as f64)).unwrap();
        }

        assert_eq!(buffer.len(), 3);
        let kept: Vec<f64> = buffer.acc_column(AccelAxis::X).collect();
        assert_eq!(kept, vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_never_exceeds_window() {
        let mut buffer = HistoryBuffer::new(4).unwrap();

        for i in 0..100 {
            buffer.append(reading(i as f64)).unwrap();
            assert!(buffer.len() <= 4);
        }
        assert!(buffer.is_full());
        assert_eq!(buffer.latest().unwrap().acc_x, 99.0);
        assert_eq!(buffer.previous().unwrap().acc_x, 98.0);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let mut buffer = HistoryBuffer::new(5).unwrap();
        buffer.append(reading(1.0)).unwrap();
        buffer.append(reading(1.0)).unwrap();

        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_malformed_reading_leaves_buffer_unchanged() {
        let mut buffer = HistoryBuffer::new(3).unwrap();
        buffer.append(reading(1.0)).unwrap();
        buffer.append(reading(2.0)).unwrap();
        let before = buffer.clone();

        let bad = Reading {
            acc_z: f64::NAN,
            ..reading(3.0)
        };
        let result = buffer.append(bad);

        assert!(matches!(result, Err(ComputeError::MalformedReading(_))));
        assert_eq!(buffer, before);
    }

    #[test]
    fn test_malformed_reading_on_full_buffer_does_not_evict() {
        let mut buffer = HistoryBuffer::new(2).unwrap();
        buffer.append(reading(1.0)).unwrap();
        buffer.append(reading(2.0)).unwrap();

        let bad = Reading {
            gyro_x: f64::NEG_INFINITY,
            ..reading(3.0)
        };
        assert!(buffer.append(bad).is_err());

        let kept: Vec<f64> = buffer.acc_column(AccelAxis::X).collect();
        assert_eq!(kept, vec![1.0, 2.0]);
    }

    #[test]
    fn test_previous_needs_two_readings() {
        let mut buffer = HistoryBuffer::new(3).unwrap();
        assert!(buffer.latest().is_none());
        buffer.append(reading(1.0)).unwrap();
        assert!(buffer.previous().is_none());
    }

    #[test]
    fn test_json_roundtrip() {
        let mut buffer = HistoryBuffer::new(3).unwrap();
        buffer.append(reading(1.0)).unwrap();
        buffer.append(reading(2.0)).unwrap();

        let loaded = HistoryBuffer::from_json(&buffer.to_json().unwrap()).unwrap();
        assert_eq!(loaded, buffer);
    }

    #[test]
    fn test_plain_deserialize_enforces_invariants() {
        let overfull = r#"{"readings":[
            {"AccX":1,"AccY":0,"AccZ":0,"GyroX":0,"GyroY":0,"GyroZ":0},
            {"AccX":2,"AccY":0,"AccZ":0,"GyroX":0,"GyroY":0,"GyroZ":0}
        ],"window_size":1}"#;
        let err = serde_json::from_str::<HistoryBuffer>(overfull).unwrap_err();
        assert!(err.to_string().contains("window_size"));

        let valid = r#"{"readings":[
            {"AccX":1,"AccY":0,"AccZ":0,"GyroX":0,"GyroY":0,"GyroZ":0}
        ],"window_size":3}"#;
        let buffer: HistoryBuffer = serde_json::from_str(valid).unwrap();
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.window_size(), 3);
    }

    #[test]
    fn test_from_json_rejects_tiny_window() {
        let json = r#"{"readings":[],"window_size":1}"#;
        assert!(matches!(
            HistoryBuffer::from_json(json),
            Err(ComputeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_json_rejects_overfull_buffer() {
        let json = r#"{"readings":[
            {"AccX":1,"AccY":0,"AccZ":0,"GyroX":0,"GyroY":0,"GyroZ":0},
            {"AccX":2,"AccY":0,"AccZ":0,"GyroX":0,"GyroY":0,"GyroZ":0},
            {"AccX":3,"AccY":0,"AccZ":0,"GyroX":0,"GyroY":0,"GyroZ":0}
        ],"window_size":2}"#;

        assert!(matches!(
            HistoryBuffer::from_json(json),
            Err(ComputeError::ParseError(_))
        ));
    }
}
