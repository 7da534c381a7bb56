//! Per-vehicle stream sessions
//!
//! Each vehicle gets its own [`StreamExtractor`], created on its first reading
//! and dropped when the session ends or sits idle past the configured timeout.
//!
//! Locking: the registry map lock is held only to find or create a session.
//! The session's own lock covers validate, append and synthesize for one
//! reading, so readings of one vehicle never interleave. Classification
//! happens after that lock is released.

use chrono::{DateTime, Utc};
use log::info;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ExtractorConfig;
use crate::error::ComputeError;
use crate::gate::{ExtractionStep, StreamExtractor};
use crate::history::HistoryBuffer;
use crate::types::{Reading, StreamPhase};

/// One vehicle's stream state
#[derive(Debug)]
pub struct StreamSession {
    extractor: StreamExtractor,
    started_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl StreamSession {
    fn new(extractor: StreamExtractor, now: DateTime<Utc>) -> Self {
        Self {
            extractor,
            started_at: now,
            last_seen: now,
        }
    }

    pub fn extractor(&self) -> &StreamExtractor {
        &self.extractor
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }
}

/// Summary of a live session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub vehicle_id: String,
    pub phase: StreamPhase,
    pub readings_in_window: usize,
    pub sequence: u64,
    pub started_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Registry of vehicle sessions keyed by vehicle id
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Mutex<StreamSession>>>>,
    window_size: usize,
    idle_timeout: Option<chrono::Duration>,
}

impl SessionRegistry {
    pub fn new(config: &ExtractorConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        Ok(Self {
            sessions: Mutex::new(HashMap::new()),
            window_size: config.window_size,
            idle_timeout: config.idle_timeout(),
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Ingest a reading for `vehicle_id`, creating the session if needed
    pub fn ingest(&self, vehicle_id: &str, reading: Reading) -> Result<ExtractionStep, ComputeError> {
        self.ingest_at(vehicle_id, reading, Utc::now())
    }

    pub fn ingest_at(
        &self,
        vehicle_id: &str,
        reading: Reading,
        now: DateTime<Utc>,
    ) -> Result<ExtractionStep, ComputeError> {
        // Rejected readings must not open a session either
        reading.validate()?;

        let session = self.get_or_create(vehicle_id, now)?;
        let mut session = session.lock();
        let step = session.extractor.ingest(reading)?;
        session.last_seen = now;
        Ok(step)
    }

    fn get_or_create(
        &self,
        vehicle_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Arc<Mutex<StreamSession>>, ComputeError> {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get(vehicle_id) {
            return Ok(Arc::clone(session));
        }

        let extractor = StreamExtractor::new(self.window_size)?;
        let session = Arc::new(Mutex::new(StreamSession::new(extractor, now)));
        sessions.insert(vehicle_id.to_string(), Arc::clone(&session));
        info!(
            "Started session for vehicle '{}' (window {})",
            vehicle_id, self.window_size
        );
        Ok(session)
    }

    /// End a session explicitly. Returns whether it existed.
    pub fn end_session(&self, vehicle_id: &str) -> bool {
        let removed = self.sessions.lock().remove(vehicle_id).is_some();
        if removed {
            info!("Ended session for vehicle '{}'", vehicle_id);
        }
        removed
    }

    /// Drop sessions idle for longer than the timeout; returns their ids.
    ///
    /// Sessions currently being ingested into are skipped.
    pub fn expire_idle(&self, now: DateTime<Utc>) -> Vec<String> {
        let Some(timeout) = self.idle_timeout else {
            return Vec::new();
        };

        let mut sessions = self.sessions.lock();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, session)| {
                Arc::strong_count(*session) == 1 && now - session.lock().last_seen > timeout
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            sessions.remove(id);
            info!("Expired idle session for vehicle '{}'", id);
        }
        expired
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn contains(&self, vehicle_id: &str) -> bool {
        self.sessions.lock().contains_key(vehicle_id)
    }

    pub fn vehicle_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn info(&self, vehicle_id: &str) -> Option<SessionInfo> {
        let session = self.sessions.lock().get(vehicle_id).map(Arc::clone)?;
        let session = session.lock();
        Some(SessionInfo {
            vehicle_id: vehicle_id.to_string(),
            phase: session.extractor.phase(),
            readings_in_window: session.extractor.history().len(),
            sequence: session.extractor.sequence(),
            started_at: session.started_at,
            last_seen: session.last_seen,
        })
    }

    /// Copy of a session's history, for persistence
    pub fn snapshot(&self, vehicle_id: &str) -> Result<HistoryBuffer, ComputeError> {
        let session = self
            .sessions
            .lock()
            .get(vehicle_id)
            .map(Arc::clone)
            .ok_or_else(|| ComputeError::UnknownSession(vehicle_id.to_string()))?;
        let history = session.lock().extractor.history().clone();
        Ok(history)
    }

    /// Replace (or create) a session from a saved history
    pub fn restore(&self, vehicle_id: &str, history: HistoryBuffer) -> Result<(), ComputeError> {
        if history.window_size() != self.window_size {
            return Err(ComputeError::InvalidConfig(format!(
                "saved window_size {} does not match configured {}",
                history.window_size(),
                self.window_size
            )));
        }

        let extractor = StreamExtractor::from_history(history);
        let session = StreamSession::new(extractor, Utc::now());
        self.sessions
            .lock()
            .insert(vehicle_id.to_string(), Arc::new(Mutex::new(session)));
        info!("Restored session for vehicle '{}'", vehicle_id);
        Ok(())
    }
}
