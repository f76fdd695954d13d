//! Capture session state machine: `Idle -> Running -> Stopped -> Running ...`.
//!
//! The object owns the connection handle and the sample store. It is driven by
//! a single thread calling [`Acquisition::poll_once`] at a fixed cadence; stop
//! requests are observed between polls.

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::drivers::buffer::{Sample, SampleStore};
use crate::drivers::error::{ConnectionError, ParseError, SaveError};
use crate::drivers::parser::parse_bytes;
use crate::drivers::source::{Connector, LineSource};
use crate::recorder;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopped,
}

/// What a new start does with samples left over from the previous session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorePolicy {
    /// Keep appending to the same store across sessions.
    #[default]
    Accumulate,
    /// Clear the store when a session starts.
    FreshPerSession,
}

/// Result of one poll cycle.
#[derive(Debug, PartialEq)]
pub enum PollOutcome {
    NotRunning,
    NoData,
    Recorded(Sample),
    Discarded(ParseError),
}

pub struct Acquisition {
    state: SessionState,
    policy: StorePolicy,
    store: SampleStore,
    source: Option<Box<dyn LineSource>>,
    session_start: Option<Instant>,
    // added to session time so accumulated sessions continue the time axis
    time_offset: f64,
    read_errors: u32,
}

impl Acquisition {
    pub fn new(policy: StorePolicy) -> Self {
        Self {
            state: SessionState::Idle,
            policy,
            store: SampleStore::new(),
            source: None,
            session_start: None,
            time_offset: 0.0,
            read_errors: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn set_policy(&mut self, policy: StorePolicy) {
        self.policy = policy;
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source.as_deref().map(|s| s.name())
    }

    /// Opens a connection and begins a session. A failed open leaves the state untouched.
    pub fn start(&mut self, connector: &dyn Connector) -> Result<(), ConnectionError> {
        if self.is_running() {
            log::debug!("start ignored: session already running");
            return Ok(());
        }
        let source = connector.connect()?;
        if self.policy == StorePolicy::FreshPerSession && !self.store.is_empty() {
            log::info!("Clearing {} samples from previous session", self.store.len());
            self.store.clear();
        }
        // store is empty after a fresh clear, so the offset is 0 then
        self.time_offset = self.store.duration_seconds();
        log::info!(
            "Capture started on {} at t = {:.3} s",
            source.name(),
            self.time_offset
        );
        self.source = Some(source);
        self.read_errors = 0;
        self.session_start = Some(Instant::now());
        self.state = SessionState::Running;
        Ok(())
    }

    /// Checks the connection once; at most one line is consumed.
    pub fn poll_once(&mut self) -> PollOutcome {
        if !self.is_running() {
            return PollOutcome::NotRunning;
        }
        let (Some(source), Some(start)) = (self.source.as_mut(), self.session_start) else {
            return PollOutcome::NotRunning;
        };
        let line = match source.poll_line() {
            Ok(Some(line)) => line,
            Ok(None) => {
                self.read_errors = 0;
                return PollOutcome::NoData;
            }
            Err(e) => {
                self.read_errors = self.read_errors.saturating_add(1);
                // a pulled cable fails every poll; warn once per outage
                if self.read_errors == 1 {
                    log::warn!("Read on {} failed, skipping cycles: {}", source.name(), e);
                } else {
                    log::trace!("Read on {} still failing: {}", source.name(), e);
                }
                return PollOutcome::NoData;
            }
        };
        if self.read_errors > 0 {
            log::info!("Reads on {} recovered after {} failures", source.name(), self.read_errors);
            self.read_errors = 0;
        }
        match parse_bytes(&line) {
            Ok(pair) => {
                let timestamp = self.time_offset + start.elapsed().as_secs_f64();
                let sample = Sample::new(timestamp, pair.raw, pair.filtered);
                self.store.append(sample);
                PollOutcome::Recorded(sample)
            }
            Err(e) => {
                log::debug!("Dropped line {:?}: {}", String::from_utf8_lossy(&line).trim(), e);
                PollOutcome::Discarded(e)
            }
        }
    }

    /// Ends the session and closes the connection. Safe to call in any state.
    pub fn stop(&mut self) {
        // dropping the source closes the port
        if let Some(source) = self.source.take() {
            log::info!("Closed {}", source.name());
        }
        if self.is_running() {
            self.state = SessionState::Stopped;
            log::info!("Capture stopped with {} samples", self.store.len());
        }
    }

    /// Clears recorded samples. Refused while a session is running.
    pub fn clear(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        self.store.clear();
        true
    }

    pub fn save(&self, path: &Path) -> Result<usize, SaveError> {
        if self.is_running() {
            return Err(SaveError::CaptureActive);
        }
        recorder::save_samples(self.store.as_slice(), path)
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        self.stop();
    }
}
