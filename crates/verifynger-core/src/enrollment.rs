//! Two-phase enrollment: the node scans a finger and reports a template
//! hash, then the operator picks a user id and commits.

use std::time::{Duration, Instant};

use serde::Serialize;

use verifynger_shared::FingerprintHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentState {
    Idle,
    Scanning,
    HashReceived,
    Abandoned,
}

/// What the operator typed before pressing "scan".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrollmentForm {
    pub name: String,
    pub email: Option<String>,
    pub position: Option<String>,
}

/// The single in-flight enrollment.
#[derive(Debug, Clone)]
pub struct Enrollment {
    state: EnrollmentState,
    form: Option<EnrollmentForm>,
    hash: Option<FingerprintHash>,
    scan_started: Option<Instant>,
}

impl Enrollment {
    pub fn new() -> Self {
        Self {
            state: EnrollmentState::Idle,
            form: None,
            hash: None,
            scan_started: None,
        }
    }

    pub fn state(&self) -> EnrollmentState {
        self.state
    }

    pub fn hash(&self) -> Option<&FingerprintHash> {
        self.hash.as_ref()
    }

    pub fn form(&self) -> Option<&EnrollmentForm> {
        self.form.as_ref()
    }

    pub fn can_start(&self) -> bool {
        matches!(self.state, EnrollmentState::Idle | EnrollmentState::Abandoned)
    }

    pub fn can_commit(&self) -> bool {
        self.state == EnrollmentState::HashReceived && self.hash.is_some()
    }

    pub fn begin_scan(&mut self, form: EnrollmentForm, now: Instant) {
        self.state = EnrollmentState::Scanning;
        self.form = Some(form);
        self.hash = None;
        self.scan_started = Some(now);
    }

    /// A template result arrived. `None` means the scan failed.
    pub fn accept_template(&mut self, hash: Option<FingerprintHash>) {
        self.scan_started = None;
        match hash {
            Some(hash) => {
                self.hash = Some(hash);
                self.state = EnrollmentState::HashReceived;
            }
            None => {
                self.hash = None;
                self.state = EnrollmentState::Abandoned;
            }
        }
    }

    /// Hand out the pending hash and return to `Idle`.
    pub fn take_committed(&mut self) -> Option<FingerprintHash> {
        if !self.can_commit() {
            return None;
        }
        let hash = self.hash.take();
        self.reset();
        hash
    }

    /// Drop everything and return to `Idle`.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Move a scan that has waited longer than `timeout` to `Abandoned`.
    /// Returns true if it did.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> bool {
        match (self.state, self.scan_started) {
            (EnrollmentState::Scanning, Some(started))
                if now.saturating_duration_since(started) >= timeout =>
            {
                self.state = EnrollmentState::Abandoned;
                self.scan_started = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for Enrollment {
    fn default() -> Self {
        Self::new()
    }
}
