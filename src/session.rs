//! Sync session lifecycle tracking.
//!
//! One [`SyncSession`] records one end-to-end reconciliation run: when it
//! ran, what triggered it, how many products came out, and every error the
//! run absorbed along the way. The [`SessionTracker`] guards against two
//! concurrent runs interleaving for the same tenant.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{SyncError, SyncErrorRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Scheduled,
    Manual,
}

/// Lifecycle record of one reconciliation run.
///
/// Owned exclusively by the run that created it; the only legal transitions
/// are `running -> completed` and `running -> failed`, and `finished_at` is
/// set exactly once at the terminal transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSession {
    pub id: Uuid,
    pub tenant: String,
    pub triggered_by: TriggerSource,
    pub status: SessionStatus,
    #[serde(rename = "startTime")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "endTime")]
    pub finished_at: Option<DateTime<Utc>>,
    pub products_processed: usize,
    pub errors: Vec<SyncErrorRecord>,
}

impl SyncSession {
    fn new(tenant: &str, triggered_by: TriggerSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant: tenant.to_string(),
            triggered_by,
            status: SessionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            products_processed: 0,
            errors: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != SessionStatus::Running
    }

    /// Append one error to the ledger. Errors are enumerable, never
    /// collapsed into a single failure.
    pub fn record_error(&mut self, record: SyncErrorRecord) {
        self.errors.push(record);
    }

    pub fn record_errors(&mut self, records: impl IntoIterator<Item = SyncErrorRecord>) {
        self.errors.extend(records);
    }

    /// Transition to `completed`. No-op if already terminal.
    pub fn complete(&mut self, products_processed: usize) {
        if self.is_terminal() {
            warn!(session_id = %self.id, "ignoring complete() on terminal session");
            return;
        }
        self.status = SessionStatus::Completed;
        self.products_processed = products_processed;
        self.finished_at = Some(Utc::now());
        info!(
            session_id = %self.id,
            tenant = %self.tenant,
            products_processed,
            errors = self.errors.len(),
            "sync session completed"
        );
    }

    /// Transition to `failed`. Partial results are preserved by the caller;
    /// `products_processed` still reflects what was finalized.
    pub fn fail(&mut self, products_processed: usize) {
        if self.is_terminal() {
            warn!(session_id = %self.id, "ignoring fail() on terminal session");
            return;
        }
        self.status = SessionStatus::Failed;
        self.products_processed = products_processed;
        self.finished_at = Some(Utc::now());
        warn!(
            session_id = %self.id,
            tenant = %self.tenant,
            products_processed,
            errors = self.errors.len(),
            "sync session failed"
        );
    }
}

/// Admission guard and summary store, keyed by tenant.
#[derive(Debug, Default)]
pub struct SessionTracker {
    running: DashMap<String, Uuid>,
    last_finished: DashMap<String, SyncSession>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for a tenant, rejecting concurrent runs.
    ///
    /// The returned session is owned by the caller; the tracker only holds
    /// the admission claim until [`SessionTracker::finish`] releases it.
    pub fn begin(&self, tenant: &str, trigger: TriggerSource) -> Result<SyncSession, SyncError> {
        let session = SyncSession::new(tenant, trigger);
        match self.running.entry(tenant.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                warn!(tenant, "refusing concurrent sync session");
                Err(SyncError::AlreadyRunning(tenant.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(session.id);
                info!(session_id = %session.id, tenant, ?trigger, "sync session started");
                Ok(session)
            }
        }
    }

    /// Release the tenant's admission claim and retain the terminal summary.
    ///
    /// Callers must drive the session to a terminal state first; a
    /// still-running session is transitioned to `failed` here so the
    /// admission claim is always released.
    pub fn finish(&self, mut session: SyncSession) -> SyncSession {
        if !session.is_terminal() {
            session.fail(session.products_processed);
        }
        self.running
            .remove_if(&session.tenant, |_, id| *id == session.id);
        self.last_finished
            .insert(session.tenant.clone(), session.clone());
        session
    }

    pub fn is_running(&self, tenant: &str) -> bool {
        self.running.contains_key(tenant)
    }

    /// Terminal summary of the tenant's most recent run, if any.
    pub fn last_summary(&self, tenant: &str) -> Option<SyncSession> {
        self.last_finished.get(tenant).map(|s| s.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_second_session_while_running() {
        let tracker = SessionTracker::new();
        let first = tracker.begin("tenant-a", TriggerSource::Scheduled).unwrap();
        let second = tracker.begin("tenant-a", TriggerSource::Manual);
        assert!(matches!(second, Err(SyncError::AlreadyRunning(_))));

        // Different tenant is unaffected.
        assert!(tracker.begin("tenant-b", TriggerSource::Manual).is_ok());

        let mut first = first;
        first.complete(0);
        tracker.finish(first);
        assert!(tracker.begin("tenant-a", TriggerSource::Manual).is_ok());
    }

    #[test]
    fn terminal_transition_sets_finished_at_once() {
        let tracker = SessionTracker::new();
        let mut session = tracker.begin("t", TriggerSource::Manual).unwrap();
        session.complete(3);
        let finished = session.finished_at;
        assert!(finished.is_some());
        assert_eq!(session.status, SessionStatus::Completed);

        // Further transitions are ignored.
        session.fail(99);
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.products_processed, 3);
        assert_eq!(session.finished_at, finished);
    }

    #[test]
    fn finish_fails_leaked_running_session() {
        let tracker = SessionTracker::new();
        let session = tracker.begin("t", TriggerSource::Scheduled).unwrap();
        let finished = tracker.finish(session);
        assert_eq!(finished.status, SessionStatus::Failed);
        assert!(!tracker.is_running("t"));
    }

    #[test]
    fn summary_serializes_with_contract_keys() {
        let tracker = SessionTracker::new();
        let mut session = tracker.begin("t", TriggerSource::Scheduled).unwrap();
        session.complete(2);
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("startTime").is_some());
        assert!(json.get("endTime").is_some());
        assert_eq!(json["productsProcessed"], 2);
        assert_eq!(json["status"], "completed");
        assert_eq!(json["triggeredBy"], "scheduled");
    }

    #[test]
    fn last_summary_survives_finish() {
        let tracker = SessionTracker::new();
        let mut session = tracker.begin("t", TriggerSource::Manual).unwrap();
        session.record_error(SyncErrorRecord::new("malformed_record", "bad row"));
        session.complete(5);
        tracker.finish(session);

        let summary = tracker.last_summary("t").unwrap();
        assert_eq!(summary.products_processed, 5);
        assert_eq!(summary.errors.len(), 1);
    }
}
