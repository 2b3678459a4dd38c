use serde::{Deserialize, Serialize};

/// Whether a request is still pending resolution or has reached a terminal
/// outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    Active,
    Inactive,
}

/// Fine-grained request status. The terminal variants are exactly the ones
/// that force `Activity::Inactive`; once reached, the status never changes
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    InProgress,
    Declined,
    Completed,
    Cancelled,
    Expired,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Declined
                | RequestStatus::Completed
                | RequestStatus::Cancelled
                | RequestStatus::Expired
        )
    }
}

/// Service request aggregate: one offer-to-provide-service agreement between
/// a requester and the provider of a listing.
///
/// Invariants:
/// - `activity == Inactive` iff `status.is_terminal()`
/// - `token_reward` is fixed from the listing price at creation
/// - exactly one terminal status holds once activity flips to inactive
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceRequest {
    pub id: u64,
    pub listing_id: u64,
    pub requester_id: String,
    pub provider_id: String,
    pub activity: Activity,
    pub status: RequestStatus,
    pub token_reward: u64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ServiceRequest {
    /// Create a new request in the initial `pending`/`active` state
    pub fn pending(
        id: u64,
        listing_id: u64,
        requester_id: String,
        provider_id: String,
        token_reward: u64,
        now: i64,
    ) -> Self {
        ServiceRequest {
            id,
            listing_id,
            requester_id,
            provider_id,
            activity: Activity::Active,
            status: RequestStatus::Pending,
            token_reward,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.activity == Activity::Active
    }

    pub fn is_party(&self, user_id: &str) -> bool {
        self.requester_id == user_id || self.provider_id == user_id
    }

    /// Provider accepted: `pending -> in_progress`, still active
    pub fn begin_progress(&mut self, now: i64) {
        self.status = RequestStatus::InProgress;
        self.updated_at = now;
    }

    /// Reach a terminal outcome: status set once, activity flips to inactive
    pub fn resolve(&mut self, status: RequestStatus, now: i64) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.activity = Activity::Inactive;
        self.updated_at = now;
    }
}

/// Bilateral sign-off record, one-to-one with a request.
///
/// Invariants:
/// - `is_active == !(requester_completed && provider_completed)`
/// - flags only move false -> true; once both are set the record is
///   permanently inactive
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Completion {
    pub requester_completed: bool,
    pub provider_completed: bool,
    pub is_active: bool,
}

impl Completion {
    pub fn new() -> Self {
        Completion {
            requester_completed: false,
            provider_completed: false,
            is_active: true,
        }
    }

    /// Record one party's confirmation. OR'd with the existing flag, so a
    /// repeat confirmation by the same caller is a no-op.
    pub fn confirm(&mut self, as_requester: bool) {
        if as_requester {
            self.requester_completed = true;
        } else {
            self.provider_completed = true;
        }
        self.is_active = !(self.requester_completed && self.provider_completed);
    }

    pub fn both_confirmed(&self) -> bool {
        self.requester_completed && self.provider_completed
    }
}

impl Default for Completion {
    fn default() -> Self {
        Completion::new()
    }
}

/// Status of a filed request report ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Open,
    Resolved,
}

/// A report filed against a request, identified by a human-readable ticket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestReport {
    pub id: u64,
    pub request_id: u64,
    pub reporter_id: String,
    pub ticket_id: String,
    pub status: ReportStatus,
    pub created_at: i64,
}

impl RequestReport {
    pub fn open(id: u64, request_id: u64, reporter_id: String, ticket_id: String, now: i64) -> Self {
        RequestReport {
            id,
            request_id,
            reporter_id,
            ticket_id,
            status: ReportStatus::Open,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ServiceRequest {
        ServiceRequest::pending(1, 7, "alice".to_string(), "bob".to_string(), 50, 1_000)
    }

    #[test]
    fn test_request_starts_pending_active() {
        let r = request();
        assert_eq!(r.status, RequestStatus::Pending);
        assert_eq!(r.activity, Activity::Active);
        assert_eq!(r.token_reward, 50);
        assert_eq!(r.created_at, 1_000);
    }

    #[test]
    fn test_begin_progress_keeps_active() {
        let mut r = request();
        r.begin_progress(2_000);
        assert_eq!(r.status, RequestStatus::InProgress);
        assert!(r.is_active());
        assert_eq!(r.updated_at, 2_000);
    }

    #[test]
    fn test_resolve_flips_inactive() {
        let mut r = request();
        r.resolve(RequestStatus::Declined, 2_000);
        assert_eq!(r.status, RequestStatus::Declined);
        assert!(!r.is_active());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::InProgress.is_terminal());
        assert!(RequestStatus::Declined.is_terminal());
        assert!(RequestStatus::Completed.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
        assert!(RequestStatus::Expired.is_terminal());
    }

    #[test]
    fn test_is_party() {
        let r = request();
        assert!(r.is_party("alice"));
        assert!(r.is_party("bob"));
        assert!(!r.is_party("carol"));
    }

    #[test]
    fn test_completion_single_confirm_stays_active() {
        let mut c = Completion::new();
        c.confirm(true);
        assert!(c.requester_completed);
        assert!(!c.provider_completed);
        assert!(c.is_active);
    }

    #[test]
    fn test_completion_both_confirm_deactivates() {
        let mut c = Completion::new();
        c.confirm(true);
        c.confirm(false);
        assert!(c.both_confirmed());
        assert!(!c.is_active);
    }

    #[test]
    fn test_completion_confirm_idempotent() {
        let mut c = Completion::new();
        c.confirm(true);
        c.confirm(true);
        assert!(c.requester_completed);
        assert!(!c.provider_completed);
        assert!(c.is_active);
    }
}
