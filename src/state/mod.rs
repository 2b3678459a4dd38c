pub mod account;
pub mod apply;
pub mod event;
pub mod holding;
pub mod listing;
pub mod request;

pub use account::Account;
pub use apply::{apply, Applied, Outcome};
pub use event::{Event, EventCategory, EventKind, Notification};
pub use holding::{HoldingStatus, LedgerEntry, LedgerKind, PaymentHolding};
pub use listing::Listing;
pub use request::{
    Activity, Completion, ReportStatus, RequestReport, RequestStatus, ServiceRequest,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Core domain state: accounts, listings, requests with their completion and
/// escrow records, and the append-only ledger/event/notification logs.
///
/// State is fully reconstructible by replaying operations from genesis. All
/// state transitions are deterministic and side-effect free, which is why
/// ordered maps are used throughout: the canonical encoding of two equal
/// states must be byte-identical.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct State {
    /// All accounts indexed by user id
    pub accounts: BTreeMap<String, Account>,

    /// All listings indexed by listing id
    pub listings: BTreeMap<u64, Listing>,

    /// All service requests indexed by request id
    pub requests: BTreeMap<u64, ServiceRequest>,

    /// Bilateral sign-off records, one per request
    pub completions: BTreeMap<u64, Completion>,

    /// Escrow holdings, one per request, keyed by request id
    pub holdings: BTreeMap<u64, PaymentHolding>,

    /// Append-only balance audit log
    pub ledger: Vec<LedgerEntry>,

    /// Append-only transition audit log
    pub events: Vec<Event>,

    /// Per-recipient notifications (mutable only in the read flag)
    pub notifications: Vec<Notification>,

    /// Filed request reports
    pub reports: Vec<RequestReport>,

    next_listing_id: u64,
    next_request_id: u64,
    next_holding_id: u64,
    next_event_id: u64,
    next_notification_id: u64,
    next_report_id: u64,
}

impl State {
    /// Create empty genesis state
    pub fn new() -> Self {
        State {
            accounts: BTreeMap::new(),
            listings: BTreeMap::new(),
            requests: BTreeMap::new(),
            completions: BTreeMap::new(),
            holdings: BTreeMap::new(),
            ledger: Vec::new(),
            events: Vec::new(),
            notifications: Vec::new(),
            reports: Vec::new(),
            next_listing_id: 1,
            next_request_id: 1,
            next_holding_id: 1,
            next_event_id: 1,
            next_notification_id: 1,
            next_report_id: 1,
        }
    }

    /// Get account (returns Option)
    pub fn get_account(&self, user_id: &str) -> Option<&Account> {
        self.accounts.get(user_id)
    }

    /// Get account mutably (returns Option)
    pub fn get_account_mut(&mut self, user_id: &str) -> Option<&mut Account> {
        self.accounts.get_mut(user_id)
    }

    pub fn insert_account(&mut self, account: Account) {
        self.accounts.insert(account.id.clone(), account);
    }

    pub fn get_listing(&self, listing_id: u64) -> Option<&Listing> {
        self.listings.get(&listing_id)
    }

    pub fn get_request(&self, request_id: u64) -> Option<&ServiceRequest> {
        self.requests.get(&request_id)
    }

    pub fn get_request_mut(&mut self, request_id: u64) -> Option<&mut ServiceRequest> {
        self.requests.get_mut(&request_id)
    }

    pub fn get_completion(&self, request_id: u64) -> Option<&Completion> {
        self.completions.get(&request_id)
    }

    pub fn get_completion_mut(&mut self, request_id: u64) -> Option<&mut Completion> {
        self.completions.get_mut(&request_id)
    }

    /// Escrow holding for a request (holdings are keyed by request id)
    pub fn get_holding(&self, request_id: u64) -> Option<&PaymentHolding> {
        self.holdings.get(&request_id)
    }

    pub fn get_holding_mut(&mut self, request_id: u64) -> Option<&mut PaymentHolding> {
        self.holdings.get_mut(&request_id)
    }

    /// Check whether any active request already references the listing.
    ///
    /// A listing is exclusively taken while such a request exists; terminal
    /// transitions free it again.
    pub fn listing_is_taken(&self, listing_id: u64) -> bool {
        self.requests
            .values()
            .any(|r| r.listing_id == listing_id && r.is_active())
    }

    /// All requests a user is a party to, newest first
    pub fn user_requests(&self, user_id: &str) -> Vec<&ServiceRequest> {
        let mut out: Vec<&ServiceRequest> = self
            .requests
            .values()
            .filter(|r| r.is_party(user_id))
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out
    }

    /// Active pending requests created at or before the cutoff, in id order.
    /// This is the expiry sweep's selection predicate; already-inactive
    /// requests are never selected.
    pub fn expirable_requests(&self, cutoff: i64) -> Vec<u64> {
        self.requests
            .values()
            .filter(|r| {
                r.is_active() && r.status == RequestStatus::Pending && r.created_at <= cutoff
            })
            .map(|r| r.id)
            .collect()
    }

    /// Events recorded against a request, in append order
    pub fn request_events(&self, request_id: u64) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.target_id == request_id)
            .collect()
    }

    /// Notifications addressed to a recipient, newest first
    pub fn notifications_for(&self, recipient_id: &str) -> Vec<&Notification> {
        let mut out: Vec<&Notification> = self
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out
    }

    pub fn get_notification_mut(&mut self, notification_id: u64) -> Option<&mut Notification> {
        self.notifications
            .iter_mut()
            .find(|n| n.id == notification_id)
    }

    pub fn get_report(&self, request_id: u64, reporter_id: &str) -> Option<&RequestReport> {
        self.reports
            .iter()
            .find(|r| r.request_id == request_id && r.reporter_id == reporter_id)
    }

    /// Sum of all spendable balances
    pub fn total_balances(&self) -> u64 {
        self.accounts.values().map(|a| a.balance).sum()
    }

    /// Sum of all escrow amounts still in `held` status
    pub fn total_held(&self) -> u64 {
        self.holdings
            .values()
            .filter(|h| h.is_held())
            .map(|h| h.amount)
            .sum()
    }

    /// Total tokens in the system: spendable balances plus held escrow.
    /// Invariant across every lifecycle operation; only grants and
    /// advertisement credits move it.
    pub fn total_tokens(&self) -> u64 {
        self.total_balances() + self.total_held()
    }

    pub fn take_listing_id(&mut self) -> u64 {
        let id = self.next_listing_id;
        self.next_listing_id += 1;
        id
    }

    pub fn take_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    pub fn take_holding_id(&mut self) -> u64 {
        let id = self.next_holding_id;
        self.next_holding_id += 1;
        id
    }

    pub fn take_event_id(&mut self) -> u64 {
        let id = self.next_event_id;
        self.next_event_id += 1;
        id
    }

    pub fn take_notification_id(&mut self) -> u64 {
        let id = self.next_notification_id;
        self.next_notification_id += 1;
        id
    }

    pub fn take_report_id(&mut self) -> u64 {
        let id = self.next_report_id;
        self.next_report_id += 1;
        id
    }
}

impl Default for State {
    fn default() -> Self {
        State::new()
    }
}
