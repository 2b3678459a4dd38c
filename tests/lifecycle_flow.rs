use service_market::config::Config;
use service_market::error::{Error, Result};
use service_market::market::Market;
use service_market::op::Operation;
use service_market::push::{NoOpPush, PushGateway};
use service_market::replay;
use service_market::state::{HoldingStatus, RequestStatus, State};
use service_market::storage::{FileStorage, Storage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn open_market(dir: &TempDir) -> Market<FileStorage, NoOpPush> {
    let storage = FileStorage::with_paths(
        dir.path().join("ops.log"),
        dir.path().join("state.bin"),
    );
    let config = Config::with_data_dir(dir.path().to_path_buf());
    Market::open(storage, NoOpPush, &config).unwrap()
}

/// Register R (balance 100) and P, publish P's listing priced at 50
fn seed<S: Storage, P: PushGateway>(market: &Market<S, P>) -> u64 {
    market.register_account("r", "Rhea").unwrap();
    market.register_account("p", "Piet").unwrap();
    market.grant_tokens("r", 100, 0).unwrap();
    market.add_listing("p", "Garden work", 50).unwrap()
}

/// Scenario A: creation moves the listing price from the requester's
/// balance into a held escrow, with the request pending and active.
#[test]
fn test_create_holds_escrow() {
    let dir = TempDir::new().unwrap();
    let market = open_market(&dir);
    let listing_id = seed(&market);

    let request_id = market.create_request(listing_id, "r", 1_000).unwrap();

    assert_eq!(market.account("r").unwrap().balance, 50);
    let view = market.request(request_id, "r").unwrap();
    assert_eq!(view.status, RequestStatus::Pending);
    assert_eq!(view.token_reward, 50);
    assert!(view.events.len() == 1);

    let audit = market.audit().unwrap();
    assert_eq!(audit.total_held, 50);
    assert_eq!(audit.total_tokens, 100);
}

/// Scenario B: once the provider accepts, a decline is no longer possible
/// because the request left `pending`.
#[test]
fn test_decline_after_accept_rejected() {
    let dir = TempDir::new().unwrap();
    let market = open_market(&dir);
    let listing_id = seed(&market);

    let request_id = market.create_request(listing_id, "r", 1_000).unwrap();
    market.accept_request(request_id, "p", 2_000).unwrap();

    let view = market.request(request_id, "p").unwrap();
    assert_eq!(view.status, RequestStatus::InProgress);

    let err = market.decline_request(request_id, "p", 3_000).unwrap_err();
    assert!(matches!(err, Error::Unauthorized));
}

/// Scenario C: bilateral completion. The second confirmation releases the
/// escrow to the provider; a third confirmation by either party fails.
#[test]
fn test_bilateral_completion() {
    let dir = TempDir::new().unwrap();
    let market = open_market(&dir);
    let listing_id = seed(&market);

    let request_id = market.create_request(listing_id, "r", 1_000).unwrap();
    market.accept_request(request_id, "p", 2_000).unwrap();

    assert_eq!(market.complete_request(request_id, "r", 3_000).unwrap(), None);
    assert_eq!(
        market.complete_request(request_id, "p", 4_000).unwrap(),
        Some(request_id)
    );

    assert_eq!(market.account("p").unwrap().balance, 50);
    let view = market.request(request_id, "p").unwrap();
    assert_eq!(view.status, RequestStatus::Completed);
    assert!(view.requester_completed && view.provider_completed);

    for caller in ["r", "p"] {
        let err = market.complete_request(request_id, caller, 5_000).unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
    }
}

/// Scenario D: insufficient balance aborts creation with no partial state.
#[test]
fn test_insufficient_balance_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let market = open_market(&dir);
    market.register_account("r", "Rhea").unwrap();
    market.register_account("p", "Piet").unwrap();
    market.grant_tokens("r", 10, 0).unwrap();
    let listing_id = market.add_listing("p", "Garden work", 50).unwrap();

    let err = market.create_request(listing_id, "r", 1_000).unwrap_err();
    assert!(matches!(
        err,
        Error::InsufficientBalance { have: 10, need: 50 }
    ));

    assert_eq!(market.account("r").unwrap().balance, 10);
    let audit = market.audit().unwrap();
    assert_eq!(audit.total_held, 0);
    assert!(market.request(1, "r").is_err());
    assert!(market.notifications("p").unwrap().is_empty());
}

/// Scenario E: the sweep refunds and expires stale pending requests,
/// notifies both parties, and never reprocesses an inactive request.
#[test]
fn test_expiry_sweep() {
    let dir = TempDir::new().unwrap();
    let market = open_market(&dir);
    let listing_id = seed(&market);
    let request_id = market.create_request(listing_id, "r", 1_000).unwrap();

    let now = 1_000 + Config::new().pending_window_secs + 1;
    let expired = market.update_expired_requests(now).unwrap();
    assert_eq!(expired, vec![request_id]);

    assert_eq!(market.account("r").unwrap().balance, 100);
    let view = market.request(request_id, "r").unwrap();
    assert_eq!(view.status, RequestStatus::Expired);
    assert_eq!(market.notifications("r").unwrap().len(), 1);
    assert_eq!(market.notifications("p").unwrap().len(), 2); // initiate + expiry

    // Second sweep finds nothing
    let expired_again = market.update_expired_requests(now + 60).unwrap();
    assert!(expired_again.is_empty());
}

/// A sweep leaves fresh pending requests alone.
#[test]
fn test_sweep_spares_recent_requests() {
    let dir = TempDir::new().unwrap();
    let market = open_market(&dir);
    let listing_id = seed(&market);
    let created_at = 50_000;
    let request_id = market.create_request(listing_id, "r", created_at).unwrap();

    let expired = market.update_expired_requests(created_at + 60).unwrap();
    assert!(expired.is_empty());
    assert_eq!(
        market.request(request_id, "r").unwrap().status,
        RequestStatus::Pending
    );
}

/// Storage wrapper whose appends can be made to fail, for atomicity tests
struct FlakyStorage {
    inner: FileStorage,
    fail_appends: Arc<AtomicBool>,
}

impl Storage for FlakyStorage {
    fn append_op(&mut self, op: &Operation) -> Result<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(Error::StateError("disk full".to_string()));
        }
        self.inner.append_op(op)
    }

    fn load_state(&self) -> Result<Option<(State, u64)>> {
        self.inner.load_state()
    }

    fn persist_state(&mut self, state: &State, applied_ops: u64) -> Result<()> {
        self.inner.persist_state(state, applied_ops)
    }

    fn load_ops_from(&self, from: u64) -> Result<Vec<Operation>> {
        self.inner.load_ops_from(from)
    }
}

/// Atomicity: a persistence failure mid-operation leaves balances, escrow
/// and the request store exactly at their pre-call state.
#[test]
fn test_append_failure_leaves_pre_image() {
    let dir = TempDir::new().unwrap();
    let fail_appends = Arc::new(AtomicBool::new(false));
    let storage = FlakyStorage {
        inner: FileStorage::with_paths(
            dir.path().join("ops.log"),
            dir.path().join("state.bin"),
        ),
        fail_appends: fail_appends.clone(),
    };
    let config = Config::with_data_dir(dir.path().to_path_buf());
    let market = Market::open(storage, NoOpPush, &config).unwrap();
    let listing_id = seed(&market);
    let audit_before = market.audit().unwrap();

    fail_appends.store(true, Ordering::SeqCst);
    let err = market.create_request(listing_id, "r", 1_000).unwrap_err();
    assert!(matches!(err, Error::StateError(_)));

    let audit_after = market.audit().unwrap();
    assert_eq!(audit_before.state_digest, audit_after.state_digest);
    assert_eq!(market.account("r").unwrap().balance, 100);

    // Once storage recovers, the same call goes through
    fail_appends.store(false, Ordering::SeqCst);
    let request_id = market.create_request(listing_id, "r", 2_000).unwrap();
    assert_eq!(market.account("r").unwrap().balance, 50);
    assert_eq!(
        market.request(request_id, "r").unwrap().status,
        RequestStatus::Pending
    );
}

/// Deterministic replay: a reopened engine reproduces the exact state the
/// live engine committed, digest for digest.
#[test]
fn test_reopen_reproduces_state() {
    let dir = TempDir::new().unwrap();
    let digest_before;
    {
        let market = open_market(&dir);
        let listing_id = seed(&market);
        let request_id = market.create_request(listing_id, "r", 1_000).unwrap();
        market.accept_request(request_id, "p", 2_000).unwrap();
        market.complete_request(request_id, "r", 3_000).unwrap();
        market.complete_request(request_id, "p", 4_000).unwrap();
        digest_before = market.audit().unwrap().state_digest;
    }

    let storage = FileStorage::with_paths(
        dir.path().join("ops.log"),
        dir.path().join("state.bin"),
    );
    let report = replay::verify_storage(&storage).unwrap();
    assert!(report.consistent);
    assert_eq!(report.tip_digest, digest_before);

    let market = open_market(&dir);
    assert_eq!(market.audit().unwrap().state_digest, digest_before);
    assert_eq!(market.account("p").unwrap().balance, 50);
    assert_eq!(
        market.request(1, "p").unwrap().status,
        RequestStatus::Completed
    );
}

/// Escrow status is terminal: released and refunded holdings never move
/// again, even under further lifecycle attempts.
#[test]
fn test_holding_transitions_are_terminal() {
    let dir = TempDir::new().unwrap();
    let market = open_market(&dir);
    let listing_id = seed(&market);

    let first = market.create_request(listing_id, "r", 1_000).unwrap();
    market.cancel_request(first, "r", 2_000).unwrap();

    let second = market.create_request(listing_id, "r", 3_000).unwrap();
    market.complete_request(second, "r", 4_000).unwrap();
    market.complete_request(second, "p", 5_000).unwrap();

    // Reopen and inspect the raw holdings
    drop(market);
    let storage = FileStorage::with_paths(
        dir.path().join("ops.log"),
        dir.path().join("state.bin"),
    );
    let (state, _) = replay::replay_to_tip(&storage).unwrap();
    assert_eq!(state.get_holding(first).unwrap().status, HoldingStatus::Refunded);
    assert_eq!(state.get_holding(second).unwrap().status, HoldingStatus::Released);
    assert_eq!(state.total_held(), 0);
}
