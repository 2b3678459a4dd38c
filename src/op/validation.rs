use crate::error::{Error, Result};
use crate::op::Operation;
use crate::state::{RequestStatus, State};

/// Validate an operation against the pre-image state.
///
/// Every business-rule check happens here, before `apply` issues any write
/// to its clone. The one exception is the balance deduction inside
/// `apply_create_request`: the conditional deduct re-checks sufficiency at
/// the mutation site as an independent safety net.
pub fn validate(state: &State, op: &Operation) -> Result<()> {
    match op {
        Operation::RegisterAccount { user_id, .. } => validate_register(state, user_id),
        Operation::GrantTokens {
            user_id, amount, ..
        } => validate_grant(state, user_id, *amount),
        Operation::WatchAdvertisement { user_id, .. } => validate_account_exists(state, user_id),
        Operation::AddListing {
            provider_id,
            title,
            price,
        } => validate_add_listing(state, provider_id, title, *price),
        Operation::CreateRequest {
            listing_id,
            requester_id,
            ..
        } => validate_create_request(state, *listing_id, requester_id),
        Operation::AcceptRequest {
            request_id,
            caller_id,
            ..
        } => validate_provider_resolution(state, *request_id, caller_id),
        Operation::DeclineRequest {
            request_id,
            caller_id,
            ..
        } => validate_provider_resolution(state, *request_id, caller_id),
        Operation::CompleteRequest {
            request_id,
            caller_id,
            ..
        } => validate_complete(state, *request_id, caller_id),
        Operation::CancelRequest {
            request_id,
            caller_id,
            ..
        } => validate_cancel(state, *request_id, caller_id),
        // Selection is the predicate itself; an empty sweep is a no-op
        Operation::ExpirePending { .. } => Ok(()),
        Operation::FileReport {
            request_id,
            reporter_id,
            ticket_id,
            ..
        } => validate_file_report(state, *request_id, reporter_id, ticket_id),
        Operation::MarkNotificationRead {
            notification_id,
            caller_id,
        } => validate_mark_read(state, *notification_id, caller_id),
    }
}

fn validate_account_exists(state: &State, user_id: &str) -> Result<()> {
    if state.get_account(user_id).is_none() {
        return Err(Error::NoRecord);
    }
    Ok(())
}

fn validate_register(state: &State, user_id: &str) -> Result<()> {
    if state.get_account(user_id).is_some() {
        return Err(Error::DuplicateId(user_id.to_string()));
    }
    if user_id.is_empty() {
        return Err(Error::InvalidOperation(
            "user id must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_grant(state: &State, user_id: &str, amount: u64) -> Result<()> {
    validate_account_exists(state, user_id)?;
    if amount == 0 {
        return Err(Error::InvalidOperation(
            "grant amount must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_add_listing(state: &State, provider_id: &str, title: &str, price: u64) -> Result<()> {
    validate_account_exists(state, provider_id)?;
    if title.is_empty() {
        return Err(Error::InvalidOperation(
            "listing title must not be empty".to_string(),
        ));
    }
    if price == 0 {
        return Err(Error::InvalidOperation(
            "listing price must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Creation requires the listing to exist and to not be exclusively taken
/// by another active request. Balance sufficiency is not checked here; the
/// conditional deduct in apply reports `InsufficientBalance` itself.
fn validate_create_request(state: &State, listing_id: u64, requester_id: &str) -> Result<()> {
    validate_account_exists(state, requester_id)?;
    if state.get_listing(listing_id).is_none() {
        return Err(Error::NoRecord);
    }
    if state.listing_is_taken(listing_id) {
        return Err(Error::Unauthorized);
    }
    Ok(())
}

/// Shared precondition for accept and decline: the caller must be the
/// request's provider AND the request must still be active in `pending`.
/// Either failing makes the whole call unauthorized; a caller-id match
/// never bypasses the state check.
fn validate_provider_resolution(state: &State, request_id: u64, caller_id: &str) -> Result<()> {
    let request = state.get_request(request_id).ok_or(Error::NoRecord)?;
    if request.provider_id != caller_id
        || !request.is_active()
        || request.status != RequestStatus::Pending
    {
        return Err(Error::Unauthorized);
    }
    Ok(())
}

/// Completion checks authorization first (caller must be a party), then the
/// completion record: once both flags are set the record is inactive and
/// every further call is unauthorized. A request that already reached a
/// terminal outcome through another path (declined, cancelled, expired)
/// rejects confirmations the same way; its escrow is no longer held.
fn validate_complete(state: &State, request_id: u64, caller_id: &str) -> Result<()> {
    let request = state.get_request(request_id).ok_or(Error::NoRecord)?;
    if !request.is_party(caller_id) {
        return Err(Error::Unauthorized);
    }
    if !request.is_active() {
        return Err(Error::Unauthorized);
    }
    let completion = state
        .get_completion(request_id)
        .ok_or_else(|| Error::StateError(format!("request {} has no completion row", request_id)))?;
    if !completion.is_active {
        return Err(Error::Unauthorized);
    }
    Ok(())
}

/// Cancellation is requester-initiated only and allowed in both pending and
/// in-progress phases, anything still active.
fn validate_cancel(state: &State, request_id: u64, caller_id: &str) -> Result<()> {
    let request = state.get_request(request_id).ok_or(Error::NoRecord)?;
    if request.requester_id != caller_id || !request.is_active() {
        return Err(Error::Unauthorized);
    }
    Ok(())
}

fn validate_file_report(
    state: &State,
    request_id: u64,
    reporter_id: &str,
    ticket_id: &str,
) -> Result<()> {
    let request = state.get_request(request_id).ok_or(Error::NoRecord)?;
    if !request.is_party(reporter_id) {
        return Err(Error::Unauthorized);
    }
    if ticket_id.is_empty() {
        return Err(Error::InvalidOperation(
            "ticket id must not be empty".to_string(),
        ));
    }
    if state.get_report(request_id, reporter_id).is_some() {
        return Err(Error::DuplicateId(format!(
            "report for request {} by {}",
            request_id, reporter_id
        )));
    }
    Ok(())
}

fn validate_mark_read(state: &State, notification_id: u64, caller_id: &str) -> Result<()> {
    let notification = state
        .notifications
        .iter()
        .find(|n| n.id == notification_id)
        .ok_or(Error::NoRecord)?;
    if notification.recipient_id != caller_id {
        return Err(Error::Unauthorized);
    }
    Ok(())
}
