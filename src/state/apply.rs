use crate::error::{Error, Result};
use crate::op::{validation, Operation};
use crate::state::{
    Completion, Event, EventCategory, EventKind, LedgerEntry, LedgerKind, Listing, Notification,
    PaymentHolding, RequestStatus, ServiceRequest, State,
};

/// What an applied operation produced, for the caller's benefit. The state
/// itself carries every durable effect; this is only the return channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Registered { user_id: String },
    Granted { user_id: String, balance: u64 },
    AdWatched { user_id: String, balance: u64 },
    ListingAdded { listing_id: u64 },
    RequestCreated { request_id: u64 },
    Accepted { request_id: u64 },
    Declined { request_id: u64 },
    /// `released` is true only when this confirmation was the second one
    /// and the escrow moved to the provider
    Confirmed { request_id: u64, released: bool },
    Cancelled { request_id: u64 },
    Expired { request_ids: Vec<u64> },
    Reported { ticket_id: String },
    NotificationRead { notification_id: u64 },
}

/// Result of a successful apply: the outcome plus the users that should
/// receive a best-effort push *after* the new state has been committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub outcome: Outcome,
    pub pushes: Vec<String>,
}

impl Applied {
    fn quiet(outcome: Outcome) -> Self {
        Applied {
            outcome,
            pushes: Vec::new(),
        }
    }

    fn with_pushes(outcome: Outcome, pushes: Vec<String>) -> Self {
        Applied { outcome, pushes }
    }
}

/// Apply one operation to the state.
///
/// Validates every precondition against the pre-image, then mutates a clone.
/// Any error discards the clone, so a failed operation leaves no observable
/// write. This is the transaction guarantee the lifecycle depends on.
pub fn apply(state: &State, op: &Operation) -> Result<(State, Applied)> {
    validation::validate(state, op)?;
    let mut new_state = state.clone();
    let applied = match op {
        Operation::RegisterAccount {
            user_id,
            display_name,
        } => apply_register(&mut new_state, user_id, display_name)?,
        Operation::GrantTokens {
            user_id,
            amount,
            at,
        } => apply_grant(&mut new_state, user_id, *amount, *at)?,
        Operation::WatchAdvertisement { user_id, at } => {
            apply_watch_ad(&mut new_state, user_id, *at)?
        }
        Operation::AddListing {
            provider_id,
            title,
            price,
        } => apply_add_listing(&mut new_state, provider_id, title, *price)?,
        Operation::CreateRequest {
            listing_id,
            requester_id,
            at,
        } => apply_create_request(&mut new_state, *listing_id, requester_id, *at)?,
        Operation::AcceptRequest {
            request_id,
            caller_id,
            at,
        } => apply_accept(&mut new_state, *request_id, caller_id, *at)?,
        Operation::DeclineRequest {
            request_id,
            caller_id,
            at,
        } => apply_decline(&mut new_state, *request_id, caller_id, *at)?,
        Operation::CompleteRequest {
            request_id,
            caller_id,
            at,
        } => apply_complete(&mut new_state, *request_id, caller_id, *at)?,
        Operation::CancelRequest {
            request_id,
            caller_id,
            at,
        } => apply_cancel(&mut new_state, *request_id, caller_id, *at)?,
        Operation::ExpirePending { cutoff, now } => {
            apply_expire(&mut new_state, *cutoff, *now)?
        }
        Operation::FileReport {
            request_id,
            reporter_id,
            ticket_id,
            at,
        } => apply_file_report(&mut new_state, *request_id, reporter_id, ticket_id, *at)?,
        Operation::MarkNotificationRead {
            notification_id,
            caller_id: _,
        } => apply_mark_read(&mut new_state, *notification_id)?,
    };

    Ok((new_state, applied))
}

fn apply_register(state: &mut State, user_id: &str, display_name: &str) -> Result<Applied> {
    state.insert_account(crate::state::Account::new(
        user_id.to_string(),
        display_name.to_string(),
    ));
    Ok(Applied::quiet(Outcome::Registered {
        user_id: user_id.to_string(),
    }))
}

fn apply_grant(state: &mut State, user_id: &str, amount: u64, at: i64) -> Result<Applied> {
    let account = state
        .get_account_mut(user_id)
        .ok_or_else(|| Error::StateError(format!("account {} not found", user_id)))?;
    let balance = account.credit(amount);
    state.ledger.push(LedgerEntry::new(
        user_id.to_string(),
        LedgerKind::Reward,
        None,
        at,
    ));
    Ok(Applied::quiet(Outcome::Granted {
        user_id: user_id.to_string(),
        balance,
    }))
}

fn apply_watch_ad(state: &mut State, user_id: &str, at: i64) -> Result<Applied> {
    let account = state
        .get_account_mut(user_id)
        .ok_or_else(|| Error::StateError(format!("account {} not found", user_id)))?;
    let balance = account.credit(1);
    state.ledger.push(LedgerEntry::new(
        user_id.to_string(),
        LedgerKind::Advertisement,
        None,
        at,
    ));
    Ok(Applied::quiet(Outcome::AdWatched {
        user_id: user_id.to_string(),
        balance,
    }))
}

fn apply_add_listing(
    state: &mut State,
    provider_id: &str,
    title: &str,
    price: u64,
) -> Result<Applied> {
    let listing_id = state.take_listing_id();
    state.listings.insert(
        listing_id,
        Listing::new(listing_id, provider_id.to_string(), title.to_string(), price),
    );
    Ok(Applied::quiet(Outcome::ListingAdded { listing_id }))
}

/// The five-write creation set (request, completion, conditional deduct,
/// holding, ledger entry) plus the event/notification pair. Either all of
/// it lands or (via the discarded clone) none of it does.
fn apply_create_request(
    state: &mut State,
    listing_id: u64,
    requester_id: &str,
    at: i64,
) -> Result<Applied> {
    let listing = state
        .get_listing(listing_id)
        .ok_or(Error::NoRecord)?
        .clone();
    let requester_name = display_name(state, requester_id)?;

    let request_id = state.take_request_id();
    state.requests.insert(
        request_id,
        ServiceRequest::pending(
            request_id,
            listing_id,
            requester_id.to_string(),
            listing.provider_id.clone(),
            listing.price,
            at,
        ),
    );
    state.completions.insert(request_id, Completion::new());

    // Conditional deduct: the second safety net after validation. An
    // insufficient balance aborts the whole operation here.
    let account = state
        .get_account_mut(requester_id)
        .ok_or_else(|| Error::StateError(format!("account {} not found", requester_id)))?;
    account.deduct(listing.price)?;

    let holding_id = state.take_holding_id();
    state.holdings.insert(
        request_id,
        PaymentHolding::held(holding_id, request_id, requester_id.to_string(), listing.price),
    );
    state.ledger.push(LedgerEntry::new(
        requester_id.to_string(),
        LedgerKind::Deduct,
        Some(holding_id),
        at,
    ));

    let event_id = record_event(
        state,
        request_id,
        EventCategory::Request,
        EventKind::Initiate,
        Some(requester_id.to_string()),
        at,
    );
    record_notification(
        state,
        format!(
            "{} has requested your service \"{}\"",
            requester_name, listing.title
        ),
        listing.provider_id.clone(),
        Some(requester_id.to_string()),
        event_id,
        at,
    );

    Ok(Applied::with_pushes(
        Outcome::RequestCreated { request_id },
        vec![listing.provider_id],
    ))
}

fn apply_accept(state: &mut State, request_id: u64, caller_id: &str, at: i64) -> Result<Applied> {
    let request = state
        .get_request_mut(request_id)
        .ok_or(Error::NoRecord)?;
    let requester_id = request.requester_id.clone();
    let listing_id = request.listing_id;
    request.begin_progress(at);

    let provider_name = display_name(state, caller_id)?;
    let title = listing_title(state, listing_id)?;

    let event_id = record_event(
        state,
        request_id,
        EventCategory::Request,
        EventKind::Accept,
        Some(caller_id.to_string()),
        at,
    );
    record_notification(
        state,
        format!(
            "{} has accepted your request for \"{}\"",
            provider_name, title
        ),
        requester_id.clone(),
        Some(caller_id.to_string()),
        event_id,
        at,
    );

    Ok(Applied::with_pushes(
        Outcome::Accepted { request_id },
        vec![requester_id],
    ))
}

fn apply_decline(state: &mut State, request_id: u64, caller_id: &str, at: i64) -> Result<Applied> {
    let request = state
        .get_request_mut(request_id)
        .ok_or(Error::NoRecord)?;
    let requester_id = request.requester_id.clone();
    request.resolve(RequestStatus::Declined, at);

    refund_holding(state, request_id, at)?;

    let provider_name = display_name(state, caller_id)?;
    let event_id = record_event(
        state,
        request_id,
        EventCategory::Request,
        EventKind::Decline,
        Some(caller_id.to_string()),
        at,
    );
    record_notification(
        state,
        format!("{} has declined your service request.", provider_name),
        requester_id.clone(),
        Some(caller_id.to_string()),
        event_id,
        at,
    );

    Ok(Applied::with_pushes(
        Outcome::Declined { request_id },
        vec![requester_id],
    ))
}

fn apply_complete(state: &mut State, request_id: u64, caller_id: &str, at: i64) -> Result<Applied> {
    let request = state
        .get_request(request_id)
        .ok_or(Error::NoRecord)?
        .clone();
    let as_requester = request.requester_id == caller_id;

    let completion = state
        .get_completion_mut(request_id)
        .ok_or_else(|| Error::StateError(format!("request {} has no completion row", request_id)))?;
    completion.confirm(as_requester);
    let both = completion.both_confirmed();

    // Second confirmation releases the escrow to the provider and resolves
    // the request
    if both {
        let holding = state
            .get_holding_mut(request_id)
            .ok_or_else(|| Error::StateError(format!("request {} has no holding", request_id)))?;
        if !holding.is_held() {
            return Err(Error::StateError(format!(
                "holding for request {} is not held",
                request_id
            )));
        }
        let amount = holding.release();
        let holding_id = holding.id;

        let provider = state
            .get_account_mut(&request.provider_id)
            .ok_or_else(|| Error::StateError(format!("account {} not found", request.provider_id)))?;
        provider.credit(amount);
        state.ledger.push(LedgerEntry::new(
            request.provider_id.clone(),
            LedgerKind::Addition,
            Some(holding_id),
            at,
        ));

        state
            .get_request_mut(request_id)
            .ok_or(Error::NoRecord)?
            .resolve(RequestStatus::Completed, at);
    }

    // The confirmation event and the notification to the other party are
    // recorded on every call, released or not
    let actor_name = display_name(state, caller_id)?;
    let recipient = if as_requester {
        request.provider_id.clone()
    } else {
        request.requester_id.clone()
    };
    let event_id = record_event(
        state,
        request_id,
        EventCategory::Request,
        EventKind::Confirmation,
        Some(caller_id.to_string()),
        at,
    );
    record_notification(
        state,
        format!("{} has confirmed completion.", actor_name),
        recipient.clone(),
        Some(caller_id.to_string()),
        event_id,
        at,
    );

    Ok(Applied::with_pushes(
        Outcome::Confirmed {
            request_id,
            released: both,
        },
        vec![recipient],
    ))
}

fn apply_cancel(state: &mut State, request_id: u64, caller_id: &str, at: i64) -> Result<Applied> {
    let request = state
        .get_request_mut(request_id)
        .ok_or(Error::NoRecord)?;
    let provider_id = request.provider_id.clone();
    let listing_id = request.listing_id;
    request.resolve(RequestStatus::Cancelled, at);

    refund_holding(state, request_id, at)?;

    let requester_name = display_name(state, caller_id)?;
    let title = listing_title(state, listing_id)?;
    let event_id = record_event(
        state,
        request_id,
        EventCategory::Request,
        EventKind::Cancelled,
        Some(caller_id.to_string()),
        at,
    );
    record_notification(
        state,
        format!(
            "{} cancelled request for your service \"{}\".",
            requester_name, title
        ),
        provider_id.clone(),
        Some(caller_id.to_string()),
        event_id,
        at,
    );

    Ok(Applied::with_pushes(
        Outcome::Cancelled { request_id },
        vec![provider_id],
    ))
}

/// Expire every active pending request at or past the cutoff, refunding each
/// escrow. The whole batch shares one apply: a failure on any row discards
/// everything rather than leaving a half-refunded sweep.
fn apply_expire(state: &mut State, cutoff: i64, now: i64) -> Result<Applied> {
    let request_ids = state.expirable_requests(cutoff);
    let mut pushes = Vec::new();

    for &request_id in &request_ids {
        let request = state
            .get_request_mut(request_id)
            .ok_or_else(|| Error::StateError(format!("request {} disappeared", request_id)))?;
        let requester_id = request.requester_id.clone();
        let provider_id = request.provider_id.clone();
        let listing_id = request.listing_id;
        request.resolve(RequestStatus::Expired, now);

        refund_holding(state, request_id, now)?;

        let requester_name = display_name(state, &requester_id)?;
        let title = listing_title(state, listing_id)?;

        let event_id = record_event(
            state,
            request_id,
            EventCategory::System,
            EventKind::Expired,
            None,
            now,
        );
        record_notification(
            state,
            format!(
                "Your request for \"{}\" has expired. Your tokens have been refunded.",
                title
            ),
            requester_id.clone(),
            None,
            event_id,
            now,
        );
        record_notification(
            state,
            format!(
                "Request from {} has expired for your service \"{}\".",
                requester_name, title
            ),
            provider_id.clone(),
            None,
            event_id,
            now,
        );

        pushes.push(requester_id);
        pushes.push(provider_id);
    }

    Ok(Applied::with_pushes(
        Outcome::Expired { request_ids },
        pushes,
    ))
}

fn apply_file_report(
    state: &mut State,
    request_id: u64,
    reporter_id: &str,
    ticket_id: &str,
    at: i64,
) -> Result<Applied> {
    let report_id = state.take_report_id();
    state.reports.push(crate::state::RequestReport::open(
        report_id,
        request_id,
        reporter_id.to_string(),
        ticket_id.to_string(),
        at,
    ));
    Ok(Applied::quiet(Outcome::Reported {
        ticket_id: ticket_id.to_string(),
    }))
}

fn apply_mark_read(state: &mut State, notification_id: u64) -> Result<Applied> {
    let notification = state
        .get_notification_mut(notification_id)
        .ok_or(Error::NoRecord)?;
    notification.mark_read();
    Ok(Applied::quiet(Outcome::NotificationRead { notification_id }))
}

/// Refund a held escrow back to its payer and record the ledger addition.
/// Shared by decline, cancel, and the expiry sweep.
fn refund_holding(state: &mut State, request_id: u64, at: i64) -> Result<()> {
    let holding = state
        .get_holding_mut(request_id)
        .ok_or_else(|| Error::StateError(format!("request {} has no holding", request_id)))?;
    if !holding.is_held() {
        return Err(Error::StateError(format!(
            "holding for request {} is not held",
            request_id
        )));
    }
    let amount = holding.refund();
    let holding_id = holding.id;
    let payer_id = holding.payer_id.clone();

    let payer = state
        .get_account_mut(&payer_id)
        .ok_or_else(|| Error::StateError(format!("account {} not found", payer_id)))?;
    payer.credit(amount);
    state.ledger.push(LedgerEntry::new(
        payer_id,
        LedgerKind::Addition,
        Some(holding_id),
        at,
    ));
    Ok(())
}

fn record_event(
    state: &mut State,
    target_id: u64,
    category: EventCategory,
    kind: EventKind,
    actor_id: Option<String>,
    at: i64,
) -> u64 {
    let event_id = state.take_event_id();
    state
        .events
        .push(Event::new(event_id, target_id, category, kind, actor_id, at));
    event_id
}

fn record_notification(
    state: &mut State,
    message: String,
    recipient_id: String,
    actor_id: Option<String>,
    event_id: u64,
    at: i64,
) {
    let notification_id = state.take_notification_id();
    state.notifications.push(Notification::new(
        notification_id,
        message,
        recipient_id,
        actor_id,
        event_id,
        at,
    ));
}

fn display_name(state: &State, user_id: &str) -> Result<String> {
    state
        .get_account(user_id)
        .map(|a| a.display_name.clone())
        .ok_or_else(|| Error::StateError(format!("account {} not found", user_id)))
}

fn listing_title(state: &State, listing_id: u64) -> Result<String> {
    state
        .get_listing(listing_id)
        .map(|l| l.title.clone())
        .ok_or_else(|| Error::StateError(format!("listing {} not found", listing_id)))
}
