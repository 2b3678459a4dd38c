//! Request lifecycle engine.
//!
//! `Market` owns the domain state and turns each inbound intent into one
//! atomic commit: validate + apply on a clone, append the operation to the
//! log, swap the clone in. Only after a commit does the engine fire
//! best-effort pushes; a push failure is logged and never unwinds the
//! committed state.
//!
//! The engine mutex is the serialization point for conflicting transitions
//! on the same request: two concurrent completion calls cannot both observe
//! an active completion record.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::op::Operation;
use crate::push::PushGateway;
use crate::replay;
use crate::state::{
    apply, Activity, Applied, Event, EventKind, Notification, Outcome, RequestStatus, State,
};
use crate::storage::Storage;
use crate::ticket;
use serde::Serialize;
use std::sync::Mutex;

struct Inner<S: Storage> {
    state: State,
    applied_ops: u64,
    storage: S,
}

impl<S: Storage> Inner<S> {
    /// One transaction: apply on a clone, append to the log, swap the clone
    /// in. The log append is the commit point: an error before or at the
    /// append leaves the in-memory state and the log at the pre-image. The
    /// snapshot is only an optimization over the log; a failed snapshot
    /// write costs replay time at the next open, not correctness.
    fn commit(&mut self, op: Operation) -> Result<Applied> {
        let (new_state, applied) = apply(&self.state, &op)?;
        self.storage.append_op(&op)?;
        self.state = new_state;
        self.applied_ops += 1;
        if let Err(e) = self.storage.persist_state(&self.state, self.applied_ops) {
            Logger::warn(&format!("failed to persist snapshot: {}", e));
        }
        Ok(applied)
    }
}

/// The marketplace engine: lifecycle operations plus read-side queries.
pub struct Market<S: Storage, P: PushGateway> {
    inner: Mutex<Inner<S>>,
    push: P,
    pending_window_secs: i64,
}

impl<S: Storage, P: PushGateway> Market<S, P> {
    /// Open the engine on existing storage, replaying the log to tip.
    pub fn open(storage: S, push: P, config: &Config) -> Result<Self> {
        let (state, applied_ops) = replay::replay_to_tip(&storage)?;
        Ok(Market {
            inner: Mutex::new(Inner {
                state,
                applied_ops,
                storage,
            }),
            push,
            pending_window_secs: config.pending_window_secs,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner<S>>> {
        self.inner
            .lock()
            .map_err(|_| Error::StateError("engine lock poisoned".to_string()))
    }

    fn commit(&self, op: Operation) -> Result<Applied> {
        let applied = self.lock()?.commit(op)?;
        self.notify(&applied.pushes);
        Ok(applied)
    }

    /// Fire the post-commit hints. At most one per recipient per
    /// transition; failures are logged, never retried, never surfaced.
    fn notify(&self, pushes: &[String]) {
        for recipient in pushes {
            let channel = format!("user-{}", recipient);
            if let Err(e) = self.push.trigger(&channel, "new-notification", None) {
                Logger::warn(&format!("failed to send push to {}: {}", channel, e));
            }
        }
    }

    pub fn register_account(&self, user_id: &str, display_name: &str) -> Result<()> {
        self.commit(Operation::RegisterAccount {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
        })?;
        Ok(())
    }

    /// Credit tokens to an account. Returns the new balance.
    pub fn grant_tokens(&self, user_id: &str, amount: u64, now: i64) -> Result<u64> {
        let applied = self.commit(Operation::GrantTokens {
            user_id: user_id.to_string(),
            amount,
            at: now,
        })?;
        match applied.outcome {
            Outcome::Granted { balance, .. } => Ok(balance),
            other => Err(unexpected(other)),
        }
    }

    /// Credit one token for a watched advertisement. Returns the new
    /// balance.
    pub fn watch_advertisement(&self, user_id: &str, now: i64) -> Result<u64> {
        let applied = self.commit(Operation::WatchAdvertisement {
            user_id: user_id.to_string(),
            at: now,
        })?;
        match applied.outcome {
            Outcome::AdWatched { balance, .. } => Ok(balance),
            other => Err(unexpected(other)),
        }
    }

    /// Publish a listing. Returns the new listing id.
    pub fn add_listing(&self, provider_id: &str, title: &str, price: u64) -> Result<u64> {
        let applied = self.commit(Operation::AddListing {
            provider_id: provider_id.to_string(),
            title: title.to_string(),
            price,
        })?;
        match applied.outcome {
            Outcome::ListingAdded { listing_id } => Ok(listing_id),
            other => Err(unexpected(other)),
        }
    }

    /// Open a service request: deducts the listing price from the requester
    /// into escrow. Returns the new request id.
    pub fn create_request(&self, listing_id: u64, requester_id: &str, now: i64) -> Result<u64> {
        let applied = self.commit(Operation::CreateRequest {
            listing_id,
            requester_id: requester_id.to_string(),
            at: now,
        })?;
        match applied.outcome {
            Outcome::RequestCreated { request_id } => Ok(request_id),
            other => Err(unexpected(other)),
        }
    }

    pub fn accept_request(&self, request_id: u64, caller_id: &str, now: i64) -> Result<u64> {
        let applied = self.commit(Operation::AcceptRequest {
            request_id,
            caller_id: caller_id.to_string(),
            at: now,
        })?;
        match applied.outcome {
            Outcome::Accepted { request_id } => Ok(request_id),
            other => Err(unexpected(other)),
        }
    }

    pub fn decline_request(&self, request_id: u64, caller_id: &str, now: i64) -> Result<u64> {
        let applied = self.commit(Operation::DeclineRequest {
            request_id,
            caller_id: caller_id.to_string(),
            at: now,
        })?;
        match applied.outcome {
            Outcome::Declined { request_id } => Ok(request_id),
            other => Err(unexpected(other)),
        }
    }

    /// Record one party's completion confirmation. Returns
    /// `Some(request_id)` when this was the second confirmation and the
    /// escrow was released to the provider, `None` otherwise.
    pub fn complete_request(
        &self,
        request_id: u64,
        caller_id: &str,
        now: i64,
    ) -> Result<Option<u64>> {
        let applied = self.commit(Operation::CompleteRequest {
            request_id,
            caller_id: caller_id.to_string(),
            at: now,
        })?;
        match applied.outcome {
            Outcome::Confirmed {
                request_id,
                released,
            } => Ok(released.then_some(request_id)),
            other => Err(unexpected(other)),
        }
    }

    pub fn cancel_request(&self, request_id: u64, caller_id: &str, now: i64) -> Result<()> {
        let applied = self.commit(Operation::CancelRequest {
            request_id,
            caller_id: caller_id.to_string(),
            at: now,
        })?;
        match applied.outcome {
            Outcome::Cancelled { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// System-initiated expiry sweep. Meant to be invoked on a fixed
    /// interval by an external scheduler; processes the whole batch in one
    /// commit and returns the expired request ids.
    pub fn update_expired_requests(&self, now: i64) -> Result<Vec<u64>> {
        let cutoff = now - self.pending_window_secs;
        let applied = self.commit(Operation::ExpirePending { cutoff, now })?;
        match applied.outcome {
            Outcome::Expired { request_ids } => {
                if !request_ids.is_empty() {
                    Logger::info(&format!("expired {} pending request(s)", request_ids.len()));
                }
                Ok(request_ids)
            }
            other => Err(unexpected(other)),
        }
    }

    /// File a report against a request. The ticket id is generated under
    /// the engine lock so it lands in the logged operation.
    pub fn file_report(&self, request_id: u64, reporter_id: &str, now: i64) -> Result<String> {
        let mut inner = self.lock()?;
        let report_seq = inner.state.reports.len() as i64 + 1;
        let ticket_id = ticket::generate_ticket(report_seq, now);
        let applied = inner.commit(Operation::FileReport {
            request_id,
            reporter_id: reporter_id.to_string(),
            ticket_id,
            at: now,
        })?;
        match applied.outcome {
            Outcome::Reported { ticket_id } => Ok(ticket_id),
            other => Err(unexpected(other)),
        }
    }

    pub fn mark_notification_read(&self, notification_id: u64, caller_id: &str) -> Result<()> {
        self.commit(Operation::MarkNotificationRead {
            notification_id,
            caller_id: caller_id.to_string(),
        })?;
        Ok(())
    }

    /// Account balance and name
    pub fn account(&self, user_id: &str) -> Result<AccountView> {
        let inner = self.lock()?;
        let account = inner.state.get_account(user_id).ok_or(Error::NoRecord)?;
        Ok(AccountView {
            user_id: account.id.clone(),
            display_name: account.display_name.clone(),
            balance: account.balance,
        })
    }

    /// Full request view with events attributed to the acting party
    pub fn request(&self, request_id: u64, viewer_id: &str) -> Result<RequestView> {
        let inner = self.lock()?;
        let state = &inner.state;
        let request = state.get_request(request_id).ok_or(Error::NoRecord)?;
        let completion = state
            .get_completion(request_id)
            .ok_or_else(|| Error::StateError(format!("request {} has no completion row", request_id)))?;
        let listing = state
            .get_listing(request.listing_id)
            .ok_or_else(|| Error::StateError(format!("listing {} not found", request.listing_id)))?;

        let events = state
            .request_events(request_id)
            .into_iter()
            .map(|e| attribute_event(e, &request.requester_id, &request.provider_id))
            .collect();

        Ok(RequestView {
            id: request.id,
            listing_id: listing.id,
            listing_title: listing.title.clone(),
            requester_id: request.requester_id.clone(),
            provider_id: request.provider_id.clone(),
            activity: request.activity,
            status: request.status,
            token_reward: request.token_reward,
            created_at: request.created_at,
            updated_at: request.updated_at,
            requester_completed: completion.requester_completed,
            provider_completed: completion.provider_completed,
            direction: direction_for(request.provider_id == viewer_id),
            events,
        })
    }

    /// All requests the user is a party to, labelled incoming/outgoing
    pub fn user_requests(&self, user_id: &str) -> Result<Vec<RequestSummary>> {
        let inner = self.lock()?;
        let state = &inner.state;
        let summaries = state
            .user_requests(user_id)
            .into_iter()
            .map(|r| {
                let title = state
                    .get_listing(r.listing_id)
                    .map(|l| l.title.clone())
                    .unwrap_or_default();
                RequestSummary {
                    id: r.id,
                    listing_id: r.listing_id,
                    listing_title: title,
                    requester_id: r.requester_id.clone(),
                    provider_id: r.provider_id.clone(),
                    activity: r.activity,
                    status: r.status,
                    token_reward: r.token_reward,
                    created_at: r.created_at,
                    direction: direction_for(r.provider_id == user_id),
                }
            })
            .collect();
        Ok(summaries)
    }

    /// A recipient's notifications, newest first
    pub fn notifications(&self, recipient_id: &str) -> Result<Vec<Notification>> {
        let inner = self.lock()?;
        Ok(inner
            .state
            .notifications_for(recipient_id)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Reconciliation summary: balances, held escrow, and the state digest
    pub fn audit(&self) -> Result<AuditReport> {
        let inner = self.lock()?;
        let state = &inner.state;
        Ok(AuditReport {
            total_balances: state.total_balances(),
            total_held: state.total_held(),
            total_tokens: state.total_tokens(),
            ledger_entries: state.ledger.len() as u64,
            applied_ops: inner.applied_ops,
            state_digest: replay::state_digest(state)?,
        })
    }
}

fn unexpected(outcome: Outcome) -> Error {
    Error::StateError(format!("unexpected apply outcome: {:?}", outcome))
}

fn direction_for(is_provider: bool) -> RequestDirection {
    if is_provider {
        RequestDirection::Incoming
    } else {
        RequestDirection::Outgoing
    }
}

fn attribute_event(event: &Event, requester_id: &str, provider_id: &str) -> RequestEventView {
    let by = match &event.actor_id {
        Some(actor) if actor == requester_id => "requester",
        Some(actor) if actor == provider_id => "provider",
        Some(_) => "unknown",
        None => "system",
    };
    RequestEventView {
        id: event.id,
        at: event.at,
        description: event.kind,
        by: by.to_string(),
    }
}

/// Whether the viewer is providing (incoming) or requesting (outgoing)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestDirection {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub user_id: String,
    pub display_name: String,
    pub balance: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestEventView {
    pub id: u64,
    pub at: i64,
    pub description: EventKind,
    pub by: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestView {
    pub id: u64,
    pub listing_id: u64,
    pub listing_title: String,
    pub requester_id: String,
    pub provider_id: String,
    pub activity: Activity,
    pub status: RequestStatus,
    pub token_reward: u64,
    pub created_at: i64,
    pub updated_at: i64,
    pub requester_completed: bool,
    pub provider_completed: bool,
    pub direction: RequestDirection,
    pub events: Vec<RequestEventView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestSummary {
    pub id: u64,
    pub listing_id: u64,
    pub listing_title: String,
    pub requester_id: String,
    pub provider_id: String,
    pub activity: Activity,
    pub status: RequestStatus,
    pub token_reward: u64,
    pub created_at: i64,
    pub direction: RequestDirection,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub total_balances: u64,
    pub total_held: u64,
    pub total_tokens: u64,
    pub ledger_entries: u64,
    pub applied_ops: u64,
    pub state_digest: String,
}
