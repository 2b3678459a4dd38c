use serde::{Deserialize, Serialize};

/// One intent against the marketplace state.
///
/// Operations are the unit of atomicity: `state::apply` turns one operation
/// into either a fully-committed set of writes or no writes at all. They are
/// also the unit of durability: the engine appends each committed operation
/// to the log, so replaying the log from genesis reproduces the state.
///
/// Every time-dependent operation carries its wall-clock timestamp (`at`,
/// `now`, `cutoff`); replay must never consult the clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create a marketplace account with zero balance
    RegisterAccount {
        user_id: String,
        display_name: String,
    },

    /// Credit tokens to an account (signup award / top-up); ledger kind
    /// `reward`
    GrantTokens { user_id: String, amount: u64, at: i64 },

    /// Credit exactly one token for a watched advertisement; ledger kind
    /// `advertisement`
    WatchAdvertisement { user_id: String, at: i64 },

    /// Publish a listing offering a service for a fixed token price
    AddListing {
        provider_id: String,
        title: String,
        price: u64,
    },

    /// Open a service request against a listing: deducts the listing price
    /// from the requester and holds it in escrow
    CreateRequest {
        listing_id: u64,
        requester_id: String,
        at: i64,
    },

    /// Provider accepts a pending request
    AcceptRequest {
        request_id: u64,
        caller_id: String,
        at: i64,
    },

    /// Provider declines a pending request; escrow refunds to the requester
    DeclineRequest {
        request_id: u64,
        caller_id: String,
        at: i64,
    },

    /// One party confirms completion; when both have confirmed, escrow
    /// releases to the provider
    CompleteRequest {
        request_id: u64,
        caller_id: String,
        at: i64,
    },

    /// Requester cancels an active request; escrow refunds to the requester
    CancelRequest {
        request_id: u64,
        caller_id: String,
        at: i64,
    },

    /// System-initiated sweep: expire every active pending request created
    /// at or before `cutoff`, refunding each escrow
    ExpirePending { cutoff: i64, now: i64 },

    /// File a report ticket against a request. The ticket id is generated
    /// by the engine before logging so that replay stays deterministic.
    FileReport {
        request_id: u64,
        reporter_id: String,
        ticket_id: String,
        at: i64,
    },

    /// Mark one of the caller's notifications as read
    MarkNotificationRead {
        notification_id: u64,
        caller_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_json_round_trip() {
        let op = Operation::CreateRequest {
            listing_id: 3,
            requester_id: "alice".to_string(),
            at: 1_700_000_000,
        };
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"create_request\""));
        let back: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(op, back);
    }

    #[test]
    fn test_operation_bincode_round_trip() {
        let op = Operation::ExpirePending {
            cutoff: 1_000,
            now: 2_000,
        };
        let bytes = bincode::serialize(&op).unwrap();
        let back: Operation = bincode::deserialize(&bytes).unwrap();
        assert_eq!(op, back);
    }
}
