use serde::{Deserialize, Serialize};

/// Escrow status. `Held` is the only non-terminal state; the two
/// transitions out of it (`Released`, `Refunded`) are mutually exclusive
/// and final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldingStatus {
    Held,
    Released,
    Refunded,
}

/// Payment holding: tokens removed from the requester's spendable balance
/// and held against a specific request until release (to the provider) or
/// refund (back to the requester).
///
/// Invariants:
/// - one holding per request, created in the same transaction as the request
/// - `amount` is fixed at creation and never mutated
/// - status transitions only `held -> released` or `held -> refunded`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentHolding {
    pub id: u64,
    pub request_id: u64,
    pub payer_id: String,
    pub amount: u64,
    pub status: HoldingStatus,
}

impl PaymentHolding {
    /// Open a new holding in `held` status
    pub fn held(id: u64, request_id: u64, payer_id: String, amount: u64) -> Self {
        PaymentHolding {
            id,
            request_id,
            payer_id,
            amount,
            status: HoldingStatus::Held,
        }
    }

    pub fn is_held(&self) -> bool {
        self.status == HoldingStatus::Held
    }

    /// Release the escrow to the provider. Returns the amount to credit.
    pub fn release(&mut self) -> u64 {
        debug_assert!(self.is_held());
        self.status = HoldingStatus::Released;
        self.amount
    }

    /// Refund the escrow to the payer. Returns the amount to credit.
    pub fn refund(&mut self) -> u64 {
        debug_assert!(self.is_held());
        self.status = HoldingStatus::Refunded;
        self.amount
    }
}

/// Ledger entry type. `Advertisement` and `Reward` come from the token
/// top-up paths; the lifecycle engine itself only writes `Deduct` and
/// `Addition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    Deduct,
    Addition,
    Advertisement,
    Reward,
}

/// Append-only audit row for every balance mutation. Never updated or
/// deleted; exists purely for reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub user_id: String,
    pub kind: LedgerKind,
    /// Holding this entry settles against; grant/advertisement entries
    /// have none
    pub holding_id: Option<u64>,
    pub at: i64,
}

impl LedgerEntry {
    pub fn new(user_id: String, kind: LedgerKind, holding_id: Option<u64>, at: i64) -> Self {
        LedgerEntry {
            user_id,
            kind,
            holding_id,
            at,
        }
    }
}
