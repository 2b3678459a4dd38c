pub mod kv;

pub use kv::FileStorage;

use crate::error::Result;
use crate::op::Operation;
use crate::state::State;

/// Storage abstraction for the append-only operation log and state
/// snapshots.
///
/// Implementations must preserve:
/// - Append-only semantics for the operation log
/// - Atomic snapshot writes (crash-safe)
/// - Deterministic replay from the operation log
pub trait Storage {
    /// Append an operation to the log (append-only, fsync before ack)
    fn append_op(&mut self, op: &Operation) -> Result<()>;

    /// Load the latest state snapshot with the count of operations applied
    /// to it
    ///
    /// Returns `None` if no snapshot exists (genesis state).
    fn load_state(&self) -> Result<Option<(State, u64)>>;

    /// Persist state snapshot atomically (write to temp file, fsync, rename)
    ///
    /// `applied_ops` is the number of log operations folded into this state;
    /// replay resumes from that log position.
    fn persist_state(&mut self, state: &State, applied_ops: u64) -> Result<()>;

    /// Load operations from the log starting at position `from` (0-indexed,
    /// inclusive)
    fn load_ops_from(&self, from: u64) -> Result<Vec<Operation>>;
}
