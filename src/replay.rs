//! Replay service: rebuild state from the operation log.
//!
//! Operations carry their own timestamps, so replay never consults the
//! clock and two replays of the same log are byte-identical.

use crate::error::Result;
use crate::state::{apply, State};
use crate::storage::Storage;
use serde::Serialize;

/// Replay the operation log from storage to current tip.
///
/// - If a snapshot exists: load it, then replay the log suffix from the
///   snapshot's applied-op position.
/// - If no snapshot: replay from genesis.
///
/// Returns the state and the number of operations applied.
pub fn replay_to_tip<S: Storage>(storage: &S) -> Result<(State, u64)> {
    match storage.load_state()? {
        Some((snapshot_state, applied_ops)) => {
            let suffix = storage.load_ops_from(applied_ops)?;
            let mut current_state = snapshot_state;
            let mut count = applied_ops;
            for op in suffix {
                current_state = apply(&current_state, &op)?.0;
                count += 1;
            }
            Ok((current_state, count))
        }
        None => replay_from_genesis(storage),
    }
}

/// Replay the full log from genesis, ignoring any snapshot.
pub fn replay_from_genesis<S: Storage>(storage: &S) -> Result<(State, u64)> {
    let all_ops = storage.load_ops_from(0)?;
    let mut state = State::new();
    let mut count = 0u64;
    for op in all_ops {
        state = apply(&state, &op)?.0;
        count += 1;
    }
    Ok((state, count))
}

/// SHA256 digest of the canonical state encoding, lowercase hex. Equal
/// states produce equal digests because State serializes through ordered
/// maps.
pub fn state_digest(state: &State) -> Result<String> {
    let bytes = bincode::serialize(state)
        .map_err(|e| crate::error::Error::StateError(format!("Failed to encode state: {}", e)))?;
    Ok(hex::encode(crate::sha256_digest(&bytes)))
}

/// Outcome of a snapshot-vs-log consistency check.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub ops_in_log: u64,
    pub tip_digest: String,
    pub genesis_digest: String,
    pub consistent: bool,
}

/// Verify that the snapshot + log suffix reproduces the same state as a
/// full replay from genesis.
pub fn verify_storage<S: Storage>(storage: &S) -> Result<VerifyReport> {
    let (tip_state, _) = replay_to_tip(storage)?;
    let (genesis_state, ops_in_log) = replay_from_genesis(storage)?;

    let tip_digest = state_digest(&tip_state)?;
    let genesis_digest = state_digest(&genesis_state)?;
    let consistent = tip_digest == genesis_digest;

    Ok(VerifyReport {
        ops_in_log,
        tip_digest,
        genesis_digest,
        consistent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Operation;
    use crate::storage::FileStorage;
    use tempfile::TempDir;

    fn create_test_storage() -> (FileStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::with_paths(
            temp_dir.path().join("ops.log"),
            temp_dir.path().join("state.bin"),
        );
        (storage, temp_dir)
    }

    fn seed_ops() -> Vec<Operation> {
        vec![
            Operation::RegisterAccount {
                user_id: "alice".to_string(),
                display_name: "Alice".to_string(),
            },
            Operation::RegisterAccount {
                user_id: "bob".to_string(),
                display_name: "Bob".to_string(),
            },
            Operation::GrantTokens {
                user_id: "alice".to_string(),
                amount: 100,
                at: 0,
            },
            Operation::AddListing {
                provider_id: "bob".to_string(),
                title: "Tutoring".to_string(),
                price: 40,
            },
            Operation::CreateRequest {
                listing_id: 1,
                requester_id: "alice".to_string(),
                at: 1_000,
            },
        ]
    }

    #[test]
    fn test_replay_from_genesis() {
        let (mut storage, _temp_dir) = create_test_storage();
        let mut state = State::new();
        for op in seed_ops() {
            state = apply(&state, &op).unwrap().0;
            storage.append_op(&op).unwrap();
        }

        let (replayed, count) = replay_from_genesis(&storage).unwrap();
        assert_eq!(count, 5);
        assert_eq!(replayed, state);
        assert_eq!(
            state_digest(&replayed).unwrap(),
            state_digest(&state).unwrap()
        );
    }

    #[test]
    fn test_replay_resumes_from_snapshot() {
        let (mut storage, _temp_dir) = create_test_storage();
        let mut state = State::new();
        let ops = seed_ops();

        // Snapshot midway, then append the rest to the log only
        for op in &ops[..3] {
            state = apply(&state, op).unwrap().0;
            storage.append_op(op).unwrap();
        }
        storage.persist_state(&state, 3).unwrap();
        for op in &ops[3..] {
            state = apply(&state, op).unwrap().0;
            storage.append_op(op).unwrap();
        }

        let (tip, count) = replay_to_tip(&storage).unwrap();
        assert_eq!(count, 5);
        assert_eq!(tip, state);

        let report = verify_storage(&storage).unwrap();
        assert!(report.consistent);
        assert_eq!(report.ops_in_log, 5);
    }

    #[test]
    fn test_digest_changes_with_state() {
        let state = State::new();
        let d1 = state_digest(&state).unwrap();
        let op = Operation::RegisterAccount {
            user_id: "alice".to_string(),
            display_name: "Alice".to_string(),
        };
        let (state2, _) = apply(&state, &op).unwrap();
        let d2 = state_digest(&state2).unwrap();
        assert_ne!(d1, d2);
    }
}
