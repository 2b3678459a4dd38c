use crate::config::Config;
use crate::error::{Error, Result};
use crate::op::Operation;
use crate::state::State;
use crate::storage::Storage;
use std::fs;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;

/// File-based storage implementation using append-only logs and snapshots.
///
/// Files:
/// - `ops.log`: Append-only operation log (bincode serialized)
/// - `state.bin`: State snapshot (bincode serialized State + u64 applied_ops)
/// - `state.bin.tmp`: Temporary file for atomic snapshot writes
pub struct FileStorage {
    op_log_path: PathBuf,
    state_path: PathBuf,
    state_tmp_path: PathBuf,
}

impl FileStorage {
    /// Create a new FileStorage with paths from config
    pub fn new(config: &Config) -> Self {
        FileStorage {
            op_log_path: config.get_op_log_path(),
            state_path: config.get_state_path(),
            state_tmp_path: config.get_state_path().with_extension("bin.tmp"),
        }
    }

    /// Create FileStorage with custom paths (for testing)
    pub fn with_paths(op_log_path: PathBuf, state_path: PathBuf) -> Self {
        let state_tmp_path = state_path.with_extension("bin.tmp");
        FileStorage {
            op_log_path,
            state_path,
            state_tmp_path,
        }
    }

    /// Ensure the data directory exists
    fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.op_log_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::StateError(format!("Failed to create data directory: {}", e))
            })?;
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    fn append_op(&mut self, op: &Operation) -> Result<()> {
        self.ensure_dir()?;

        let op_bytes = bincode::serialize(op)
            .map_err(|e| Error::StateError(format!("Failed to serialize operation: {}", e)))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.op_log_path)
            .map_err(|e| Error::StateError(format!("Failed to open op log for append: {}", e)))?;

        // Write length prefix (u64 little-endian) + operation data
        let len = op_bytes.len() as u64;
        file.write_all(&len.to_le_bytes())
            .map_err(|e| Error::StateError(format!("Failed to write op length: {}", e)))?;
        file.write_all(&op_bytes)
            .map_err(|e| Error::StateError(format!("Failed to write op data: {}", e)))?;

        // Fsync for crash safety (append-only semantics)
        file.sync_all()
            .map_err(|e| Error::StateError(format!("Failed to fsync op log: {}", e)))?;

        Ok(())
    }

    fn load_state(&self) -> Result<Option<(State, u64)>> {
        if !self.state_path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&self.state_path)
            .map_err(|e| Error::StateError(format!("Failed to open state file: {}", e)))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| Error::StateError(format!("Failed to read state file: {}", e)))?;

        // Format: [State bytes][applied_ops: u64]
        if data.len() < 8 {
            return Err(Error::StateError("State file too short".to_string()));
        }

        let applied_ops_bytes = &data[data.len() - 8..];
        let applied_ops = u64::from_le_bytes(
            applied_ops_bytes
                .try_into()
                .map_err(|_| Error::StateError("State file trailer corrupt".to_string()))?,
        );

        let state_bytes = &data[..data.len() - 8];
        let state: State = bincode::deserialize(state_bytes)
            .map_err(|e| Error::StateError(format!("Failed to deserialize state: {}", e)))?;

        Ok(Some((state, applied_ops)))
    }

    fn persist_state(&mut self, state: &State, applied_ops: u64) -> Result<()> {
        self.ensure_dir()?;

        let state_bytes = bincode::serialize(state)
            .map_err(|e| Error::StateError(format!("Failed to serialize state: {}", e)))?;

        // Write to temporary file
        let mut file = File::create(&self.state_tmp_path)
            .map_err(|e| Error::StateError(format!("Failed to create temp state file: {}", e)))?;

        file.write_all(&state_bytes)
            .map_err(|e| Error::StateError(format!("Failed to write state: {}", e)))?;
        file.write_all(&applied_ops.to_le_bytes())
            .map_err(|e| Error::StateError(format!("Failed to write applied_ops: {}", e)))?;

        // Fsync before rename (crash safety)
        file.sync_all()
            .map_err(|e| Error::StateError(format!("Failed to fsync temp state file: {}", e)))?;
        drop(file); // Close file before rename

        // Atomic rename (crash-safe snapshot)
        fs::rename(&self.state_tmp_path, &self.state_path)
            .map_err(|e| Error::StateError(format!("Failed to rename temp state file: {}", e)))?;

        // Fsync parent directory (ensure rename is persisted)
        if let Some(parent) = self.state_path.parent() {
            let parent_file = File::open(parent).map_err(|e| {
                Error::StateError(format!("Failed to open parent directory: {}", e))
            })?;
            parent_file.sync_all().map_err(|e| {
                Error::StateError(format!("Failed to fsync parent directory: {}", e))
            })?;
        }

        Ok(())
    }

    fn load_ops_from(&self, from: u64) -> Result<Vec<Operation>> {
        if !self.op_log_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.op_log_path)
            .map_err(|e| Error::StateError(format!("Failed to open op log: {}", e)))?;
        let mut reader = BufReader::new(file);

        let mut operations = Vec::new();
        let mut position = 0u64;

        loop {
            let mut len_buf = [0u8; 8];
            match reader.read_exact(&mut len_buf) {
                Ok(_) => {
                    let len = u64::from_le_bytes(len_buf) as usize;
                    let mut op_buf = vec![0u8; len];
                    reader
                        .read_exact(&mut op_buf)
                        .map_err(|e| Error::StateError(format!("Failed to read op data: {}", e)))?;

                    if position >= from {
                        let op: Operation = bincode::deserialize(&op_buf).map_err(|e| {
                            Error::StateError(format!("Failed to deserialize op: {}", e))
                        })?;
                        operations.push(op);
                    }

                    position += 1;
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(e) => {
                    return Err(Error::StateError(format!("Failed to read op log: {}", e)));
                }
            }
        }

        Ok(operations)
    }
}
