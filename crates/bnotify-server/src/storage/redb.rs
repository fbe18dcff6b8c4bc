//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety.
//! Identity, counter and queue survive daemon restarts.

use std::{fmt::Display, path::Path, sync::Arc};

use bnotify_proto::{Envelope, ServerIdentity};
use redb::{Database, ReadableTable, TableDefinition};

use super::{FIRST_SEQUENCE, PendingMessage, Storage, StorageError, StoredPending};

/// Table: settings
/// Key: setting name
/// Value: raw bytes (identity: 16 bytes, counter: u64 big-endian)
const SETTINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");

/// Table: pending
/// Key: sequence number
/// Value: CBOR-encoded `StoredPending`
const PENDING: TableDefinition<u64, &[u8]> = TableDefinition::new("pending");

const SERVER_ID_KEY: &str = "server_id";
const NEXT_SEQ_KEY: &str = "next_seq";

fn io_err(e: impl Display) -> StorageError {
    StorageError::Io(e.to_string())
}

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist (SETTINGS, PENDING).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        let txn = db.begin_write().map_err(io_err)?;
        {
            let _ = txn.open_table(SETTINGS).map_err(io_err)?;
            let _ = txn.open_table(PENDING).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;

        Ok(Self { db: Arc::new(db) })
    }
}

fn read_identity<T: ReadableTable<&'static str, &'static [u8]>>(
    table: &T,
) -> Result<Option<ServerIdentity>, StorageError> {
    let Some(guard) = table.get(SERVER_ID_KEY).map_err(io_err)? else {
        return Ok(None);
    };
    let bytes = guard.value();
    ServerIdentity::from_slice(bytes).map(Some).ok_or_else(|| {
        StorageError::Corrupt(format!(
            "server identity is {} bytes, expected {}",
            bytes.len(),
            ServerIdentity::SIZE
        ))
    })
}

fn read_next_seq<T: ReadableTable<&'static str, &'static [u8]>>(
    table: &T,
) -> Result<u64, StorageError> {
    let Some(guard) = table.get(NEXT_SEQ_KEY).map_err(io_err)? else {
        return Ok(FIRST_SEQUENCE);
    };
    let bytes: [u8; 8] = guard.value().try_into().map_err(|_| {
        StorageError::Corrupt(format!("sequence counter is {} bytes", guard.value().len()))
    })?;
    Ok(u64::from_be_bytes(bytes))
}

impl Storage for RedbStorage {
    fn load_or_init_identity(
        &self,
        candidate: ServerIdentity,
    ) -> Result<ServerIdentity, StorageError> {
        let txn = self.db.begin_write().map_err(io_err)?;

        let identity = {
            let mut table = txn.open_table(SETTINGS).map_err(io_err)?;
            if let Some(existing) = read_identity(&table)? {
                existing
            } else {
                table.insert(SERVER_ID_KEY, candidate.as_bytes().as_slice()).map_err(io_err)?;
                candidate
            }
        };

        txn.commit().map_err(io_err)?;

        Ok(identity)
    }

    fn server_identity(&self) -> Result<Option<ServerIdentity>, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(SETTINGS).map_err(io_err)?;

        read_identity(&table)
    }

    fn next_sequence(&self) -> Result<u64, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(SETTINGS).map_err(io_err)?;

        read_next_seq(&table)
    }

    fn enqueue<F>(&self, candidate: ServerIdentity, seal: F) -> Result<PendingMessage, StorageError>
    where
        F: FnOnce(ServerIdentity, u64) -> Result<Envelope, StorageError>,
    {
        // Any early return drops `txn`, which aborts it.
        let txn = self.db.begin_write().map_err(io_err)?;

        let pending = {
            let mut settings = txn.open_table(SETTINGS).map_err(io_err)?;

            let identity = match read_identity(&settings)? {
                Some(existing) => existing,
                None => {
                    settings
                        .insert(SERVER_ID_KEY, candidate.as_bytes().as_slice())
                        .map_err(io_err)?;
                    candidate
                },
            };

            let seq = read_next_seq(&settings)?;
            let next = seq.checked_add(1).ok_or(StorageError::SequenceExhausted)?;

            let envelope = seal(identity, seq)?;

            settings.insert(NEXT_SEQ_KEY, next.to_be_bytes().as_slice()).map_err(io_err)?;

            let record = StoredPending { envelope, attempts: 0 };
            let bytes = record.encode()?;

            let mut table = txn.open_table(PENDING).map_err(io_err)?;
            table.insert(seq, bytes.as_slice()).map_err(io_err)?;

            record.into_pending(seq)
        };

        txn.commit().map_err(io_err)?;

        Ok(pending)
    }

    fn load_pending(&self, seq: u64) -> Result<Option<PendingMessage>, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(PENDING).map_err(io_err)?;

        match table.get(seq).map_err(io_err)? {
            Some(guard) => Ok(Some(StoredPending::decode(guard.value())?.into_pending(seq))),
            None => Ok(None),
        }
    }

    fn list_pending(&self) -> Result<Vec<u64>, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(PENDING).map_err(io_err)?;

        let mut seqs = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (key, _) = entry.map_err(io_err)?;
            seqs.push(key.value());
        }

        Ok(seqs)
    }

    fn record_attempt(&self, seq: u64) -> Result<u32, StorageError> {
        let txn = self.db.begin_write().map_err(io_err)?;

        let attempts = {
            let mut table = txn.open_table(PENDING).map_err(io_err)?;

            let mut record = {
                let Some(guard) = table.get(seq).map_err(io_err)? else {
                    return Err(StorageError::NotFound { seq });
                };
                StoredPending::decode(guard.value())?
            };

            record.attempts = record.attempts.saturating_add(1);
            let bytes = record.encode()?;
            table.insert(seq, bytes.as_slice()).map_err(io_err)?;

            record.attempts
        };

        txn.commit().map_err(io_err)?;

        Ok(attempts)
    }

    fn remove_pending(&self, seq: u64) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(io_err)?;

        let existed = {
            let mut table = txn.open_table(PENDING).map_err(io_err)?;
            table.remove(seq).map_err(io_err)?.is_some()
        };

        txn.commit().map_err(io_err)?;

        Ok(existed)
    }
}
