//! Redb-backed receiver storage.

use std::{fmt::Display, path::Path, sync::Arc};

use bnotify_crypto::CachedKey;
use bnotify_proto::ServerIdentity;
use redb::{Database, ReadableTable, TableDefinition};

use super::{
    ReceiverStorage, Secret, StorageError, decode_cached_key, decode_guard, encode_cached_key,
    encode_ranges,
};
use crate::replay::{ReplayGuard, UsedRange};

/// Table: used_ranges
/// Key: server identity (16 raw bytes)
/// Value: CBOR-encoded `Vec<UsedRange>`
const USED_RANGES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("used_ranges");

/// Table: settings
/// Key: setting name
/// Value: raw bytes (UTF-8 secrets, CBOR cached key, u32 BE counter)
const SETTINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");

const CACHED_KEY: &str = "cached_key";
const DISPLAY_ID: &str = "display_id";

fn io_err(e: impl Display) -> StorageError {
    StorageError::Io(e.to_string())
}

/// Durable receiver storage backed by Redb.
///
/// Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        let txn = db.begin_write().map_err(io_err)?;
        {
            let _ = txn.open_table(USED_RANGES).map_err(io_err)?;
            let _ = txn.open_table(SETTINGS).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl ReceiverStorage for RedbStorage {
    fn use_sequence(&self, server_id: ServerIdentity, seq: u64) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(io_err)?;

        let accepted = {
            let mut table = txn.open_table(USED_RANGES).map_err(io_err)?;
            let key = server_id.as_bytes().as_slice();

            let mut guard = match table.get(key).map_err(io_err)? {
                Some(bytes) => decode_guard(bytes.value())?,
                None => ReplayGuard::new(),
            };

            let accepted = guard.use_seq(seq);
            if accepted {
                let bytes = encode_ranges(&guard.ranges())?;
                table.insert(key, bytes.as_slice()).map_err(io_err)?;
            }
            accepted
        };

        if accepted {
            txn.commit().map_err(io_err)?;
        } else {
            txn.abort().map_err(io_err)?;
        }

        Ok(accepted)
    }

    fn used_ranges(&self, server_id: ServerIdentity) -> Result<Vec<UsedRange>, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(USED_RANGES).map_err(io_err)?;

        match table.get(server_id.as_bytes().as_slice()).map_err(io_err)? {
            Some(bytes) => Ok(decode_guard(bytes.value())?.ranges()),
            None => Ok(Vec::new()),
        }
    }

    fn secret(&self, secret: Secret) -> Result<Option<String>, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(SETTINGS).map_err(io_err)?;

        let Some(bytes) = table.get(secret.key()).map_err(io_err)? else {
            return Ok(None);
        };
        String::from_utf8(bytes.value().to_vec())
            .map(Some)
            .map_err(|e| StorageError::Corrupt(format!("{}: {e}", secret.key())))
    }

    fn set_secret(&self, secret: Secret, value: &str) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(io_err)?;

        let changed = {
            let mut table = txn.open_table(SETTINGS).map_err(io_err)?;

            let changed = table
                .get(secret.key())
                .map_err(io_err)?
                .is_none_or(|current| current.value() != value.as_bytes());

            if changed {
                table.insert(secret.key(), value.as_bytes()).map_err(io_err)?;
                table.remove(CACHED_KEY).map_err(io_err)?;
            }
            changed
        };

        txn.commit().map_err(io_err)?;

        Ok(changed)
    }

    fn cached_key(&self) -> Result<Option<CachedKey>, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(SETTINGS).map_err(io_err)?;

        match table.get(CACHED_KEY).map_err(io_err)? {
            Some(bytes) => Ok(Some(decode_cached_key(bytes.value())?)),
            None => Ok(None),
        }
    }

    fn store_cached_key(&self, entry: &CachedKey, password: &str) -> Result<bool, StorageError> {
        let bytes = encode_cached_key(entry)?;
        let txn = self.db.begin_write().map_err(io_err)?;

        let current = {
            let mut table = txn.open_table(SETTINGS).map_err(io_err)?;

            let is_current = |secret: Secret, expected: &[u8]| -> Result<bool, StorageError> {
                Ok(table
                    .get(secret.key())
                    .map_err(io_err)?
                    .is_some_and(|value| value.value() == expected))
            };
            let current = is_current(Secret::Password, password.as_bytes())?
                && is_current(Secret::RegistrationId, &entry.salt)?;

            if current {
                table.insert(CACHED_KEY, bytes.as_slice()).map_err(io_err)?;
            }
            current
        };

        if current {
            txn.commit().map_err(io_err)?;
        } else {
            txn.abort().map_err(io_err)?;
        }

        Ok(current)
    }

    fn next_display_id(&self) -> Result<u32, StorageError> {
        let txn = self.db.begin_write().map_err(io_err)?;

        let id = {
            let mut table = txn.open_table(SETTINGS).map_err(io_err)?;

            let id = match table.get(DISPLAY_ID).map_err(io_err)? {
                Some(bytes) => {
                    let raw: [u8; 4] = bytes.value().try_into().map_err(|_| {
                        StorageError::Corrupt("display id counter is not 4 bytes".to_string())
                    })?;
                    u32::from_be_bytes(raw)
                },
                None => 0,
            };
            table.insert(DISPLAY_ID, id.wrapping_add(1).to_be_bytes().as_slice()).map_err(io_err)?;
            id
        };

        txn.commit().map_err(io_err)?;

        Ok(id)
    }
}
