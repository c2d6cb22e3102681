//! Persistent storage using redb
//!
//! One database file holds three tables:
//! - `vehicles` — the synced cache, the local mirror of remote state
//! - `local_edits` — the pending-edit queue for offline writes
//! - `protected` — small key/value blobs (sync metadata, identity snapshot)
//!
//! Records are JSON-encoded values keyed by the uppercased license number,
//! which is what makes lookups case-insensitive and range scans ascending.

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;

use crate::error::{StoreError, StoreResult};
use crate::types::{normalize_key, Vehicle};

// Table definitions
const VEHICLES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("vehicles");
const LOCAL_EDITS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("local_edits");
const PROTECTED_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("protected");

/// Maximum number of keys returned by an autocomplete scan
pub const AUTOCOMPLETE_LIMIT: usize = 5;

/// Storage layer for the vehicle cache and pending-edit queue
///
/// All methods are blocking; async callers route them through the store's
/// background execution context. The handle is immutable once opened and is
/// shared as `Arc<VehicleDb>`.
pub struct VehicleDb {
    db: Database,
}

impl VehicleDb {
    /// Open or create the database at the given path.
    ///
    /// This will:
    /// - Create the database directory if it doesn't exist
    /// - Initialize the database file
    /// - Create all required tables
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Open/create database
        let db = Database::create(path)?;

        // Initialize all tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(VEHICLES_TABLE)?;
            let _ = write_txn.open_table(LOCAL_EDITS_TABLE)?;
            let _ = write_txn.open_table(PROTECTED_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    fn encode(vehicle: &Vehicle) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(vehicle).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> StoreResult<Vehicle> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Synced Cache Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Load a vehicle from the synced cache by license number.
    ///
    /// Returns `None` if the cache holds no record for the key.
    pub fn cached(&self, license_number: &str) -> StoreResult<Option<Vehicle>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(VEHICLES_TABLE)?;
        let key = normalize_key(license_number);

        match table.get(key.as_str())? {
            Some(v) => Ok(Some(Self::decode(v.value())?)),
            None => Ok(None),
        }
    }

    /// Upsert a batch of remote records into the synced cache.
    ///
    /// Runs in a single write transaction: either every record in the batch
    /// is applied or none is. Each record replaces any existing entry for
    /// its key in full.
    pub fn apply_remote_changes(&self, vehicles: &[Vehicle]) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(VEHICLES_TABLE)?;
            for vehicle in vehicles {
                let key = vehicle.storage_key();
                let data = Self::encode(vehicle)?;
                table.insert(key.as_str(), data.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Maximum `last_updated` across the synced cache — the pull watermark.
    ///
    /// Returns `None` when the cache is empty.
    pub fn max_last_updated(&self) -> StoreResult<Option<DateTime<Utc>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(VEHICLES_TABLE)?;

        let mut max = None;
        for entry in table.iter()? {
            let (_, value) = entry?;
            let vehicle = Self::decode(value.value())?;
            if max.map_or(true, |m| vehicle.last_updated > m) {
                max = Some(vehicle.last_updated);
            }
        }
        Ok(max)
    }

    /// License numbers in the synced cache starting with `prefix`, ascending
    /// by storage key, capped at [`AUTOCOMPLETE_LIMIT`].
    ///
    /// Only the synced cache is searched; pending edits never appear here.
    pub fn autocomplete(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(VEHICLES_TABLE)?;
        let prefix = normalize_key(prefix);

        let mut matches = Vec::new();
        for entry in table.range(prefix.as_str()..)? {
            let (key, value) = entry?;
            if !key.value().starts_with(prefix.as_str()) {
                break;
            }
            matches.push(Self::decode(value.value())?.license_number);
            if matches.len() == AUTOCOMPLETE_LIMIT {
                break;
            }
        }
        Ok(matches)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Pending-Edit Queue Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Load the pending edit for a license number, if one is queued.
    pub fn edit(&self, license_number: &str) -> StoreResult<Option<Vehicle>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LOCAL_EDITS_TABLE)?;
        let key = normalize_key(license_number);

        match table.get(key.as_str())? {
            Some(v) => Ok(Some(Self::decode(v.value())?)),
            None => Ok(None),
        }
    }

    /// Queue a local edit, replacing any earlier edit for the same key.
    pub fn upsert_edit(&self, vehicle: &Vehicle) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(LOCAL_EDITS_TABLE)?;
            let key = vehicle.storage_key();
            let data = Self::encode(vehicle)?;
            table.insert(key.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Remove the queued edit for a license number, if any.
    ///
    /// Called exactly when the remote has confirmed the push of that edit.
    pub fn remove_edit(&self, license_number: &str) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(LOCAL_EDITS_TABLE)?;
            let key = normalize_key(license_number);
            table.remove(key.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All queued edits, in storage-key order.
    pub fn list_edits(&self) -> StoreResult<Vec<Vehicle>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LOCAL_EDITS_TABLE)?;

        let mut edits = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            edits.push(Self::decode(value.value())?);
        }
        Ok(edits)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Protected Blob Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Load a blob from the protected key/value table.
    pub fn get_blob(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PROTECTED_TABLE)?;

        Ok(table.get(key)?.map(|v| v.value().to_vec()))
    }

    /// Store a blob in the protected key/value table, overwriting any
    /// existing value.
    pub fn put_blob(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PROTECTED_TABLE)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Delete a blob from the protected key/value table.
    pub fn delete_blob(&self, key: &str) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PROTECTED_TABLE)?;
            table.remove(key)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
