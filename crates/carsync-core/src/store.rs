//! Offline-first vehicle store
//!
//! `LocalVehicleStore` is the main entry point. It serves reads instantly
//! from on-device storage, queues writes made while offline, and reconciles
//! both directions with the remote record service on `synchronize()`.
//!
//! Storage is opened lazily, exactly once, even under concurrent first
//! access: the first caller publishes a shared initialization future and
//! every racer awaits the same one. All storage I/O runs on the blocking
//! pool so async callers never stall on disk access.
//!
//! # Example
//!
//! ```ignore
//! use carsync_core::{LocalVehicleStore, VehicleService};
//!
//! let remote = VehicleService::new("https://carcheck.example.com");
//! let store = LocalVehicleStore::new("~/.carsync/data", remote);
//!
//! // Reads hit local storage only
//! if let Some(vehicle) = store.lookup("AB12CDE").await? {
//!     println!("{} {}", vehicle.make, vehicle.model);
//! }
//!
//! // Writes land in the pending-edit queue, no network needed
//! store.save_edit(&edited).await?;
//!
//! // Push queued edits, then pull remote changes
//! store.synchronize().await?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::task;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::identity::{IdentityRestore, StoredIdentity};
use crate::remote::VehicleService;
use crate::storage::VehicleDb;
use crate::types::{normalize_key, Vehicle};

/// Protected-blob key for the display timestamp of the last synchronization
const LAST_UPDATE_DATE_KEY: &str = "last_update_date";

/// Protected-blob key for the serialized identity snapshot
const CLAIMS_PRINCIPAL_KEY: &str = "claims_principal";

/// Database file name inside the data directory
const DB_FILE: &str = "carsync.redb";

/// The published initialization unit of work. Cloned by every caller that
/// races on first access; caches its result, including a fatal open error.
type InitFuture = Shared<BoxFuture<'static, Result<Arc<VehicleDb>, Arc<StoreError>>>>;

/// Offline-first store over the synced cache and pending-edit queue
pub struct LocalVehicleStore {
    data_dir: PathBuf,
    remote: VehicleService,
    /// Publish-once slot for the shared initialization future
    init: Mutex<Option<InitFuture>>,
    /// Single-flight guard: at most one synchronization runs at a time
    sync_flight: tokio::sync::Mutex<()>,
}

impl LocalVehicleStore {
    /// Create a store rooted at `data_dir`, syncing against `remote`.
    ///
    /// Cheap and infallible; storage is opened on first use.
    pub fn new(data_dir: impl AsRef<Path>, remote: VehicleService) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            remote,
            init: Mutex::new(None),
            sync_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// Open storage exactly once; concurrent first callers await the same
    /// open, and an open failure propagates to every waiter.
    async fn ensure_open(&self) -> StoreResult<Arc<VehicleDb>> {
        let init = {
            let mut slot = self.init.lock();
            match slot.as_ref() {
                Some(init) => init.clone(),
                None => {
                    let path = self.data_dir.join(DB_FILE);
                    info!(?path, "Opening vehicle store");
                    let init: InitFuture = async move {
                        task::spawn_blocking(move || VehicleDb::open(&path).map(Arc::new))
                            .await
                            .map_err(|e| StoreError::Storage(format!("open task failed: {e}")))
                            .and_then(|opened| opened)
                            .map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    *slot = Some(init.clone());
                    init
                }
            }
        };

        init.await
            .map_err(|e| StoreError::Initialization(e.to_string()))
    }

    /// Run a storage operation on the blocking pool.
    async fn with_db<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&VehicleDb) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.ensure_open().await?;
        task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StoreError::Storage(format!("storage task failed: {e}")))?
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Read Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Look up a vehicle by license number, case-insensitively.
    ///
    /// A pending local edit always shadows the synced-cache entry for the
    /// same key.
    pub async fn lookup(&self, license_number: &str) -> StoreResult<Option<Vehicle>> {
        let key = normalize_key(license_number);
        self.with_db(move |db| match db.edit(&key)? {
            Some(edit) => Ok(Some(edit)),
            None => db.cached(&key),
        })
        .await
    }

    /// Up to 5 license numbers from the synced cache starting with `prefix`,
    /// ascending. Pending edits are not included.
    pub async fn autocomplete(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let prefix = prefix.to_string();
        self.with_db(move |db| db.autocomplete(&prefix)).await
    }

    /// All edits waiting to be pushed to the remote.
    pub async fn list_pending_edits(&self) -> StoreResult<Vec<Vehicle>> {
        self.with_db(|db| db.list_edits()).await
    }

    /// When the most recent successful synchronization was initiated.
    ///
    /// Display anchor only; the pull phase computes its own watermark from
    /// the cache.
    pub async fn last_update_date(&self) -> StoreResult<Option<DateTime<Utc>>> {
        let blob = self.with_db(|db| db.get_blob(LAST_UPDATE_DATE_KEY)).await?;
        match blob {
            Some(bytes) => {
                let date = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(date))
            }
            None => Ok(None),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Write Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Save a local edit into the pending-edit queue.
    ///
    /// Completes without contacting the remote and never touches the synced
    /// cache; the edit is visible to `lookup` immediately and is pushed on
    /// the next `synchronize()`.
    pub async fn save_edit(&self, vehicle: &Vehicle) -> StoreResult<()> {
        let vehicle = vehicle.clone();
        debug!(license = %vehicle.license_number, "Queueing local edit");
        self.with_db(move |db| db.upsert_edit(&vehicle)).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Identity Cache
    // ═══════════════════════════════════════════════════════════════════════

    /// Persist an identity snapshot for offline sign-in, or delete it.
    ///
    /// `Some` overwrites the stored snapshot (called after a successful
    /// online sign-in); `None` deletes it (explicit sign-out).
    pub async fn save_identity(&self, identity: Option<&StoredIdentity>) -> StoreResult<()> {
        match identity {
            Some(identity) => {
                let bytes = identity.to_bytes()?;
                self.with_db(move |db| db.put_blob(CLAIMS_PRINCIPAL_KEY, &bytes))
                    .await
            }
            None => {
                self.with_db(|db| db.delete_blob(CLAIMS_PRINCIPAL_KEY))
                    .await
            }
        }
    }

    /// Restore the last persisted identity snapshot.
    ///
    /// Fail-open: a missing or unreadable snapshot yields the anonymous
    /// identity, never an error (see [`IdentityRestore`]).
    pub async fn load_identity(&self) -> StoreResult<StoredIdentity> {
        let blob = self.with_db(|db| db.get_blob(CLAIMS_PRINCIPAL_KEY)).await?;
        Ok(IdentityRestore::from_blob(blob.as_deref()).or_anonymous())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Synchronization Engine
    // ═══════════════════════════════════════════════════════════════════════

    /// Push all pending edits to the remote, then pull remote changes into
    /// the synced cache.
    ///
    /// Single-flight: a concurrent call waits for the in-flight run to
    /// finish before starting its own, so the two phases can never
    /// interleave across invocations. A push failure aborts the call before
    /// the pull phase; already-confirmed edits stay removed from the queue,
    /// the rest stay queued for the next call.
    pub async fn synchronize(&self) -> StoreResult<()> {
        let _flight = self.sync_flight.lock().await;

        // Display anchor: when this synchronization was initiated
        let started_at = Utc::now();
        info!("Starting synchronization");

        self.push_pending_edits().await?;
        self.fetch_changes(started_at).await?;

        info!("Synchronization complete");
        Ok(())
    }

    /// Push phase: drain the pending-edit queue in storage-key order.
    async fn push_pending_edits(&self) -> StoreResult<()> {
        let pending = self.with_db(|db| db.list_edits()).await?;
        if pending.is_empty() {
            debug!("No pending edits to push");
            return Ok(());
        }

        info!(count = pending.len(), "Pushing pending edits");
        for vehicle in pending {
            self.remote.put_vehicle(&vehicle).await?;
            // Remove only after the remote confirmed the upsert
            let key = vehicle.license_number.clone();
            self.with_db(move |db| db.remove_edit(&key)).await?;
            debug!(license = %vehicle.license_number, "Pushed local edit");
        }
        Ok(())
    }

    /// Pull phase: fetch records changed since the cache watermark and
    /// upsert them, then persist the display anchor.
    async fn fetch_changes(&self, started_at: DateTime<Utc>) -> StoreResult<()> {
        let since = self
            .with_db(|db| db.max_last_updated())
            .await?
            // Strip the timezone: the remote compares naive timestamps
            .map(|watermark| watermark.naive_utc())
            .unwrap_or_else(min_watermark);

        let changed = self.remote.changed_vehicles(since).await?;
        info!(count = changed.len(), %since, "Applying remote changes");
        self.with_db(move |db| db.apply_remote_changes(&changed))
            .await?;

        let stamp = serde_json::to_vec(&started_at)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.with_db(move |db| db.put_blob(LAST_UPDATE_DATE_KEY, &stamp))
            .await
    }
}

/// Watermark sent when the synced cache is empty. Matches the remote's
/// minimum timestamp (`0001-01-01T00:00:00`).
fn min_watermark() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .expect("0001-01-01T00:00:00 is a valid timestamp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Claim;
    use crate::types::TankLevel;
    use chrono::TimeZone;
    use tempfile::TempDir;

    // Remote that is never reached by these tests
    fn offline_remote() -> VehicleService {
        VehicleService::new("http://127.0.0.1:9")
    }

    fn test_store() -> (Arc<LocalVehicleStore>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalVehicleStore::new(temp_dir.path(), offline_remote());
        (Arc::new(store), temp_dir)
    }

    fn vehicle(license_number: &str, hour: u32) -> Vehicle {
        Vehicle {
            license_number: license_number.to_string(),
            make: "Volvo".to_string(),
            model: "V70".to_string(),
            registration_date: NaiveDate::from_ymd_opt(2018, 3, 14).unwrap(),
            mileage: 83_500,
            tank: TankLevel::Half,
            notes: Vec::new(),
            last_updated: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
        }
    }

    /// Seed the database file before the store lazily opens it.
    fn seed_db(dir: &Path, seed: impl FnOnce(&VehicleDb)) {
        let db = VehicleDb::open(dir.join(DB_FILE)).unwrap();
        seed(&db);
    }

    #[tokio::test]
    async fn test_lookup_not_found() {
        let (store, _temp) = test_store();
        assert!(store.lookup("ABC123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pending_edit_shadows_cache() {
        let (store, temp) = test_store();
        seed_db(temp.path(), |db| {
            db.apply_remote_changes(&[vehicle("ABC123", 10)]).unwrap();
        });

        let mut edited = vehicle("ABC123", 11);
        edited.mileage = 99_000;
        store.save_edit(&edited).await.unwrap();

        let found = store.lookup("ABC123").await.unwrap().unwrap();
        assert_eq!(found.mileage, 99_000);
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let (store, temp) = test_store();
        seed_db(temp.path(), |db| {
            db.apply_remote_changes(&[vehicle("ABC123", 10)]).unwrap();
        });

        let found = store.lookup("abc123").await.unwrap().unwrap();
        assert_eq!(found.license_number, "ABC123");
    }

    #[tokio::test]
    async fn test_autocomplete_excludes_pending_only_keys() {
        let (store, temp) = test_store();
        seed_db(temp.path(), |db| {
            db.apply_remote_changes(&[vehicle("ABC123", 10)]).unwrap();
        });
        store.save_edit(&vehicle("ABD456", 11)).await.unwrap();

        assert_eq!(store.autocomplete("AB").await.unwrap(), vec!["ABC123"]);
    }

    #[tokio::test]
    async fn test_save_edit_is_visible_in_pending_list() {
        let (store, _temp) = test_store();
        store.save_edit(&vehicle("XYZ999", 10)).await.unwrap();

        let pending = store.list_pending_edits().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].license_number, "XYZ999");
    }

    #[tokio::test]
    async fn test_last_update_date_absent_before_first_sync() {
        let (store, _temp) = test_store();
        assert!(store.last_update_date().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_identity_round_trip_and_sign_out() {
        let (store, _temp) = test_store();

        let identity = StoredIdentity {
            authentication_type: Some("oidc".to_string()),
            name: Some("Abbey Road".to_string()),
            claims: vec![Claim::new("role", "inspector")],
        };
        store.save_identity(Some(&identity)).await.unwrap();
        assert_eq!(store.load_identity().await.unwrap(), identity);

        // Sign-out deletes the snapshot; the next load is anonymous
        store.save_identity(None).await.unwrap();
        let loaded = store.load_identity().await.unwrap();
        assert_eq!(loaded, StoredIdentity::anonymous());
        assert!(!loaded.is_authenticated());
    }

    #[tokio::test]
    async fn test_corrupt_identity_loads_as_anonymous() {
        let (store, temp) = test_store();
        seed_db(temp.path(), |db| {
            db.put_blob(CLAIMS_PRINCIPAL_KEY, &[0xde, 0xad, 0xbe, 0xef])
                .unwrap();
        });

        let loaded = store.load_identity().await.unwrap();
        assert_eq!(loaded, StoredIdentity::anonymous());
    }

    #[tokio::test]
    async fn test_concurrent_first_access_opens_once() {
        let (store, _temp) = test_store();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    store.lookup("ABC123").await.map(|_| ())
                } else {
                    store.save_edit(&vehicle(&format!("QQ{i}"), 10)).await
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Every writer landed in the one database
        assert_eq!(store.list_pending_edits().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_init_failure_is_fatal_and_shared() {
        let temp = TempDir::new().unwrap();
        // Occupy the data directory path with a plain file so the open fails
        let blocked = temp.path().join("data");
        std::fs::write(&blocked, b"not a directory").unwrap();

        let store = LocalVehicleStore::new(&blocked, offline_remote());
        let first = store.lookup("ABC123").await;
        assert!(matches!(first, Err(StoreError::Initialization(_))));

        // The failed init stays published; later callers see the same error
        let second = store.save_edit(&vehicle("ABC123", 10)).await;
        assert!(matches!(second, Err(StoreError::Initialization(_))));
    }

    #[test]
    fn test_min_watermark_matches_remote_minimum() {
        assert_eq!(min_watermark().to_string(), "0001-01-01 00:00:00");
    }
}
