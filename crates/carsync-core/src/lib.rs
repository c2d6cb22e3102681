//! CarSync Core Library
//!
//! Offline-first vehicle record cache with two-way synchronization against
//! a remote record service.
//!
//! ## Overview
//!
//! Reads are served instantly from on-device storage (redb). Writes made
//! while offline land in a pending-edit queue and always shadow synced
//! state. A `synchronize()` call pushes the queue to the remote service and
//! then pulls an incremental delta of remote changes, driven by a
//! `last_updated` watermark. The last known authenticated identity is
//! cached locally so sign-in survives losing the identity provider.
//!
//! ## Core Principles
//!
//! - **Local-first**: every read and write works fully offline
//! - **Edits are never lost**: a queued edit leaves the queue only after
//!   the remote confirms it
//! - **Fail-open identity restore**: a damaged identity snapshot degrades
//!   to anonymous instead of blocking startup
//!
//! ## Quick Start
//!
//! ```ignore
//! use carsync_core::{LocalVehicleStore, VehicleService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let remote = VehicleService::new("https://carcheck.example.com");
//!     let store = LocalVehicleStore::new("~/.carsync/data", remote);
//!
//!     // Offline write
//!     store.save_edit(&vehicle).await?;
//!
//!     // Instant local reads
//!     let found = store.lookup("AB12CDE").await?;
//!     let suggestions = store.autocomplete("AB").await?;
//!
//!     // Reconcile with the remote when connectivity allows
//!     store.synchronize().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod identity;
pub mod remote;
pub mod storage;
pub mod store;
pub mod types;

// Re-exports
pub use error::{StoreError, StoreResult};
pub use identity::{Claim, IdentityRestore, StoredIdentity, IDENTITY_FORMAT_VERSION};
pub use remote::VehicleService;
pub use storage::{VehicleDb, AUTOCOMPLETE_LIMIT};
pub use store::LocalVehicleStore;
pub use types::{InspectionNote, TankLevel, Vehicle, VehiclePart};
