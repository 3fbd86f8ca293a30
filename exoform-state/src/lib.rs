//! Exoform State Management
//!
//! Persists the last observed state of every managed resource, one record per
//! object carrying its provider identifier and the schema version it was
//! written with. Records are upgraded through the provider on load.
//!
//! - **StateFile**: the persisted document (serial, lineage, resources)
//! - **StateBackend**: storage trait; only a local JSON file backend exists
//! - **LockInfo**: lock held for the duration of a mutating command
//!
//! ```ignore
//! use exoform_state::{create_backend, BackendConfig};
//!
//! let backend = create_backend(&BackendConfig::local())?;
//! let lock = backend.acquire_lock("apply").await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//! // ... apply changes, record outcomes ...
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::{LocalBackend, create_backend};
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile};
