//! State lock - who holds the state file and until when

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// How long a lock stays valid when its holder never releases it
pub const DEFAULT_LOCK_LIFETIME: TimeDelta = TimeDelta::minutes(15);

/// Lock held on a state file for the duration of one mutating command.
///
/// A lock past its expiry is stale: the next command may take it over
/// without `force-unlock`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Random identifier; `force-unlock` and release must present it
    pub id: String,
    /// Command holding the lock (e.g., "apply", "destroy", "import")
    pub operation: String,
    /// username@hostname of the holder
    pub who: String,
    /// When the lock was taken
    pub created: DateTime<Utc>,
    /// When the lock turns stale
    pub expires: DateTime<Utc>,
}

impl LockInfo {
    /// Lock for `operation` with the default lifetime
    pub fn new(operation: impl Into<String>) -> Self {
        Self::with_lifetime(operation, DEFAULT_LOCK_LIFETIME)
    }

    pub fn with_lifetime(operation: impl Into<String>, lifetime: TimeDelta) -> Self {
        let created = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            who: lock_owner(),
            created,
            expires: created + lifetime,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires
    }

    /// Whole seconds until the lock turns stale, zero once it has
    pub fn expires_in_secs(&self) -> u64 {
        u64::try_from((self.expires - Utc::now()).num_seconds()).unwrap_or(0)
    }
}

fn lock_owner() -> String {
    let username = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    format!("{}@{}", username, hostname)
}
