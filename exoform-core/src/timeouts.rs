//! Timeouts - Per-phase deadlines for lifecycle operations

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::provider::{ErrorKind, ProviderError, ProviderResult};

/// Deadline used for every phase unless configured otherwise
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Create,
    Read,
    Update,
    Delete,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Create => "create",
            Phase::Read => "read",
            Phase::Update => "update",
            Phase::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Resolved deadline for each phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(with = "humantime_serde")]
    pub create: Duration,
    #[serde(with = "humantime_serde")]
    pub read: Duration,
    #[serde(with = "humantime_serde")]
    pub update: Duration,
    #[serde(with = "humantime_serde")]
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::uniform(DEFAULT_TIMEOUT)
    }
}

impl Timeouts {
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            create: timeout,
            read: timeout,
            update: timeout,
            delete: timeout,
        }
    }

    pub fn get(&self, phase: Phase) -> Duration {
        match phase {
            Phase::Create => self.create,
            Phase::Read => self.read,
            Phase::Update => self.update,
            Phase::Delete => self.delete,
        }
    }
}

/// Per-resource `timeouts` block; omitted phases fall back to the provider default
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutsConfig {
    #[serde(default, with = "humantime_serde")]
    pub create: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub read: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub update: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub delete: Option<Duration>,
}

impl TimeoutsConfig {
    pub fn resolve(&self, default: Duration) -> Timeouts {
        Timeouts {
            create: self.create.unwrap_or(default),
            read: self.read.unwrap_or(default),
            update: self.update.unwrap_or(default),
            delete: self.delete.unwrap_or(default),
        }
    }
}

/// Run `fut` under a deadline; expiry aborts it with a timeout error
pub async fn with_deadline<T, F>(phase: Phase, timeout: Duration, fut: F) -> ProviderResult<T>
where
    F: Future<Output = ProviderResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::new(format!(
            "{} did not complete within {:?}",
            phase, timeout
        ))
        .with_kind(ErrorKind::Timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_resolves_against_default() {
        let config: TimeoutsConfig = serde_json::from_str(r#"{"create": "10m"}"#).unwrap();
        let timeouts = config.resolve(Duration::from_secs(60));
        assert_eq!(timeouts.create, Duration::from_secs(600));
        assert_eq!(timeouts.get(Phase::Delete), Duration::from_secs(60));
    }

    #[test]
    fn config_rejects_unknown_phase() {
        assert!(serde_json::from_str::<TimeoutsConfig>(r#"{"destroy": "1m"}"#).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_is_a_timeout_error() {
        let result: ProviderResult<()> = with_deadline(Phase::Create, Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.message.contains("create"));
    }

    #[tokio::test]
    async fn completed_future_passes_through() {
        let result = with_deadline(Phase::Read, Duration::from_secs(1), async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }
}
