//! Upgrade - Versioned migration of persisted resource state

use crate::provider::{ProviderError, ProviderResult};

/// Persisted attribute map as raw JSON, before typed decoding
pub type RawState = serde_json::Map<String, serde_json::Value>;

/// Transforms state persisted at `version` into the layout of `version + 1`
#[derive(Debug, Clone, Copy)]
pub struct StateUpgrader {
    pub version: u32,
    pub upgrade: fn(RawState) -> ProviderResult<RawState>,
}

impl StateUpgrader {
    pub fn new(version: u32, upgrade: fn(RawState) -> ProviderResult<RawState>) -> Self {
        Self { version, upgrade }
    }
}

/// Apply upgraders in order until `raw` reaches `target` version
pub fn upgrade_state(
    resource_type: &str,
    raw: RawState,
    from: u32,
    target: u32,
    upgraders: &[StateUpgrader],
) -> ProviderResult<RawState> {
    if from > target {
        return Err(ProviderError::migration(format!(
            "{}: state version {} is newer than supported version {}",
            resource_type, from, target
        )));
    }

    let mut raw = raw;
    for version in from..target {
        let upgrader = upgraders
            .iter()
            .find(|u| u.version == version)
            .ok_or_else(|| {
                ProviderError::migration(format!(
                    "{}: no upgrader from state version {}",
                    resource_type, version
                ))
            })?;
        log::debug!(
            "{}: migrating state from version {} to {}",
            resource_type,
            version,
            version + 1
        );
        raw = (upgrader.upgrade)(raw)?;
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ErrorKind;

    fn add_marker(mut raw: RawState) -> ProviderResult<RawState> {
        let count = raw.get("steps").and_then(|v| v.as_i64()).unwrap_or(0);
        raw.insert("steps".to_string(), serde_json::json!(count + 1));
        Ok(raw)
    }

    fn fail(_: RawState) -> ProviderResult<RawState> {
        Err(ProviderError::migration("broken"))
    }

    #[test]
    fn upgraders_run_in_sequence() {
        let upgraders = [StateUpgrader::new(1, add_marker), StateUpgrader::new(0, add_marker)];
        let raw = upgrade_state("r", RawState::new(), 0, 2, &upgraders).unwrap();
        assert_eq!(raw["steps"], serde_json::json!(2));
    }

    #[test]
    fn current_version_is_untouched() {
        let raw = upgrade_state("r", RawState::new(), 1, 1, &[StateUpgrader::new(1, fail)]).unwrap();
        assert!(raw.is_empty());
    }

    #[test]
    fn missing_upgrader_is_a_migration_error() {
        let err = upgrade_state("r", RawState::new(), 0, 1, &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Migration);
    }

    #[test]
    fn newer_state_is_rejected() {
        let err = upgrade_state("r", RawState::new(), 3, 1, &[]).unwrap_err();
        assert!(err.message.contains("newer"));
    }
}
