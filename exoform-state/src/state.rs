//! State file structures for persisting infrastructure state

use std::collections::{BTreeMap, HashMap};

use exoform_core::provider::{Provider, ProviderError, ProviderResult};
use exoform_core::resource::{ResourceId, State};
use exoform_core::schema::ResourceSchema;
use exoform_core::upgrade::RawState;
use serde::{Deserialize, Serialize};

/// The main state file structure that persists to the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Monotonically increasing number for each state modification
    pub serial: u64,
    /// Unique identifier for this state lineage (prevents accidental overwrites)
    pub lineage: String,
    /// Version of exoform that last modified this state
    pub exoform_version: String,
    /// All managed resources and their last observed state
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    /// Current state file format version
    pub const CURRENT_VERSION: u32 = 1;

    /// Create a new empty state file
    pub fn new() -> Self {
        Self::with_lineage(uuid::Uuid::new_v4().to_string())
    }

    /// Create a new state file with a specific lineage
    pub fn with_lineage(lineage: String) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage,
            exoform_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Increment serial and stamp the exoform version for a new state write
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.exoform_version = env!("CARGO_PKG_VERSION").to_string();
    }

    /// Find a resource by type and name
    pub fn find_resource(&self, resource_type: &str, name: &str) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    /// Add or replace a resource record
    pub fn upsert_resource(&mut self, resource: ResourceState) {
        match self
            .resources
            .iter_mut()
            .find(|r| r.resource_type == resource.resource_type && r.name == resource.name)
        {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
    }

    /// Remove a resource record
    pub fn remove_resource(&mut self, resource_type: &str, name: &str) -> Option<ResourceState> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.resource_type == resource_type && r.name == name)?;
        Some(self.resources.remove(pos))
    }

    /// Record the outcome of a lifecycle call: existing states are upserted,
    /// not-found states drop the record
    pub fn record(&mut self, state: &State, schema: &ResourceSchema) {
        if state.exists {
            self.upsert_resource(ResourceState::from_state(state, schema));
        } else {
            self.remove_resource(&state.id.resource_type, &state.id.name);
        }
    }

    /// Upgrade and decode every record into host-side state
    pub fn load_states(&self, provider: &dyn Provider) -> ProviderResult<HashMap<ResourceId, State>> {
        self.resources
            .iter()
            .map(|r| {
                let state = r.to_state(provider)?;
                Ok((state.id.clone(), state))
            })
            .collect()
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Persisted record of a single managed object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type (e.g., "exoscale_elastic_ip")
    pub resource_type: String,
    /// Logical name from configuration
    pub name: String,
    /// Provider-assigned identifier
    pub id: String,
    /// Schema version the attributes were written with
    #[serde(default)]
    pub schema_version: u32,
    /// Attribute values as JSON
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl ResourceState {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            id: id.into(),
            schema_version: 0,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    /// Record an observed state under the current schema version
    pub fn from_state(state: &State, schema: &ResourceSchema) -> Self {
        Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            id: state.identifier.clone().unwrap_or_default(),
            schema_version: schema.version,
            attributes: state
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        }
    }

    /// Upgrade the raw attributes to the current schema version, then decode them
    pub fn to_state(&self, provider: &dyn Provider) -> ProviderResult<State> {
        let id = ResourceId::new(&self.resource_type, &self.name);
        let schema = provider.schema(&self.resource_type).ok_or_else(|| {
            ProviderError::validation(format!(
                "unsupported resource type '{}'",
                self.resource_type
            ))
            .for_resource(id.clone())
        })?;

        let raw: RawState = self.attributes.clone().into_iter().collect();
        let raw = if self.schema_version == schema.version {
            raw
        } else {
            log::debug!(
                "upgrading {} from schema version {} to {}",
                id,
                self.schema_version,
                schema.version
            );
            provider
                .upgrade_state(&self.resource_type, self.schema_version, raw)
                .map_err(|e| e.for_resource(id.clone()))?
        };

        let attributes = schema
            .decode_json(&raw)
            .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?;
        Ok(State::existing(id, attributes).with_identifier(&self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exoform_core::provider::BoxFuture;
    use exoform_core::resource::{Attributes, ResourceData, Value};
    use exoform_core::schema::{AttributeSchema, AttributeType};
    use exoform_core::upgrade::{StateUpgrader, upgrade_state};

    fn lowercase_name(mut raw: RawState) -> ProviderResult<RawState> {
        let name = raw
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::migration("missing name"))?
            .to_lowercase();
        raw.insert("name".to_string(), serde_json::json!(name));
        Ok(raw)
    }

    struct GroupProvider;

    impl Provider for GroupProvider {
        fn name(&self) -> &'static str {
            "test"
        }

        fn schemas(&self) -> Vec<ResourceSchema> {
            vec![
                ResourceSchema::new("group")
                    .with_version(1)
                    .attribute(AttributeSchema::new("name", AttributeType::String).required())
                    .attribute(AttributeSchema::new(
                        "sources",
                        AttributeType::Set(Box::new(AttributeType::String)),
                    )),
            ]
        }

        fn upgrade_state(
            &self,
            resource_type: &str,
            version: u32,
            raw: RawState,
        ) -> ProviderResult<RawState> {
            upgrade_state(
                resource_type,
                raw,
                version,
                1,
                &[StateUpgrader::new(0, lowercase_name)],
            )
        }

        fn create<'a>(&'a self, _: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn read<'a>(&'a self, _: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn update<'a>(&'a self, _: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn delete<'a>(&'a self, _: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn import<'a>(
            &'a self,
            _: &'a str,
            _: &'a mut ResourceData,
        ) -> BoxFuture<'a, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn test_state_file_new() {
        let state = StateFile::new();
        assert_eq!(state.version, StateFile::CURRENT_VERSION);
        assert_eq!(state.serial, 0);
        assert!(!state.lineage.is_empty());
        assert!(state.resources.is_empty());
    }

    #[test]
    fn test_state_file_upsert_and_remove() {
        let mut state = StateFile::new();
        state.upsert_resource(
            ResourceState::new("group", "web", "g-1").with_attribute("name", serde_json::json!("a")),
        );
        state.upsert_resource(
            ResourceState::new("group", "web", "g-1").with_attribute("name", serde_json::json!("b")),
        );
        assert_eq!(state.resources.len(), 1);
        assert_eq!(state.resources[0].attributes["name"], serde_json::json!("b"));

        assert!(state.remove_resource("group", "web").is_some());
        assert!(state.remove_resource("group", "web").is_none());
    }

    #[test]
    fn test_record_follows_existence() {
        let schemas = GroupProvider.schemas();
        let schema = &schemas[0];
        let id = ResourceId::new("group", "web");
        let mut state = StateFile::new();

        let observed = State::existing(
            id.clone(),
            Attributes::from([("name".to_string(), Value::from("web"))]),
        )
        .with_identifier("g-1");
        state.record(&observed, schema);
        assert_eq!(state.resources[0].schema_version, 1);
        assert_eq!(state.resources[0].id, "g-1");

        state.record(&State::not_found(id), schema);
        assert!(state.resources.is_empty());
    }

    #[test]
    fn test_load_upgrades_old_records() {
        let mut state = StateFile::new();
        state.upsert_resource(
            ResourceState::new("group", "web", "g-1")
                .with_attribute("name", serde_json::json!("MyGroup"))
                .with_attribute("sources", serde_json::json!(["10.0.0.0/24"])),
        );

        let states = state.load_states(&GroupProvider).unwrap();
        let loaded = &states[&ResourceId::new("group", "web")];
        assert_eq!(loaded.identifier.as_deref(), Some("g-1"));
        assert_eq!(loaded.attributes["name"], Value::from("mygroup"));
        assert_eq!(loaded.attributes["sources"], Value::string_set(["10.0.0.0/24"]));
    }

    #[test]
    fn test_load_rejects_broken_old_records() {
        let mut state = StateFile::new();
        state.upsert_resource(ResourceState::new("group", "web", "g-1"));
        let err = state.load_states(&GroupProvider).unwrap_err();
        assert!(err.message.contains("missing name"));
    }

    #[test]
    fn test_state_file_serialization() {
        let mut state = StateFile::new();
        state.upsert_resource(
            ResourceState::new("group", "web", "g-1")
                .with_schema_version(1)
                .with_attribute("name", serde_json::json!("web")),
        );

        let json = serde_json::to_string_pretty(&state).unwrap();
        let deserialized: StateFile = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.lineage, state.lineage);
        assert_eq!(deserialized.resources, state.resources);
    }
}
