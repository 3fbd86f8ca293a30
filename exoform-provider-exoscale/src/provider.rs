//! Exoscale Provider implementation
//!
//! Holds the API client shared by every adapter and routes lifecycle calls
//! to the adapter registered for the resource type.

use std::sync::Arc;

use exoform_core::provider::{ProviderError, ProviderResult};
use exoform_core::schema::ResourceSchema;
use exoform_core::upgrade::{self, RawState};

use crate::client::{Credentials, HttpClient};
use crate::config::{ConfigError, ProviderConfig};
use crate::resources::{self, Adapter, ProviderClient};

/// Schemas of every supported resource type; no API access needed
pub fn resource_schemas() -> Vec<ResourceSchema> {
    resources::adapters().iter().map(|a| a.schema()).collect()
}

/// Exoscale Provider
pub struct ExoscaleProvider {
    client: ProviderClient,
    adapters: Vec<Adapter>,
}

impl std::fmt::Debug for ExoscaleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExoscaleProvider")
            .field("client", &self.client)
            .field(
                "resource_types",
                &self.adapters.iter().map(|a| a.type_name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ExoscaleProvider {
    pub fn new(client: ProviderClient) -> Self {
        Self {
            client,
            adapters: resources::adapters(),
        }
    }

    /// Build a provider talking to the real API
    pub fn from_config(
        config: &ProviderConfig,
        credentials: Credentials,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if !credentials.is_complete() {
            return Err(ConfigError::MissingCredentials(
                "EXOSCALE_API_KEY and EXOSCALE_API_SECRET",
            ));
        }

        let http = HttpClient::new(credentials, &config.environment)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(Self::new(ProviderClient::new(Arc::new(http), &config.zone)))
    }

    pub fn client(&self) -> &ProviderClient {
        &self.client
    }

    // =========================================================================
    // Adapter Lookup
    // =========================================================================

    pub(crate) fn adapter(&self, resource_type: &str) -> ProviderResult<&Adapter> {
        self.adapters
            .iter()
            .find(|a| a.type_name() == resource_type)
            .ok_or_else(|| {
                ProviderError::validation(format!("unsupported resource type '{}'", resource_type))
            })
    }

    pub(crate) fn all_schemas(&self) -> Vec<ResourceSchema> {
        self.adapters.iter().map(|a| a.schema()).collect()
    }

    /// Run the upgraders of `resource_type` from `version` to its current version
    pub(crate) fn upgrade(
        &self,
        resource_type: &str,
        version: u32,
        raw: RawState,
    ) -> ProviderResult<RawState> {
        let adapter = self.adapter(resource_type)?;
        upgrade::upgrade_state(
            resource_type,
            raw,
            version,
            adapter.schema().version,
            &adapter.upgraders(),
        )
    }
}
