//! Resource adapters for the Exoscale compute API
//!
//! Each adapter keeps a typed configuration struct decoded from the state
//! container and an `apply` function writing a remote object back into it.
//! Every phase runs under its configured deadline.

pub mod anti_affinity_group;
pub mod block_storage_volume;
pub mod elastic_ip;
pub mod security_group;

use std::sync::Arc;

use exoform_core::provider::{ErrorKind, ProviderError, ProviderResult, ResourceAdapter};

use crate::client::{ApiError, ComputeApi};

/// API client and default zone shared by every adapter invocation
#[derive(Clone)]
pub struct ProviderClient {
    api: Arc<dyn ComputeApi>,
    zone: String,
}

impl ProviderClient {
    pub fn new(api: Arc<dyn ComputeApi>, zone: impl Into<String>) -> Self {
        Self {
            api,
            zone: zone.into(),
        }
    }

    pub fn api(&self) -> &dyn ComputeApi {
        self.api.as_ref()
    }

    /// Zone for resources that are not zoned themselves
    pub fn default_zone(&self) -> &str {
        &self.zone
    }
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("zone", &self.zone)
            .finish_non_exhaustive()
    }
}

pub type Adapter = Box<dyn ResourceAdapter<Client = ProviderClient>>;

/// Every resource type handled by the provider
pub fn adapters() -> Vec<Adapter> {
    vec![
        Box::new(elastic_ip::ElasticIpAdapter),
        Box::new(security_group::SecurityGroupAdapter),
        Box::new(anti_affinity_group::AntiAffinityGroupAdapter),
        Box::new(block_storage_volume::BlockStorageVolumeAdapter),
    ]
}

/// Zone of an import for types without a zone attribute. Such objects are
/// always managed in the provider zone, so any other zone is refused.
fn provider_zone<'a>(client: &'a ProviderClient, zone: Option<&str>) -> ProviderResult<&'a str> {
    match zone {
        Some(zone) if zone != client.default_zone() => Err(ProviderError::validation(format!(
            "cannot import from zone '{}': resources of this type are managed in the provider zone '{}'",
            zone,
            client.default_zone()
        ))),
        _ => Ok(client.default_zone()),
    }
}

/// Prefix the message of an API failure, keeping its kind
fn with_context(context: &str, e: ApiError) -> ProviderError {
    let err = ProviderError::from(e);
    ProviderError {
        message: format!("{}: {}", context, err.message),
        ..err
    }
}

/// Failure of a follow-up step after the primary object was created.
/// No rollback happens: the object stays tracked and the next apply converges it.
fn partial(context: &str, e: ApiError) -> ProviderError {
    with_context(context, e).with_kind(ErrorKind::PartialCompletion)
}
