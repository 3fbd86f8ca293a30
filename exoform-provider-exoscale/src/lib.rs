//! Exoscale Provider
//!
//! Resource adapters for elastic IPs, security groups, anti-affinity groups
//! and block storage volumes, backed by the Exoscale API v2.

pub mod client;
pub mod config;
pub mod provider;
pub mod resources;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

use exoform_core::provider::{BoxFuture, Provider, ProviderResult};
use exoform_core::resource::ResourceData;
use exoform_core::schema::ResourceSchema;
use exoform_core::upgrade::RawState;

pub use client::Credentials;
pub use config::{ConfigError, ProviderConfig};
pub use provider::{ExoscaleProvider, resource_schemas};
pub use resources::ProviderClient;

impl Provider for ExoscaleProvider {
    fn name(&self) -> &'static str {
        "exoscale"
    }

    fn schemas(&self) -> Vec<ResourceSchema> {
        self.all_schemas()
    }

    fn upgrade_state(
        &self,
        resource_type: &str,
        version: u32,
        raw: RawState,
    ) -> ProviderResult<RawState> {
        self.upgrade(resource_type, version, raw)
    }

    fn create<'a>(&'a self, data: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
        match self.adapter(data.resource_type()) {
            Ok(adapter) => adapter.create(data, self.client()),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }

    fn read<'a>(&'a self, data: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
        match self.adapter(data.resource_type()) {
            Ok(adapter) => adapter.read(data, self.client()),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }

    fn update<'a>(&'a self, data: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
        match self.adapter(data.resource_type()) {
            Ok(adapter) => adapter.update(data, self.client()),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }

    fn delete<'a>(&'a self, data: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
        match self.adapter(data.resource_type()) {
            Ok(adapter) => adapter.delete(data, self.client()),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }

    fn import<'a>(
        &'a self,
        import_id: &'a str,
        data: &'a mut ResourceData,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        match self.adapter(data.resource_type()) {
            Ok(adapter) => adapter.import(import_id, data, self.client()),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }
}
