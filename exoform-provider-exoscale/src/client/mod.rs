//! Client - Zone-scoped access to the Exoscale compute API
//!
//! Adapters talk to the API only through [`ComputeApi`], so tests can swap the
//! HTTP client for an in-memory one. Every call either succeeds, fails with
//! [`ApiError::NotFound`] when the object is absent, or fails with another error.

mod error;
mod http;
pub mod types;

use async_trait::async_trait;

pub use error::{ApiError, ApiResult};
pub use http::{Credentials, HttpClient};
use types::{AntiAffinityGroup, BlockStorageVolume, ElasticIp, SecurityGroup};

#[async_trait]
pub trait ComputeApi: Send + Sync {
    // Elastic IPs

    /// Create an elastic IP and return it with its assigned id
    async fn create_elastic_ip(&self, zone: &str, eip: &ElasticIp) -> ApiResult<ElasticIp>;

    async fn get_elastic_ip(&self, zone: &str, id: &str) -> ApiResult<ElasticIp>;

    /// Update description, healthcheck and labels of `eip` in one call
    async fn update_elastic_ip(&self, zone: &str, eip: &ElasticIp) -> ApiResult<()>;

    async fn delete_elastic_ip(&self, zone: &str, id: &str) -> ApiResult<()>;

    /// Reverse DNS domain of an elastic IP, as returned by the API (trailing dot included)
    async fn get_elastic_ip_reverse_dns(&self, zone: &str, id: &str) -> ApiResult<String>;

    async fn update_elastic_ip_reverse_dns(
        &self,
        zone: &str,
        id: &str,
        domain_name: &str,
    ) -> ApiResult<()>;

    async fn delete_elastic_ip_reverse_dns(&self, zone: &str, id: &str) -> ApiResult<()>;

    // Security groups

    async fn create_security_group(
        &self,
        zone: &str,
        group: &SecurityGroup,
    ) -> ApiResult<SecurityGroup>;

    async fn get_security_group(&self, zone: &str, id: &str) -> ApiResult<SecurityGroup>;

    /// Look a security group up by id or by name
    async fn find_security_group(&self, zone: &str, id_or_name: &str)
    -> ApiResult<SecurityGroup>;

    async fn delete_security_group(&self, zone: &str, id: &str) -> ApiResult<()>;

    async fn add_external_source_to_security_group(
        &self,
        zone: &str,
        id: &str,
        cidr: &str,
    ) -> ApiResult<()>;

    async fn remove_external_source_from_security_group(
        &self,
        zone: &str,
        id: &str,
        cidr: &str,
    ) -> ApiResult<()>;

    // Anti-affinity groups

    async fn create_anti_affinity_group(
        &self,
        zone: &str,
        group: &AntiAffinityGroup,
    ) -> ApiResult<AntiAffinityGroup>;

    async fn get_anti_affinity_group(&self, zone: &str, id: &str) -> ApiResult<AntiAffinityGroup>;

    /// Look an anti-affinity group up by id or by name
    async fn find_anti_affinity_group(
        &self,
        zone: &str,
        id_or_name: &str,
    ) -> ApiResult<AntiAffinityGroup>;

    async fn delete_anti_affinity_group(&self, zone: &str, id: &str) -> ApiResult<()>;

    // Block storage volumes

    async fn create_block_storage_volume(
        &self,
        zone: &str,
        volume: &BlockStorageVolume,
    ) -> ApiResult<BlockStorageVolume>;

    async fn get_block_storage_volume(&self, zone: &str, id: &str)
    -> ApiResult<BlockStorageVolume>;

    /// Look a volume up by id or by name
    async fn find_block_storage_volume(
        &self,
        zone: &str,
        id_or_name: &str,
    ) -> ApiResult<BlockStorageVolume>;

    /// Update name and labels of `volume` in one call
    async fn update_block_storage_volume(
        &self,
        zone: &str,
        volume: &BlockStorageVolume,
    ) -> ApiResult<()>;

    async fn resize_block_storage_volume(&self, zone: &str, id: &str, size: i64)
    -> ApiResult<()>;

    async fn detach_block_storage_volume(&self, zone: &str, id: &str) -> ApiResult<()>;

    async fn delete_block_storage_volume(&self, zone: &str, id: &str) -> ApiResult<()>;
}
