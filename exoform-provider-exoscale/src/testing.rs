//! In-memory compute API recording every call

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use exoform_core::resource::{Attributes, Resource, ResourceData, Value};

use crate::client::types::{
    AntiAffinityGroup, BlockStorageVolume, ElasticIp, Reference, SecurityGroup,
};
use crate::client::{ApiError, ApiResult, ComputeApi};
use crate::resources::ProviderClient;

#[derive(Default)]
struct Store {
    next_id: u64,
    elastic_ips: BTreeMap<String, ElasticIp>,
    reverse_dns: BTreeMap<String, String>,
    security_groups: BTreeMap<String, SecurityGroup>,
    anti_affinity_groups: BTreeMap<String, AntiAffinityGroup>,
    volumes: BTreeMap<String, BlockStorageVolume>,
    calls: Vec<&'static str>,
    failing: BTreeSet<&'static str>,
}

impl Store {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

#[derive(Default)]
pub struct FakeCompute {
    store: Mutex<Store>,
}

impl FakeCompute {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Client over this fake, zone "ch-gva-2"
    pub fn client(self: &Arc<Self>) -> ProviderClient {
        ProviderClient::new(self.clone(), "ch-gva-2")
    }

    /// Make every later `call` fail with a server error
    pub fn fail(&self, call: &'static str) {
        self.store.lock().unwrap().failing.insert(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.store.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    pub fn clear_calls(&self) {
        self.store.lock().unwrap().calls.clear();
    }

    /// Remove an elastic IP behind the provider's back
    pub fn forget_elastic_ip(&self, id: &str) {
        self.store.lock().unwrap().elastic_ips.remove(id);
    }

    pub fn elastic_ip(&self, id: &str) -> Option<ElasticIp> {
        self.store.lock().unwrap().elastic_ips.get(id).cloned()
    }

    pub fn reverse_dns(&self, id: &str) -> Option<String> {
        self.store.lock().unwrap().reverse_dns.get(id).cloned()
    }

    pub fn security_group(&self, id: &str) -> Option<SecurityGroup> {
        self.store.lock().unwrap().security_groups.get(id).cloned()
    }

    pub fn volume(&self, id: &str) -> Option<BlockStorageVolume> {
        self.store.lock().unwrap().volumes.get(id).cloned()
    }

    pub fn attach_volume(&self, id: &str, instance_id: &str) {
        if let Some(volume) = self.store.lock().unwrap().volumes.get_mut(id) {
            volume.instance = Some(Reference::new(instance_id));
            volume.state = Some("attached".to_string());
        }
    }

    pub fn join_anti_affinity_group(&self, id: &str, instance_id: &str) {
        if let Some(group) = self.store.lock().unwrap().anti_affinity_groups.get_mut(id) {
            group
                .instances
                .get_or_insert_with(Vec::new)
                .push(Reference::new(instance_id));
        }
    }

    fn record(&self, call: &'static str) -> ApiResult<MutexGuard<'_, Store>> {
        let mut store = self.store.lock().unwrap();
        store.calls.push(call);
        if store.failing.contains(call) {
            return Err(ApiError::Http {
                status: 500,
                message: format!("{} failed", call),
            });
        }
        Ok(store)
    }
}

/// Container for creating a resource of `schema` from `attributes`
pub fn create_data(
    schema: exoform_core::schema::ResourceSchema,
    attributes: impl IntoIterator<Item = (&'static str, Value)>,
) -> ResourceData {
    let mut resource = Resource::new(schema.resource_type.clone(), "test");
    for (name, value) in attributes {
        resource = resource.with_attribute(name, value);
    }
    ResourceData::for_create(Arc::new(schema), &resource)
}

/// Container for updating the object tracked by `current` towards `desired`
pub fn update_data(current: &ResourceData, desired: Attributes) -> ResourceData {
    let mut data = ResourceData::new(Arc::new(current.schema().clone()))
        .with_prior(current.observed().clone())
        .with_desired(desired)
        .with_timeouts(current.timeouts());
    if let Some(id) = current.id() {
        data.set_id(id);
    }
    data
}

/// Container holding only the last observed state of `current`
pub fn state_data(current: &ResourceData) -> ResourceData {
    update_data(current, Attributes::new())
}

#[async_trait]
impl ComputeApi for FakeCompute {
    async fn create_elastic_ip(&self, _zone: &str, eip: &ElasticIp) -> ApiResult<ElasticIp> {
        let mut store = self.record("create_elastic_ip")?;
        let id = store.next_id("eip");
        let family = eip.addressfamily.clone().unwrap_or_else(|| "inet4".to_string());
        let (ip, cidr) = if family == "inet6" {
            let ip = format!("2001:db8::{}", store.next_id);
            (ip.clone(), format!("{}/128", ip))
        } else {
            let ip = format!("198.51.100.{}", store.next_id);
            (ip.clone(), format!("{}/32", ip))
        };
        let created = ElasticIp {
            id: Some(id.clone()),
            ip: Some(ip),
            addressfamily: Some(family),
            cidr: Some(cidr),
            ..eip.clone()
        };
        store.elastic_ips.insert(id, created.clone());
        Ok(created)
    }

    async fn get_elastic_ip(&self, zone: &str, id: &str) -> ApiResult<ElasticIp> {
        let store = self.record("get_elastic_ip")?;
        if zone.is_empty() {
            return Err(ApiError::InvalidRequest("missing zone".to_string()));
        }
        store.elastic_ips.get(id).cloned().ok_or(ApiError::NotFound)
    }

    async fn update_elastic_ip(&self, _zone: &str, eip: &ElasticIp) -> ApiResult<()> {
        let mut store = self.record("update_elastic_ip")?;
        let id = eip.id.clone().unwrap_or_default();
        let current = store.elastic_ips.get_mut(&id).ok_or(ApiError::NotFound)?;
        current.description = eip.description.clone();
        current.healthcheck = eip.healthcheck.clone();
        current.labels = eip.labels.clone();
        Ok(())
    }

    async fn delete_elastic_ip(&self, _zone: &str, id: &str) -> ApiResult<()> {
        let mut store = self.record("delete_elastic_ip")?;
        store.reverse_dns.remove(id);
        store.elastic_ips.remove(id).map(|_| ()).ok_or(ApiError::NotFound)
    }

    async fn get_elastic_ip_reverse_dns(&self, _zone: &str, id: &str) -> ApiResult<String> {
        let store = self.record("get_elastic_ip_reverse_dns")?;
        store.reverse_dns.get(id).cloned().ok_or(ApiError::NotFound)
    }

    async fn update_elastic_ip_reverse_dns(
        &self,
        _zone: &str,
        id: &str,
        domain_name: &str,
    ) -> ApiResult<()> {
        let mut store = self.record("update_elastic_ip_reverse_dns")?;
        if !store.elastic_ips.contains_key(id) {
            return Err(ApiError::NotFound);
        }
        // The API answers with a fully qualified name
        store
            .reverse_dns
            .insert(id.to_string(), format!("{}.", domain_name));
        Ok(())
    }

    async fn delete_elastic_ip_reverse_dns(&self, _zone: &str, id: &str) -> ApiResult<()> {
        let mut store = self.record("delete_elastic_ip_reverse_dns")?;
        store.reverse_dns.remove(id).map(|_| ()).ok_or(ApiError::NotFound)
    }

    async fn create_security_group(
        &self,
        _zone: &str,
        group: &SecurityGroup,
    ) -> ApiResult<SecurityGroup> {
        let mut store = self.record("create_security_group")?;
        let id = store.next_id("sg");
        let created = SecurityGroup {
            id: Some(id.clone()),
            name: group.name.as_deref().map(str::to_lowercase),
            description: group.description.clone(),
            external_sources: None,
        };
        store.security_groups.insert(id, created.clone());
        Ok(created)
    }

    async fn get_security_group(&self, _zone: &str, id: &str) -> ApiResult<SecurityGroup> {
        let store = self.record("get_security_group")?;
        store.security_groups.get(id).cloned().ok_or(ApiError::NotFound)
    }

    async fn find_security_group(
        &self,
        _zone: &str,
        id_or_name: &str,
    ) -> ApiResult<SecurityGroup> {
        let store = self.record("find_security_group")?;
        store
            .security_groups
            .values()
            .find(|g| g.id.as_deref() == Some(id_or_name) || g.name.as_deref() == Some(id_or_name))
            .cloned()
            .ok_or(ApiError::NotFound)
    }

    async fn delete_security_group(&self, _zone: &str, id: &str) -> ApiResult<()> {
        let mut store = self.record("delete_security_group")?;
        store.security_groups.remove(id).map(|_| ()).ok_or(ApiError::NotFound)
    }

    async fn add_external_source_to_security_group(
        &self,
        _zone: &str,
        id: &str,
        cidr: &str,
    ) -> ApiResult<()> {
        let mut store = self.record("add_external_source_to_security_group")?;
        let group = store.security_groups.get_mut(id).ok_or(ApiError::NotFound)?;
        let sources = group.external_sources.get_or_insert_with(Vec::new);
        if sources.iter().any(|s| s == cidr) {
            return Err(ApiError::InvalidRequest(format!("{} already present", cidr)));
        }
        sources.push(cidr.to_string());
        Ok(())
    }

    async fn remove_external_source_from_security_group(
        &self,
        _zone: &str,
        id: &str,
        cidr: &str,
    ) -> ApiResult<()> {
        let mut store = self.record("remove_external_source_from_security_group")?;
        let group = store.security_groups.get_mut(id).ok_or(ApiError::NotFound)?;
        let sources = group.external_sources.get_or_insert_with(Vec::new);
        let before = sources.len();
        sources.retain(|s| s != cidr);
        if sources.len() == before {
            return Err(ApiError::NotFound);
        }
        Ok(())
    }

    async fn create_anti_affinity_group(
        &self,
        _zone: &str,
        group: &AntiAffinityGroup,
    ) -> ApiResult<AntiAffinityGroup> {
        let mut store = self.record("create_anti_affinity_group")?;
        let id = store.next_id("aag");
        let created = AntiAffinityGroup {
            id: Some(id.clone()),
            ..group.clone()
        };
        store.anti_affinity_groups.insert(id, created.clone());
        Ok(created)
    }

    async fn get_anti_affinity_group(&self, _zone: &str, id: &str) -> ApiResult<AntiAffinityGroup> {
        let store = self.record("get_anti_affinity_group")?;
        store
            .anti_affinity_groups
            .get(id)
            .cloned()
            .ok_or(ApiError::NotFound)
    }

    async fn find_anti_affinity_group(
        &self,
        _zone: &str,
        id_or_name: &str,
    ) -> ApiResult<AntiAffinityGroup> {
        let store = self.record("find_anti_affinity_group")?;
        store
            .anti_affinity_groups
            .values()
            .find(|g| g.id.as_deref() == Some(id_or_name) || g.name.as_deref() == Some(id_or_name))
            .cloned()
            .ok_or(ApiError::NotFound)
    }

    async fn delete_anti_affinity_group(&self, _zone: &str, id: &str) -> ApiResult<()> {
        let mut store = self.record("delete_anti_affinity_group")?;
        store
            .anti_affinity_groups
            .remove(id)
            .map(|_| ())
            .ok_or(ApiError::NotFound)
    }

    async fn create_block_storage_volume(
        &self,
        _zone: &str,
        volume: &BlockStorageVolume,
    ) -> ApiResult<BlockStorageVolume> {
        let mut store = self.record("create_block_storage_volume")?;
        let id = store.next_id("vol");
        let created = BlockStorageVolume {
            id: Some(id.clone()),
            size: Some(volume.size.unwrap_or(10)),
            blocksize: Some(4096),
            state: Some("detached".to_string()),
            created_at: Some("2026-01-01T00:00:00Z".to_string()),
            ..volume.clone()
        };
        store.volumes.insert(id, created.clone());
        Ok(created)
    }

    async fn get_block_storage_volume(
        &self,
        _zone: &str,
        id: &str,
    ) -> ApiResult<BlockStorageVolume> {
        let store = self.record("get_block_storage_volume")?;
        store.volumes.get(id).cloned().ok_or(ApiError::NotFound)
    }

    async fn find_block_storage_volume(
        &self,
        _zone: &str,
        id_or_name: &str,
    ) -> ApiResult<BlockStorageVolume> {
        let store = self.record("find_block_storage_volume")?;
        store
            .volumes
            .values()
            .find(|v| v.id.as_deref() == Some(id_or_name) || v.name.as_deref() == Some(id_or_name))
            .cloned()
            .ok_or(ApiError::NotFound)
    }

    async fn update_block_storage_volume(
        &self,
        _zone: &str,
        volume: &BlockStorageVolume,
    ) -> ApiResult<()> {
        let mut store = self.record("update_block_storage_volume")?;
        let id = volume.id.clone().unwrap_or_default();
        let current = store.volumes.get_mut(&id).ok_or(ApiError::NotFound)?;
        if volume.name.is_some() {
            current.name = volume.name.clone();
        }
        if volume.labels.is_some() {
            current.labels = volume.labels.clone();
        }
        Ok(())
    }

    async fn resize_block_storage_volume(&self, _zone: &str, id: &str, size: i64) -> ApiResult<()> {
        let mut store = self.record("resize_block_storage_volume")?;
        let current = store.volumes.get_mut(id).ok_or(ApiError::NotFound)?;
        if current.size.is_some_and(|s| size < s) {
            return Err(ApiError::InvalidRequest("volume cannot shrink".to_string()));
        }
        current.size = Some(size);
        Ok(())
    }

    async fn detach_block_storage_volume(&self, _zone: &str, id: &str) -> ApiResult<()> {
        let mut store = self.record("detach_block_storage_volume")?;
        let current = store.volumes.get_mut(id).ok_or(ApiError::NotFound)?;
        current.instance = None;
        current.state = Some("detached".to_string());
        Ok(())
    }

    async fn delete_block_storage_volume(&self, _zone: &str, id: &str) -> ApiResult<()> {
        let mut store = self.record("delete_block_storage_volume")?;
        let attached = store
            .volumes
            .get(id)
            .ok_or(ApiError::NotFound)?
            .instance
            .is_some();
        if attached {
            return Err(ApiError::InvalidRequest("volume is attached".to_string()));
        }
        store.volumes.remove(id);
        Ok(())
    }
}
