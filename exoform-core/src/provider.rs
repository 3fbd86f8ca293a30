//! Provider - Traits abstracting resource operations
//!
//! A resource adapter implements the lifecycle of one resource type against a
//! remote API. A Provider bundles adapters with the client they share and
//! dispatches lifecycle calls by resource type.

use std::future::Future;
use std::pin::Pin;

use crate::resource::{ResourceData, ResourceId};
use crate::schema::{ResourceSchema, TypeError};
use crate::upgrade::{RawState, StateUpgrader};

/// Category of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote object does not exist
    NotFound,
    /// Input rejected before any remote call
    Validation,
    /// Any other remote failure
    Remote,
    /// A phase deadline expired
    Timeout,
    /// The remote object was created but a follow-up step failed
    PartialCompletion,
    /// Persisted state could not be upgraded
    Migration,
    /// Attribute values could not be decoded or recorded
    Decode,
}

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}.{}] {}", id.resource_type, id.name, self.message)?;
        } else {
            write!(f, "{}", self.message)?;
        }
        if let Some(ref cause) = self.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Remote,
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ErrorKind::NotFound)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ErrorKind::Validation)
    }

    pub fn migration(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ErrorKind::Migration)
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl From<TypeError> for ProviderError {
    fn from(e: TypeError) -> Self {
        ProviderError::new(e.to_string()).with_kind(ErrorKind::Decode)
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Lifecycle of a single resource type.
///
/// Every operation receives the per-invocation state container and the shared
/// client. Adapters record the remote identifier with `set_id`, write observed
/// attributes with `set`, and call `clear_id` when `read` finds the object gone.
pub trait ResourceAdapter: Send + Sync {
    /// Client shared by all adapters of a provider
    type Client: ?Sized + Send + Sync;

    /// Resource type name (e.g., "exoscale_elastic_ip")
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    /// Upgraders for state persisted under older schema versions
    fn upgraders(&self) -> Vec<StateUpgrader> {
        Vec::new()
    }

    fn create<'a>(
        &'a self,
        data: &'a mut ResourceData,
        client: &'a Self::Client,
    ) -> BoxFuture<'a, ProviderResult<()>>;

    fn read<'a>(
        &'a self,
        data: &'a mut ResourceData,
        client: &'a Self::Client,
    ) -> BoxFuture<'a, ProviderResult<()>>;

    fn update<'a>(
        &'a self,
        data: &'a mut ResourceData,
        client: &'a Self::Client,
    ) -> BoxFuture<'a, ProviderResult<()>>;

    fn delete<'a>(
        &'a self,
        data: &'a mut ResourceData,
        client: &'a Self::Client,
    ) -> BoxFuture<'a, ProviderResult<()>>;

    /// Adopt an existing remote object given a user-supplied import id
    fn import<'a>(
        &'a self,
        import_id: &'a str,
        data: &'a mut ResourceData,
        client: &'a Self::Client,
    ) -> BoxFuture<'a, ProviderResult<()>>;
}

/// Main Provider trait
///
/// Dispatches lifecycle calls to the adapter registered for the resource type
/// of the given state container. All operations are async and involve side effects.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "exoscale")
    fn name(&self) -> &'static str;

    /// Schemas of every resource type this Provider can handle
    fn schemas(&self) -> Vec<ResourceSchema>;

    fn schema(&self, resource_type: &str) -> Option<ResourceSchema> {
        self.schemas()
            .into_iter()
            .find(|s| s.resource_type == resource_type)
    }

    /// Bring state persisted at `version` up to the current schema version
    fn upgrade_state(
        &self,
        resource_type: &str,
        version: u32,
        raw: RawState,
    ) -> ProviderResult<RawState>;

    fn create<'a>(&'a self, data: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>>;

    fn read<'a>(&'a self, data: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>>;

    fn update<'a>(&'a self, data: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>>;

    fn delete<'a>(&'a self, data: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>>;

    fn import<'a>(
        &'a self,
        import_id: &'a str,
        data: &'a mut ResourceData,
    ) -> BoxFuture<'a, ProviderResult<()>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn schemas(&self) -> Vec<ResourceSchema> {
        (**self).schemas()
    }

    fn upgrade_state(
        &self,
        resource_type: &str,
        version: u32,
        raw: RawState,
    ) -> ProviderResult<RawState> {
        (**self).upgrade_state(resource_type, version, raw)
    }

    fn create<'a>(&'a self, data: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
        (**self).create(data)
    }

    fn read<'a>(&'a self, data: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
        (**self).read(data)
    }

    fn update<'a>(&'a self, data: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
        (**self).update(data)
    }

    fn delete<'a>(&'a self, data: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
        (**self).delete(data)
    }

    fn import<'a>(
        &'a self,
        import_id: &'a str,
        data: &'a mut ResourceData,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        (**self).import(import_id, data)
    }
}
