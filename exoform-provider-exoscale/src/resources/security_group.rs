//! Security Group - `exoscale_security_group`
//!
//! Groups live in the provider's default zone. Only the external sources can
//! change in place; they are reconciled one CIDR at a time.

use std::collections::BTreeSet;

use exoform_core::differ::set_difference;
use exoform_core::provider::{BoxFuture, ProviderError, ProviderResult, ResourceAdapter};
use exoform_core::resource::{Fields, FromAttributes, ResourceData, Value};
use exoform_core::schema::{AttributeSchema, AttributeType, ResourceSchema, TypeError, types};
use exoform_core::timeouts::{Phase, with_deadline};
use exoform_core::upgrade::{RawState, StateUpgrader};
use log::debug;

use super::{ProviderClient, partial, provider_zone, with_context};
use crate::client::types::SecurityGroup;
use crate::utils::{parse_import_id, require_id};

pub const TYPE_NAME: &str = "exoscale_security_group";

/// Version 1 stores the name lowercased, as the API reports it
pub const SCHEMA_VERSION: u32 = 1;

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE_NAME)
        .with_version(SCHEMA_VERSION)
        .with_description("Exoscale security group")
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .force_new()
                .case_insensitive(),
        )
        .attribute(AttributeSchema::new("description", AttributeType::String).force_new())
        .attribute(
            AttributeSchema::new("external_sources", AttributeType::Set(Box::new(types::cidr())))
                .with_description("CIDR networks allowed to reach members of the group"),
        )
}

/// Lowercase the persisted name
fn upgrade_v0(mut raw: RawState) -> ProviderResult<RawState> {
    let name = raw
        .get("name")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| ProviderError::migration("unable to get resource name during migration"))?
        .to_lowercase();
    raw.insert("name".to_string(), serde_json::Value::String(name));
    Ok(raw)
}

#[derive(Debug, Clone, PartialEq)]
struct SecurityGroupConfig {
    name: String,
    description: Option<String>,
    external_sources: BTreeSet<String>,
}

impl FromAttributes for SecurityGroupConfig {
    fn from_attributes(fields: &Fields<'_>) -> Result<Self, TypeError> {
        Ok(Self {
            name: fields.required_string("name")?,
            description: fields.non_empty_string("description")?,
            external_sources: fields.string_set("external_sources")?,
        })
    }
}

fn apply(data: &mut ResourceData, group: &SecurityGroup) -> ProviderResult<()> {
    data.set("name", group.name.clone().unwrap_or_default())?;
    data.set("description", group.description.clone().unwrap_or_default())?;
    data.set(
        "external_sources",
        Value::string_set(group.external_sources.iter().flatten().cloned()),
    )?;
    Ok(())
}

async fn create(data: &mut ResourceData, client: &ProviderClient) -> ProviderResult<()> {
    debug!("{}: beginning create", data.id_string());

    let config: SecurityGroupConfig = data.decode()?;
    let zone = client.default_zone();
    let request = SecurityGroup {
        name: Some(config.name.clone()),
        description: config.description.clone(),
        ..Default::default()
    };

    let created = client.api().create_security_group(zone, &request).await?;
    let id = created
        .id
        .ok_or_else(|| ProviderError::new("security group created without an id"))?;
    data.set_id(&id);

    for cidr in &config.external_sources {
        client
            .api()
            .add_external_source_to_security_group(zone, &id, cidr)
            .await
            .map_err(|e| partial(&format!("unable to add external source {}", cidr), e))?;
    }

    debug!("{}: create finished successfully", data.id_string());
    read(data, client).await
}

async fn read(data: &mut ResourceData, client: &ProviderClient) -> ProviderResult<()> {
    debug!("{}: beginning read", data.id_string());

    let id = require_id(data)?;
    let group = match client
        .api()
        .get_security_group(client.default_zone(), &id)
        .await
    {
        Ok(group) => group,
        Err(e) if e.is_not_found() => {
            debug!("{}: no longer exists, removing from state", data.id_string());
            data.clear_id();
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    apply(data, &group)?;
    debug!("{}: read finished successfully", data.id_string());
    Ok(())
}

async fn update(data: &mut ResourceData, client: &ProviderClient) -> ProviderResult<()> {
    debug!("{}: beginning update", data.id_string());

    let zone = client.default_zone();
    let id = require_id(data)?;

    if data.has_change("external_sources") {
        let old: SecurityGroupConfig = data.decode_prior()?;
        let new: SecurityGroupConfig = data.decode_desired()?;
        let changes = set_difference(&old.external_sources, &new.external_sources);

        for cidr in &changes.added {
            client
                .api()
                .add_external_source_to_security_group(zone, &id, cidr)
                .await
                .map_err(|e| with_context(&format!("unable to add external source {}", cidr), e))?;
        }
        for cidr in &changes.removed {
            client
                .api()
                .remove_external_source_from_security_group(zone, &id, cidr)
                .await
                .map_err(|e| {
                    with_context(&format!("unable to remove external source {}", cidr), e)
                })?;
        }
    }

    debug!("{}: update finished successfully", data.id_string());
    read(data, client).await
}

async fn delete(data: &mut ResourceData, client: &ProviderClient) -> ProviderResult<()> {
    debug!("{}: beginning delete", data.id_string());

    let id = require_id(data)?;
    client
        .api()
        .delete_security_group(client.default_zone(), &id)
        .await?;

    debug!("{}: delete finished successfully", data.id_string());
    Ok(())
}

/// Import by id or by name
async fn import(
    import_id: &str,
    data: &mut ResourceData,
    client: &ProviderClient,
) -> ProviderResult<()> {
    let (zone, id_or_name) = parse_import_id(import_id)?;
    let zone = provider_zone(client, zone)?;

    let group = match client.api().find_security_group(zone, id_or_name).await {
        Ok(group) => group,
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if let Some(id) = &group.id {
        data.set_id(id);
    }
    apply(data, &group)
}

pub struct SecurityGroupAdapter;

impl ResourceAdapter for SecurityGroupAdapter {
    type Client = ProviderClient;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    fn upgraders(&self) -> Vec<StateUpgrader> {
        vec![StateUpgrader::new(0, upgrade_v0)]
    }

    fn create<'a>(
        &'a self,
        data: &'a mut ResourceData,
        client: &'a ProviderClient,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(with_deadline(
            Phase::Create,
            data.timeout(Phase::Create),
            create(data, client),
        ))
    }

    fn read<'a>(
        &'a self,
        data: &'a mut ResourceData,
        client: &'a ProviderClient,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(with_deadline(
            Phase::Read,
            data.timeout(Phase::Read),
            read(data, client),
        ))
    }

    fn update<'a>(
        &'a self,
        data: &'a mut ResourceData,
        client: &'a ProviderClient,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(with_deadline(
            Phase::Update,
            data.timeout(Phase::Update),
            update(data, client),
        ))
    }

    fn delete<'a>(
        &'a self,
        data: &'a mut ResourceData,
        client: &'a ProviderClient,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(with_deadline(
            Phase::Delete,
            data.timeout(Phase::Delete),
            delete(data, client),
        ))
    }

    fn import<'a>(
        &'a self,
        import_id: &'a str,
        data: &'a mut ResourceData,
        client: &'a ProviderClient,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(with_deadline(
            Phase::Read,
            data.timeout(Phase::Read),
            import(import_id, data, client),
        ))
    }
}
