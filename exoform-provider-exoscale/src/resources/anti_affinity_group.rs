//! Anti-Affinity Group - `exoscale_anti_affinity_group`
//!
//! Every configurable attribute forces replacement, so update only refreshes.

use exoform_core::provider::{BoxFuture, ProviderError, ProviderResult, ResourceAdapter};
use exoform_core::resource::{Fields, FromAttributes, ResourceData, Value};
use exoform_core::schema::{AttributeSchema, AttributeType, ResourceSchema, TypeError};
use exoform_core::timeouts::{Phase, with_deadline};
use log::debug;

use super::{ProviderClient, provider_zone};
use crate::client::types::AntiAffinityGroup;
use crate::utils::{parse_import_id, require_id};

pub const TYPE_NAME: &str = "exoscale_anti_affinity_group";

/// The only placement policy the API offers
const HOST_ANTI_AFFINITY: &str = "host anti-affinity";

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE_NAME)
        .with_description("Exoscale anti-affinity group")
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("description", AttributeType::String).force_new())
        .attribute(
            AttributeSchema::new(
                "type",
                AttributeType::Enum(vec![HOST_ANTI_AFFINITY.to_string()]),
            )
            .force_new()
            .with_default(Value::from(HOST_ANTI_AFFINITY)),
        )
        .attribute(
            AttributeSchema::new(
                "instance_ids",
                AttributeType::Set(Box::new(AttributeType::String)),
            )
            .computed()
            .with_description("Instances currently member of the group"),
        )
}

#[derive(Debug, Clone, PartialEq)]
struct AntiAffinityGroupConfig {
    name: String,
    description: Option<String>,
}

impl FromAttributes for AntiAffinityGroupConfig {
    fn from_attributes(fields: &Fields<'_>) -> Result<Self, TypeError> {
        Ok(Self {
            name: fields.required_string("name")?,
            description: fields.non_empty_string("description")?,
        })
    }
}

fn apply(data: &mut ResourceData, group: &AntiAffinityGroup) -> ProviderResult<()> {
    data.set("name", group.name.clone().unwrap_or_default())?;
    data.set("description", group.description.clone().unwrap_or_default())?;
    data.set("type", HOST_ANTI_AFFINITY)?;
    data.set(
        "instance_ids",
        Value::string_set(
            group
                .instances
                .iter()
                .flatten()
                .filter_map(|i| i.id.clone()),
        ),
    )?;
    Ok(())
}

async fn create(data: &mut ResourceData, client: &ProviderClient) -> ProviderResult<()> {
    debug!("{}: beginning create", data.id_string());

    let config: AntiAffinityGroupConfig = data.decode()?;
    let request = AntiAffinityGroup {
        name: Some(config.name),
        description: config.description,
        ..Default::default()
    };

    let created = client
        .api()
        .create_anti_affinity_group(client.default_zone(), &request)
        .await?;
    let id = created
        .id
        .ok_or_else(|| ProviderError::new("anti-affinity group created without an id"))?;
    data.set_id(id);

    debug!("{}: create finished successfully", data.id_string());
    read(data, client).await
}

async fn read(data: &mut ResourceData, client: &ProviderClient) -> ProviderResult<()> {
    debug!("{}: beginning read", data.id_string());

    let id = require_id(data)?;
    let group = match client
        .api()
        .get_anti_affinity_group(client.default_zone(), &id)
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

async fn delete(data: &mut ResourceData, client: &ProviderClient) -> ProviderResult<()> {
    debug!("{}: beginning delete", data.id_string());

    let id = require_id(data)?;
    client
        .api()
        .delete_anti_affinity_group(client.default_zone(), &id)
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

    let group = match client.api().find_anti_affinity_group(zone, id_or_name).await {
        Ok(group) => group,
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if let Some(id) = &group.id {
        data.set_id(id);
    }
    apply(data, &group)
}

pub struct AntiAffinityGroupAdapter;

impl ResourceAdapter for AntiAffinityGroupAdapter {
    type Client = ProviderClient;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        schema()
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
            read(data, client),
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
