//! Block Storage Volume - `exoscale_block_storage_volume`
//!
//! Name and labels change in one update call. Size changes go through a
//! separate resize call and may only grow.

use std::collections::BTreeMap;

use exoform_core::provider::{BoxFuture, ProviderError, ProviderResult, ResourceAdapter};
use exoform_core::resource::{Fields, FromAttributes, ResourceData, Value};
use exoform_core::schema::{AttributeSchema, AttributeType, ResourceSchema, TypeError, types};
use exoform_core::timeouts::{Phase, with_deadline};
use log::debug;

use super::{ProviderClient, with_context};
use crate::client::types::{BlockStorageVolume, Reference};
use crate::utils::{labels_value, parse_import_id, require_id};

pub const TYPE_NAME: &str = "exoscale_block_storage_volume";

pub const MIN_SIZE_GIB: i64 = 10;
pub const MAX_SIZE_GIB: i64 = 10240;

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE_NAME)
        .with_description("Exoscale block storage volume")
        .attribute(
            AttributeSchema::new("zone", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("name", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("size", types::int_between(MIN_SIZE_GIB, MAX_SIZE_GIB))
                .optional_computed()
                .with_description("Size in GiB"),
        )
        .attribute(AttributeSchema::new(
            "labels",
            AttributeType::Map(Box::new(AttributeType::String)),
        ))
        .attribute(
            AttributeSchema::new("snapshot_target", AttributeType::String)
                .force_new()
                .with_description("Snapshot the volume is created from"),
        )
        .attribute(AttributeSchema::new("blocksize", AttributeType::Int).computed())
        .attribute(AttributeSchema::new("state", AttributeType::String).computed())
        .attribute(AttributeSchema::new("created_at", AttributeType::String).computed())
        .attribute(AttributeSchema::new("attached_instance_id", AttributeType::String).computed())
}

#[derive(Debug, Clone, PartialEq)]
struct VolumeConfig {
    zone: String,
    name: String,
    size: Option<i64>,
    labels: Option<BTreeMap<String, String>>,
    snapshot_target: Option<String>,
}

impl FromAttributes for VolumeConfig {
    fn from_attributes(fields: &Fields<'_>) -> Result<Self, TypeError> {
        Ok(Self {
            zone: fields.required_string("zone")?,
            name: fields.required_string("name")?,
            size: fields.int("size")?,
            labels: fields.string_map("labels")?,
            snapshot_target: fields.non_empty_string("snapshot_target")?,
        })
    }
}

fn apply(data: &mut ResourceData, zone: &str, volume: &BlockStorageVolume) -> ProviderResult<()> {
    // The API does not always echo the source snapshot back
    let snapshot = volume
        .block_storage_snapshot
        .as_ref()
        .and_then(|s| s.id.clone())
        .unwrap_or_else(|| data.get_string("snapshot_target"));

    data.set("zone", zone)?;
    data.set("name", volume.name.clone().unwrap_or_default())?;
    data.set("size", volume.size.unwrap_or_default())?;
    data.set("labels", labels_value(volume.labels.as_ref()))?;
    data.set("snapshot_target", snapshot)?;
    data.set("blocksize", volume.blocksize.unwrap_or_default())?;
    data.set("state", volume.state.clone().unwrap_or_default())?;
    data.set("created_at", volume.created_at.clone().unwrap_or_default())?;
    data.set(
        "attached_instance_id",
        volume
            .instance
            .as_ref()
            .and_then(|i| i.id.clone())
            .unwrap_or_default(),
    )?;
    Ok(())
}

async fn create(data: &mut ResourceData, client: &ProviderClient) -> ProviderResult<()> {
    debug!("{}: beginning create", data.id_string());

    let config: VolumeConfig = data.decode()?;
    let request = BlockStorageVolume {
        name: Some(config.name.clone()),
        size: config.size,
        labels: config.labels.clone(),
        block_storage_snapshot: config.snapshot_target.as_deref().map(Reference::new),
        ..Default::default()
    };

    let created = client
        .api()
        .create_block_storage_volume(&config.zone, &request)
        .await?;
    let id = created
        .id
        .ok_or_else(|| ProviderError::new("volume created without an id"))?;
    data.set_id(id);

    debug!("{}: create finished successfully", data.id_string());
    read(data, client).await
}

async fn read(data: &mut ResourceData, client: &ProviderClient) -> ProviderResult<()> {
    debug!("{}: beginning read", data.id_string());

    let zone = data.get_string("zone");
    let id = require_id(data)?;
    let volume = match client.api().get_block_storage_volume(&zone, &id).await {
        Ok(volume) => volume,
        Err(e) if e.is_not_found() => {
            debug!("{}: no longer exists, removing from state", data.id_string());
            data.clear_id();
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    apply(data, &zone, &volume)?;
    debug!("{}: read finished successfully", data.id_string());
    Ok(())
}

async fn update(data: &mut ResourceData, client: &ProviderClient) -> ProviderResult<()> {
    debug!("{}: beginning update", data.id_string());

    let zone = data.get_string("zone");
    let id = require_id(data)?;
    let old: VolumeConfig = data.decode_prior()?;
    let new: VolumeConfig = data.decode_desired()?;

    let resize = data.has_change("size").then_some(new.size).flatten();
    if let (Some(from), Some(to)) = (old.size, resize)
        && to < from
    {
        return Err(ProviderError::validation(format!(
            "volume size can only grow: {} GiB -> {} GiB",
            from, to
        )));
    }

    if data.has_change("name") || data.has_change("labels") {
        let request = BlockStorageVolume {
            id: Some(id.clone()),
            name: Some(new.name.clone()),
            labels: Some(new.labels.clone().unwrap_or_default()),
            ..Default::default()
        };
        client
            .api()
            .update_block_storage_volume(&zone, &request)
            .await?;
    }

    if let Some(size) = resize {
        client
            .api()
            .resize_block_storage_volume(&zone, &id, size)
            .await
            .map_err(|e| with_context("unable to resize volume", e))?;
    }

    debug!("{}: update finished successfully", data.id_string());
    read(data, client).await
}

async fn delete(data: &mut ResourceData, client: &ProviderClient) -> ProviderResult<()> {
    debug!("{}: beginning delete", data.id_string());

    let zone = data.get_string("zone");
    let id = require_id(data)?;

    if !data.get_string("attached_instance_id").is_empty() {
        match client.api().detach_block_storage_volume(&zone, &id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(with_context("unable to detach volume", e)),
        }
    }

    client
        .api()
        .delete_block_storage_volume(&zone, &id)
        .await?;

    debug!("{}: delete finished successfully", data.id_string());
    Ok(())
}

/// Import by id or by name, optionally zoned
async fn import(
    import_id: &str,
    data: &mut ResourceData,
    client: &ProviderClient,
) -> ProviderResult<()> {
    let (zone, id_or_name) = parse_import_id(import_id)?;
    let zone = zone.unwrap_or(client.default_zone()).to_string();

    let volume = match client
        .api()
        .find_block_storage_volume(&zone, id_or_name)
        .await
    {
        Ok(volume) => volume,
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if let Some(id) = &volume.id {
        data.set_id(id);
    }
    apply(data, &zone, &volume)
}

pub struct BlockStorageVolumeAdapter;

impl ResourceAdapter for BlockStorageVolumeAdapter {
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
