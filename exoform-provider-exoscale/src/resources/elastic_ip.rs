//! Elastic IP - `exoscale_elastic_ip`
//!
//! A zoned public address with an optional healthcheck and reverse DNS record.
//! The reverse DNS record is a separate API object managed alongside the IP.

use std::collections::BTreeMap;

use exoform_core::provider::{BoxFuture, ProviderError, ProviderResult, ResourceAdapter};
use exoform_core::resource::{Fields, FromAttributes, ResourceData, Value};
use exoform_core::schema::{
    AttributeSchema, AttributeType, BlockSchema, ResourceSchema, TypeError, types,
};
use exoform_core::timeouts::{Phase, with_deadline};
use log::debug;

use super::{ProviderClient, partial, with_context};
use crate::client::types::{ElasticIp, Healthcheck};
use crate::utils::{block, labels_value, parse_import_id, require_id};

pub const TYPE_NAME: &str = "exoscale_elastic_ip";

const DEFAULT_HEALTHCHECK_INTERVAL: i64 = 10;
const DEFAULT_HEALTHCHECK_TIMEOUT: i64 = 3;
const DEFAULT_HEALTHCHECK_STRIKES_FAIL: i64 = 2;
const DEFAULT_HEALTHCHECK_STRIKES_OK: i64 = 3;

fn healthcheck_schema() -> BlockSchema {
    BlockSchema::new()
        .max_items(1)
        .attribute(
            AttributeSchema::new(
                "mode",
                types::string_match(
                    "^(?:tcp|https?)$",
                    r#"must be either "tcp", "http", or "https""#,
                ),
            )
            .required(),
        )
        .attribute(AttributeSchema::new("port", types::int_between(1, 65535)).required())
        .attribute(
            AttributeSchema::new("interval", types::int_between(5, 300))
                .with_default(Value::Int(DEFAULT_HEALTHCHECK_INTERVAL))
                .with_description("Interval between probes, in seconds"),
        )
        .attribute(
            AttributeSchema::new("timeout", types::int_between(2, 60))
                .with_default(Value::Int(DEFAULT_HEALTHCHECK_TIMEOUT))
                .with_description("Probe timeout, in seconds"),
        )
        .attribute(
            AttributeSchema::new("strikes_fail", types::int_between(1, 20))
                .with_default(Value::Int(DEFAULT_HEALTHCHECK_STRIKES_FAIL)),
        )
        .attribute(
            AttributeSchema::new("strikes_ok", types::int_between(1, 20))
                .with_default(Value::Int(DEFAULT_HEALTHCHECK_STRIKES_OK)),
        )
        .attribute(AttributeSchema::new("tls_skip_verify", AttributeType::Bool))
        .attribute(AttributeSchema::new("tls_sni", AttributeType::String))
        .attribute(AttributeSchema::new("uri", AttributeType::String))
}

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE_NAME)
        .with_description("Exoscale elastic IP")
        .attribute(
            AttributeSchema::new("zone", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new(
                "address_family",
                AttributeType::Enum(vec!["inet4".to_string(), "inet6".to_string()]),
            )
            .optional_computed()
            .force_new(),
        )
        .attribute(AttributeSchema::new("cidr", AttributeType::String).computed())
        .attribute(AttributeSchema::new("description", AttributeType::String).optional_computed())
        .attribute(
            AttributeSchema::new(
                "healthcheck",
                AttributeType::Block(Box::new(healthcheck_schema())),
            )
            .optional_computed(),
        )
        .attribute(AttributeSchema::new("ip_address", AttributeType::String).computed())
        .attribute(
            AttributeSchema::new("reverse_dns", AttributeType::String)
                .with_description("Domain name of the PTR record"),
        )
        .attribute(AttributeSchema::new(
            "labels",
            AttributeType::Map(Box::new(AttributeType::String)),
        ))
}

#[derive(Debug, Clone, PartialEq)]
struct ElasticIpConfig {
    zone: String,
    address_family: Option<String>,
    description: Option<String>,
    healthcheck: Option<HealthcheckConfig>,
    reverse_dns: Option<String>,
    labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq)]
struct HealthcheckConfig {
    mode: String,
    port: i64,
    interval: i64,
    timeout: i64,
    strikes_fail: i64,
    strikes_ok: i64,
    tls_skip_verify: bool,
    tls_sni: Option<String>,
    uri: Option<String>,
}

impl FromAttributes for ElasticIpConfig {
    fn from_attributes(fields: &Fields<'_>) -> Result<Self, TypeError> {
        let healthcheck = fields
            .block("healthcheck")?
            .map(|hc| HealthcheckConfig::from_attributes(&hc))
            .transpose()
            .map_err(|e| e.in_attribute("healthcheck"))?;

        Ok(Self {
            zone: fields.required_string("zone")?,
            address_family: fields.non_empty_string("address_family")?,
            description: fields.string("description")?,
            healthcheck,
            reverse_dns: fields.string("reverse_dns")?,
            labels: fields.string_map("labels")?,
        })
    }
}

impl FromAttributes for HealthcheckConfig {
    fn from_attributes(fields: &Fields<'_>) -> Result<Self, TypeError> {
        Ok(Self {
            mode: fields.required_string("mode")?,
            port: fields.required_int("port")?,
            interval: fields
                .int("interval")?
                .unwrap_or(DEFAULT_HEALTHCHECK_INTERVAL),
            timeout: fields.int("timeout")?.unwrap_or(DEFAULT_HEALTHCHECK_TIMEOUT),
            strikes_fail: fields
                .int("strikes_fail")?
                .unwrap_or(DEFAULT_HEALTHCHECK_STRIKES_FAIL),
            strikes_ok: fields
                .int("strikes_ok")?
                .unwrap_or(DEFAULT_HEALTHCHECK_STRIKES_OK),
            tls_skip_verify: fields.bool("tls_skip_verify")?.unwrap_or(false),
            tls_sni: fields.non_empty_string("tls_sni")?,
            uri: fields.non_empty_string("uri")?,
        })
    }
}

impl From<&HealthcheckConfig> for Healthcheck {
    fn from(hc: &HealthcheckConfig) -> Self {
        Healthcheck {
            mode: Some(hc.mode.clone()),
            port: Some(hc.port),
            interval: Some(hc.interval),
            timeout: Some(hc.timeout),
            strikes_ok: Some(hc.strikes_ok),
            strikes_fail: Some(hc.strikes_fail),
            tls_sni: hc.tls_sni.clone(),
            tls_skip_verify: Some(hc.tls_skip_verify),
            uri: hc.uri.clone(),
        }
    }
}

fn healthcheck_value(hc: &Healthcheck) -> Value {
    block([
        ("mode", hc.mode.clone().map(Value::from)),
        ("port", hc.port.map(Value::Int)),
        ("interval", hc.interval.map(Value::Int)),
        ("timeout", hc.timeout.map(Value::Int)),
        ("strikes_fail", hc.strikes_fail.map(Value::Int)),
        ("strikes_ok", hc.strikes_ok.map(Value::Int)),
        ("tls_skip_verify", hc.tls_skip_verify.map(Value::Bool)),
        ("tls_sni", hc.tls_sni.clone().map(Value::from)),
        ("uri", hc.uri.clone().map(Value::from)),
    ])
}

/// Write the remote elastic IP and its reverse DNS domain into `data`
fn apply(
    data: &mut ResourceData,
    zone: &str,
    eip: &ElasticIp,
    reverse_dns: &str,
) -> ProviderResult<()> {
    data.set("zone", zone)?;
    data.set("address_family", eip.addressfamily.clone().unwrap_or_default())?;
    data.set("cidr", eip.cidr.clone().unwrap_or_default())?;
    data.set("description", eip.description.clone().unwrap_or_default())?;
    match &eip.healthcheck {
        Some(hc) => data.set("healthcheck", healthcheck_value(hc))?,
        None => data.unset("healthcheck"),
    }
    data.set("ip_address", eip.ip.clone().unwrap_or_default())?;
    data.set(
        "reverse_dns",
        reverse_dns.strip_suffix('.').unwrap_or(reverse_dns),
    )?;
    data.set("labels", labels_value(eip.labels.as_ref()))?;
    Ok(())
}

async fn create(data: &mut ResourceData, client: &ProviderClient) -> ProviderResult<()> {
    debug!("{}: beginning create", data.id_string());

    let config: ElasticIpConfig = data.decode()?;
    let request = ElasticIp {
        addressfamily: config.address_family.clone(),
        description: config.description.clone(),
        healthcheck: config.healthcheck.as_ref().map(Healthcheck::from),
        labels: config.labels.clone(),
        ..Default::default()
    };

    let created = client.api().create_elastic_ip(&config.zone, &request).await?;
    let id = created
        .id
        .ok_or_else(|| ProviderError::new("elastic IP created without an id"))?;
    data.set_id(&id);

    if let Some(domain) = config.reverse_dns.as_deref().filter(|d| !d.is_empty()) {
        client
            .api()
            .update_elastic_ip_reverse_dns(&config.zone, &id, domain)
            .await
            .map_err(|e| partial("unable to create Reverse DNS record", e))?;
    }

    debug!("{}: create finished successfully", data.id_string());
    read(data, client).await
}

async fn read(data: &mut ResourceData, client: &ProviderClient) -> ProviderResult<()> {
    debug!("{}: beginning read", data.id_string());

    let zone = data.get_string("zone");
    let id = require_id(data)?;

    let eip = match client.api().get_elastic_ip(&zone, &id).await {
        Ok(eip) => eip,
        Err(e) if e.is_not_found() => {
            debug!("{}: no longer exists, removing from state", data.id_string());
            data.clear_id();
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let reverse_dns = match client.api().get_elastic_ip_reverse_dns(&zone, &id).await {
        Ok(domain) => domain,
        Err(e) if e.is_not_found() => String::new(),
        Err(e) => return Err(with_context("unable to retrieve reverse DNS", e)),
    };

    apply(data, &zone, &eip, &reverse_dns)?;
    debug!("{}: read finished successfully", data.id_string());
    Ok(())
}

async fn update(data: &mut ResourceData, client: &ProviderClient) -> ProviderResult<()> {
    debug!("{}: beginning update", data.id_string());

    let zone = data.get_string("zone");
    let id = require_id(data)?;
    let config: ElasticIpConfig = data.decode_desired()?;

    let mut eip = client.api().get_elastic_ip(&zone, &id).await?;
    let mut updated = false;

    if data.has_change("description") {
        eip.description = Some(config.description.clone().unwrap_or_default());
        updated = true;
    }
    if data.has_change("healthcheck")
        && let Some(hc) = &config.healthcheck
    {
        eip.healthcheck = Some(Healthcheck::from(hc));
        updated = true;
    }
    if data.has_change("labels") {
        eip.labels = Some(config.labels.clone().unwrap_or_default());
        updated = true;
    }

    if updated {
        client.api().update_elastic_ip(&zone, &eip).await?;
    }

    if data.has_change("reverse_dns") {
        match config.reverse_dns.as_deref().unwrap_or_default() {
            "" => {
                client
                    .api()
                    .delete_elastic_ip_reverse_dns(&zone, &id)
                    .await?
            }
            domain => {
                client
                    .api()
                    .update_elastic_ip_reverse_dns(&zone, &id, domain)
                    .await?
            }
        }
    }

    debug!("{}: update finished successfully", data.id_string());
    read(data, client).await
}

async fn delete(data: &mut ResourceData, client: &ProviderClient) -> ProviderResult<()> {
    debug!("{}: beginning delete", data.id_string());

    let zone = data.get_string("zone");
    let id = require_id(data)?;

    match client.api().delete_elastic_ip_reverse_dns(&zone, &id).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(with_context("unable to delete reverse DNS record", e)),
    }

    client.api().delete_elastic_ip(&zone, &id).await?;

    debug!("{}: delete finished successfully", data.id_string());
    Ok(())
}

async fn import(
    import_id: &str,
    data: &mut ResourceData,
    client: &ProviderClient,
) -> ProviderResult<()> {
    let (zone, id) = parse_import_id(import_id)?;
    let zone = zone.unwrap_or(client.default_zone()).to_string();
    data.set_id(id);
    data.set("zone", zone)?;
    read(data, client).await
}

pub struct ElasticIpAdapter;

impl ResourceAdapter for ElasticIpAdapter {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCompute, create_data, state_data, update_data};
    use exoform_core::provider::ErrorKind;
    use exoform_core::resource::Attributes;

    fn healthcheck(mode: &str, port: i64) -> Value {
        block([
            ("mode", Some(Value::from(mode))),
            ("port", Some(Value::Int(port))),
        ])
    }

    #[tokio::test]
    async fn create_then_read_matches_desired() {
        let fake = FakeCompute::new();
        let client = fake.client();
        let mut data = create_data(
            schema(),
            [
                ("zone", Value::from("ch-gva-2")),
                ("description", Value::from("web")),
                ("healthcheck", healthcheck("tcp", 80)),
                ("reverse_dns", Value::from("web.example.net")),
                ("labels", Value::string_map([("env", "prod")])),
            ],
        );

        ElasticIpAdapter.create(&mut data, &client).await.unwrap();

        let id = data.id().unwrap().to_string();
        assert_eq!(fake.reverse_dns(&id).as_deref(), Some("web.example.net."));
        let schema = schema();
        assert!(
            schema
                .changed_attributes(data.observed(), data.desired())
                .is_empty()
        );
        for computed in ["ip_address", "cidr", "address_family"] {
            assert!(!data.observed()[computed].is_zero(), "{} is empty", computed);
        }
        assert_eq!(data.observed()["reverse_dns"], Value::from("web.example.net"));
    }

    #[tokio::test]
    async fn healthcheck_interval_defaults_to_ten_seconds() {
        let fake = FakeCompute::new();
        let mut data = create_data(
            schema(),
            [
                ("zone", Value::from("ch-gva-2")),
                ("healthcheck", healthcheck("tcp", 80)),
            ],
        );

        ElasticIpAdapter
            .create(&mut data, &fake.client())
            .await
            .unwrap();

        let remote = fake.elastic_ip(data.id().unwrap()).unwrap();
        assert_eq!(remote.healthcheck.unwrap().interval, Some(10));
        let hc = &data.observed()["healthcheck"].as_list().unwrap()[0];
        assert_eq!(hc.as_map().unwrap()["interval"], Value::Int(10));
        assert_eq!(hc.as_map().unwrap()["timeout"], Value::Int(3));
    }

    #[tokio::test]
    async fn failed_reverse_dns_keeps_identifier() {
        let fake = FakeCompute::new();
        fake.fail("update_elastic_ip_reverse_dns");
        let mut data = create_data(
            schema(),
            [
                ("zone", Value::from("ch-gva-2")),
                ("reverse_dns", Value::from("web.example.net")),
            ],
        );

        let err = ElasticIpAdapter
            .create(&mut data, &fake.client())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::PartialCompletion);
        assert!(err.message.starts_with("unable to create Reverse DNS record"));
        assert!(fake.elastic_ip(data.id().unwrap()).is_some());
    }

    #[tokio::test]
    async fn read_of_missing_ip_clears_identifier() {
        let fake = FakeCompute::new();
        let client = fake.client();
        let mut data = create_data(schema(), [("zone", Value::from("ch-gva-2"))]);
        ElasticIpAdapter.create(&mut data, &client).await.unwrap();
        fake.forget_elastic_ip(data.id().unwrap());

        let mut refreshed = state_data(&data);
        ElasticIpAdapter.read(&mut refreshed, &client).await.unwrap();

        assert!(refreshed.id().is_none());
        assert!(refreshed.observed().is_empty());
    }

    #[tokio::test]
    async fn read_failure_on_reverse_dns_is_reported() {
        let fake = FakeCompute::new();
        let client = fake.client();
        let mut data = create_data(schema(), [("zone", Value::from("ch-gva-2"))]);
        ElasticIpAdapter.create(&mut data, &client).await.unwrap();
        fake.fail("get_elastic_ip_reverse_dns");

        let mut refreshed = state_data(&data);
        let err = ElasticIpAdapter
            .read(&mut refreshed, &client)
            .await
            .unwrap_err();
        assert!(err.message.starts_with("unable to retrieve reverse DNS"));
        assert!(refreshed.id().is_some());
    }

    #[tokio::test]
    async fn update_batches_changes_into_one_call() {
        let fake = FakeCompute::new();
        let client = fake.client();
        let mut data = create_data(
            schema(),
            [
                ("zone", Value::from("ch-gva-2")),
                ("description", Value::from("old")),
                ("reverse_dns", Value::from("old.example.net")),
            ],
        );
        ElasticIpAdapter.create(&mut data, &client).await.unwrap();
        fake.clear_calls();

        let desired = Attributes::from([
            ("zone".to_string(), Value::from("ch-gva-2")),
            ("description".to_string(), Value::from("new")),
            ("healthcheck".to_string(), healthcheck("https", 443)),
            ("labels".to_string(), Value::string_map([("team", "ops")])),
        ]);
        let mut updated = update_data(&data, desired);
        ElasticIpAdapter.update(&mut updated, &client).await.unwrap();

        assert_eq!(fake.count("update_elastic_ip"), 1);
        assert_eq!(fake.count("delete_elastic_ip_reverse_dns"), 1);
        let id = updated.id().unwrap();
        let remote = fake.elastic_ip(id).unwrap();
        assert_eq!(remote.description.as_deref(), Some("new"));
        assert_eq!(remote.healthcheck.unwrap().mode.as_deref(), Some("https"));
        assert!(fake.reverse_dns(id).is_none());
        assert_eq!(updated.observed()["reverse_dns"], Value::from(""));
    }

    #[tokio::test]
    async fn update_without_changes_makes_no_mutation() {
        let fake = FakeCompute::new();
        let client = fake.client();
        let mut data = create_data(schema(), [("zone", Value::from("ch-gva-2"))]);
        ElasticIpAdapter.create(&mut data, &client).await.unwrap();
        fake.clear_calls();

        let desired = Attributes::from([("zone".to_string(), Value::from("ch-gva-2"))]);
        let mut updated = update_data(&data, desired);
        ElasticIpAdapter.update(&mut updated, &client).await.unwrap();

        assert_eq!(fake.count("update_elastic_ip"), 0);
        assert_eq!(fake.count("update_elastic_ip_reverse_dns"), 0);
        assert_eq!(fake.count("delete_elastic_ip_reverse_dns"), 0);
    }

    #[tokio::test]
    async fn delete_tolerates_missing_reverse_dns() {
        let fake = FakeCompute::new();
        let client = fake.client();
        let mut data = create_data(schema(), [("zone", Value::from("ch-gva-2"))]);
        ElasticIpAdapter.create(&mut data, &client).await.unwrap();

        let mut deleting = state_data(&data);
        ElasticIpAdapter.delete(&mut deleting, &client).await.unwrap();

        assert_eq!(fake.count("delete_elastic_ip_reverse_dns"), 1);
        assert!(fake.elastic_ip(data.id().unwrap()).is_none());
    }

    #[tokio::test]
    async fn delete_of_missing_ip_fails() {
        let fake = FakeCompute::new();
        let client = fake.client();
        let mut data = create_data(schema(), [("zone", Value::from("ch-gva-2"))]);
        ElasticIpAdapter.create(&mut data, &client).await.unwrap();
        fake.forget_elastic_ip(data.id().unwrap());

        let mut deleting = state_data(&data);
        let err = ElasticIpAdapter
            .delete(&mut deleting, &client)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn import_reads_zoned_identifier() {
        let fake = FakeCompute::new();
        let client = fake.client();
        let mut data = create_data(
            schema(),
            [
                ("zone", Value::from("de-fra-1")),
                ("description", Value::from("imported")),
            ],
        );
        ElasticIpAdapter.create(&mut data, &client).await.unwrap();
        let id = data.id().unwrap().to_string();

        let mut imported = ResourceData::new(std::sync::Arc::new(schema()));
        ElasticIpAdapter
            .import(&format!("{}@de-fra-1", id), &mut imported, &client)
            .await
            .unwrap();

        assert_eq!(imported.id(), Some(id.as_str()));
        assert_eq!(imported.get_string("zone"), "de-fra-1");
        assert_eq!(imported.get_string("description"), "imported");
    }

    #[test]
    fn schema_rejects_bad_healthcheck() {
        let schema = schema();
        let attrs = Attributes::from([
            ("zone".to_string(), Value::from("ch-gva-2")),
            ("healthcheck".to_string(), healthcheck("udp", 80)),
        ]);
        assert!(schema.validate(&attrs).is_err());

        let attrs = Attributes::from([
            ("zone".to_string(), Value::from("ch-gva-2")),
            ("healthcheck".to_string(), healthcheck("tcp", 70000)),
        ]);
        assert!(schema.validate(&attrs).is_err());

        let attrs = Attributes::from([
            ("zone".to_string(), Value::from("ch-gva-2")),
            ("healthcheck".to_string(), healthcheck("http", 8080)),
        ]);
        assert!(schema.validate(&attrs).is_ok());
    }
}
