//! HTTP - Signed reqwest client for the Exoscale API v2
//!
//! Mutating calls return an operation which is polled until it settles. The
//! caller bounds the overall wait with the lifecycle phase deadline.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use sha2::Sha256;

use super::error::{ApiError, ApiResult};
use super::types::{
    AntiAffinityGroup, BlockStorageVolume, ElasticIp, Operation, OperationState,
    ReverseDnsRecord, SecurityGroup,
};
use super::ComputeApi;

/// Timeout of a single HTTP request
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Delay between two polls of a pending operation
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Lifetime of a request signature
const SIGNATURE_VALIDITY_SECS: i64 = 600;

type HmacSha256 = Hmac<Sha256>;

/// API key and secret
#[derive(Clone)]
pub struct Credentials {
    key: String,
    secret: String,
}

// The secret never shows up in debug output
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"<REDACTED>")
            .finish()
    }
}

impl Credentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.key.is_empty() && !self.secret.is_empty()
    }

    /// `Authorization` header value for an EXO2-HMAC-SHA256 signed request
    fn sign(&self, method: &str, path: &str, body: &str, expires: i64) -> ApiResult<String> {
        let message = format!("{} {}\n{}\n\n\n{}", method, path, body, expires);
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| ApiError::Transport(format!("unable to sign request: {}", e)))?;
        mac.update(message.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());
        Ok(format!(
            "EXO2-HMAC-SHA256 credential={},expires={},signature={}",
            self.key, expires, signature
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SecurityGroupList {
    #[serde(default)]
    security_groups: Vec<SecurityGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct AntiAffinityGroupList {
    #[serde(default)]
    anti_affinity_groups: Vec<AntiAffinityGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct BlockStorageVolumeList {
    #[serde(default)]
    block_storage_volumes: Vec<BlockStorageVolume>,
}

/// Exoscale API client
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    credentials: Credentials,
    environment: String,
    endpoint: Option<String>,
    poll_interval: Duration,
}

impl HttpClient {
    /// Client for `https://{environment}-{zone}.exoscale.com/v2`
    pub fn new(credentials: Credentials, environment: impl Into<String>) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .user_agent(concat!("exoform/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            credentials,
            environment: environment.into(),
            endpoint: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Send every request to `endpoint` regardless of zone
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn base_url(&self, zone: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}-{}.exoscale.com/v2", self.environment, zone),
        }
    }

    // =========================================================================
    // Request Plumbing
    // =========================================================================

    async fn send(
        &self,
        zone: &str,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> ApiResult<reqwest::Response> {
        let url = Url::parse(&format!("{}{}", self.base_url(zone), path))
            .map_err(|e| ApiError::Transport(format!("invalid URL: {}", e)))?;
        let body = body.map(|b| b.to_string()).unwrap_or_default();
        let expires = chrono::Utc::now().timestamp() + SIGNATURE_VALIDITY_SECS;
        let authorization = self
            .credentials
            .sign(method.as_str(), url.path(), &body, expires)?;

        log::debug!("{} {}", method, url);
        let mut request = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, authorization);
        if !body.is_empty() {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request.send().await?;
        check_status(response).await
    }

    async fn get<T: DeserializeOwned>(&self, zone: &str, path: &str) -> ApiResult<T> {
        let response = self.send(zone, Method::GET, path, None).await?;
        Ok(response.json::<T>().await?)
    }

    /// Issue a mutating call and wait for the resulting operation to settle
    async fn execute(
        &self,
        zone: &str,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> ApiResult<Operation> {
        let response = self.send(zone, method, path, body).await?;
        let operation = response.json::<Operation>().await?;
        self.wait_for_operation(zone, operation).await
    }

    /// Poll an operation until it succeeds or fails
    async fn wait_for_operation(&self, zone: &str, operation: Operation) -> ApiResult<Operation> {
        let mut operation = operation;
        loop {
            match operation.state {
                OperationState::Success => return Ok(operation),
                OperationState::Failure | OperationState::Timeout => {
                    let message = operation
                        .message
                        .or(operation.reason)
                        .unwrap_or_else(|| format!("{:?}", operation.state).to_lowercase());
                    return Err(ApiError::OperationFailed {
                        id: operation.id,
                        message,
                    });
                }
                OperationState::Pending => {
                    tokio::time::sleep(self.poll_interval).await;
                    operation = self
                        .get(zone, &format!("/operation/{}", operation.id))
                        .await?;
                }
            }
        }
    }

    /// Create through `path` and return the id of the new object
    async fn create(&self, zone: &str, path: &str, body: serde_json::Value) -> ApiResult<String> {
        let operation = self.execute(zone, Method::POST, path, Some(body)).await?;
        operation
            .reference
            .and_then(|r| r.id)
            .ok_or_else(|| ApiError::Decode(format!("operation {} has no reference", operation.id)))
    }
}

async fn check_status(response: reqwest::Response) -> ApiResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or(text);

    Err(match status.as_u16() {
        404 => ApiError::NotFound,
        400 => ApiError::InvalidRequest(message),
        401 | 403 => ApiError::Unauthorized(message),
        status => ApiError::Http { status, message },
    })
}

fn to_body<T: serde::Serialize>(value: &T) -> ApiResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

fn matches_id_or_name(id: Option<&str>, name: Option<&str>, needle: &str) -> bool {
    id == Some(needle) || name == Some(needle)
}

#[async_trait]
impl ComputeApi for HttpClient {
    async fn create_elastic_ip(&self, zone: &str, eip: &ElasticIp) -> ApiResult<ElasticIp> {
        let id = self.create(zone, "/elastic-ip", to_body(eip)?).await?;
        self.get_elastic_ip(zone, &id).await
    }

    async fn get_elastic_ip(&self, zone: &str, id: &str) -> ApiResult<ElasticIp> {
        self.get(zone, &format!("/elastic-ip/{}", id)).await
    }

    async fn update_elastic_ip(&self, zone: &str, eip: &ElasticIp) -> ApiResult<()> {
        let id = eip.id.as_deref().ok_or(ApiError::NotFound)?;
        let body = ElasticIp {
            description: eip.description.clone(),
            healthcheck: eip.healthcheck.clone(),
            labels: eip.labels.clone(),
            ..Default::default()
        };
        self.execute(zone, Method::PUT, &format!("/elastic-ip/{}", id), Some(to_body(&body)?))
            .await?;
        Ok(())
    }

    async fn delete_elastic_ip(&self, zone: &str, id: &str) -> ApiResult<()> {
        self.execute(zone, Method::DELETE, &format!("/elastic-ip/{}", id), None)
            .await?;
        Ok(())
    }

    async fn get_elastic_ip_reverse_dns(&self, zone: &str, id: &str) -> ApiResult<String> {
        let record: ReverseDnsRecord = self
            .get(zone, &format!("/reverse-dns/elastic-ip/{}", id))
            .await?;
        Ok(record.domain_name.unwrap_or_default())
    }

    async fn update_elastic_ip_reverse_dns(
        &self,
        zone: &str,
        id: &str,
        domain_name: &str,
    ) -> ApiResult<()> {
        self.execute(
            zone,
            Method::POST,
            &format!("/reverse-dns/elastic-ip/{}", id),
            Some(json!({ "domain-name": domain_name })),
        )
        .await?;
        Ok(())
    }

    async fn delete_elastic_ip_reverse_dns(&self, zone: &str, id: &str) -> ApiResult<()> {
        self.execute(
            zone,
            Method::DELETE,
            &format!("/reverse-dns/elastic-ip/{}", id),
            None,
        )
        .await?;
        Ok(())
    }

    async fn create_security_group(
        &self,
        zone: &str,
        group: &SecurityGroup,
    ) -> ApiResult<SecurityGroup> {
        let id = self.create(zone, "/security-group", to_body(group)?).await?;
        self.get_security_group(zone, &id).await
    }

    async fn get_security_group(&self, zone: &str, id: &str) -> ApiResult<SecurityGroup> {
        self.get(zone, &format!("/security-group/{}", id)).await
    }

    async fn find_security_group(
        &self,
        zone: &str,
        id_or_name: &str,
    ) -> ApiResult<SecurityGroup> {
        let list: SecurityGroupList = self.get(zone, "/security-group").await?;
        list.security_groups
            .into_iter()
            .find(|g| matches_id_or_name(g.id.as_deref(), g.name.as_deref(), id_or_name))
            .ok_or(ApiError::NotFound)
    }

    async fn delete_security_group(&self, zone: &str, id: &str) -> ApiResult<()> {
        self.execute(zone, Method::DELETE, &format!("/security-group/{}", id), None)
            .await?;
        Ok(())
    }

    async fn add_external_source_to_security_group(
        &self,
        zone: &str,
        id: &str,
        cidr: &str,
    ) -> ApiResult<()> {
        self.execute(
            zone,
            Method::PUT,
            &format!("/security-group/{}:add-source", id),
            Some(json!({ "cidr": cidr })),
        )
        .await?;
        Ok(())
    }

    async fn remove_external_source_from_security_group(
        &self,
        zone: &str,
        id: &str,
        cidr: &str,
    ) -> ApiResult<()> {
        self.execute(
            zone,
            Method::PUT,
            &format!("/security-group/{}:remove-source", id),
            Some(json!({ "cidr": cidr })),
        )
        .await?;
        Ok(())
    }

    async fn create_anti_affinity_group(
        &self,
        zone: &str,
        group: &AntiAffinityGroup,
    ) -> ApiResult<AntiAffinityGroup> {
        let id = self
            .create(zone, "/anti-affinity-group", to_body(group)?)
            .await?;
        self.get_anti_affinity_group(zone, &id).await
    }

    async fn get_anti_affinity_group(&self, zone: &str, id: &str) -> ApiResult<AntiAffinityGroup> {
        self.get(zone, &format!("/anti-affinity-group/{}", id)).await
    }

    async fn find_anti_affinity_group(
        &self,
        zone: &str,
        id_or_name: &str,
    ) -> ApiResult<AntiAffinityGroup> {
        let list: AntiAffinityGroupList = self.get(zone, "/anti-affinity-group").await?;
        list.anti_affinity_groups
            .into_iter()
            .find(|g| matches_id_or_name(g.id.as_deref(), g.name.as_deref(), id_or_name))
            .ok_or(ApiError::NotFound)
    }

    async fn delete_anti_affinity_group(&self, zone: &str, id: &str) -> ApiResult<()> {
        self.execute(
            zone,
            Method::DELETE,
            &format!("/anti-affinity-group/{}", id),
            None,
        )
        .await?;
        Ok(())
    }

    async fn create_block_storage_volume(
        &self,
        zone: &str,
        volume: &BlockStorageVolume,
    ) -> ApiResult<BlockStorageVolume> {
        let id = self.create(zone, "/block-storage", to_body(volume)?).await?;
        self.get_block_storage_volume(zone, &id).await
    }

    async fn get_block_storage_volume(
        &self,
        zone: &str,
        id: &str,
    ) -> ApiResult<BlockStorageVolume> {
        self.get(zone, &format!("/block-storage/{}", id)).await
    }

    async fn find_block_storage_volume(
        &self,
        zone: &str,
        id_or_name: &str,
    ) -> ApiResult<BlockStorageVolume> {
        let list: BlockStorageVolumeList = self.get(zone, "/block-storage").await?;
        list.block_storage_volumes
            .into_iter()
            .find(|v| matches_id_or_name(v.id.as_deref(), v.name.as_deref(), id_or_name))
            .ok_or(ApiError::NotFound)
    }

    async fn update_block_storage_volume(
        &self,
        zone: &str,
        volume: &BlockStorageVolume,
    ) -> ApiResult<()> {
        let id = volume.id.as_deref().ok_or(ApiError::NotFound)?;
        let body = BlockStorageVolume {
            name: volume.name.clone(),
            labels: volume.labels.clone(),
            ..Default::default()
        };
        self.execute(zone, Method::PUT, &format!("/block-storage/{}", id), Some(to_body(&body)?))
            .await?;
        Ok(())
    }

    async fn resize_block_storage_volume(&self, zone: &str, id: &str, size: i64) -> ApiResult<()> {
        self.execute(
            zone,
            Method::PUT,
            &format!("/block-storage/{}:resize-volume", id),
            Some(json!({ "size": size })),
        )
        .await?;
        Ok(())
    }

    async fn detach_block_storage_volume(&self, zone: &str, id: &str) -> ApiResult<()> {
        self.execute(zone, Method::PUT, &format!("/block-storage/{}:detach", id), None)
            .await?;
        Ok(())
    }

    async fn delete_block_storage_volume(&self, zone: &str, id: &str) -> ApiResult<()> {
        self.execute(zone, Method::DELETE, &format!("/block-storage/{}", id), None)
            .await?;
        Ok(())
    }
}
