//! HTTP implementation of the compute API

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{
    cancellable, ComputeApi, CreateInstanceRequest, Instance, Operation, RegisterSshKeyRequest,
    SdkError, Zone,
};

pub const DEFAULT_ENDPOINT: &str = "https://api-{zone}.nimbus.cloud/v1";
pub const DEFAULT_ZONE: &str = "ch-gva-2";

// ============ Response Envelope ============

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    result: Option<T>,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    code: i32,
    message: String,
}

fn join_errors(errors: &[ApiErrorDetail]) -> String {
    errors
        .iter()
        .map(|e| format!("[{}] {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

// ============ Client ============

/// Bearer-token client bound to one zone.
///
/// The endpoint may contain a `{zone}` placeholder; without one, zone
/// endpoints come from the zone list.
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    endpoint: String,
    zone: String,
    token: Option<String>,
    cancel: CancellationToken,
}

impl HttpClient {
    pub fn new(
        endpoint: Option<&str>,
        token: Option<&str>,
        zone: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, SdkError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nimbus/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.unwrap_or(DEFAULT_ENDPOINT).to_string(),
            zone: zone.unwrap_or(DEFAULT_ZONE).to_string(),
            token: token.map(str::to_string),
            cancel: CancellationToken::new(),
        })
    }

    /// Abort in-flight requests when `cancel` fires. Zone-scoped copies
    /// share the token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn base_url(&self) -> String {
        self.endpoint
            .replace("{zone}", &self.zone)
            .trim_end_matches('/')
            .to_string()
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, SdkError> {
        cancellable(&self.cancel, self.send(method, path, body)).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, SdkError> {
        let token = self.token.as_deref().ok_or(SdkError::MissingCredentials)?;
        let url = format!("{}{}", self.base_url(), path);
        tracing::debug!(%method, %url, "API request");

        let mut req = self
            .http
            .request(method, &url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SdkError::NotFound(path.trim_start_matches('/').to_string()));
        }

        let api_resp: ApiResponse<T> = resp.json().await?;
        if !api_resp.success {
            return Err(SdkError::Api(format!(
                "{} {}",
                status.as_u16(),
                join_errors(&api_resp.errors)
            )));
        }
        api_resp
            .result
            .ok_or_else(|| SdkError::Api(format!("{} empty response", status.as_u16())))
    }
}

#[async_trait]
impl ComputeApi for HttpClient {
    fn zone(&self) -> Option<&str> {
        Some(&self.zone)
    }

    async fn in_zone(&self, zone: &str) -> Result<Arc<dyn ComputeApi>, SdkError> {
        let mut scoped = self.clone();
        scoped.zone = zone.to_string();

        if !self.endpoint.contains("{zone}") {
            let zones = self.list_zones().await?;
            let found = zones
                .into_iter()
                .find(|z| z.name == zone)
                .ok_or_else(|| SdkError::NotFound(format!("zone {zone:?}")))?;
            if let Some(endpoint) = found.api_endpoint {
                scoped.endpoint = endpoint;
            }
        }

        Ok(Arc::new(scoped))
    }

    async fn list_zones(&self) -> Result<Vec<Zone>, SdkError> {
        self.request(Method::GET, "/zones", None).await
    }

    async fn list_instances(&self) -> Result<Vec<Instance>, SdkError> {
        self.request(Method::GET, "/instances", None).await
    }

    async fn get_instance(&self, id: &str) -> Result<Instance, SdkError> {
        self.request(Method::GET, &format!("/instances/{id}"), None)
            .await
    }

    async fn create_instance(&self, req: &CreateInstanceRequest) -> Result<Operation, SdkError> {
        let body = serde_json::to_value(req).map_err(|e| SdkError::Api(e.to_string()))?;
        self.request(Method::POST, "/instances", Some(body)).await
    }

    async fn delete_instance(&self, id: &str) -> Result<Operation, SdkError> {
        self.request(Method::DELETE, &format!("/instances/{id}"), None)
            .await
    }

    async fn scale_instance(&self, id: &str, instance_type: &str) -> Result<Operation, SdkError> {
        let body = json!({ "instance_type": instance_type });
        self.request(Method::PUT, &format!("/instances/{id}:scale"), Some(body))
            .await
    }

    async fn register_ssh_key(&self, req: &RegisterSshKeyRequest) -> Result<Operation, SdkError> {
        let body = serde_json::to_value(req).map_err(|e| SdkError::Api(e.to_string()))?;
        self.request(Method::POST, "/ssh-keys", Some(body)).await
    }

    async fn delete_ssh_key(&self, name: &str) -> Result<Operation, SdkError> {
        self.request(Method::DELETE, &format!("/ssh-keys/{name}"), None)
            .await
    }

    async fn get_operation(&self, id: &str) -> Result<Operation, SdkError> {
        self.request(Method::GET, &format!("/operations/{id}"), None)
            .await
    }
}
