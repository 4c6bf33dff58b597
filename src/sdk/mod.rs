//! Compute API contract
//!
//! The commands only ever talk to a [`ComputeApi`]. [`HttpClient`] is the
//! real implementation; tests use an in-memory one.

mod http;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use http::HttpClient;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(
        "no API token configured; set NIMBUS_API_TOKEN or add a profile to profiles.json \
         in the configuration directory"
    )]
    MissingCredentials,

    #[error("operation {id} ended in state {state}: {message}")]
    OperationFailed {
        id: String,
        state: String,
        message: String,
    },

    #[error("request cancelled")]
    Cancelled,
}

// ============ API Types ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    #[serde(default)]
    pub api_endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub instance_type: String,
    #[serde(default)]
    pub template: String,
    pub state: String,
    #[serde(default)]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub ipv6_address: Option<String>,
    /// GiB
    #[serde(default)]
    pub disk_size: i64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub security_groups: Vec<String>,
    #[serde(default)]
    pub ssh_key: Option<String>,
    #[serde(default)]
    pub user_data: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    pub name: String,
    pub instance_type: String,
    pub template: String,
    pub disk_size: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    Pending,
    Success,
    Failure,
    Timeout,
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Pending => "pending",
            OperationState::Success => "success",
            OperationState::Failure => "failure",
            OperationState::Timeout => "timeout",
        }
    }
}

/// Resource created or modified by an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub id: String,
    #[serde(default)]
    pub link: Option<String>,
}

/// Handle on an in-flight asynchronous operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub state: OperationState,
    #[serde(default)]
    pub reference: Option<Reference>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterSshKeyRequest {
    pub name: String,
    /// `authorized_keys` line.
    pub public_key: String,
}

// ============ Client Contract ============

#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Zone this client is bound to, if any.
    fn zone(&self) -> Option<&str>;

    /// A copy of this client talking to `zone`'s API endpoint.
    async fn in_zone(&self, zone: &str) -> Result<Arc<dyn ComputeApi>, SdkError>;

    async fn list_zones(&self) -> Result<Vec<Zone>, SdkError>;

    async fn list_instances(&self) -> Result<Vec<Instance>, SdkError>;

    async fn get_instance(&self, id: &str) -> Result<Instance, SdkError>;

    async fn create_instance(&self, req: &CreateInstanceRequest) -> Result<Operation, SdkError>;

    async fn delete_instance(&self, id: &str) -> Result<Operation, SdkError>;

    async fn scale_instance(&self, id: &str, instance_type: &str) -> Result<Operation, SdkError>;

    async fn register_ssh_key(&self, req: &RegisterSshKeyRequest) -> Result<Operation, SdkError>;

    async fn delete_ssh_key(&self, name: &str) -> Result<Operation, SdkError>;

    async fn get_operation(&self, id: &str) -> Result<Operation, SdkError>;

    fn poll_interval(&self) -> Duration {
        Duration::from_secs(3)
    }

    /// Block until `op` reaches a terminal state.
    ///
    /// Success yields the operation's resource reference; failure or timeout
    /// yields [`SdkError::OperationFailed`]. Cancelling `cancel` interrupts
    /// both the pause between two polls and the poll request itself.
    async fn wait(
        &self,
        op: Operation,
        cancel: &CancellationToken,
    ) -> Result<Option<Reference>, SdkError> {
        let mut op = op;
        loop {
            match op.state {
                OperationState::Success => return Ok(op.reference),
                OperationState::Failure | OperationState::Timeout => {
                    return Err(SdkError::OperationFailed {
                        id: op.id,
                        state: op.state.as_str().to_string(),
                        message: op.message.unwrap_or_default(),
                    })
                }
                OperationState::Pending => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(SdkError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval()) => {}
            }

            tracing::trace!(operation = %op.id, "polling operation");
            op = cancellable(cancel, self.get_operation(&op.id)).await?;
        }
    }
}

/// Run an SDK call until it completes or `cancel` fires, whichever is first.
pub async fn cancellable<T, F>(cancel: &CancellationToken, call: F) -> Result<T, SdkError>
where
    F: Future<Output = Result<T, SdkError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SdkError::Cancelled),
        result = call => result,
    }
}

/// Find an instance by ID or name, ID first.
pub fn find_instance<'a>(instances: &'a [Instance], name_or_id: &str) -> Option<&'a Instance> {
    instances
        .iter()
        .find(|i| i.id == name_or_id)
        .or_else(|| instances.iter().find(|i| i.name == name_or_id))
}
