//! In-memory compute API and context builder for unit tests

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{ConfigDir, Profile};
use crate::output::OutputFormat;
use crate::sdk::{
    ComputeApi, CreateInstanceRequest, Instance, Operation, OperationState, Reference,
    RegisterSshKeyRequest, SdkError, Zone,
};
use crate::state::{Capture, Context, GlobalState, SharedReader, Streams};

#[derive(Default)]
struct World {
    /// zone -> instances
    instances: BTreeMap<String, Vec<Instance>>,
    failing_zones: BTreeSet<String>,
    failing_deletes: BTreeSet<String>,
    deleted: Vec<String>,
    /// name -> public key
    ssh_keys: BTreeMap<String, String>,
    registered_keys: Vec<String>,
    next_id: usize,
}

/// Fake API shared by every zone-scoped clone.
#[derive(Clone)]
pub struct FakeCompute {
    zone: Option<String>,
    latency: Option<Duration>,
    world: Arc<Mutex<World>>,
}

impl FakeCompute {
    pub fn new(zones: &[&str]) -> Self {
        let world = World {
            instances: zones.iter().map(|z| (z.to_string(), Vec::new())).collect(),
            ..Default::default()
        };
        Self {
            zone: None,
            latency: None,
            world: Arc::new(Mutex::new(world)),
        }
    }

    /// Every API call sleeps for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_instance(self, zone: &str, id: &str, name: &str) -> Self {
        let instance = Instance {
            id: id.into(),
            name: name.into(),
            instance_type: "standard.small".into(),
            template: "debian-12".into(),
            state: "running".into(),
            disk_size: 10,
            ..Default::default()
        };
        self.world
            .lock()
            .unwrap()
            .instances
            .entry(zone.into())
            .or_default()
            .push(instance);
        self
    }

    pub fn failing_zone(self, zone: &str) -> Self {
        self.world.lock().unwrap().failing_zones.insert(zone.into());
        self
    }

    pub fn failing_delete(self, id: &str) -> Self {
        self.world.lock().unwrap().failing_deletes.insert(id.into());
        self
    }

    pub fn deleted(&self) -> Vec<String> {
        self.world.lock().unwrap().deleted.clone()
    }

    pub fn instances_in(&self, zone: &str) -> Vec<Instance> {
        self.world
            .lock()
            .unwrap()
            .instances
            .get(zone)
            .cloned()
            .unwrap_or_default()
    }

    /// Keys currently registered with the API.
    pub fn ssh_keys(&self) -> BTreeMap<String, String> {
        self.world.lock().unwrap().ssh_keys.clone()
    }

    /// Every key name ever registered, deleted or not.
    pub fn registered_keys(&self) -> Vec<String> {
        self.world.lock().unwrap().registered_keys.clone()
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn current_zone(&self) -> Result<String, SdkError> {
        let zone = self
            .zone
            .clone()
            .ok_or_else(|| SdkError::Api("no zone selected".into()))?;
        if self.world.lock().unwrap().failing_zones.contains(&zone) {
            return Err(SdkError::Api(format!("[503] zone {zone} unavailable")));
        }
        Ok(zone)
    }

    fn done(id: String, reference: Option<String>) -> Operation {
        Operation {
            id,
            state: OperationState::Success,
            reference: reference.map(|id| Reference { id, link: None }),
            message: None,
        }
    }
}

#[async_trait]
impl ComputeApi for FakeCompute {
    fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    async fn in_zone(&self, zone: &str) -> Result<Arc<dyn ComputeApi>, SdkError> {
        self.pause().await;
        if !self.world.lock().unwrap().instances.contains_key(zone) {
            return Err(SdkError::NotFound(format!("zone {zone:?}")));
        }
        let mut scoped = self.clone();
        scoped.zone = Some(zone.into());
        Ok(Arc::new(scoped))
    }

    async fn list_zones(&self) -> Result<Vec<Zone>, SdkError> {
        self.pause().await;
        Ok(self
            .world
            .lock()
            .unwrap()
            .instances
            .keys()
            .map(|name| Zone {
                name: name.clone(),
                api_endpoint: None,
            })
            .collect())
    }

    async fn list_instances(&self) -> Result<Vec<Instance>, SdkError> {
        self.pause().await;
        let zone = self.current_zone()?;
        Ok(self.instances_in(&zone))
    }

    async fn get_instance(&self, id: &str) -> Result<Instance, SdkError> {
        self.pause().await;
        let zone = self.current_zone()?;
        self.instances_in(&zone)
            .into_iter()
            .find(|i| i.id == id)
            .ok_or_else(|| SdkError::NotFound(format!("instance {id:?}")))
    }

    async fn create_instance(&self, req: &CreateInstanceRequest) -> Result<Operation, SdkError> {
        self.pause().await;
        let zone = self.current_zone()?;
        let mut world = self.world.lock().unwrap();
        world.next_id += 1;
        let id = format!("i-{}", world.next_id);
        world.instances.entry(zone).or_default().push(Instance {
            id: id.clone(),
            name: req.name.clone(),
            instance_type: req.instance_type.clone(),
            template: req.template.clone(),
            state: "running".into(),
            disk_size: req.disk_size,
            labels: req.labels.clone(),
            security_groups: req.security_groups.clone(),
            ssh_key: req.ssh_key.clone(),
            ..Default::default()
        });
        Ok(Self::done(format!("op-{id}"), Some(id)))
    }

    async fn scale_instance(&self, id: &str, instance_type: &str) -> Result<Operation, SdkError> {
        self.pause().await;
        let zone = self.current_zone()?;
        let mut world = self.world.lock().unwrap();
        let instance = world
            .instances
            .get_mut(&zone)
            .and_then(|list| list.iter_mut().find(|i| i.id == id))
            .ok_or_else(|| SdkError::NotFound(format!("instance {id:?}")))?;
        instance.instance_type = instance_type.to_string();
        Ok(Self::done(format!("op-scale-{id}"), Some(id.to_string())))
    }

    async fn register_ssh_key(&self, req: &RegisterSshKeyRequest) -> Result<Operation, SdkError> {
        self.pause().await;
        let mut world = self.world.lock().unwrap();
        world.ssh_keys.insert(req.name.clone(), req.public_key.clone());
        world.registered_keys.push(req.name.clone());
        Ok(Self::done(format!("op-key-{}", req.name), Some(req.name.clone())))
    }

    async fn delete_ssh_key(&self, name: &str) -> Result<Operation, SdkError> {
        self.pause().await;
        let mut world = self.world.lock().unwrap();
        world
            .ssh_keys
            .remove(name)
            .ok_or_else(|| SdkError::NotFound(format!("SSH key {name:?}")))?;
        Ok(Self::done(format!("op-unkey-{name}"), None))
    }

    async fn delete_instance(&self, id: &str) -> Result<Operation, SdkError> {
        self.pause().await;
        let zone = self.current_zone()?;
        let mut world = self.world.lock().unwrap();
        if world.failing_deletes.contains(id) {
            return Ok(Operation {
                id: format!("op-{id}"),
                state: OperationState::Failure,
                reference: None,
                message: Some("instance is locked".into()),
            });
        }
        if let Some(list) = world.instances.get_mut(&zone) {
            list.retain(|i| i.id != id);
        }
        world.deleted.push(id.to_string());
        Ok(Self::done(format!("op-{id}"), None))
    }

    async fn get_operation(&self, id: &str) -> Result<Operation, SdkError> {
        self.pause().await;
        Ok(Self::done(id.to_string(), None))
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(1)
    }
}

// ============ Context ============

pub struct TestIo {
    pub stdin: String,
    pub quiet: bool,
    pub format: OutputFormat,
    pub template: Option<String>,
    pub client: Option<FakeCompute>,
}

impl Default for TestIo {
    fn default() -> Self {
        Self {
            stdin: String::new(),
            quiet: false,
            format: OutputFormat::Text,
            template: None,
            client: None,
        }
    }
}

pub struct Captured {
    pub stdout: Capture,
    pub stderr: Capture,
    pub client: FakeCompute,
    pub dir: tempfile::TempDir,
}

pub fn test_context(io: TestIo) -> (Context, Captured) {
    let dir = tempfile::tempdir().unwrap();
    let client = io
        .client
        .unwrap_or_else(|| FakeCompute::new(&["ch-gva-2", "de-fra-1"]));

    let state = GlobalState {
        output_format: io.format,
        output_template: io.template,
        quiet: io.quiet,
        config_dir: ConfigDir::new(dir.path()),
        profile: Profile {
            name: "test".into(),
            api_token: Some("token".into()),
            default_zone: Some("ch-gva-2".into()),
            ..Default::default()
        },
        stderr_is_term: false,
    };

    let stdout = Capture::default();
    let stderr = Capture::default();
    let streams = Streams {
        stdout: stdout.writer(),
        stderr: stderr.writer(),
        stdin: SharedReader::new(std::io::Cursor::new(io.stdin.into_bytes())),
    };

    let ctx = Context::new(state, Arc::new(client.clone())).with_streams(streams);
    (
        ctx,
        Captured {
            stdout,
            stderr,
            client,
            dir,
        },
    )
}
