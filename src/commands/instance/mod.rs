//! Compute instance commands

mod create;
mod delete;
mod list;
mod scale;
mod show;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{CliError, SdkResultExt};
use crate::output::{self, Output};
use crate::registrar::Group;
use crate::sdk::{self, ComputeApi, Instance};
use crate::state::Context;

pub use create::InstanceCreateCmd;
pub use delete::InstanceDeleteCmd;
pub use list::{InstanceListCmd, InstanceListItem};
pub use scale::InstanceScaleCmd;
pub use show::InstanceShowCmd;

/// Scratch directory kind for instance files in the config directory.
const RESOURCE_KIND: &str = "instances";

pub fn group() -> Result<Group, CliError> {
    let mut group = Group::new("instance", "Compute instances management").alias("i");
    group.register(InstanceListCmd::default())?;
    group.register(InstanceShowCmd::default())?;
    group.register(InstanceCreateCmd::default())?;
    group.register(InstanceDeleteCmd::default())?;
    group.register(InstanceScaleCmd::default())?;
    Ok(group)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InstanceView {
    pub id: String,
    pub name: String,
    pub zone: String,
    pub instance_type: String,
    pub template: String,
    pub state: String,
    pub disk_size: String,
    pub ip_address: Option<String>,
    pub ipv6_address: Option<String>,
    pub security_groups: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub ssh_key: Option<String>,
    pub created_at: String,
}

impl Output for InstanceView {
    fn type_name() -> Option<&'static str> {
        Some("Compute instance")
    }

    fn labels() -> &'static [(&'static str, &'static str)] {
        &[
            ("id", "ID"),
            ("ip_address", "IP Address"),
            ("ipv6_address", "IPv6 Address"),
            ("ssh_key", "SSH Key"),
        ]
    }

    fn fields() -> Vec<String> {
        output::field_keys::<Self>()
    }
}

impl InstanceView {
    fn new(instance: Instance, zone: &str) -> Self {
        Self {
            id: instance.id,
            name: instance.name,
            zone: zone.to_string(),
            instance_type: instance.instance_type,
            template: instance.template,
            state: instance.state,
            disk_size: format!("{} GiB", instance.disk_size),
            ip_address: instance.public_ip,
            ipv6_address: instance.ipv6_address,
            security_groups: instance.security_groups,
            labels: instance.labels,
            ssh_key: instance.ssh_key,
            created_at: instance.created_at,
        }
    }
}

/// Look an instance up by ID or name in the client's zone.
pub(crate) async fn lookup_instance(
    ctx: &Context,
    client: &dyn ComputeApi,
    zone: &str,
    name_or_id: &str,
) -> Result<Instance, CliError> {
    let instances = ctx
        .call(client.list_instances())
        .await
        .sdk_context("unable to list instances")?;
    sdk::find_instance(&instances, name_or_id)
        .cloned()
        .ok_or_else(|| CliError::NotFound {
            kind: "instance",
            name: name_or_id.to_string(),
            zone: zone.to_string(),
        })
}

/// Current state of an instance, ready to render.
pub(crate) async fn fetch_instance_view(
    ctx: &Context,
    zone: &str,
    name_or_id: &str,
) -> Result<InstanceView, CliError> {
    let client = ctx.zone_client(zone).await?;
    let found = lookup_instance(ctx, client.as_ref(), zone, name_or_id).await?;
    let instance = ctx
        .call(client.get_instance(&found.id))
        .await
        .sdk_context(format!("unable to retrieve instance {:?}", found.name))?;
    Ok(InstanceView::new(instance, zone))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_context, FakeCompute, TestIo};

    #[tokio::test]
    async fn lookup_miss_names_zone_and_hint() {
        let (ctx, _io) = test_context(TestIo {
            client: Some(FakeCompute::new(&["ch-gva-2", "de-fra-1"]).with_instance(
                "de-fra-1",
                "i-1",
                "web",
            )),
            ..Default::default()
        });
        let err = fetch_instance_view(&ctx, "ch-gva-2", "web")
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("\"web\""));
        assert!(msg.contains("ch-gva-2"));
        assert!(msg.contains("--zone"));
    }

    #[tokio::test]
    async fn view_carries_zone_and_size() {
        let (ctx, _io) = test_context(TestIo {
            client: Some(FakeCompute::new(&["ch-gva-2"]).with_instance("ch-gva-2", "i-1", "web")),
            ..Default::default()
        });
        let view = fetch_instance_view(&ctx, "ch-gva-2", "i-1").await.unwrap();
        assert_eq!(view.name, "web");
        assert_eq!(view.zone, "ch-gva-2");
        assert_eq!(view.disk_size, "10 GiB");
    }
}
