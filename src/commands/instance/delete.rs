use std::collections::HashSet;
use std::io::Write;

use async_trait::async_trait;

use super::RESOURCE_KIND;
use crate::descriptor::{Bindable, Descriptor};
use crate::error::{CliError, SdkResultExt};
use crate::lifecycle::Command;
use crate::prompt;
use crate::registrar::{self, REMOVE_ALIASES};
use crate::sdk;
use crate::state::Context;
use crate::waiter::decorate_async_operations;

#[derive(Debug, Clone, Default)]
pub struct InstanceDeleteCmd {
    pub instances: Vec<String>,
    pub force: bool,
    pub zone: String,
}

#[async_trait]
impl Command for InstanceDeleteCmd {
    type Output = ();

    fn describe() -> Result<Descriptor<Self>, CliError> {
        Descriptor::<Self>::builder("delete")
            .args("instances", |c| c.instances.field_ref())
            .usage("NAME|ID")
            .flag("force", |c| c.force.field_ref())
            .short('f')
            .usage("don't prompt for confirmation")
            .flag("zone", |c| c.zone.field_ref())
            .short('z')
            .usage("instances zone")
            .build()
    }

    fn aliases() -> Vec<&'static str> {
        registrar::aliases(&[REMOVE_ALIASES])
    }

    fn short() -> &'static str {
        "Delete Compute instances"
    }

    async fn pre_run(&mut self, ctx: &Context) -> Result<(), CliError> {
        ctx.default_zone(&mut self.zone)
    }

    async fn run(&self, ctx: &Context) -> Result<Option<Self::Output>, CliError> {
        let client = ctx.zone_client(&self.zone).await?;
        let existing = ctx
            .call(client.list_instances())
            .await
            .sdk_context("unable to list instances")?;

        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for name in &self.instances {
            let Some(instance) = sdk::find_instance(&existing, name) else {
                if self.force {
                    writeln!(
                        ctx.stderr(),
                        "warning: instance {name:?} not found in zone {}",
                        self.zone
                    )?;
                    continue;
                }
                return Err(CliError::NotFound {
                    kind: "instance",
                    name: name.clone(),
                    zone: self.zone.clone(),
                });
            };

            if seen.contains(&instance.id) {
                continue;
            }
            let prompt = format!("Are you sure you want to delete instance {:?}?", instance.name);
            if !prompt::confirm(ctx, self.force, &prompt).await? {
                continue;
            }
            seen.insert(instance.id.clone());
            targets.push(instance.clone());
        }

        if targets.is_empty() {
            return Ok(None);
        }

        let message = format!("Deleting {} instance(s)...", targets.len());
        let operations = targets.iter().map(|instance| {
            let client = client.clone();
            async move {
                let op = ctx
                    .call(client.delete_instance(&instance.id))
                    .await
                    .sdk_context(format!("unable to delete instance {:?}", instance.name))?;
                client
                    .wait(op, ctx.cancellation())
                    .await
                    .sdk_context(format!("unable to delete instance {:?}", instance.name))?;
                ctx.state()
                    .config_dir
                    .remove_resource_dir(RESOURCE_KIND, &instance.id)?;
                tracing::debug!(instance = %instance.id, "instance deleted");
                Ok::<_, CliError>(())
            }
        });
        decorate_async_operations(ctx, &message, operations).await?;

        Ok(None)
    }
}
