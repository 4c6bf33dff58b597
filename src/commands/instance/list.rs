use async_trait::async_trait;
use serde::Serialize;

use crate::descriptor::{Bindable, Descriptor};
use crate::error::{CliError, SdkResultExt};
use crate::lifecycle::Command;
use crate::output::{List, Output};
use crate::registrar::{self, LIST_ALIASES};
use crate::state::Context;
use crate::zones;

#[derive(Debug, Clone, Default, Serialize)]
pub struct InstanceListItem {
    pub id: String,
    pub name: String,
    pub zone: String,
    pub instance_type: String,
    pub ip_address: Option<String>,
    pub state: String,
}

impl Output for InstanceListItem {
    fn labels() -> &'static [(&'static str, &'static str)] {
        &[("id", "ID"), ("ip_address", "IP Address")]
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstanceListCmd {
    pub zone: String,
}

#[async_trait]
impl Command for InstanceListCmd {
    type Output = List<InstanceListItem>;

    fn describe() -> Result<Descriptor<Self>, CliError> {
        Descriptor::<Self>::builder("list")
            .flag("zone", |c| c.zone.field_ref())
            .short('z')
            .usage("zone to filter results to")
            .build()
    }

    fn aliases() -> Vec<&'static str> {
        registrar::aliases(&[LIST_ALIASES])
    }

    fn short() -> &'static str {
        "List Compute instances"
    }

    fn long() -> Option<&'static str> {
        Some(
            "List Compute instances of every zone, or of the zone given with --zone.\n\n\
             A zone that cannot be listed is reported as a warning on stderr and the \
             instances of the other zones are still printed.",
        )
    }

    async fn run(&self, ctx: &Context) -> Result<Option<Self::Output>, CliError> {
        let all = self.zone.is_empty();
        let targets = if all {
            zones::all_zones(ctx).await?
        } else {
            vec![self.zone.clone()]
        };

        let (mut items, result) = zones::collect_zones(ctx, &targets, |scope| async move {
            let instances = ctx
                .call(scope.client.list_instances())
                .await
                .sdk_context("unable to list instances")?;
            for i in instances {
                scope.send(InstanceListItem {
                    id: i.id,
                    name: i.name,
                    zone: scope.zone.clone(),
                    instance_type: i.instance_type,
                    ip_address: i.public_ip,
                    state: i.state,
                });
            }
            Ok(())
        })
        .await;

        if let Err(err) = result {
            // An explicit zone has no partial result worth keeping.
            if !all {
                return Err(err);
            }
            zones::warn_partial(ctx, &err);
        }

        items.sort_by(|a, b| (&a.zone, &a.name).cmp(&(&b.zone, &b.name)));
        Ok(Some(List(items)))
    }
}
