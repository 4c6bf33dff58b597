use async_trait::async_trait;

use super::{fetch_instance_view, lookup_instance, InstanceView};
use crate::descriptor::{Bindable, Descriptor};
use crate::error::{CliError, SdkResultExt};
use crate::lifecycle::Command;
use crate::output;
use crate::prompt;
use crate::state::Context;
use crate::waiter::decorate_async_operation;

#[derive(Debug, Clone, Default)]
pub struct InstanceScaleCmd {
    pub instance: String,
    pub instance_type: String,
    pub force: bool,
    pub zone: String,
}

#[async_trait]
impl Command for InstanceScaleCmd {
    type Output = InstanceView;

    fn describe() -> Result<Descriptor<Self>, CliError> {
        Descriptor::<Self>::builder("scale")
            .arg("instance", |c| c.instance.field_ref())
            .usage("NAME|ID")
            .flag("instance_type", |c| c.instance_type.field_ref())
            .name("type")
            .short('t')
            .usage("new instance type (FAMILY.SIZE)")
            .required()
            .flag("force", |c| c.force.field_ref())
            .short('f')
            .usage("don't prompt for confirmation")
            .flag("zone", |c| c.zone.field_ref())
            .short('z')
            .usage("instance zone")
            .build()
    }

    fn short() -> &'static str {
        "Scale a Compute instance"
    }

    fn long() -> Option<&'static str> {
        Some(
            "Change the type of a Compute instance.\n\n\
             The instance must be stopped for the new type to be applied.",
        )
    }

    async fn pre_run(&mut self, ctx: &Context) -> Result<(), CliError> {
        ctx.default_zone(&mut self.zone)
    }

    async fn run(&self, ctx: &Context) -> Result<Option<Self::Output>, CliError> {
        let client = ctx.zone_client(&self.zone).await?;
        let instance = lookup_instance(ctx, client.as_ref(), &self.zone, &self.instance).await?;

        let prompt = format!("Are you sure you want to scale instance {:?}?", instance.name);
        if !prompt::confirm(ctx, self.force, &prompt).await? {
            return Ok(None);
        }

        let message = format!("Scaling instance {:?}...", instance.name);
        decorate_async_operation(ctx, &message, async {
            let op = ctx
                .call(client.scale_instance(&instance.id, &self.instance_type))
                .await
                .sdk_context(format!("unable to scale instance {:?}", instance.name))?;
            client.wait(op, ctx.cancellation()).await?;
            Ok::<_, CliError>(())
        })
        .await?;
        tracing::debug!(instance = %instance.id, instance_type = %self.instance_type, "instance scaled");

        if !ctx.quiet() {
            self.render_fresh_state(ctx, &instance.id).await?;
        }
        Ok(None)
    }

    async fn render_fresh_state(&self, ctx: &Context, id: &str) -> Result<(), CliError> {
        let view = fetch_instance_view(ctx, &self.zone, id).await?;
        output::print_output(ctx, &view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::execute;
    use crate::testing::{test_context, FakeCompute, TestIo};

    fn client() -> FakeCompute {
        FakeCompute::new(&["ch-gva-2"]).with_instance("ch-gva-2", "i-1", "web")
    }

    fn cmd(force: bool) -> InstanceScaleCmd {
        InstanceScaleCmd {
            instance: "web".into(),
            instance_type: "standard.large".into(),
            force,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn scales_and_renders_fresh_state() {
        let (ctx, io) = test_context(TestIo {
            client: Some(client()),
            template: Some("{{.Name}} {{.InstanceType}}".into()),
            ..Default::default()
        });
        execute(cmd(true), &ctx).await.unwrap();

        assert_eq!(io.stdout.contents(), "web standard.large\n");
        assert_eq!(io.client.instances_in("ch-gva-2")[0].instance_type, "standard.large");
    }

    #[tokio::test]
    async fn declined_prompt_leaves_instance_alone() {
        let (ctx, io) = test_context(TestIo {
            client: Some(client()),
            stdin: "n\n".into(),
            ..Default::default()
        });
        execute(cmd(false), &ctx).await.unwrap();

        assert!(io.stdout.contents().is_empty());
        assert_eq!(io.client.instances_in("ch-gva-2")[0].instance_type, "standard.small");
        assert!(io
            .stderr
            .contents()
            .contains("Are you sure you want to scale instance \"web\"?"));
    }

    #[tokio::test]
    async fn unknown_instance_is_not_found() {
        let (ctx, _io) = test_context(TestIo {
            client: Some(client()),
            ..Default::default()
        });
        let cmd = InstanceScaleCmd {
            instance: "db".into(),
            ..cmd(true)
        };
        let err = execute(cmd, &ctx).await.unwrap_err();
        assert!(matches!(err, CliError::NotFound { .. }));
    }
}
