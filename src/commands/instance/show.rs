use std::io::Write;

use async_trait::async_trait;

use super::{fetch_instance_view, lookup_instance, InstanceView};
use crate::descriptor::{Bindable, Descriptor};
use crate::error::{CliError, SdkResultExt};
use crate::lifecycle::Command;
use crate::registrar::{self, SHOW_ALIASES};
use crate::state::Context;

#[derive(Debug, Clone, Default)]
pub struct InstanceShowCmd {
    pub instance: String,
    pub zone: String,
    pub user_data: bool,
}

#[async_trait]
impl Command for InstanceShowCmd {
    type Output = InstanceView;

    fn describe() -> Result<Descriptor<Self>, CliError> {
        Descriptor::<Self>::builder("show")
            .arg("instance", |c| c.instance.field_ref())
            .usage("NAME|ID")
            .flag("zone", |c| c.zone.field_ref())
            .short('z')
            .usage("instance zone")
            .flag("user_data", |c| c.user_data.field_ref())
            .short('u')
            .usage("show instance cloud-init user data configuration")
            .build()
    }

    fn aliases() -> Vec<&'static str> {
        registrar::aliases(&[SHOW_ALIASES])
    }

    fn short() -> &'static str {
        "Show a Compute instance details"
    }

    async fn pre_run(&mut self, ctx: &Context) -> Result<(), CliError> {
        ctx.default_zone(&mut self.zone)
    }

    async fn run(&self, ctx: &Context) -> Result<Option<Self::Output>, CliError> {
        if self.user_data {
            let client = ctx.zone_client(&self.zone).await?;
            let found = lookup_instance(ctx, client.as_ref(), &self.zone, &self.instance).await?;
            let instance = ctx
                .call(client.get_instance(&found.id))
                .await
                .sdk_context(format!("unable to retrieve instance {:?}", found.name))?;
            if let Some(user_data) = instance.user_data {
                let mut out = ctx.stdout();
                writeln!(out, "{}", user_data.trim_end())?;
            }
            return Ok(None);
        }

        fetch_instance_view(ctx, &self.zone, &self.instance)
            .await
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::execute;
    use crate::testing::{test_context, FakeCompute, TestIo};

    fn context(format: crate::OutputFormat) -> (Context, crate::testing::Captured) {
        test_context(TestIo {
            client: Some(
                FakeCompute::new(&["ch-gva-2", "de-fra-1"]).with_instance("ch-gva-2", "i-1", "web"),
            ),
            format,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn shows_instance_table() {
        let (ctx, io) = context(crate::OutputFormat::Table);
        let cmd = InstanceShowCmd {
            instance: "web".into(),
            ..Default::default()
        };
        execute(cmd, &ctx).await.unwrap();

        let out = io.stdout.contents();
        assert!(out.contains("Compute instance"));
        assert!(out.contains("IP Address"));
        assert!(out.contains("i-1"));
    }

    #[tokio::test]
    async fn wrong_zone_suggests_another() {
        let (ctx, io) = context(crate::OutputFormat::Json);
        let cmd = InstanceShowCmd {
            instance: "web".into(),
            zone: "de-fra-1".into(),
            ..Default::default()
        };
        let err = execute(cmd, &ctx).await.unwrap_err();
        assert!(matches!(err, CliError::NotFound { ref zone, .. } if zone == "de-fra-1"));
        assert!(err.to_string().contains("try a different zone"));
        assert!(io.stdout.contents().is_empty());
    }

    #[tokio::test]
    async fn json_output_is_the_view() {
        let (ctx, io) = context(crate::OutputFormat::Json);
        let cmd = InstanceShowCmd {
            instance: "i-1".into(),
            ..Default::default()
        };
        execute(cmd, &ctx).await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&io.stdout.contents()).unwrap();
        assert_eq!(v["name"], "web");
        assert_eq!(v["zone"], "ch-gva-2");
    }
}
