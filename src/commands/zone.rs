//! Zone commands

use async_trait::async_trait;
use serde::Serialize;

use crate::descriptor::Descriptor;
use crate::error::{CliError, SdkResultExt};
use crate::lifecycle::Command;
use crate::output::{List, Output};
use crate::registrar::{self, LIST_ALIASES};
use crate::state::Context;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ZoneListItem {
    pub name: String,
    pub api_endpoint: Option<String>,
}

impl Output for ZoneListItem {
    fn labels() -> &'static [(&'static str, &'static str)] {
        &[("api_endpoint", "API Endpoint")]
    }
}

#[derive(Debug, Clone, Default)]
pub struct ZoneListCmd;

#[async_trait]
impl Command for ZoneListCmd {
    type Output = List<ZoneListItem>;

    fn describe() -> Result<Descriptor<Self>, CliError> {
        Descriptor::<Self>::builder("list").build()
    }

    fn aliases() -> Vec<&'static str> {
        registrar::aliases(&[LIST_ALIASES])
    }

    fn short() -> &'static str {
        "List zones"
    }

    async fn run(&self, ctx: &Context) -> Result<Option<Self::Output>, CliError> {
        let zones = ctx
            .call(ctx.client().list_zones())
            .await
            .sdk_context("unable to list zones")?;

        Ok(Some(
            zones
                .into_iter()
                .map(|z| ZoneListItem {
                    name: z.name,
                    api_endpoint: z.api_endpoint,
                })
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::execute;
    use crate::testing::{test_context, FakeCompute, TestIo};
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn lists_zones_one_per_line() {
        let (ctx, io) = test_context(TestIo {
            template: Some("{{ name }}".into()),
            ..Default::default()
        });
        execute(ZoneListCmd, &ctx).await.unwrap();
        assert_eq!(io.stdout.contents(), "ch-gva-2\nde-fra-1\n");
    }

    #[tokio::test]
    async fn cancellation_interrupts_slow_listing() {
        let client = FakeCompute::new(&["ch-gva-2"]).with_latency(Duration::from_secs(30));
        let (ctx, io) = test_context(TestIo {
            client: Some(client),
            ..Default::default()
        });

        let cancel = ctx.cancellation().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        let started = Instant::now();
        let result = tokio::time::timeout(Duration::from_secs(3), execute(ZoneListCmd, &ctx))
            .await
            .expect("listing kept running after cancellation");
        assert!(matches!(result, Err(CliError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(io.stdout.contents().is_empty());
    }
}
