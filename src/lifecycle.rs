//! Command lifecycle: pre-run, run, render

use std::time::Duration;

use async_trait::async_trait;

use crate::descriptor::Descriptor;
use crate::error::CliError;
use crate::output::{self, Output};
use crate::state::Context;

/// A leaf verb of the command tree.
///
/// The value registered with the tree is a template: every invocation
/// starts from a clone of it, with the parsed arguments written over the
/// fields its [`Descriptor`] binds.
#[async_trait]
pub trait Command: Clone + Send + Sync + 'static {
    type Output: Output + Send;

    fn describe() -> Result<Descriptor<Self>, CliError>;

    fn aliases() -> Vec<&'static str> {
        Vec::new()
    }

    fn short() -> &'static str;

    fn long() -> Option<&'static str> {
        None
    }

    /// Fill unset values from the profile and validate across fields.
    async fn pre_run(&mut self, _ctx: &Context) -> Result<(), CliError> {
        Ok(())
    }

    /// `None` means there is nothing to render.
    async fn run(&self, ctx: &Context) -> Result<Option<Self::Output>, CliError>;

    /// Fetch and print the current state of the resource `id`, used after a
    /// mutation.
    async fn render_fresh_state(&self, _ctx: &Context, _id: &str) -> Result<(), CliError> {
        Ok(())
    }

    /// Minimum time this command may run before the context is cancelled.
    fn deadline_extension(&self) -> Option<Duration> {
        None
    }
}

/// Run one invocation: pre-run, then run, then render.
pub async fn execute<C: Command>(mut cmd: C, ctx: &Context) -> Result<(), CliError> {
    if let Some(extension) = cmd.deadline_extension() {
        ctx.extend_deadline(extension);
    }
    let _deadline = ctx.arm_deadline();

    cmd.pre_run(ctx).await?;
    tracing::debug!("pre-run complete");

    let result = cmd.run(ctx).await?;
    finalize(ctx, result)
}

fn finalize<O: Output>(ctx: &Context, result: Option<O>) -> Result<(), CliError> {
    if ctx.quiet() {
        return Ok(());
    }
    match result {
        Some(value) => output::print_output(ctx, &value),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Bindable;
    use crate::testing::{test_context, TestIo};
    use serde::Serialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Default, Serialize)]
    struct Greeting {
        text: String,
    }

    impl Output for Greeting {}

    #[derive(Clone, Default)]
    struct GreetCmd {
        name: String,
        runs: Arc<AtomicUsize>,
        extend: Option<Duration>,
    }

    #[async_trait]
    impl Command for GreetCmd {
        type Output = Greeting;

        fn describe() -> Result<Descriptor<Self>, CliError> {
            Descriptor::<Self>::builder("greet")
                .optional_arg("name", |c| c.name.field_ref())
                .build()
        }

        fn short() -> &'static str {
            "Say hello"
        }

        async fn pre_run(&mut self, _ctx: &Context) -> Result<(), CliError> {
            if self.name == "nobody" {
                return Err(CliError::Usage("who?".into()));
            }
            if self.name.is_empty() {
                self.name = "world".into();
            }
            Ok(())
        }

        async fn run(&self, _ctx: &Context) -> Result<Option<Greeting>, CliError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Greeting {
                text: format!("hello {}", self.name),
            }))
        }

        fn deadline_extension(&self) -> Option<Duration> {
            self.extend
        }
    }

    #[tokio::test]
    async fn pre_run_then_run_then_render() {
        let (ctx, io) = test_context(TestIo::default());
        execute(GreetCmd::default(), &ctx).await.unwrap();
        assert_eq!(io.stdout.contents(), "hello world\n");
    }

    #[tokio::test]
    async fn pre_run_failure_skips_run() {
        let (ctx, io) = test_context(TestIo::default());
        let cmd = GreetCmd {
            name: "nobody".into(),
            ..Default::default()
        };
        let runs = cmd.runs.clone();

        assert!(execute(cmd, &ctx).await.is_err());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(io.stdout.contents().is_empty());
    }

    #[tokio::test]
    async fn quiet_skips_rendering() {
        let (ctx, io) = test_context(TestIo {
            quiet: true,
            ..Default::default()
        });
        let cmd = GreetCmd::default();
        let runs = cmd.runs.clone();

        execute(cmd, &ctx).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(io.stdout.contents().is_empty());
    }

    #[tokio::test]
    async fn deadline_extension_applies_before_run() {
        let (ctx, _io) = test_context(TestIo::default());
        let before = ctx.deadline();
        let cmd = GreetCmd {
            extend: Some(Duration::from_secs(72 * 3600)),
            ..Default::default()
        };
        execute(cmd, &ctx).await.unwrap();
        assert!(ctx.deadline() > before);
    }

    #[tokio::test]
    async fn render_errors_are_fatal() {
        let (ctx, _io) = test_context(TestIo {
            template: Some("{{ missing }}".into()),
            ..Default::default()
        });
        let err = execute(GreetCmd::default(), &ctx).await.unwrap_err();
        assert!(matches!(err, CliError::Render(_)));
    }
}
