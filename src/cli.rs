//! Root command: global flags and tree assembly

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, FromArgMatches};

use crate::config::{self, ConfigDir};
use crate::error::CliError;
use crate::output::{OutputFormat, OUTPUT_HELP};
use crate::registrar::Group;
use crate::state::GlobalState;

pub const ABOUT: &str = "Command-line client for the Nimbus compute platform";

const AFTER_HELP: &str = r#"
Examples:

  List instances in every zone:
    nimbus compute instance list

  Create an instance:
    nimbus compute instance create web-1 --zone ch-gva-2 --template debian-12

  Delete instances without confirmation:
    nimbus compute instance delete web-1 web-2 --force

  Machine-readable output:
    nimbus compute instance list -O json

Configuration:
  Profiles are read from profiles.json in the configuration directory;
  NIMBUS_API_TOKEN, NIMBUS_API_ENDPOINT and NIMBUS_ZONE override the active
  profile. Set NIMBUS_LOG=debug for verbose logs.
"#;

/// Flags accepted by every command.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Output format
    #[arg(short = 'O', long, global = true, value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Text template for the output, see `nimbus output`
    #[arg(long, global = true, value_name = "TEMPLATE")]
    pub output_template: Option<String>,

    /// Suppress prompts and output
    #[arg(short = 'Q', long, global = true)]
    pub quiet: bool,

    /// Configuration directory
    #[arg(short = 'C', long, global = true, env = "NIMBUS_CONFIG_DIR", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Profile to use from profiles.json
    #[arg(short = 'A', long, global = true, env = "NIMBUS_PROFILE", value_name = "PROFILE")]
    pub use_profile: Option<String>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    pub fn from_matches(matches: &clap::ArgMatches) -> Result<Self, clap::Error> {
        Self::from_arg_matches(matches)
    }
}

/// Every verb and help topic, under the root group.
/// How long in-flight tasks get once the top-level future is done. A prompt
/// interrupted by Ctrl-C leaves a blocking stdin read behind that would
/// otherwise hold the process open.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// Run `fut` to completion on a fresh multi-threaded runtime, then shut the
/// runtime down without waiting on stuck blocking tasks.
pub fn block_on<F: Future>(fut: F) -> io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(fut);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    Ok(output)
}

pub fn build_tree() -> Result<Group, CliError> {
    let mut root = Group::new("nimbus", ABOUT);
    crate::commands::register_all(&mut root)?;
    root.add_topic("output", "Output formats and templates", OUTPUT_HELP)?;
    Ok(root)
}

/// The root clap command for `tree`.
pub fn root_command(tree: &Group) -> clap::Command {
    let cmd = tree
        .clap_command()
        .version(env!("CARGO_PKG_VERSION"))
        .after_help(AFTER_HELP);
    GlobalArgs::augment_args(cmd)
}

/// Resolve the process-wide state from the global flags, the environment
/// and the configuration directory.
pub fn resolve_state(
    args: &GlobalArgs,
    stdout_is_term: bool,
    stderr_is_term: bool,
) -> Result<GlobalState, CliError> {
    let config_dir = ConfigDir::resolve(args.config_dir.clone())?;
    if config::load_env(&config_dir)? {
        tracing::debug!(dir = ?config_dir.path(), "loaded .env");
    }

    // A NIMBUS_PROFILE coming from the config dir's .env is only visible
    // after parsing.
    let requested = args
        .use_profile
        .clone()
        .or_else(|| std::env::var("NIMBUS_PROFILE").ok())
        .filter(|p| !p.is_empty());
    let mut profile = config::select_profile(config::load_profiles(&config_dir)?, requested.as_deref())?;
    profile.apply_env_overrides(|key| std::env::var(key).ok());
    tracing::debug!(profile = %profile.name, "active profile");

    Ok(GlobalState {
        output_format: args
            .output_format
            .unwrap_or_else(|| OutputFormat::detect(stdout_is_term)),
        output_template: args.output_template.clone(),
        quiet: args.quiet,
        config_dir,
        profile,
        stderr_is_term,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<clap::ArgMatches, clap::Error> {
        let tree = build_tree().unwrap();
        root_command(&tree).try_get_matches_from(args)
    }

    #[test]
    fn tree_builds_and_passes_clap_asserts() {
        let tree = build_tree().unwrap();
        root_command(&tree).debug_assert();
    }

    #[test]
    fn global_flags_after_the_verb() {
        let m = parse(&[
            "nimbus", "compute", "instance", "list", "-O", "json", "--quiet", "-A", "dev",
        ])
        .unwrap();
        let args = GlobalArgs::from_matches(&m).unwrap();
        assert_eq!(args.output_format, Some(OutputFormat::Json));
        assert!(args.quiet);
        assert_eq!(args.use_profile.as_deref(), Some("dev"));
    }

    #[test]
    fn conventional_aliases_resolve() {
        let m = parse(&["nimbus", "compute", "instance", "ls"]).unwrap();
        let (_, compute) = m.subcommand().unwrap();
        let (_, instance) = compute.subcommand().unwrap();
        assert_eq!(instance.subcommand_name(), Some("list"));
    }

    #[test]
    fn group_without_verb_is_an_error() {
        assert!(parse(&["nimbus", "compute"]).is_err());
    }

    #[test]
    fn resolve_state_reads_profiles() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("profiles.json"),
            r#"{"default_profile":"main","profiles":{"main":{"api_token":"abc","default_zone":"at-vie-1"}}}"#,
        )
        .unwrap();

        let args = GlobalArgs {
            config_dir: Some(dir.path().to_path_buf()),
            output_template: Some("{{ id }}".into()),
            ..Default::default()
        };
        let state = resolve_state(&args, false, false).unwrap();
        assert_eq!(state.profile.name, "main");
        assert_eq!(state.output_format, OutputFormat::Text);
        assert_eq!(state.output_template.as_deref(), Some("{{ id }}"));
        assert_eq!(state.config_dir.path(), dir.path());
    }
}
