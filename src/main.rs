//! Nimbus CLI - command-line client for the Nimbus compute platform

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use nimbus::cli::{self, GlobalArgs};
use nimbus::sdk::HttpClient;
use nimbus::{CliError, Context};

fn main() -> ExitCode {
    // Descriptor errors are bugs: report them before touching argv.
    let tree = match cli::build_tree() {
        Ok(tree) => tree,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let matches = match cli::root_command(&tree).try_get_matches() {
        Ok(m) => m,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(e.exit_code().clamp(0, 255) as u8);
        }
    };

    let args = match GlobalArgs::from_matches(&matches) {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(e.exit_code().clamp(0, 255) as u8);
        }
    };

    init_tracing(args.verbose);

    match cli::block_on(run(&tree, &args, &matches)) {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: unable to start the async runtime: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "nimbus=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("NIMBUS_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run(
    tree: &nimbus::registrar::Group,
    args: &GlobalArgs,
    matches: &clap::ArgMatches,
) -> Result<(), CliError> {
    let state = cli::resolve_state(
        args,
        console::Term::stdout().is_term(),
        console::Term::stderr().is_term(),
    )?;

    let cancel = CancellationToken::new();
    let profile = &state.profile;
    let client = HttpClient::new(
        profile.endpoint.as_deref(),
        profile.api_token.as_deref(),
        profile.default_zone.as_deref(),
        profile.client_timeout(),
    )
    .map_err(|e| CliError::Sdk {
        context: "unable to initialize API client".into(),
        source: e,
    })?
    .with_cancellation(cancel.clone());

    let ctx = Context::new(state, Arc::new(client)).with_cancellation(cancel.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupted, cancelling");
            cancel.cancel();
        }
        // A second Ctrl-C does not wait for cleanup.
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    tree.dispatch(&ctx, matches).await
}
