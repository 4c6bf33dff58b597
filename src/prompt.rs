//! Confirmation prompts

use std::io::{self, Write};

use crate::error::CliError;
use crate::state::Context;

/// Ask a yes/no question on stderr and read the answer from stdin.
/// Anything but `y`/`yes` is a no, including end of input.
pub async fn ask(ctx: &Context, prompt: &str) -> Result<bool, CliError> {
    let mut stderr = ctx.stderr();
    write!(stderr, "[+] {prompt} [yN]: ")?;
    stderr.flush()?;

    let stdin = ctx.stdin();
    let read = tokio::task::spawn_blocking(move || stdin.read_line());

    tokio::select! {
        _ = ctx.cancellation().cancelled() => Err(CliError::Cancelled),
        joined = read => {
            let line = joined.map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;
            Ok(is_yes(&line))
        }
    }
}

/// Skip the question when forced. Quiet mode never prompts.
pub async fn confirm(ctx: &Context, force: bool, prompt: &str) -> Result<bool, CliError> {
    if force {
        return Ok(true);
    }
    if ctx.quiet() {
        return Err(CliError::Usage(
            "confirmation required but prompts are disabled in quiet mode; use --force".into(),
        ));
    }
    ask(ctx, prompt).await
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
