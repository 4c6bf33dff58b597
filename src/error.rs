//! CLI error types

use thiserror::Error;

use crate::sdk::SdkError;

/// Errors surfaced to the user by the framework and the commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bad invocation: missing argument, invalid flag value, missing confirmation.
    #[error("{0}")]
    Usage(String),

    /// A command descriptor is malformed. Raised while the command tree is built.
    #[error(
        "CLI command implementation error: {0}. \
         This is a bug, and should be reported to the maintainers of this tool."
    )]
    Descriptor(String),

    /// Lookup by name or ID returned nothing in the searched zone.
    #[error("{kind} {name:?} not found in zone {zone} (hint: try a different zone with --zone)")]
    NotFound {
        kind: &'static str,
        name: String,
        zone: String,
    },

    /// SDK call failed, with a one-line context.
    #[error("{context}: {source}")]
    Sdk {
        context: String,
        #[source]
        source: SdkError,
    },

    /// An asynchronous operation reached a non-success terminal state.
    #[error("{0}")]
    Operation(String),

    /// Output could not be rendered.
    #[error("unable to render output: {0}")]
    Render(String),

    /// Failure scoped to a single zone of a multi-zone iteration.
    #[error("zone {zone}: {source}")]
    Zone {
        zone: String,
        #[source]
        source: Box<CliError>,
    },

    /// Several independent failures (fan-out, per-zone iteration).
    #[error("{}", format_partial(.0))]
    Partial(Vec<CliError>),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Config(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn format_partial(errors: &[CliError]) -> String {
    let mut out = format!(
        "{} error{} occurred:",
        errors.len(),
        if errors.len() == 1 { "" } else { "s" }
    );
    for err in errors {
        out.push_str("\n\t* ");
        out.push_str(&err.to_string());
    }
    out
}

impl CliError {
    /// Collapse a list of errors: none is success, one is returned as-is,
    /// several become [`CliError::Partial`].
    pub fn aggregate(mut errors: Vec<CliError>) -> Result<(), CliError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(CliError::Partial(errors)),
        }
    }

    /// Individual failures carried by this error (itself unless partial).
    pub fn components(&self) -> Vec<&CliError> {
        match self {
            CliError::Partial(errors) => errors.iter().flat_map(|e| e.components()).collect(),
            other => vec![other],
        }
    }
}

impl From<SdkError> for CliError {
    fn from(err: SdkError) -> Self {
        match err {
            SdkError::OperationFailed { .. } => CliError::Operation(err.to_string()),
            SdkError::Cancelled => CliError::Cancelled,
            other => CliError::Sdk {
                context: "API request failed".into(),
                source: other,
            },
        }
    }
}

/// Attach a one-line context to SDK results, the way `anyhow::Context` does.
pub trait SdkResultExt<T> {
    fn sdk_context<S: Into<String>>(self, context: S) -> Result<T, CliError>;
}

impl<T> SdkResultExt<T> for Result<T, SdkError> {
    fn sdk_context<S: Into<String>>(self, context: S) -> Result<T, CliError> {
        self.map_err(|err| match err {
            SdkError::OperationFailed { .. } | SdkError::Cancelled => CliError::from(err),
            source => CliError::Sdk {
                context: context.into(),
                source,
            },
        })
    }
}
