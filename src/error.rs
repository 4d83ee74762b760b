use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("filter startup failed: {0}")]
    Startup(#[source] anyhow::Error),

    #[error("filter is not started")]
    NotStarted,

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("{scanner} scanner failed: {source}")]
    Scanner {
        scanner: String,
        #[source]
        source: anyhow::Error,
    },
}

/// A forbidden string located in scanned content, with the text around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForbiddenMatch {
    pub forbidden: String,
    pub context: String,
}

/// Why a request was turned away. `Display` renders the message surfaced to
/// the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    PromptInjection { risk_score: f64 },
    ConfidentialContent { matches: Vec<ForbiddenMatch> },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::PromptInjection { risk_score } => {
                write!(f, "Prompt injection detected with risk score: {risk_score:.2}")
            }
            Rejection::ConfidentialContent { matches } => {
                f.write_str("Confidential information detected:\n")?;
                for item in matches {
                    write!(
                        f,
                        "\n- Found '{}' in context:\n  ...{}...",
                        item.forbidden, item.context
                    )?;
                }
                Ok(())
            }
        }
    }
}
