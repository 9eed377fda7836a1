use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use amadeus_lib::AmadeusError;

#[derive(Debug)]
pub enum CliError {
    Io(std::io::Error),
    ReadScript {
        path: PathBuf,
        source: std::io::Error,
    },
    InvalidScript(serde_json::Error),
    Amadeus(AmadeusError),
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "terminal error: {}", err),
            Self::ReadScript { path, source } => {
                write!(f, "cannot read script {}: {}", path.display(), source)
            }
            Self::InvalidScript(err) => write!(f, "invalid script: {}", err),
            Self::Amadeus(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::ReadScript { source, .. } => Some(source),
            Self::InvalidScript(err) => Some(err),
            Self::Amadeus(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidScript(value)
    }
}

impl From<AmadeusError> for CliError {
    fn from(value: AmadeusError) -> Self {
        Self::Amadeus(value)
    }
}
