use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::ids::ExecutionId;

/// A `flatagents://{execution_id}/{path}` address: the one name a result or
/// checkpoint is known by, independent of which `ResultBackend` implementation
/// is actually storing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri {
    pub execution_id: ExecutionId,
    pub path: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UriParseError {
    #[error("uri must start with \"flatagents://\"")]
    MissingScheme,
    #[error("uri has no execution id")]
    MissingExecutionId,
    #[error("invalid execution id: {0}")]
    InvalidExecutionId(String),
    #[error("uri has no path component")]
    MissingPath,
}

impl Uri {
    pub fn new(execution_id: ExecutionId, path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Self { execution_id, path }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flatagents://{}{}", self.execution_id, self.path)
    }
}

impl FromStr for Uri {
    type Err = UriParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix("flatagents://").ok_or(UriParseError::MissingScheme)?;
        let (id_part, path_part) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        if id_part.is_empty() {
            return Err(UriParseError::MissingExecutionId);
        }
        let execution_id = id_part
            .parse::<ExecutionId>()
            .map_err(|_| UriParseError::InvalidExecutionId(id_part.to_string()))?;
        if path_part.is_empty() {
            return Err(UriParseError::MissingPath);
        }
        Ok(Uri {
            execution_id,
            path: path_part.to_string(),
        })
    }
}
