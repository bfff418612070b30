use thiserror::Error;

/// Why a directive did not produce a handler result
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error("unknown capability '{0}'")]
    UnknownCapability(String),

    #[error("{capability}: missing required parameter '{parameter}'")]
    MissingParameter {
        capability: String,
        parameter: String,
    },

    #[error("{capability}: invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        capability: String,
        parameter: String,
        reason: String,
    },

    #[error("malformed directive: {0}")]
    MalformedDirective(String),

    #[error("{capability} rejected: {reason}")]
    Rejected { capability: String, reason: String },

    #[error("{capability} failed: {reason}")]
    Handler { capability: String, reason: String },
}

impl DispatchError {
    pub fn rejected(capability: &str, reason: impl ToString) -> Self {
        DispatchError::Rejected {
            capability: capability.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn handler(capability: &str, reason: impl ToString) -> Self {
        DispatchError::Handler {
            capability: capability.to_string(),
            reason: reason.to_string(),
        }
    }
}
