//! Failures raised while turning a snippet into a call

use thiserror::Error;

/// Coarse classification used by callers that only care about the failure family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    LookupFailure,
    TypeMismatch,
    InvalidArgument,
    UnsupportedResult,
    UnknownBuiltin,
    HostFailure,
}

/// Every error a snippet dispatch can end with.
///
/// Handles are printed in lowercase hex so log lines can be matched against
/// server-side form ids.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("Class {class} not found")]
    ClassNotFound { class: String },

    #[error("{class}.{function} is not a callable member")]
    MemberNotFound { class: String, function: String },

    #[error("No local id for remote form {remote_id:x}")]
    UnmappedHandle { remote_id: u32 },

    #[error("Unable to find form with id {form_id:x}")]
    FormNotFound { form_id: u32 },

    #[error("Form {form_id:x} is not instance of {class}, form type is {actual}")]
    TypeMismatch {
        form_id: u32,
        class: String,
        actual: String,
    },

    #[error("Invalid argument {index} for {function}: {reason}")]
    InvalidArgument {
        function: String,
        index: usize,
        reason: String,
    },

    #[error("Unsupported SpSnippet result type '{type_name}'")]
    UnsupportedResult { type_name: &'static str },

    #[error("Unknown SkympHack - {function}")]
    UnknownBuiltin { function: String },

    #[error("{0}")]
    Host(String),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::ClassNotFound { .. }
            | DispatchError::MemberNotFound { .. }
            | DispatchError::UnmappedHandle { .. }
            | DispatchError::FormNotFound { .. } => ErrorKind::LookupFailure,
            DispatchError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            DispatchError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            DispatchError::UnsupportedResult { .. } => ErrorKind::UnsupportedResult,
            DispatchError::UnknownBuiltin { .. } => ErrorKind::UnknownBuiltin,
            DispatchError::Host(_) => ErrorKind::HostFailure,
        }
    }

    pub fn invalid_argument(function: &str, index: usize, reason: impl Into<String>) -> Self {
        DispatchError::InvalidArgument {
            function: function.to_string(),
            index,
            reason: reason.into(),
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
