use std::fmt;

/// Failures of a JK build that are caused by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum JKError {
    /// Invalid settings or inputs that do not match the basis, e.g. mismatching lengths of
    /// the density and scale lists or wrongly shaped matrices.
    Config(String),
    /// The build was requested in a state that does not allow it (before `initialize` or
    /// after `finalize`).
    Lifecycle(String),
}

impl fmt::Display for JKError {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            JKError::Config(message) => write!(f, "JK configuration error: {}", message),
            JKError::Lifecycle(message) => write!(f, "JK lifecycle error: {}", message),
        }
    }
}

impl std::error::Error for JKError {}
