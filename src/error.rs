use thiserror::Error;

use crate::config::ConfigError;
use crate::intake::SupervisorError;
use crate::{BuildError, EvalError, PluginError};

/// Unified error type for callers that do not care which layer failed.
#[derive(Debug, Error)]
pub enum StageruleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
