use thiserror::Error;

use super::plugin::PluginError;

/// Hard failures while evaluating a stage. A gate rejection is not an error.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("step {step} of line {line} reads the previous result but is the front of its line")]
    PreviousOfFirstStep { line: usize, step: usize },

    #[error("step {step} of line {line} expected a string previous result, found {found}")]
    PreviousNotText {
        line: usize,
        step: usize,
        found: &'static str,
    },

    #[error("step {step} of line {line} has an operator argument but no value to compare")]
    MissingValue { line: usize, step: usize },

    #[error("operator at step {step} of line {line} has an unset operand")]
    UnsetOperand { line: usize, step: usize },

    #[error("operator '{plugin}' at step {step} of line {line} returned {found}, expected bool")]
    NonBooleanOperator {
        plugin: String,
        line: usize,
        step: usize,
        found: &'static str,
    },

    #[error("argument of step {step} in line {line} failed")]
    Argument {
        line: usize,
        step: usize,
        #[source]
        source: PluginError,
    },

    #[error("step {step} of line {line} failed")]
    Plugin {
        line: usize,
        step: usize,
        #[source]
        source: PluginError,
    },

    #[error("projection step {step} of line {line} has no id")]
    MissingStepId { line: usize, step: usize },

    #[error("failed to encode projection output")]
    Serialize(#[from] serde_json::Error),
}

/// Errors raised while assembling a [`Rulebase`](super::Rulebase).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("rule '{rule}' has no destination")]
    MissingDestination { rule: String },
}
