use std::fmt;
use std::time::Duration;

use super::error::EvalError;
use super::stage::StageKind;

/// Terminal state of one record.
#[derive(Debug)]
pub enum Outcome {
    /// A gate returned `false` (or the projection produced nothing).
    Rejected(StageKind),
    /// The document was published.
    Published { attempts: u32 },
    /// Every publish attempt failed.
    PublishExhausted { attempts: u32 },
    /// A stage hit a hard error; the record was dropped unacknowledged.
    Failed { stage: StageKind, error: EvalError },
}

/// Report returned by [`Rulebase::run_rule()`](super::Rulebase::run_rule).
#[derive(Debug)]
#[must_use]
pub struct RunReport {
    outcome: Outcome,
    duration: Duration,
}

impl RunReport {
    pub(crate) fn new(outcome: Outcome, duration: Duration) -> Self {
        Self { outcome, duration }
    }

    #[must_use]
    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    #[must_use]
    pub fn into_outcome(self) -> Outcome {
        self.outcome
    }

    /// Publish attempts made; zero if the record never reached publish.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self.outcome {
            Outcome::Published { attempts } | Outcome::PublishExhausted { attempts } => attempts,
            _ => 0,
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }

    /// Wall-clock time from predicate start to the terminal state.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Rejected(stage) => write!(f, "rejected at {stage}")?,
            Outcome::Published { attempts } => write!(f, "published after {attempts} attempt(s)")?,
            Outcome::PublishExhausted { attempts } => {
                write!(f, "publish failed after {attempts} attempt(s)")?;
            }
            Outcome::Failed { stage, error } => write!(f, "failed at {stage}: {error}")?,
        }
        write!(f, ", duration: {:?}", self.duration)
    }
}
