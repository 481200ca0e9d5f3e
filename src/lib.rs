//! Staged record rules.
//!
//! A [`Rulebase`] holds three stages of steps. Each record is gated by the
//! predicate stage, then the optional cache stage, then transformed by the
//! projection stage into a JSON document (or passed through verbatim) and
//! published to the rule's destination with bounded retry.

mod config;
mod error;
mod evaluate;
mod intake;
pub mod logging;
mod orchestrate;
mod types;

pub use config::{ConfigError, FailurePolicy, RuleConfig, DEFAULT_PUBLISH_ATTEMPTS};
pub use error::StageruleError;
pub use intake::{
    ExitStatus, RecordIntake, RuleWorker, Supervisor, SupervisorError, WorkerExit,
    DEFAULT_QUEUE_DEPTH,
};
pub use orchestrate::{CRITICAL_ERRORS_COUNT, RULE_COUNT, RULE_EXECUTION_TIME};
pub use types::{
    BuildError, CheckpointIdentifier, ComputePlugin, Dimensions, EvalError, FnPlugin,
    GaugeSample, InMemoryMetrics, IoPlugin, Line, LogMetrics, MetricSender, NoopMetrics,
    Outcome, PluginError, RecordSender, Rulebase, RulebaseBuilder, RunReport, SendAll, Stage,
    StageKind, Step, StepKind, Value, Verdict, SEND_ALL,
};
