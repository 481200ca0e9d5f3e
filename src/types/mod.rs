mod checkpoint;
mod error;
mod metrics;
mod plugin;
mod rulebase;
mod run_report;
mod stage;
mod step;
mod value;
mod verdict;

pub use checkpoint::CheckpointIdentifier;
pub use error::{BuildError, EvalError};
pub use metrics::{Dimensions, GaugeSample, InMemoryMetrics, LogMetrics, MetricSender, NoopMetrics};
pub use plugin::{
    ComputePlugin, FnPlugin, IoPlugin, PluginError, RecordSender, SendAll, SEND_ALL,
};
pub use rulebase::{Rulebase, RulebaseBuilder};
pub use run_report::{Outcome, RunReport};
pub use stage::{Line, Stage, StageKind};
pub use step::{Step, StepKind};
pub use value::Value;
pub use verdict::Verdict;
