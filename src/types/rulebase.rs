use std::fmt;
use std::sync::Arc;

use super::error::{BuildError, EvalError};
use super::metrics::{MetricSender, NoopMetrics};
use super::plugin::IoPlugin;
use super::stage::{Stage, StageKind};
use super::verdict::Verdict;
use crate::config::{FailurePolicy, RuleConfig};
use crate::evaluate::{self, CacheWrite};

/// Builder for constructing a [`Rulebase`].
///
/// Stages are defined via closures, mirroring how lines are added to a stage.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use stagerule::{FnPlugin, RulebaseBuilder, SendAll, Step};
/// # use stagerule::{Dimensions, IoPlugin, PluginError, RecordSender};
/// # use std::sync::mpsc::Sender;
/// # struct Stdout;
/// # impl IoPlugin for Stdout {
/// #     fn name(&self) -> &str { "stdout" }
/// #     fn consume(&self, _: &RecordSender, _: &Sender<PluginError>) -> Result<(), PluginError> {
/// #         Ok(())
/// #     }
/// #     fn publish(&self, _: &[u8], _: &Dimensions) -> Result<bool, PluginError> { Ok(true) }
/// # }
///
/// let rule = RulebaseBuilder::new("everything")
///     .projection(|s| s.line(|l| l.step(Step::call(Arc::new(SendAll)).id("all"))))
///     .destination(Arc::new(Stdout))
///     .build()
///     .unwrap();
/// assert_eq!(rule.name(), "everything");
/// ```
pub struct RulebaseBuilder {
    config: RuleConfig,
    predicate: Stage,
    cache: Option<Stage>,
    projection: Stage,
    destination: Option<Arc<dyn IoPlugin>>,
    metrics: Arc<dyn MetricSender>,
}

impl RulebaseBuilder {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self::from_config(RuleConfig::new(name))
    }

    /// Start from a loaded [`RuleConfig`].
    #[must_use]
    pub fn from_config(config: RuleConfig) -> Self {
        Self {
            config,
            predicate: Stage::new(),
            cache: None,
            projection: Stage::new(),
            destination: None,
            metrics: Arc::new(NoopMetrics),
        }
    }

    #[must_use]
    pub fn predicate(mut self, f: impl FnOnce(Stage) -> Stage) -> Self {
        self.predicate = f(Stage::new());
        self
    }

    /// Define the optional cache stage. Without it the cache gate always passes.
    #[must_use]
    pub fn cache(mut self, f: impl FnOnce(Stage) -> Stage) -> Self {
        self.cache = Some(f(Stage::new()));
        self
    }

    #[must_use]
    pub fn projection(mut self, f: impl FnOnce(Stage) -> Stage) -> Self {
        self.projection = f(Stage::new());
        self
    }

    #[must_use]
    pub fn destination(mut self, plugin: Arc<dyn IoPlugin>) -> Self {
        self.destination = Some(plugin);
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricSender>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Acknowledge every record that reaches a terminal state.
    #[must_use]
    pub fn checkpoint(mut self, enabled: bool) -> Self {
        self.config.checkpoint = enabled;
        self
    }

    /// Publish attempts per record. Values below 1 are raised to 1.
    #[must_use]
    pub fn publish_attempts(mut self, attempts: u32) -> Self {
        self.config.publish_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn on_error(mut self, policy: FailurePolicy) -> Self {
        self.config.on_error = policy;
        self
    }

    /// Assemble the rule.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if no destination was set.
    pub fn build(self) -> Result<Rulebase, BuildError> {
        let destination = self.destination.ok_or_else(|| BuildError::MissingDestination {
            rule: self.config.name.clone(),
        })?;
        let mut config = self.config;
        config.publish_attempts = config.publish_attempts.max(1);
        Ok(Rulebase {
            config,
            predicate: self.predicate,
            cache: self.cache,
            projection: self.projection,
            destination,
            metrics: self.metrics,
        })
    }
}

/// One compiled rule: its three stages, destination and metrics sender.
///
/// A `Rulebase` mutates step results while it evaluates, so records must be
/// fed to it one at a time. Distinct rulebases share nothing and can run on
/// separate threads.
pub struct Rulebase {
    pub(crate) config: RuleConfig,
    pub(crate) predicate: Stage,
    pub(crate) cache: Option<Stage>,
    pub(crate) projection: Stage,
    pub(crate) destination: Arc<dyn IoPlugin>,
    pub(crate) metrics: Arc<dyn MetricSender>,
}

impl Rulebase {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[must_use]
    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    #[must_use]
    pub fn checkpoint_enabled(&self) -> bool {
        self.config.checkpoint
    }

    #[must_use]
    pub fn failure_policy(&self) -> FailurePolicy {
        self.config.on_error
    }

    /// The stage of the given kind; `None` only for an unconfigured cache.
    #[must_use]
    pub fn stage(&self, kind: StageKind) -> Option<&Stage> {
        match kind {
            StageKind::Predicate => Some(&self.predicate),
            StageKind::Cache => self.cache.as_ref(),
            StageKind::Projection => Some(&self.projection),
        }
    }

    /// Evaluate one stage against a raw record.
    ///
    /// A rejected gate is `Ok` with a non-passing [`Verdict`]; only hard
    /// failures are errors. Projection verdicts carry the output document.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError`] on malformed trees, plugin failures or output
    /// encoding failures.
    pub fn evaluate(&mut self, kind: StageKind, record: &str) -> Result<Verdict, EvalError> {
        match kind {
            StageKind::Predicate => evaluate::evaluate(&mut self.predicate, kind, record, None),
            StageKind::Cache => match self.cache.as_mut() {
                Some(stage) => evaluate::evaluate(stage, kind, record, Some(&CacheWrite)),
                None => Ok(Verdict::pass(kind)),
            },
            StageKind::Projection => evaluate::evaluate(&mut self.projection, kind, record, None),
        }
    }
}

impl fmt::Debug for Rulebase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rulebase")
            .field("config", &self.config)
            .field("predicate", &self.predicate)
            .field("cache", &self.cache)
            .field("projection", &self.projection)
            .field("destination", &self.destination.name())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Rulebase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rulebase({}: {} predicate lines, {} cache lines, {} projection lines -> {})",
            self.config.name,
            self.predicate.lines.len(),
            self.cache.as_ref().map_or(0, |c| c.lines.len()),
            self.projection.lines.len(),
            self.destination.name(),
        )
    }
}
