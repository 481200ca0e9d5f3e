use std::fmt;
use std::sync::Arc;

use super::plugin::{ComputePlugin, SEND_ALL};
use super::value::Value;

/// What a step does when evaluated, fixed when the step is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// No plugin; contributes its literal value to argument lists only.
    Literal,
    /// Plugin-backed value producer.
    Normal,
    /// Boolean combinator comparing two stored results.
    Operator,
    /// Projection passthrough marker.
    SendAll,
}

/// One node of a [`Line`](super::Line).
///
/// `result` holds whatever the last evaluation wrote and is never reset
/// between records. Steps skipped by a short-circuit keep the value from an
/// earlier pass, and later steps read it as-is.
#[derive(Clone)]
pub struct Step {
    pub(crate) id: Option<String>,
    pub(crate) plugin: Option<Arc<dyn ComputePlugin>>,
    pub(crate) value: Option<String>,
    pub(crate) args: Vec<Step>,
    pub(crate) result: Option<Value>,
    pub(crate) get_prev: bool,
    pub(crate) kind: StepKind,
}

impl Step {
    /// A plugin-backed step. Plugins named [`SEND_ALL`] yield a passthrough step.
    #[must_use]
    pub fn call(plugin: Arc<dyn ComputePlugin>) -> Self {
        let kind = if plugin.name() == SEND_ALL {
            StepKind::SendAll
        } else {
            StepKind::Normal
        };
        Self::with_kind(Some(plugin), kind)
    }

    /// A plugin-less step carrying only a literal value.
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self::with_kind(None, StepKind::Literal).value(value)
    }

    /// An operator step. `operand` is stored as the step's initial result
    /// and is what the operator compares against.
    #[must_use]
    pub fn operator(plugin: Arc<dyn ComputePlugin>, operand: impl Into<Value>) -> Self {
        let mut step = Self::with_kind(Some(plugin), StepKind::Operator);
        step.result = Some(operand.into());
        step
    }

    fn with_kind(plugin: Option<Arc<dyn ComputePlugin>>, kind: StepKind) -> Self {
        Self {
            id: None,
            plugin,
            value: None,
            args: Vec::new(),
            result: None,
            get_prev: false,
            kind,
        }
    }

    /// Set the identifier. In projection stages it names the output field.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the literal value.
    #[must_use]
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Read the preceding step's result as this step's value.
    #[must_use]
    pub fn get_prev(mut self) -> Self {
        self.get_prev = true;
        self
    }

    /// Append an extra argument (or trailing operator) child.
    #[must_use]
    pub fn arg(mut self, child: Step) -> Self {
        self.args.push(child);
        self
    }

    #[must_use]
    pub fn kind(&self) -> StepKind {
        self.kind
    }

    #[must_use]
    pub fn step_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[must_use]
    pub fn literal_value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// The result written by the most recent evaluation.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn args(&self) -> &[Step] {
        &self.args
    }

    #[must_use]
    pub fn reads_previous(&self) -> bool {
        self.get_prev
    }

    #[must_use]
    pub fn plugin_name(&self) -> Option<&str> {
        self.plugin.as_deref().map(|plugin| plugin.name())
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("plugin", &self.plugin_name())
            .field("value", &self.value)
            .field("args", &self.args)
            .field("result", &self.result)
            .field("get_prev", &self.get_prev)
            .field("kind", &self.kind)
            .finish()
    }
}
