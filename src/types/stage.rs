use std::fmt;

use super::step::Step;

/// The three evaluation passes of a rule, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Predicate,
    Cache,
    Projection,
}

impl StageKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Predicate => "PREDICATE",
            StageKind::Cache => "CACHE",
            StageKind::Projection => "PROJECTION",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One expression clause: an ordered sequence of steps.
///
/// A step's predecessor is always the step at the previous index.
#[derive(Debug, Clone, Default)]
pub struct Line {
    pub(crate) steps: Vec<Step>,
}

impl Line {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// An ordered sequence of lines evaluated as one pass.
#[derive(Debug, Clone, Default)]
pub struct Stage {
    pub(crate) lines: Vec<Line>,
}

impl Stage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line built by the closure.
    #[must_use]
    pub fn line(mut self, f: impl FnOnce(Line) -> Line) -> Self {
        self.lines.push(f(Line::new()));
        self
    }

    #[must_use]
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }
}
