use std::fmt;

use super::stage::StageKind;

/// Outcome of evaluating one stage against one record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Verdict {
    stage: StageKind,
    passed: bool,
    output: Option<Vec<u8>>,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.stage, self.passed)?;
        if let Some(output) = &self.output {
            write!(f, " ({} bytes)", output.len())?;
        }
        Ok(())
    }
}

impl Verdict {
    pub fn pass(stage: StageKind) -> Self {
        Self {
            stage,
            passed: true,
            output: None,
        }
    }

    pub fn reject(stage: StageKind) -> Self {
        Self {
            stage,
            passed: false,
            output: None,
        }
    }

    pub fn with_output(stage: StageKind, output: Vec<u8>) -> Self {
        Self {
            stage,
            passed: true,
            output: Some(output),
        }
    }

    #[must_use]
    pub fn stage(&self) -> StageKind {
        self.stage
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.passed
    }

    /// Projection output, if any.
    #[must_use]
    pub fn output(&self) -> Option<&[u8]> {
        self.output.as_deref()
    }

    #[must_use]
    pub fn into_output(self) -> Option<Vec<u8>> {
        self.output
    }
}
