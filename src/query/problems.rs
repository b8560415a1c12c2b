//! Accumulated, non-fatal planning diagnostics.
//!
//! The planner never throws for malformed-query input; it records problems
//! here and keeps going, so planning always terminates with a plan plus
//! zero or more problems. Callers check [`Problems::has_errors`] before
//! handing the plan to an executor.

use std::fmt;

/// How bad a problem is.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Severity {
    /// Planning continued unharmed; the result may still be surprising.
    Warning,
    /// The plan is degenerate; executing it would be wrong.
    Error,
}

/// One recorded diagnostic.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Problem {
    /// Severity of the diagnostic.
    pub severity: Severity,
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{tag}[{}]: {}", self.code, self.message)
    }
}

/// Ordered accumulator of [`Problem`]s.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Problems {
    entries: Vec<Problem>,
}

impl Problems {
    /// An empty accumulator.
    pub fn new() -> Self {
        Problems::default()
    }

    /// Records an error.
    pub fn error(&mut self, code: &'static str, message: impl Into<String>) {
        self.entries.push(Problem {
            severity: Severity::Error,
            code,
            message: message.into(),
        });
    }

    /// Records a warning.
    pub fn warning(&mut self, code: &'static str, message: impl Into<String>) {
        self.entries.push(Problem {
            severity: Severity::Warning,
            code,
            message: message.into(),
        });
    }

    /// Whether at least one error-severity problem was recorded.
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|p| p.severity == Severity::Error)
    }

    /// The recorded problems in order.
    pub fn iter(&self) -> impl Iterator<Item = &Problem> {
        self.entries.iter()
    }

    /// Number of recorded problems.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Problems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{p}")?;
        }
        Ok(())
    }
}
