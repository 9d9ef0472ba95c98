//! Compile unit lifecycle

use super::DiagnosticCounts;
use crate::error::{KilnError, KilnResult};
use crate::store::Digest;
use std::fmt;

/// Where a compile unit is in its lifecycle
#[derive(Debug, Clone)]
pub enum UnitState {
    Pending,
    Analyzing,
    ClasspathReady,
    SandboxReady,
    Executing {
        round: usize,
    },
    AwaitingNextRound {
        round: usize,
        generated_sources: Vec<String>,
    },
    Succeeded {
        output_digest: Digest,
        diagnostic_counts: DiagnosticCounts,
        from_cache: bool,
    },
    Failed {
        error: KilnError,
    },
}

impl UnitState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Analyzing => "analyzing",
            Self::ClasspathReady => "classpath-ready",
            Self::SandboxReady => "sandbox-ready",
            Self::Executing { .. } => "executing",
            Self::AwaitingNextRound { .. } => "awaiting-next-round",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }

    fn allows(&self, next: &UnitState) -> bool {
        use UnitState::*;
        match (self, next) {
            (_, Failed { .. }) => !self.is_terminal(),
            (Pending, Analyzing) => true,
            (Analyzing, ClasspathReady) => true,
            (ClasspathReady, SandboxReady) => true,
            (SandboxReady, Executing { round: 1 }) => true,
            (SandboxReady, Succeeded { from_cache: true, .. }) => true,
            (Executing { round }, AwaitingNextRound { round: next, .. }) => round == next,
            (AwaitingNextRound { round, .. }, Executing { round: next }) => *next == round + 1,
            (Executing { .. }, Succeeded { from_cache: false, .. }) => true,
            _ => false,
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Executing { round } => write!(f, "executing (round {})", round),
            Self::AwaitingNextRound { round, generated_sources } => write!(
                f,
                "awaiting round {} ({} generated source(s))",
                round + 1,
                generated_sources.len()
            ),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// A unit's current state and every state it passed through
#[derive(Debug, Clone)]
pub struct UnitProgress {
    unit: String,
    history: Vec<UnitState>,
}

impl UnitProgress {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            history: vec![UnitState::Pending],
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn current(&self) -> &UnitState {
        // history always starts with Pending
        &self.history[self.history.len() - 1]
    }

    pub fn history(&self) -> &[UnitState] {
        &self.history
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow
    pub fn advance(&mut self, next: UnitState) -> KilnResult<()> {
        if !self.current().allows(&next) {
            return Err(KilnError::Internal(format!(
                "{}: illegal transition {} -> {}",
                self.unit,
                self.current(),
                next
            )));
        }
        tracing::debug!("{}: {}", self.unit, next);
        self.history.push(next);
        Ok(())
    }

    /// Record a failure and hand the error back for propagation
    pub fn fail(&mut self, error: KilnError) -> KilnError {
        if !self.current().is_terminal() {
            self.history.push(UnitState::Failed { error: error.clone() });
        }
        error
    }

    /// Number of compiler rounds executed
    pub fn rounds(&self) -> usize {
        self.history
            .iter()
            .filter(|state| matches!(state, UnitState::Executing { .. }))
            .count()
    }

    /// State names in order, for logs and tests
    pub fn trail(&self) -> Vec<&'static str> {
        self.history.iter().map(UnitState::name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn succeeded(from_cache: bool) -> UnitState {
        UnitState::Succeeded {
            output_digest: Digest::empty(),
            diagnostic_counts: DiagnosticCounts::default(),
            from_cache,
        }
    }

    fn ready(progress: &mut UnitProgress) {
        progress.advance(UnitState::Analyzing).unwrap();
        progress.advance(UnitState::ClasspathReady).unwrap();
        progress.advance(UnitState::SandboxReady).unwrap();
    }

    #[test]
    fn two_round_lifecycle() {
        let mut p = UnitProgress::new("app");
        ready(&mut p);
        p.advance(UnitState::Executing { round: 1 }).unwrap();
        p.advance(UnitState::AwaitingNextRound {
            round: 1,
            generated_sources: vec!["generated/A_Gen.java".into()],
        })
        .unwrap();
        p.advance(UnitState::Executing { round: 2 }).unwrap();
        p.advance(succeeded(false)).unwrap();

        assert_eq!(p.rounds(), 2);
        assert_eq!(
            p.trail(),
            vec![
                "pending",
                "analyzing",
                "classpath-ready",
                "sandbox-ready",
                "executing",
                "awaiting-next-round",
                "executing",
                "succeeded"
            ]
        );
    }

    #[test]
    fn cache_hit_skips_execution() {
        let mut p = UnitProgress::new("app");
        ready(&mut p);
        p.advance(succeeded(true)).unwrap();
        assert_eq!(p.rounds(), 0);
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut p = UnitProgress::new("app");
        assert!(p.advance(UnitState::SandboxReady).is_err());

        ready(&mut p);
        assert!(p.advance(UnitState::Executing { round: 2 }).is_err());
        assert!(p.advance(succeeded(false)).is_err());

        p.advance(UnitState::Executing { round: 1 }).unwrap();
        assert!(p.advance(succeeded(true)).is_err());
    }

    #[test]
    fn failure_is_terminal() {
        let mut p = UnitProgress::new("app");
        p.advance(UnitState::Analyzing).unwrap();
        let err = p.fail(KilnError::Internal("boom".into()));
        assert_eq!(err.to_string(), "Internal error: boom");
        assert!(p.current().is_terminal());

        p.fail(KilnError::Internal("again".into()));
        assert_eq!(p.history().len(), 3);
        assert!(p.advance(UnitState::ClasspathReady).is_err());
    }
}
