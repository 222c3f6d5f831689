//! Solver modes, change codes and check levels.

use std::fmt;

/// Which partitions of the global unknown vector the solver is working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolverMode {
    /// Algebraic states only (power-flow style initialization).
    AlgebraicOnly,
    /// Differential states only (explicit integration).
    DifferentialOnly,
    /// Differential partition first, algebraic partition after it.
    Full,
}

impl SolverMode {
    pub const ALL: [SolverMode; 3] = [
        SolverMode::AlgebraicOnly,
        SolverMode::DifferentialOnly,
        SolverMode::Full,
    ];

    /// Dense index used for per-mode tables.
    #[inline]
    pub fn slot(self) -> usize {
        match self {
            SolverMode::AlgebraicOnly => 0,
            SolverMode::DifferentialOnly => 1,
            SolverMode::Full => 2,
        }
    }

    #[inline]
    pub fn has_differential(self) -> bool {
        !matches!(self, SolverMode::AlgebraicOnly)
    }

    #[inline]
    pub fn has_algebraic(self) -> bool {
        !matches!(self, SolverMode::DifferentialOnly)
    }

    #[inline]
    pub fn is_algebraic_only(self) -> bool {
        matches!(self, SolverMode::AlgebraicOnly)
    }
}

impl fmt::Display for SolverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolverMode::AlgebraicOnly => "algebraic",
            SolverMode::DifferentialOnly => "differential",
            SolverMode::Full => "full",
        };
        f.write_str(s)
    }
}

/// Outcome of a discrete check; ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ChangeCode {
    #[default]
    NoChange,
    /// States or parameters changed; the sparsity pattern is intact.
    ValueChange,
    /// The set or count of Jacobian entries changed.
    JacobianChange,
}

/// How far a root check may go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum CheckLevel {
    /// Only reversible regime switches (limiters).
    #[default]
    ReversibleOnly,
    /// Irreversible actions such as relay trips are allowed.
    Full,
    /// Like `Full`, and re-establish consistent states afterwards.
    Complete,
}

impl CheckLevel {
    pub fn allows_irreversible(self) -> bool {
        self >= CheckLevel::Full
    }

    pub fn wants_consistency(self) -> bool {
        self == CheckLevel::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_code_ordering() {
        assert!(ChangeCode::NoChange < ChangeCode::ValueChange);
        assert!(ChangeCode::ValueChange < ChangeCode::JacobianChange);
        let worst = [ChangeCode::ValueChange, ChangeCode::JacobianChange, ChangeCode::NoChange]
            .into_iter()
            .max();
        assert_eq!(worst, Some(ChangeCode::JacobianChange));
    }

    #[test]
    fn mode_partitions() {
        assert!(!SolverMode::AlgebraicOnly.has_differential());
        assert!(SolverMode::Full.has_differential() && SolverMode::Full.has_algebraic());
        assert!(!SolverMode::DifferentialOnly.has_algebraic());
        let slots: Vec<_> = SolverMode::ALL.iter().map(|m| m.slot()).collect();
        assert_eq!(slots, vec![0, 1, 2]);
    }

    #[test]
    fn check_levels() {
        assert!(!CheckLevel::ReversibleOnly.allows_irreversible());
        assert!(CheckLevel::Full.allows_irreversible());
        assert!(CheckLevel::Complete.wants_consistency());
        assert!(!CheckLevel::Full.wants_consistency());
    }
}
