//! Per-component sizes and assigned offsets into the global buffers.

use crate::mode::SolverMode;

/// Local equation counts reported by a component for one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComponentSizes {
    pub diff: usize,
    pub alg: usize,
    pub roots: usize,
    pub jac: usize,
}

impl ComponentSizes {
    /// Counts visible to the solver in `mode`.
    pub fn for_mode(self, mode: SolverMode) -> ComponentSizes {
        ComponentSizes {
            diff: if mode.has_differential() { self.diff } else { 0 },
            alg: if mode.has_algebraic() { self.alg } else { 0 },
            ..self
        }
    }

    #[inline]
    pub fn states(self) -> usize {
        self.diff + self.alg
    }
}

/// Base indices of one component in one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OffsetBlock {
    pub diff: usize,
    pub alg: usize,
    pub root: usize,
    pub jac: usize,
    pub sizes: ComponentSizes,
}

impl OffsetBlock {
    pub fn diff_range(&self) -> std::ops::Range<usize> {
        self.diff..self.diff + self.sizes.diff
    }

    pub fn alg_range(&self) -> std::ops::Range<usize> {
        self.alg..self.alg + self.sizes.alg
    }

    pub fn root_range(&self) -> std::ops::Range<usize> {
        self.root..self.root + self.sizes.roots
    }

    /// True when `index` is one of this block's state rows.
    pub fn owns_state(&self, index: usize) -> bool {
        self.diff_range().contains(&index) || self.alg_range().contains(&index)
    }
}

/// Offsets for every solver mode; `None` until the registry assigns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OffsetTable {
    blocks: [Option<OffsetBlock>; 3],
}

impl OffsetTable {
    #[inline]
    pub fn get(&self, mode: SolverMode) -> Option<&OffsetBlock> {
        self.blocks[mode.slot()].as_ref()
    }

    pub fn set(&mut self, mode: SolverMode, block: OffsetBlock) {
        self.blocks[mode.slot()] = Some(block);
    }

    pub fn clear(&mut self) {
        self.blocks = [None; 3];
    }

    pub fn is_assigned(&self, mode: SolverMode) -> bool {
        self.blocks[mode.slot()].is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_per_mode() {
        let s = ComponentSizes {
            diff: 2,
            alg: 1,
            roots: 1,
            jac: 7,
        };
        assert_eq!(s.for_mode(SolverMode::AlgebraicOnly).diff, 0);
        assert_eq!(s.for_mode(SolverMode::DifferentialOnly).alg, 0);
        assert_eq!(s.for_mode(SolverMode::Full).states(), 3);
    }

    #[test]
    fn table_set_and_clear() {
        let mut t = OffsetTable::default();
        assert!(t.get(SolverMode::Full).is_none());
        t.set(
            SolverMode::Full,
            OffsetBlock {
                diff: 4,
                alg: 10,
                root: 0,
                jac: 0,
                sizes: ComponentSizes {
                    diff: 2,
                    alg: 1,
                    roots: 0,
                    jac: 5,
                },
            },
        );
        let b = t.get(SolverMode::Full).copied().unwrap();
        assert!(b.owns_state(5));
        assert!(b.owns_state(10));
        assert!(!b.owns_state(6));
        t.clear();
        assert!(!t.is_assigned(SolverMode::Full));
    }
}
