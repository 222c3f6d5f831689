//! Assignment of global offsets to every component, per solver mode.
//!
//! For each mode the registry walks the host in index order and hands out contiguous ranges:
//! differential states first, algebraic states after the whole differential partition, then
//! root slots and Jacobian nonzero counts. The ranges partition each buffer exactly.

use gd_components::{OffsetBlock, SolverMode};
use tracing::debug;

use crate::error::{SolverError, SolverResult};
use crate::host::{ComponentHost, is_active};

/// Buffer sizes for one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeTotals {
    pub diff: usize,
    pub alg: usize,
    pub roots: usize,
    pub jac: usize,
}

impl ModeTotals {
    /// Length of the state vector.
    #[inline]
    pub fn states(&self) -> usize {
        self.diff + self.alg
    }
}

#[derive(Debug, Clone, Default)]
struct ModeTable {
    totals: ModeTotals,
    /// Component index owning each root slot.
    root_owners: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct OffsetRegistry {
    tables: [Option<ModeTable>; 3],
    valid: bool,
    version: u64,
}

impl OffsetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign offsets for every mode. Components must have run `initialize_a`.
    pub fn assign<H: ComponentHost + ?Sized>(&mut self, host: &mut H) -> SolverResult<()> {
        for i in 0..host.len() {
            host.component_mut(i).core_mut().offsets.clear();
        }
        for mode in SolverMode::ALL {
            let table = assign_mode(host, mode);
            debug!(
                %mode,
                diff = table.totals.diff,
                alg = table.totals.alg,
                roots = table.totals.roots,
                jac = table.totals.jac,
                "offsets assigned"
            );
            self.tables[mode.slot()] = Some(table);
        }
        self.valid = true;
        self.version += 1;
        Ok(())
    }

    /// Mark offsets stale after a Jacobian-structure or topology change.
    pub fn invalidate(&mut self) {
        if self.valid {
            debug!(version = self.version, "offsets invalidated");
        }
        self.valid = false;
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Incremented on every successful `assign`.
    pub fn structure_version(&self) -> u64 {
        self.version
    }

    pub fn totals(&self, mode: SolverMode) -> Option<ModeTotals> {
        self.tables[mode.slot()].as_ref().map(|t| t.totals)
    }

    /// Totals for `mode`, failing if offsets are stale.
    pub fn require(&self, mode: SolverMode) -> SolverResult<ModeTotals> {
        match self.totals(mode) {
            Some(t) if self.valid => Ok(t),
            _ => Err(SolverError::StaleOffsets),
        }
    }

    /// Component owning root slot `root`.
    pub fn root_owner(&self, mode: SolverMode, root: usize) -> Option<usize> {
        self.tables[mode.slot()]
            .as_ref()
            .and_then(|t| t.root_owners.get(root).copied())
    }

    /// Check that the assigned ranges partition each buffer exactly.
    pub fn verify<H: ComponentHost + ?Sized>(&self, host: &H) -> SolverResult<()> {
        for mode in SolverMode::ALL {
            let totals = self.require(mode)?;
            let mut states = Vec::new();
            let mut roots = Vec::new();
            let mut jac = Vec::new();
            for i in 0..host.len() {
                if let Some(b) = host.component(i).core().block(mode) {
                    states.push(b.diff_range());
                    states.push(b.alg_range());
                    roots.push(b.root_range());
                    jac.push(b.jac..b.jac + host.component(i).jac_size(mode));
                }
            }
            check_partition(states, totals.states(), mode, "state")?;
            check_partition(roots, totals.roots, mode, "root")?;
            check_partition(jac, totals.jac, mode, "jacobian")?;
        }
        Ok(())
    }
}

fn assign_mode<H: ComponentHost + ?Sized>(host: &mut H, mode: SolverMode) -> ModeTable {
    let diff_total: usize = (0..host.len())
        .map(|i| host.component(i))
        .filter(|c| is_active(*c))
        .map(|c| c.core().sizes.for_mode(mode).diff)
        .sum();

    let mut next = OffsetBlock {
        alg: diff_total,
        ..OffsetBlock::default()
    };
    let mut root_owners = Vec::new();
    for i in 0..host.len() {
        let comp = host.component_mut(i);
        if !is_active(comp) {
            continue;
        }
        let sizes = comp.core().sizes.for_mode(mode);
        let jac = comp.jac_size(mode);
        let block = OffsetBlock { sizes, ..next };
        comp.core_mut().offsets.set(mode, block);

        next.diff += sizes.diff;
        next.alg += sizes.alg;
        next.root += sizes.roots;
        next.jac += jac;
        root_owners.extend(std::iter::repeat_n(i, sizes.roots));
    }
    ModeTable {
        totals: ModeTotals {
            diff: next.diff,
            alg: next.alg - diff_total,
            roots: next.root,
            jac: next.jac,
        },
        root_owners,
    }
}

fn check_partition(
    mut ranges: Vec<std::ops::Range<usize>>,
    total: usize,
    mode: SolverMode,
    what: &str,
) -> SolverResult<()> {
    ranges.retain(|r| !r.is_empty());
    ranges.sort_by_key(|r| r.start);
    let mut cursor = 0;
    for r in ranges {
        if r.start != cursor {
            return Err(SolverError::InvalidState {
                what: format!("{mode} {what} partition broken at {cursor} (next range {r:?})"),
            });
        }
        cursor = r.end;
    }
    if cursor != total {
        return Err(SolverError::InvalidState {
            what: format!("{mode} {what} partition covers {cursor} of {total}"),
        });
    }
    Ok(())
}
