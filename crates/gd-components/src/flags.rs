//! Discrete operating conditions private to one component instance.

bitflags::bitflags! {
    /// Operational flags; only the owning component's event logic mutates them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpFlags: u32 {
        /// A limiter is currently clamping a state.
        const OUTSIDE_LIMIT = 1 << 0;
        /// Clamped at the upper bound.
        const TRIGGER_HIGH = 1 << 1;
        /// Clamped at the lower bound.
        const TRIGGER_LOW = 1 << 2;
        const HAS_ROOTS = 1 << 3;
        const INITIALIZED_A = 1 << 4;
        const INITIALIZED_B = 1 << 5;
        const TRIPPED = 1 << 6;
        const DISABLED = 1 << 7;
    }
}

bitflags::bitflags! {
    /// Options passed into `initialize_a`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InitFlags: u32 {
        /// Ignore limiters entirely (no roots, no clamping).
        const NO_LIMITS = 1 << 0;
    }
}

/// Which bound a limiter is clamped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitSide {
    High,
    Low,
}

impl OpFlags {
    /// Enter the high-clamped regime. Clears any low trigger.
    pub fn engage_high(&mut self) {
        self.remove(OpFlags::TRIGGER_LOW);
        self.insert(OpFlags::OUTSIDE_LIMIT | OpFlags::TRIGGER_HIGH);
    }

    /// Enter the low-clamped regime. Clears any high trigger.
    pub fn engage_low(&mut self) {
        self.remove(OpFlags::TRIGGER_HIGH);
        self.insert(OpFlags::OUTSIDE_LIMIT | OpFlags::TRIGGER_LOW);
    }

    pub fn release(&mut self) {
        self.remove(OpFlags::OUTSIDE_LIMIT | OpFlags::TRIGGER_HIGH | OpFlags::TRIGGER_LOW);
    }

    pub fn limit_side(&self) -> Option<LimitSide> {
        if !self.contains(OpFlags::OUTSIDE_LIMIT) {
            None
        } else if self.contains(OpFlags::TRIGGER_HIGH) {
            Some(LimitSide::High)
        } else if self.contains(OpFlags::TRIGGER_LOW) {
            Some(LimitSide::Low)
        } else {
            None
        }
    }

    #[inline]
    pub fn is_limited(&self) -> bool {
        self.limit_side().is_some()
    }
}
