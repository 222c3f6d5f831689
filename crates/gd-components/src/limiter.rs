//! Two-sided state limiter with hysteresis-protected roots.
//!
//! Unlimited, the root is the distance to the nearest bound plus [`ROOT_HYSTERESIS`], so it
//! crosses zero only once the state overshoots a bound by the margin. Clamped, the root
//! follows the recovery signal (the unclamped rate of change): it stays positive while
//! the dynamics keep pushing into the bound and crosses zero once they pull away by the margin.

use crate::flags::{LimitSide, OpFlags};
use crate::mode::ChangeCode;

/// Margin separating the engage and release thresholds.
pub const ROOT_HYSTERESIS: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limiter {
    pub min: f64,
    pub max: f64,
}

impl Limiter {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// A limiter with both bounds infinite never produces events.
    pub fn is_active(&self) -> bool {
        self.min.is_finite() || self.max.is_finite()
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    /// Side the value starts on, without hysteresis; used during initialization.
    pub fn initial_side(&self, value: f64) -> Option<LimitSide> {
        if value > self.max {
            Some(LimitSide::High)
        } else if value < self.min {
            Some(LimitSide::Low)
        } else {
            None
        }
    }

    pub fn root(&self, flags: OpFlags, value: f64, recovery: f64) -> f64 {
        match flags.limit_side() {
            None => (self.max - value).min(value - self.min) + ROOT_HYSTERESIS,
            Some(LimitSide::High) => recovery + ROOT_HYSTERESIS,
            Some(LimitSide::Low) => ROOT_HYSTERESIS - recovery,
        }
    }

    /// Apply a regime switch when a threshold has been crossed.
    ///
    /// Engaging clamps `value` exactly to the bound.
    pub fn check(&self, flags: &mut OpFlags, value: &mut f64, recovery: f64) -> ChangeCode {
        match flags.limit_side() {
            None => {
                if *value > self.max + ROOT_HYSTERESIS {
                    flags.engage_high();
                    *value = self.max;
                    ChangeCode::JacobianChange
                } else if *value < self.min - ROOT_HYSTERESIS {
                    flags.engage_low();
                    *value = self.min;
                    ChangeCode::JacobianChange
                } else {
                    ChangeCode::NoChange
                }
            }
            Some(LimitSide::High) => {
                if recovery < -ROOT_HYSTERESIS {
                    flags.release();
                    ChangeCode::JacobianChange
                } else {
                    ChangeCode::NoChange
                }
            }
            Some(LimitSide::Low) => {
                if recovery > ROOT_HYSTERESIS {
                    flags.release();
                    ChangeCode::JacobianChange
                } else {
                    ChangeCode::NoChange
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const LIM: Limiter = Limiter {
        min: -5.1,
        max: 6.6,
    };

    #[test]
    fn engage_high_clamps_exactly() {
        let mut flags = OpFlags::default();
        let mut v = 6.61;
        assert_eq!(LIM.check(&mut flags, &mut v, 1.0), ChangeCode::JacobianChange);
        assert_eq!(v, 6.6);
        assert_eq!(flags.limit_side(), Some(LimitSide::High));
    }

    #[test]
    fn overshoot_inside_margin_is_ignored() {
        let mut flags = OpFlags::default();
        let mut v = 6.6 + 0.5 * ROOT_HYSTERESIS;
        assert!(LIM.root(flags, v, 0.0) > 0.0);
        assert_eq!(LIM.check(&mut flags, &mut v, 0.0), ChangeCode::NoChange);
        assert_eq!(flags.limit_side(), None);
    }

    #[test]
    fn release_requires_crossing_margin() {
        let mut flags = OpFlags::default();
        flags.engage_high();
        let mut v = 6.6;

        // Below zero but within the margin: stays clamped.
        let small = -0.5 * ROOT_HYSTERESIS;
        assert!(LIM.root(flags, v, small) > 0.0);
        assert_eq!(LIM.check(&mut flags, &mut v, small), ChangeCode::NoChange);
        assert!(flags.is_limited());

        let big = -2.0 * ROOT_HYSTERESIS;
        assert!(LIM.root(flags, v, big) < 0.0);
        assert_eq!(LIM.check(&mut flags, &mut v, big), ChangeCode::JacobianChange);
        assert!(!flags.is_limited());
        assert_eq!(v, 6.6);
    }

    #[test]
    fn low_side_mirrors_high() {
        let mut flags = OpFlags::default();
        let mut v = -6.0;
        assert!(LIM.root(flags, v, 0.0) < 0.0);
        assert_eq!(LIM.check(&mut flags, &mut v, -1.0), ChangeCode::JacobianChange);
        assert_eq!(v, -5.1);
        assert!(LIM.root(flags, v, -1.0) > 0.0);
        assert_eq!(LIM.check(&mut flags, &mut v, 1.0), ChangeCode::JacobianChange);
        assert_eq!(flags.limit_side(), None);
    }

    proptest! {
        #[test]
        fn root_sign_agrees_with_check(
            v in -10.0f64..10.0,
            rec in -1.0f64..1.0,
            clamped in 0u8..3
        ) {
            let mut flags = OpFlags::default();
            match clamped {
                1 => flags.engage_high(),
                2 => flags.engage_low(),
                _ => {}
            }
            let root = LIM.root(flags, v, rec);
            let mut value = v;
            let code = LIM.check(&mut flags, &mut value, rec);
            prop_assert_eq!(root < 0.0, code == ChangeCode::JacobianChange);
            prop_assert!(!flags.contains(OpFlags::TRIGGER_HIGH | OpFlags::TRIGGER_LOW));
        }
    }
}
