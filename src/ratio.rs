//! Exact covered/total fraction used for every coverage metric.

use serde::{Deserialize, Serialize};

/// A coverage fraction. Invariant: `numerator <= denominator`.
///
/// A zero denominator means "unset": no instrumented items were seen, so the
/// percentage is undefined rather than zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ratio {
    pub numerator: u64,
    pub denominator: u64,
}

impl Ratio {
    pub const ZERO: Ratio = Ratio {
        numerator: 0,
        denominator: 0,
    };

    /// Build a ratio, clamping the numerator to the denominator. Report
    /// dialects are allowed to contain nonsense counts; clamping keeps the
    /// invariant without discarding the rest of the report.
    pub fn new(covered: u64, total: u64) -> Self {
        Ratio {
            numerator: covered.min(total),
            denominator: total,
        }
    }

    /// `1/1` for a hit item, `0/1` for a missed one.
    pub fn unit(hit: bool) -> Self {
        Ratio {
            numerator: u64::from(hit),
            denominator: 1,
        }
    }

    /// Componentwise sum. Associative and commutative, so children may be
    /// aggregated in any order.
    pub fn combine(self, other: Ratio) -> Ratio {
        Ratio {
            numerator: self.numerator + other.numerator,
            denominator: self.denominator + other.denominator,
        }
    }

    /// Percentage in `[0, 100]`, or `None` when the denominator is zero.
    pub fn percentage(&self) -> Option<f64> {
        if self.denominator == 0 {
            None
        } else {
            Some(self.numerator as f64 / self.denominator as f64 * 100.0)
        }
    }

    pub fn is_set(&self) -> bool {
        self.denominator > 0
    }
}

impl std::fmt::Display for Ratio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_percentage() {
        assert_eq!(Ratio::new(4, 5).percentage(), Some(80.0));
        assert_eq!(Ratio::ZERO.percentage(), None);
        assert_eq!(Ratio::new(0, 3).percentage(), Some(0.0));
    }

    #[test]
    fn test_new_clamps() {
        let r = Ratio::new(7, 3);
        assert_eq!(r.numerator, 3);
        assert_eq!(r.denominator, 3);
    }

    #[test]
    fn test_combine() {
        let a = Ratio::new(1, 2);
        let b = Ratio::new(3, 4);
        assert_eq!(a.combine(b), Ratio::new(4, 6));
    }

    #[test]
    fn test_unit() {
        assert_eq!(Ratio::unit(true), Ratio::new(1, 1));
        assert_eq!(Ratio::unit(false), Ratio::new(0, 1));
    }

    fn arb_ratio() -> impl Strategy<Value = Ratio> {
        (0u64..10_000, 0u64..10_000).prop_map(|(a, b)| Ratio::new(a.min(b), b))
    }

    proptest! {
        #[test]
        fn prop_combine_commutative(a in arb_ratio(), b in arb_ratio()) {
            prop_assert_eq!(a.combine(b), b.combine(a));
        }

        #[test]
        fn prop_combine_associative(a in arb_ratio(), b in arb_ratio(), c in arb_ratio()) {
            prop_assert_eq!(a.combine(b).combine(c), a.combine(b.combine(c)));
        }

        #[test]
        fn prop_invariant_holds(a in arb_ratio(), b in arb_ratio()) {
            let r = a.combine(b);
            prop_assert!(r.numerator <= r.denominator);
        }
    }
}
