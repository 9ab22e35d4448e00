//! Cost, reward and refund rules
//!
//! These are applied when an action is recorded. The fold itself uses the
//! amounts stored in the event, so changing a rule here never rewrites
//! history.

use crate::types::{Difficulty, DurationClass, ResultTier, Rewards};

/// Share of the original cost returned on abandonment
pub const ABANDON_REFUND_PERCENT: u32 = 25;

pub fn suggested_cost(duration: DurationClass, difficulty: Difficulty) -> u32 {
    duration.base_cost() * difficulty.multiplier()
}

pub fn conclusion_rewards(cost: u32, duration: DurationClass, result: ResultTier) -> Rewards {
    let capacity = match result {
        ResultTier::Exceeded => (duration.base_cost() / 2).max(1),
        ResultTier::Achieved if duration >= DurationClass::Month => 1,
        ResultTier::Achieved | ResultTier::Partial => 0,
    };
    let multiplier = match result {
        ResultTier::Partial => 1,
        ResultTier::Achieved => 2,
        ResultTier::Exceeded => 3,
    };
    Rewards {
        capacity,
        points: cost.saturating_mul(multiplier),
    }
}

pub fn abandon_refund(cost: u32) -> u32 {
    cost.saturating_mul(ABANDON_REFUND_PERCENT) / 100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggested_cost() {
        assert_eq!(suggested_cost(DurationClass::Month, Difficulty::Hard), 8);
        assert_eq!(suggested_cost(DurationClass::Day, Difficulty::Easy), 1);
    }

    #[test]
    fn test_abandon_refund_is_a_quarter() {
        assert_eq!(abandon_refund(8), 2);
        assert_eq!(abandon_refund(3), 0);
        assert_eq!(abandon_refund(0), 0);
    }

    #[test]
    fn test_top_tier_grows_capacity() {
        let rewards = conclusion_rewards(8, DurationClass::Month, ResultTier::Exceeded);
        assert_eq!(rewards.capacity, 2);
        assert_eq!(rewards.points, 24);

        let short = conclusion_rewards(1, DurationClass::Day, ResultTier::Exceeded);
        assert_eq!(short.capacity, 1);
    }

    #[test]
    fn test_lower_tiers() {
        assert_eq!(conclusion_rewards(2, DurationClass::Week, ResultTier::Achieved).capacity, 0);
        assert_eq!(conclusion_rewards(6, DurationClass::Season, ResultTier::Achieved).capacity, 1);
        assert_eq!(conclusion_rewards(6, DurationClass::Season, ResultTier::Partial), Rewards {
            capacity: 0,
            points: 6,
        });
    }
}
