use novella_kernel::budget::{BudgetConfig, BudgetManager, ModelTier, TierRate};
use proptest::prelude::*;

fn tier() -> impl Strategy<Value = ModelTier> {
    prop_oneof![
        Just(ModelTier::Premium),
        Just(ModelTier::Standard),
        Just(ModelTier::Economy),
    ]
}

#[test]
fn test_stage_costing_more_than_ceiling_exhausts() {
    let config = BudgetConfig::default().with_ceiling(1000.0).with_rate(
        ModelTier::Standard,
        TierRate {
            input_per_1k: 100.0,
            output_per_1k: 100.0,
        },
    );
    let mut budget = BudgetManager::new(config);

    // six units of 2k tokens each: 1200 cost units
    let mut last = budget.status();
    for _ in 0..6 {
        last = budget.charge(1_000, 1_000, ModelTier::Standard);
    }
    assert!(last.exhausted);
    assert!((budget.spent() - 1200.0).abs() < 1e-9);
    assert!(last.remaining.abs() < f64::EPSILON);
}

proptest! {
    #[test]
    fn prop_totals_never_decrease(
        calls in proptest::collection::vec((0u64..5_000, 0u64..5_000, tier()), 1..40)
    ) {
        let mut budget = BudgetManager::new(BudgetConfig::default().with_ceiling(500.0));
        let mut spent = 0.0;
        let mut tokens = 0;
        let mut exhausted = false;
        for (tokens_in, tokens_out, tier) in calls {
            let status = budget.charge(tokens_in, tokens_out, tier);
            prop_assert!(budget.spent() >= spent);
            prop_assert!(budget.tokens_in() + budget.tokens_out() >= tokens);
            prop_assert!(status.remaining >= 0.0);
            // once exhausted, always exhausted
            prop_assert!(!exhausted || status.exhausted);
            spent = budget.spent();
            tokens = budget.tokens_in() + budget.tokens_out();
            exhausted = status.exhausted;
        }
    }

    #[test]
    fn prop_active_tier_never_gets_more_expensive(
        calls in proptest::collection::vec((0u64..20_000, tier()), 1..30)
    ) {
        let mut budget = BudgetManager::new(BudgetConfig::default().with_ceiling(200.0));
        let mut tier_seen = budget.active_tier();
        for (tokens_out, tier) in calls {
            budget.charge(0, tokens_out, tier);
            prop_assert!(budget.active_tier() <= tier_seen);
            tier_seen = budget.active_tier();
        }
    }
}
