use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, warn};

use super::types::{DeviationResult, PlannerConfig, RebalancePlan, RebalancePolicy, SwapOperation};

struct Lot<'a> {
    asset: &'a DeviationResult,
    gap_usd: Decimal, // original |gap|, kept for priority scoring
    remaining: Decimal,
}

/// Convert a set of deviations into an ordered swap plan.
///
/// Surpluses and deficits are matched greedily, largest imbalance first,
/// each trade consuming `min(surplus, deficit)` until one side is
/// exhausted. Total emitted sell volume therefore matches total emitted
/// buy volume, and the swap count is bounded by
/// `|surplus| + |deficit| - 1`. A deficit with no remaining surplus is
/// left unfilled; the planner never invents value.
pub fn build_swap_plan(
    deviations: &[DeviationResult],
    total_value_usd: Decimal,
    policy: RebalancePolicy,
    config: &PlannerConfig,
) -> RebalancePlan {
    let max_deviation = deviations
        .iter()
        .map(|d| d.deviation)
        .max()
        .unwrap_or(Decimal::ZERO);
    let mut plan = RebalancePlan {
        swaps: Vec::new(),
        max_deviation,
        policy,
    };

    // Cannot rebalance nothing
    if total_value_usd <= Decimal::ZERO {
        return plan;
    }

    // The two policies share one mechanism and differ only in this filter
    let participants = deviations.iter().filter(|d| match policy {
        RebalancePolicy::Threshold => d.needs_rebalance,
        RebalancePolicy::StrictPeriodic => d.deviation > Decimal::ZERO,
    });

    let mut surplus: Vec<Lot> = Vec::new();
    let mut deficit: Vec<Lot> = Vec::new();
    for asset in participants {
        let gap_usd = asset.target_value_usd - asset.current_value_usd;
        if gap_usd.abs() <= config.gap_epsilon_usd {
            continue; // already on target, don't trade dust gaps
        }
        let lot = Lot {
            asset,
            gap_usd: gap_usd.abs(),
            remaining: gap_usd.abs(),
        };
        if gap_usd < Decimal::ZERO {
            surplus.push(lot); // over-allocated, must sell
        } else {
            deficit.push(lot); // under-allocated, must buy
        }
    }

    // Largest imbalance first; symbol order breaks ties for determinism
    let by_gap = |a: &Lot, b: &Lot| {
        b.remaining
            .cmp(&a.remaining)
            .then_with(|| a.asset.symbol.cmp(&b.asset.symbol))
    };
    surplus.sort_by(by_gap);
    deficit.sort_by(by_gap);

    let mut i = 0usize;
    let mut j = 0usize;
    while i < surplus.len() && j < deficit.len() {
        if surplus[i].asset.price_usd <= Decimal::ZERO {
            warn!(symbol = %surplus[i].asset.symbol, "No price for surplus asset, skipping");
            i += 1;
            continue;
        }
        if deficit[j].asset.price_usd <= Decimal::ZERO {
            warn!(symbol = %deficit[j].asset.symbol, "No price for deficit asset, skipping");
            j += 1;
            continue;
        }

        let trade_usd = surplus[i].remaining.min(deficit[j].remaining);
        if trade_usd >= config.dust_floor_usd {
            if let Some(swap) = build_swap(&surplus[i], &deficit[j], trade_usd, config) {
                plan.swaps.push(swap);
            }
        }

        surplus[i].remaining -= trade_usd;
        deficit[j].remaining -= trade_usd;
        if surplus[i].remaining <= config.usd_epsilon {
            i += 1;
        }
        if deficit[j].remaining <= config.usd_epsilon {
            j += 1;
        }
    }

    // Largest combined imbalance executes first
    plan.swaps.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.from_symbol.cmp(&b.from_symbol))
            .then_with(|| a.to_symbol.cmp(&b.to_symbol))
    });

    debug!(
        swap_count = plan.swaps.len(),
        max_deviation = %plan.max_deviation,
        policy = policy.as_str(),
        "Swap plan built"
    );
    plan
}

fn build_swap(
    from: &Lot,
    to: &Lot,
    trade_usd: Decimal,
    config: &PlannerConfig,
) -> Option<SwapOperation> {
    // Floor to the source asset's decimals; rounding up could overdraw the balance
    let amount_tokens = (trade_usd / from.asset.price_usd)
        .round_dp_with_strategy(from.asset.decimals as u32, RoundingStrategy::ToZero);
    if amount_tokens <= Decimal::ZERO {
        warn!(
            from = %from.asset.symbol,
            to = %to.asset.symbol,
            trade_usd = %trade_usd,
            "Trade too small to represent in source token units, dropping"
        );
        return None;
    }

    let expected_amount_out = trade_usd / to.asset.price_usd;
    let min_amount_out = (expected_amount_out * (Decimal::ONE - config.slippage_tolerance))
        .round_dp_with_strategy(to.asset.decimals as u32, RoundingStrategy::ToZero);

    Some(SwapOperation {
        from_symbol: from.asset.symbol.clone(),
        to_symbol: to.asset.symbol.clone(),
        from_address: from.asset.asset_address,
        to_address: to.asset.asset_address,
        from_decimals: from.asset.decimals,
        to_decimals: to.asset.decimals,
        amount_usd: trade_usd,
        amount_tokens,
        expected_amount_out,
        min_amount_out,
        priority: from.gap_usd + to.gap_usd,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;
    use std::collections::HashMap;

    fn dev(
        id: u64,
        symbol: &str,
        target: Decimal,
        current_value_usd: Decimal,
        total_value_usd: Decimal,
        price_usd: Decimal,
        threshold: Decimal,
    ) -> DeviationResult {
        let current_percentage = if total_value_usd > Decimal::ZERO {
            current_value_usd / total_value_usd
        } else {
            Decimal::ZERO
        };
        let deviation = (current_percentage - target).abs();
        DeviationResult {
            asset_id: id as i32,
            symbol: symbol.to_string(),
            asset_address: Address::from_low_u64_be(id),
            decimals: 8,
            price_usd,
            target_percentage: target,
            current_percentage,
            deviation,
            needs_rebalance: deviation > threshold,
            current_value_usd,
            target_value_usd: total_value_usd * target,
        }
    }

    fn thousand() -> Decimal {
        Decimal::new(1000, 0)
    }

    fn threshold() -> Decimal {
        Decimal::new(5, 2)
    }

    /// WBTC 50 / WETH 30 / USDC 20 exactly on target
    fn balanced() -> Vec<DeviationResult> {
        vec![
            dev(1, "WBTC", Decimal::new(5, 1), Decimal::new(500, 0), thousand(), Decimal::new(50_000, 0), threshold()),
            dev(2, "WETH", Decimal::new(3, 1), Decimal::new(300, 0), thousand(), Decimal::new(2_000, 0), threshold()),
            dev(3, "USDC", Decimal::new(2, 1), Decimal::new(200, 0), thousand(), Decimal::ONE, threshold()),
        ]
    }

    #[test]
    fn balanced_portfolio_yields_empty_plan_under_both_policies() {
        let deviations = balanced();
        let config = PlannerConfig::default();
        for policy in [RebalancePolicy::Threshold, RebalancePolicy::StrictPeriodic] {
            let plan = build_swap_plan(&deviations, thousand(), policy, &config);
            assert!(plan.swaps.is_empty(), "policy {:?}", policy);
        }
    }

    #[test]
    fn zero_total_value_yields_empty_plan() {
        let deviations = vec![dev(
            1,
            "WBTC",
            Decimal::ONE,
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::new(50_000, 0),
            threshold(),
        )];
        let plan = build_swap_plan(
            &deviations,
            Decimal::ZERO,
            RebalancePolicy::StrictPeriodic,
            &PlannerConfig::default(),
        );
        assert!(plan.swaps.is_empty());
    }

    #[test]
    fn single_asset_portfolio_never_trades() {
        // 100% target with nothing to trade against
        let deviations = vec![dev(
            1,
            "WBTC",
            Decimal::ONE,
            Decimal::new(900, 0),
            thousand(),
            Decimal::new(50_000, 0),
            threshold(),
        )];
        let plan = build_swap_plan(
            &deviations,
            thousand(),
            RebalancePolicy::StrictPeriodic,
            &PlannerConfig::default(),
        );
        assert!(plan.swaps.is_empty());
    }

    #[test]
    fn boundary_deviation_produces_no_threshold_swaps() {
        // 550/300/150: WBTC and USDC both deviate by exactly 0.05
        let deviations = vec![
            dev(1, "WBTC", Decimal::new(5, 1), Decimal::new(550, 0), thousand(), Decimal::new(50_000, 0), threshold()),
            dev(2, "WETH", Decimal::new(3, 1), Decimal::new(300, 0), thousand(), Decimal::new(2_000, 0), threshold()),
            dev(3, "USDC", Decimal::new(2, 1), Decimal::new(150, 0), thousand(), Decimal::ONE, threshold()),
        ];
        let plan = build_swap_plan(
            &deviations,
            thousand(),
            RebalancePolicy::Threshold,
            &PlannerConfig::default(),
        );
        assert!(plan.swaps.is_empty());
    }

    #[test]
    fn single_breach_produces_one_swap() {
        // 560/300/140: WBTC over and USDC under by 0.06 each
        let deviations = vec![
            dev(1, "WBTC", Decimal::new(5, 1), Decimal::new(560, 0), thousand(), Decimal::new(50_000, 0), threshold()),
            dev(2, "WETH", Decimal::new(3, 1), Decimal::new(300, 0), thousand(), Decimal::new(2_000, 0), threshold()),
            dev(3, "USDC", Decimal::new(2, 1), Decimal::new(140, 0), thousand(), Decimal::ONE, threshold()),
        ];
        let plan = build_swap_plan(
            &deviations,
            thousand(),
            RebalancePolicy::Threshold,
            &PlannerConfig::default(),
        );
        assert_eq!(plan.swaps.len(), 1);
        let swap = &plan.swaps[0];
        assert_eq!(swap.from_symbol, "WBTC");
        assert_eq!(swap.to_symbol, "USDC");
        assert_eq!(swap.amount_usd, Decimal::new(60, 0));
        assert_eq!(plan.max_deviation, Decimal::new(6, 2));
    }

    #[test]
    fn three_way_strict_rebalance_leaves_on_target_asset_alone() {
        // 600/200/200 against 50/30/20: USDC is exactly on target
        let deviations = vec![
            dev(1, "WBTC", Decimal::new(5, 1), Decimal::new(600, 0), thousand(), Decimal::new(50_000, 0), threshold()),
            dev(2, "WETH", Decimal::new(3, 1), Decimal::new(200, 0), thousand(), Decimal::new(2_000, 0), threshold()),
            dev(3, "USDC", Decimal::new(2, 1), Decimal::new(200, 0), thousand(), Decimal::ONE, threshold()),
        ];
        let plan = build_swap_plan(
            &deviations,
            thousand(),
            RebalancePolicy::StrictPeriodic,
            &PlannerConfig::default(),
        );
        assert_eq!(plan.swaps.len(), 1);
        assert_eq!(plan.swaps[0].from_symbol, "WBTC");
        assert_eq!(plan.swaps[0].to_symbol, "WETH");
        assert_eq!(plan.swaps[0].amount_usd, Decimal::new(100, 0));
    }

    #[test]
    fn strict_periodic_trades_at_least_as_much_as_threshold() {
        // 3% drifts stay under the 5% tolerance
        let deviations = vec![
            dev(1, "WBTC", Decimal::new(5, 1), Decimal::new(530, 0), thousand(), Decimal::new(50_000, 0), threshold()),
            dev(2, "WETH", Decimal::new(3, 1), Decimal::new(270, 0), thousand(), Decimal::new(2_000, 0), threshold()),
            dev(3, "USDC", Decimal::new(2, 1), Decimal::new(200, 0), thousand(), Decimal::ONE, threshold()),
        ];
        let config = PlannerConfig::default();
        let gated = build_swap_plan(&deviations, thousand(), RebalancePolicy::Threshold, &config);
        let strict = build_swap_plan(&deviations, thousand(), RebalancePolicy::StrictPeriodic, &config);

        let traded = |plan: &RebalancePlan| -> Decimal {
            plan.swaps.iter().map(|s| s.amount_usd).sum()
        };
        assert!(strict.swaps.len() >= gated.swaps.len());
        assert!(traded(&strict) >= traded(&gated));
        assert!(gated.swaps.is_empty());
        assert_eq!(strict.swaps.len(), 1);
    }

    #[test]
    fn plan_conserves_surpluses_and_deficits() {
        // Two sellers, two buyers with asymmetric gaps
        let total = Decimal::new(2000, 0);
        let deviations = vec![
            dev(1, "WBTC", Decimal::new(25, 2), Decimal::new(600, 0), total, Decimal::new(50_000, 0), threshold()), // surplus 100
            dev(2, "WETH", Decimal::new(25, 2), Decimal::new(550, 0), total, Decimal::new(2_000, 0), threshold()),  // surplus 50
            dev(3, "USDC", Decimal::new(25, 2), Decimal::new(380, 0), total, Decimal::ONE, threshold()),            // deficit 120
            dev(4, "DAI", Decimal::new(25, 2), Decimal::new(470, 0), total, Decimal::ONE, threshold()),             // deficit 30
        ];
        let plan = build_swap_plan(
            &deviations,
            total,
            RebalancePolicy::StrictPeriodic,
            &PlannerConfig::default(),
        );

        let mut sold: HashMap<String, Decimal> = HashMap::new();
        let mut bought: HashMap<String, Decimal> = HashMap::new();
        for swap in &plan.swaps {
            *sold.entry(swap.from_symbol.clone()).or_default() += swap.amount_usd;
            *bought.entry(swap.to_symbol.clone()).or_default() += swap.amount_usd;
        }

        assert!(sold["WBTC"] <= Decimal::new(100, 0));
        assert!(sold["WETH"] <= Decimal::new(50, 0));
        assert!(bought["USDC"] <= Decimal::new(120, 0));
        assert!(bought["DAI"] <= Decimal::new(30, 0));

        let total_sold: Decimal = sold.values().copied().sum();
        let total_bought: Decimal = bought.values().copied().sum();
        assert_eq!(total_sold, total_bought);

        // |surplus| + |deficit| - 1 bound
        assert!(plan.swaps.len() <= 3);
    }

    #[test]
    fn no_swap_falls_below_the_dust_floor() {
        let total = Decimal::new(2000, 0);
        let deviations = vec![
            dev(1, "WBTC", Decimal::new(25, 2), Decimal::new(600, 0), total, Decimal::new(50_000, 0), threshold()),
            dev(2, "WETH", Decimal::new(25, 2), Decimal::new(550, 0), total, Decimal::new(2_000, 0), threshold()),
            dev(3, "USDC", Decimal::new(25, 2), Decimal::new(380, 0), total, Decimal::ONE, threshold()),
            dev(4, "DAI", Decimal::new(25, 2), Decimal::new(470, 0), total, Decimal::ONE, threshold()),
        ];
        let config = PlannerConfig::default();
        let plan = build_swap_plan(&deviations, total, RebalancePolicy::StrictPeriodic, &config);
        assert!(!plan.swaps.is_empty());
        for swap in &plan.swaps {
            assert!(swap.amount_usd >= config.dust_floor_usd);
        }
    }

    #[test]
    fn equal_gaps_break_ties_by_symbol() {
        let total = Decimal::new(1000, 0);
        // WETH and WBTC each hold a $50 surplus; USDC needs $100
        let deviations = vec![
            dev(1, "WETH", Decimal::new(3, 1), Decimal::new(350, 0), total, Decimal::new(2_000, 0), threshold()),
            dev(2, "WBTC", Decimal::new(3, 1), Decimal::new(350, 0), total, Decimal::new(50_000, 0), threshold()),
            dev(3, "USDC", Decimal::new(4, 1), Decimal::new(300, 0), total, Decimal::ONE, threshold()),
        ];
        let plan = build_swap_plan(
            &deviations,
            total,
            RebalancePolicy::StrictPeriodic,
            &PlannerConfig::default(),
        );
        assert_eq!(plan.swaps.len(), 2);
        assert_eq!(plan.swaps[0].from_symbol, "WBTC");
        assert_eq!(plan.swaps[1].from_symbol, "WETH");
    }

    #[test]
    fn token_amounts_floor_to_asset_decimals() {
        let total = Decimal::new(1000, 0);
        // Selling $100 of an asset priced at $3 needs 33.33... tokens
        let deviations = vec![
            dev(1, "AAA", Decimal::new(4, 1), Decimal::new(500, 0), total, Decimal::new(3, 0), threshold()),
            dev(2, "BBB", Decimal::new(6, 1), Decimal::new(500, 0), total, Decimal::new(2, 0), threshold()),
        ];
        let plan = build_swap_plan(
            &deviations,
            total,
            RebalancePolicy::StrictPeriodic,
            &PlannerConfig::default(),
        );
        assert_eq!(plan.swaps.len(), 1);
        let swap = &plan.swaps[0];
        assert_eq!(swap.amount_usd, Decimal::new(100, 0));
        // 100 / 3 floored to 8 decimals
        assert_eq!(swap.amount_tokens, Decimal::new(3_333_333_333, 8));
        // expected out 50 BBB, min out reduced by 0.5% slippage
        assert_eq!(swap.expected_amount_out, Decimal::new(50, 0));
        assert_eq!(swap.min_amount_out, Decimal::new(4_975, 2));
    }

    #[test]
    fn unfilled_deficit_is_left_unfilled() {
        // One $50 surplus cannot cover a $120 deficit; the planner must
        // not invent the missing $70
        let total = Decimal::new(1000, 0);
        let deviations = vec![
            dev(1, "WETH", Decimal::new(3, 1), Decimal::new(350, 0), total, Decimal::new(2_000, 0), threshold()),
            dev(2, "USDC", Decimal::new(42, 2), Decimal::new(300, 0), total, Decimal::ONE, threshold()),
        ];
        let plan = build_swap_plan(
            &deviations,
            total,
            RebalancePolicy::StrictPeriodic,
            &PlannerConfig::default(),
        );
        assert_eq!(plan.swaps.len(), 1);
        assert_eq!(plan.swaps[0].amount_usd, Decimal::new(50, 0));
    }

    #[test]
    fn priority_orders_largest_imbalances_first() {
        let total = Decimal::new(2000, 0);
        let deviations = vec![
            dev(1, "WBTC", Decimal::new(25, 2), Decimal::new(650, 0), total, Decimal::new(50_000, 0), threshold()), // surplus 150
            dev(2, "WETH", Decimal::new(25, 2), Decimal::new(520, 0), total, Decimal::new(2_000, 0), threshold()),  // surplus 20
            dev(3, "USDC", Decimal::new(25, 2), Decimal::new(350, 0), total, Decimal::ONE, threshold()),            // deficit 150
            dev(4, "DAI", Decimal::new(25, 2), Decimal::new(480, 0), total, Decimal::ONE, threshold()),             // deficit 20
        ];
        let plan = build_swap_plan(
            &deviations,
            total,
            RebalancePolicy::StrictPeriodic,
            &PlannerConfig::default(),
        );
        assert!(plan.swaps.len() >= 2);
        assert_eq!(plan.swaps[0].from_symbol, "WBTC");
        assert_eq!(plan.swaps[0].to_symbol, "USDC");
        for pair in plan.swaps.windows(2) {
            assert!(pair[0].priority >= pair[1].priority);
        }
    }
}
