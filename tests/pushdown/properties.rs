use aggpush::{Operator, PushDownAggregateMode, PushDownAggregateSettings, collect_with_settings};
use proptest::prelude::*;

use crate::common::{arb_aggregate_kind, arb_shape, build_plan};

fn arb_mode() -> impl Strategy<Value = PushDownAggregateMode> {
    prop_oneof![
        Just(PushDownAggregateMode::Disabled),
        Just(PushDownAggregateMode::Auto),
        Just(PushDownAggregateMode::Forced),
        Just(PushDownAggregateMode::FavorMediumCardinality),
        Just(PushDownAggregateMode::FavorHighCardinality),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn collect_is_idempotent(shape in arb_shape(), kind in arb_aggregate_kind(), mode in arb_mode()) {
        let plan = build_plan(&shape, kind);
        let settings = PushDownAggregateSettings::with_mode(mode);
        let first = collect_with_settings(&plan, &settings).unwrap().decisions();
        let second = collect_with_settings(&plan, &settings).unwrap().decisions();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn disabled_mode_accepts_nothing(shape in arb_shape(), kind in arb_aggregate_kind()) {
        let plan = build_plan(&shape, kind);
        let results = collect_with_settings(&plan, &PushDownAggregateSettings::disabled()).unwrap();
        prop_assert!(results.is_empty());
    }

    #[test]
    fn non_pre_aggregable_calls_are_never_accepted(shape in arb_shape(), kind in arb_aggregate_kind()) {
        prop_assume!(!kind.is_pushable());
        let plan = build_plan(&shape, kind);
        let results = collect_with_settings(&plan, &PushDownAggregateSettings::forced()).unwrap();
        prop_assert!(results.is_empty());
    }

    #[test]
    fn accepted_targets_are_scans_or_joins_below_the_aggregate(
        shape in arb_shape(),
        kind in arb_aggregate_kind(),
        mode in arb_mode(),
    ) {
        let plan = build_plan(&shape, kind);
        let settings = PushDownAggregateSettings::with_mode(mode);
        let results = collect_with_settings(&plan, &settings).unwrap();
        for (aggregate, contexts) in results.iter() {
            prop_assert_eq!(aggregate, plan.id);
            for context in contexts {
                prop_assert!(!context.push_path().is_empty());
                let target = context.target_position().unwrap();
                let is_scan_or_join = matches!(target.op, Operator::Scan { .. } | Operator::Join { .. });
                prop_assert!(is_scan_or_join);
                prop_assert!(!target.has_limit());
                prop_assert!(plan.find(target.id).is_some());
                prop_assert!(context.aggregations().values().all(|c| !c.distinct && !c.count_star));
            }
        }
    }
}
