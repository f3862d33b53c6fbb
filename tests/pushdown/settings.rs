use aggpush::{
    Error, PushDownAggregateMode, PushDownAggregateSettings, Statistics, StatisticsOverrides,
    collect_with_settings,
};

use crate::common::{AggregateKind, Shape, build_plan};

fn join_over_scans() -> Shape {
    let scan = |rows, key_ndv| Shape::Scan {
        rows,
        key_ndv,
        limited: false,
    };
    Shape::Join {
        left: Box::new(scan(1_000_000, 500)),
        right: Box::new(scan(1_000, 1_000)),
        value_from_right: false,
    }
}

#[test]
fn settings_from_toml_drive_the_decision() {
    let plan = build_plan(&join_over_scans(), AggregateKind::Sum);

    let auto = PushDownAggregateSettings::from_toml_str(r#"mode = "auto""#).unwrap();
    let results = collect_with_settings(&plan, &auto).unwrap();
    assert_eq!(results.len(), 1);

    let disabled = PushDownAggregateSettings::from_toml_str("mode = \"disabled\"").unwrap();
    assert!(collect_with_settings(&plan, &disabled).unwrap().is_empty());
}

#[test]
fn coefficients_can_make_a_column_high_cardinality() {
    let plan = build_plan(&join_over_scans(), AggregateKind::Max);
    let strict = PushDownAggregateSettings::from_toml_str(
        r#"
        [coefficients]
        medium_aggregate_effect = 100000.0
        low_aggregate_effect = 1000000.0
        "#,
    )
    .unwrap();
    assert_eq!(strict.mode, PushDownAggregateMode::Auto);

    let results = collect_with_settings(&plan, &strict).unwrap();
    assert!(results.is_empty());
}

#[test]
fn session_values_parse_like_toml_names() {
    for (session, name) in [(-1i64, "disabled"), (0, "auto"), (1, "forced"), (3, "favor_high_cardinality")] {
        let from_session = PushDownAggregateMode::try_from(session).unwrap();
        assert_eq!(from_session, name.parse::<PushDownAggregateMode>().unwrap());
    }
    assert!(matches!(
        PushDownAggregateSettings::from_toml_str("mode = 7"),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn overrides_feed_the_cost_model() {
    let plan = build_plan(&join_over_scans(), AggregateKind::Sum);
    let left_scan = &plan.inputs[0].inputs[0];
    let overrides = StatisticsOverrides::new().with(left_scan.id, Statistics::unknown());
    let settings = PushDownAggregateSettings::default();

    let results = aggpush::PushDownAggregateCollector::new(&settings, &overrides)
        .collect(&plan)
        .unwrap();
    assert!(results.is_empty());
}

#[test]
fn decisions_serialize_for_explain_output() {
    let plan = build_plan(&join_over_scans(), AggregateKind::Sum);
    let results = collect_with_settings(&plan, &PushDownAggregateSettings::forced()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&results.to_json().unwrap()).unwrap();
    let decisions = json.as_array().unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0]["aggregate"], serde_json::json!(plan.id.0));
    assert_eq!(decisions[0]["target_operator"], "Scan");
}
