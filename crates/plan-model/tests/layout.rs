//! Tests for layout (de)serialization.

use plan_model::{PayloadSpan, PlanLayout};

#[test]
fn partial_json_falls_back_to_defaults() {
    let json = r#"{ "sheet_name": "Plan", "payload": { "start": 5, "width": 3 } }"#;
    let layout: PlanLayout = serde_json::from_str(json).expect("parse layout");
    assert_eq!(layout.sheet_name, "Plan");
    assert_eq!(layout.payload, PayloadSpan::new(5, 3));
    assert_eq!(layout.header_row, 17);
    assert_eq!(layout.key_column, 1);
    assert_eq!(layout.suite_marker, ".TS.");
}

#[test]
fn layout_round_trips_through_json() {
    let layout = PlanLayout::default().with_header_row(3);
    let json = serde_json::to_string(&layout).expect("serialize layout");
    let round: PlanLayout = serde_json::from_str(&json).expect("deserialize layout");
    assert_eq!(round, layout);
}
