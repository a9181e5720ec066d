use super::*;
use serde_json::json;

fn glock_payload() -> Value {
    json!({
        "make": "Glock",
        "model": "19",
        "variant": "Gen 5",
        "caliber": "9mm",
        "serialNumber": null,
        "conditionGrade": "New",
        "isCurrentProduction": true,
        "modifications": ["night sights"],
        "confidence": 0.95
    })
}

#[test]
fn from_json_accepts_complete_payload() {
    let record = IdentificationRecord::from_json(&glock_payload()).expect("valid payload");
    assert_eq!(record.make, "Glock");
    assert_eq!(record.variant.as_deref(), Some("Gen 5"));
    assert_eq!(record.serial_number, None);
    assert_eq!(record.condition_grade, ConditionGrade::New);
    assert!(record.is_current_production);
    assert_eq!(record.modifications, vec!["night sights".to_string()]);
}

#[test]
fn from_json_rejects_grade_outside_scale() {
    let mut payload = glock_payload();
    payload["conditionGrade"] = json!("Mint");
    let violations = IdentificationRecord::from_json(&payload).unwrap_err();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].field, "conditionGrade");
    assert!(violations[0].message.contains("Mint"));
}

#[test]
fn from_json_reports_every_failing_field() {
    let payload = json!({
        "make": "",
        "conditionGrade": "Very Good",
        "isCurrentProduction": "yes",
        "modifications": ["grips", 7],
        "confidence": 1.4
    });
    let violations = IdentificationRecord::from_json(&payload).unwrap_err();
    let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
    assert_eq!(
        fields,
        vec![
            "make",
            "model",
            "conditionGrade",
            "isCurrentProduction",
            "modifications[1]",
            "confidence"
        ]
    );
}

#[test]
fn from_json_rejects_non_object_payload() {
    let violations = IdentificationRecord::from_json(&json!(["Glock"])).unwrap_err();
    assert_eq!(violations, vec![Violation::new("$", "expected a JSON object, got array")]);
}

#[test]
fn from_json_treats_blank_optionals_as_absent() {
    let mut payload = glock_payload();
    payload["variant"] = json!("  ");
    payload.as_object_mut().unwrap().remove("modifications");
    let record = IdentificationRecord::from_json(&payload).expect("valid payload");
    assert_eq!(record.variant, None);
    assert!(record.modifications.is_empty());
}

#[test]
fn grade_parse_is_exact() {
    for grade in ConditionGrade::ALL {
        assert_eq!(ConditionGrade::parse(grade.as_str()), Some(grade));
    }
    assert_eq!(ConditionGrade::parse("excellent"), None);
    assert_eq!(ConditionGrade::parse("Mint"), None);
}

#[test]
fn valuation_violations_flag_empty_comparables_and_bad_prices() {
    let record = ValuationRecord {
        source: ValuationSource::SecondaryMarket,
        wholesale_price: Some(-1.0),
        reference_price: None,
        estimated_value: 800.0,
        currency: "usd".to_string(),
        comparables: Vec::new(),
        confidence: 0.7,
    };
    let fields: Vec<String> = record.violations().into_iter().map(|v| v.field).collect();
    assert_eq!(fields, vec!["wholesalePrice", "currency", "comparables"]);
}

#[test]
fn response_json_uses_wire_field_names() {
    let response = AppraisalResponse {
        analysis: IdentificationRecord::from_json(&glock_payload()).unwrap(),
        valuation: ValuationRecord {
            source: ValuationSource::PrimaryDistributor,
            wholesale_price: Some(480.0),
            reference_price: Some(720.0),
            estimated_value: 600.0,
            currency: DEFAULT_CURRENCY.to_string(),
            comparables: vec!["catalog:glock-19".to_string()],
            confidence: 0.9,
        },
        timestamp: "2026-10-19T12:30:00.123456Z".parse().unwrap(),
    };

    let text = serde_json::to_string(&response).unwrap();
    let value: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["analysis"]["conditionGrade"], "New");
    assert_eq!(value["analysis"]["isCurrentProduction"], true);
    assert_eq!(value["valuation"]["source"], "PrimaryDistributor");
    assert_eq!(value["valuation"]["estimatedValue"], 600.0);
    assert!(value["timestamp"].as_str().unwrap().starts_with("2026-10-19T12:30:00"));

    let parsed: AppraisalResponse = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, response);
}

#[test]
fn routed_used_condition_value_survives_round_trip() {
    let mut payload = glock_payload();
    payload["make"] = json!("Ruger");
    payload["model"] = json!("Super Redhawk 44");
    payload["conditionGrade"] = json!("Excellent");
    let analysis = IdentificationRecord::from_json(&payload).unwrap();
    let router = crate::valuation::ValuationRouter::from_config(
        &crate::valuation::PricingConfig::default(),
    );
    let valuation = router.value(&analysis).unwrap();
    let response = AppraisalResponse {
        analysis,
        valuation,
        timestamp: "2026-10-19T12:30:00Z".parse().unwrap(),
    };

    let text = serde_json::to_string(&response).unwrap();
    let parsed: AppraisalResponse = serde_json::from_str(&text).unwrap();
    assert_eq!(
        parsed.valuation.estimated_value.to_bits(),
        response.valuation.estimated_value.to_bits()
    );
    assert_eq!(parsed, response);
}
