//! End-to-end tests driving the `appraise` binary against a mock vision model.
#![cfg(unix)]

mod common;

use common::{appraise, MockFixture, GLOCK_JSON, WINCHESTER_JSON};

#[test]
fn current_production_photo_appraises_from_distributor() {
    let mut fixture = MockFixture::new();
    fixture.respond(GLOCK_JSON);

    let out = fixture.run(&[
        "--image",
        "gs://uploads/glock19.jpg",
        "--ocr",
        "GLOCK 19 Gen5",
        "--ocr",
        "Austria",
    ]);
    assert_eq!(out.code, Some(0), "stderr:\n{}", out.stderr);

    let body = out.json();
    assert_eq!(body["analysis"]["make"], "Glock");
    assert_eq!(body["analysis"]["conditionGrade"], "New");
    assert_eq!(body["valuation"]["source"], "PrimaryDistributor");
    assert_eq!(body["valuation"]["currency"], "USD");
    assert!(body["valuation"]["estimatedValue"].as_f64().unwrap() > 500.0);
    assert!(!body["valuation"]["comparables"].as_array().unwrap().is_empty());
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));

    assert_eq!(fixture.last_image(), "gs://uploads/glock19.jpg");
    let prompt = fixture.last_prompt();
    assert!(prompt.contains("GLOCK 19 Gen5"));
    assert!(prompt.contains("Austria"));
}

#[test]
fn vintage_photo_appraises_from_secondary_market() {
    let mut fixture = MockFixture::new();
    fixture.respond(WINCHESTER_JSON);

    let out = fixture.run(&["--image", "https://img.example.com/w70.jpg"]);
    assert_eq!(out.code, Some(0), "stderr:\n{}", out.stderr);
    let body = out.json();
    assert_eq!(body["valuation"]["source"], "SecondaryMarket");
    assert_eq!(body["valuation"]["estimatedValue"], 800.0);
    assert_eq!(body["valuation"]["confidence"], 0.7);
}

#[test]
fn fenced_model_output_is_accepted() {
    let mut fixture = MockFixture::new();
    fixture.respond(&format!("```json\n{GLOCK_JSON}\n```\n"));

    let out = fixture.run(&["--image", "gs://uploads/glock19.jpg"]);
    assert_eq!(out.code, Some(0), "stderr:\n{}", out.stderr);
    assert_eq!(out.json()["analysis"]["model"], "19");
}

#[test]
fn unknown_grade_fails_extraction_with_schema_violation() {
    let mut fixture = MockFixture::new();
    fixture.respond(&GLOCK_JSON.replace("\"New\"", "\"Mint\""));

    let out = fixture.run(&["--image", "gs://uploads/glock19.jpg"]);
    assert_eq!(out.code, Some(1));
    let body = out.json();
    assert_eq!(body["error"]["stage"], "extraction");
    assert_eq!(body["error"]["kind"], "SchemaViolation");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("conditionGrade"));
    assert!(body.get("valuation").is_none());
}

#[test]
fn missing_local_image_never_calls_the_model() {
    let mut fixture = MockFixture::new();
    fixture.respond(GLOCK_JSON);
    let missing = fixture.path().join("no-such-photo.jpg");

    let out = fixture.run(&["--image", missing.to_str().unwrap()]);
    assert_eq!(out.code, Some(1));
    assert_eq!(out.json()["error"]["kind"], "InvalidReference");
    assert_eq!(fixture.calls(), 0);
}

#[test]
fn local_image_is_passed_to_the_model_by_path() {
    let mut fixture = MockFixture::new();
    fixture.respond(GLOCK_JSON);
    let photo = fixture.path().join("photo.jpg");
    std::fs::write(&photo, [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]).unwrap();

    let out = fixture.run(&["--image", photo.to_str().unwrap()]);
    assert_eq!(out.code, Some(0), "stderr:\n{}", out.stderr);
    assert_eq!(fixture.last_image(), photo.display().to_string());
}

#[test]
fn prose_reply_is_malformed_output_without_echoing_raw_text() {
    let mut fixture = MockFixture::new();
    fixture.respond("Looks like a Glock 19 to me.");

    let out = fixture.run(&["--image", "gs://uploads/glock19.jpg"]);
    assert_eq!(out.code, Some(1));
    assert_eq!(out.json()["error"]["kind"], "MalformedOutput");
    assert!(!out.stdout.contains("Looks like a Glock"));
}

#[test]
fn upstream_failure_is_retried_once_when_asked() {
    let mut fixture = MockFixture::new();
    fixture.fail("model overloaded").respond(GLOCK_JSON);

    let out = fixture.run(&["--image", "gs://uploads/glock19.jpg", "--retry"]);
    assert_eq!(out.code, Some(0), "stderr:\n{}", out.stderr);
    assert_eq!(fixture.calls(), 2);
}

#[test]
fn upstream_failure_without_retry_reports_unavailable() {
    let mut fixture = MockFixture::new();
    fixture.fail("model overloaded").respond(GLOCK_JSON);

    let out = fixture.run(&["--image", "gs://uploads/glock19.jpg"]);
    assert_eq!(out.code, Some(1));
    assert_eq!(out.json()["error"]["kind"], "UpstreamUnavailable");
    assert_eq!(fixture.calls(), 1);
}

#[test]
fn validation_failures_are_not_retried() {
    let mut fixture = MockFixture::new();
    fixture.respond("{}").respond(GLOCK_JSON);

    let out = fixture.run(&["--image", "gs://uploads/glock19.jpg", "--retry"]);
    assert_eq!(out.code, Some(1));
    assert_eq!(out.json()["error"]["kind"], "SchemaViolation");
    assert_eq!(fixture.calls(), 1);
}

#[test]
fn request_file_supplies_hints_and_context() {
    let mut fixture = MockFixture::new();
    fixture.respond(WINCHESTER_JSON);
    let request = fixture.write(
        "request.json",
        r#"{"imageReference":"gs://uploads/w70.jpg","ocrHints":["WINCHESTER"],"context":{"era":"Pre-64"}}"#,
    );

    let out = fixture.run(&[
        "--request",
        request.to_str().unwrap(),
        "--context",
        "purchased=1961",
    ]);
    assert_eq!(out.code, Some(0), "stderr:\n{}", out.stderr);
    let prompt = fixture.last_prompt();
    assert!(prompt.contains("WINCHESTER"));
    assert!(prompt.contains("era: Pre-64"));
    assert!(prompt.contains("purchased: 1961"));
}

#[test]
fn request_without_image_reference_is_an_invalid_argument() {
    let fixture = MockFixture::new();
    let request = fixture.write("request.json", r#"{"ocrHints":["GLOCK"]}"#);

    let out = fixture.run(&["--request", request.to_str().unwrap()]);
    assert_eq!(out.code, Some(2));
    let body = out.json();
    assert_eq!(body["error"]["kind"], "InvalidArgument");
    assert_eq!(fixture.calls(), 0);
}

#[test]
fn transcript_records_each_attempt() {
    let mut fixture = MockFixture::new();
    fixture.respond("not json");
    let transcript = fixture.path().join("transcript.jsonl");

    let out = fixture.run(&[
        "--image",
        "gs://uploads/glock19.jpg",
        "--transcript",
        transcript.to_str().unwrap(),
    ]);
    assert_eq!(out.code, Some(1));

    let text = std::fs::read_to_string(&transcript).unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["outcome"], "failed");
    assert_eq!(lines[0]["errorKind"], "MalformedOutput");
    assert_eq!(lines[0]["rawResponse"], "not json");
}

#[test]
fn value_subcommand_prices_an_identification_file() {
    let fixture = MockFixture::new();
    let identification = fixture.write("identification.json", WINCHESTER_JSON);

    let out = appraise(&["value", "--identification", identification.to_str().unwrap()]);
    assert_eq!(out.code, Some(0), "stderr:\n{}", out.stderr);
    let body = out.json();
    assert_eq!(body["source"], "SecondaryMarket");
    assert_eq!(body["estimatedValue"], 800.0);
}

#[test]
fn value_subcommand_rejects_invalid_identification() {
    let fixture = MockFixture::new();
    let identification = fixture.write(
        "identification.json",
        r#"{"make":"Winchester","model":"Model 70","isCurrentProduction":false,"confidence":0.8}"#,
    );

    let out = appraise(&["value", "--identification", identification.to_str().unwrap()]);
    assert_eq!(out.code, Some(1));
    let body = out.json();
    assert_eq!(body["error"]["stage"], "valuation");
    assert_eq!(body["error"]["kind"], "InvalidIdentification");
}

#[test]
fn config_subcommand_prints_loadable_defaults() {
    let out = appraise(&["config"]);
    assert_eq!(out.code, Some(0));
    let body = out.json();
    assert_eq!(body["schemaVersion"], 1);
    assert_eq!(body["vision"]["generation"]["maxOutputTokens"], 2048);
    assert_eq!(body["pricing"]["tiers"]["excellent"], 1200.0);

    let fixture = MockFixture::new();
    let mut config: serde_json::Value = body;
    config["pricing"]["tiers"]["good"] = serde_json::json!(950.0);
    let path = fixture.write("config.json", &config.to_string());
    let identification = fixture.write("identification.json", WINCHESTER_JSON);

    let out = appraise(&[
        "value",
        "--identification",
        identification.to_str().unwrap(),
        "--config",
        path.to_str().unwrap(),
    ]);
    assert_eq!(out.code, Some(0), "stderr:\n{}", out.stderr);
    assert_eq!(out.json()["estimatedValue"], 950.0);
}

#[test]
fn missing_model_configuration_fails_before_any_work() {
    let out = appraise(&["run", "--image", "gs://uploads/glock19.jpg"]);
    assert_eq!(out.code, Some(1));
    assert!(out.stderr.contains("no LM command configured"));
}
