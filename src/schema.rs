//! Typed identification and valuation records.
//!
//! Every other module consumes these records, so the validity rules live here:
//! model output is parsed into a dynamic JSON value first and then checked
//! field by field, collecting every violation instead of stopping at the first.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Currency used when a pricing source does not name one.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Field names accepted on an identification payload.
const IDENTIFICATION_FIELDS: [&str; 9] = [
    "make",
    "model",
    "variant",
    "caliber",
    "serialNumber",
    "conditionGrade",
    "isCurrentProduction",
    "modifications",
    "confidence",
];

/// NRA-style six-point condition scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionGrade {
    New,
    Excellent,
    VeryGood,
    Good,
    Fair,
    Poor,
}

impl ConditionGrade {
    pub const ALL: [ConditionGrade; 6] = [
        Self::New,
        Self::Excellent,
        Self::VeryGood,
        Self::Good,
        Self::Fair,
        Self::Poor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Excellent => "Excellent",
            Self::VeryGood => "VeryGood",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
        }
    }

    /// Exact-spelling lookup; anything outside the six grades is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|grade| grade.as_str() == raw)
    }
}

impl fmt::Display for ConditionGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pricing source that produced a valuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValuationSource {
    PrimaryDistributor,
    SecondaryMarket,
    Hybrid,
}

impl fmt::Display for ValuationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrimaryDistributor => write!(f, "PrimaryDistributor"),
            Self::SecondaryMarket => write!(f, "SecondaryMarket"),
            Self::Hybrid => write!(f, "Hybrid"),
        }
    }
}

/// A single failing field found during validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// JSON field name (`$` for the payload itself).
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Render a violation list as one human-readable line.
pub fn describe_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// What the vision model saw in the photograph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentificationRecord {
    pub make: String,
    pub model: String,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub caliber: Option<String>,
    /// May be partially occluded or absent on the photographed item.
    #[serde(default)]
    pub serial_number: Option<String>,
    pub condition_grade: ConditionGrade,
    pub is_current_production: bool,
    #[serde(default)]
    pub modifications: Vec<String>,
    pub confidence: f64,
}

impl IdentificationRecord {
    /// Validate a dynamic JSON payload against the identification schema.
    ///
    /// Returns every violation found so a single bad response explains all of
    /// its problems at once.
    pub fn from_json(value: &Value) -> Result<Self, Vec<Violation>> {
        let Some(object) = value.as_object() else {
            return Err(vec![Violation::new(
                "$",
                format!("expected a JSON object, got {}", json_kind(value)),
            )]);
        };

        for key in object.keys() {
            if !IDENTIFICATION_FIELDS.contains(&key.as_str()) {
                tracing::debug!(field = %key, "ignoring unknown identification field");
            }
        }

        let mut violations = Vec::new();
        let make = required_string(object, "make", &mut violations);
        let model = required_string(object, "model", &mut violations);
        let variant = optional_string(object, "variant", &mut violations);
        let caliber = optional_string(object, "caliber", &mut violations);
        let serial_number = optional_string(object, "serialNumber", &mut violations);
        let condition_grade = required_grade(object, &mut violations);
        let is_current_production = match object.get("isCurrentProduction") {
            Some(Value::Bool(flag)) => Some(*flag),
            Some(other) => {
                violations.push(Violation::new(
                    "isCurrentProduction",
                    format!("expected a boolean, got {}", json_kind(other)),
                ));
                None
            }
            None => {
                violations.push(Violation::new("isCurrentProduction", "missing required field"));
                None
            }
        };
        let modifications = string_list(object, "modifications", &mut violations);
        let confidence = match object.get("confidence") {
            Some(Value::Number(number)) => number.as_f64().and_then(|score| {
                match check_confidence(score) {
                    Some(message) => {
                        violations.push(Violation::new("confidence", message));
                        None
                    }
                    None => Some(score),
                }
            }),
            Some(other) => {
                violations.push(Violation::new(
                    "confidence",
                    format!("expected a number, got {}", json_kind(other)),
                ));
                None
            }
            None => {
                violations.push(Violation::new("confidence", "missing required field"));
                None
            }
        };

        match (
            make,
            model,
            condition_grade,
            is_current_production,
            confidence,
        ) {
            (
                Some(make),
                Some(model),
                Some(condition_grade),
                Some(is_current_production),
                Some(confidence),
            ) if violations.is_empty() => Ok(Self {
                make,
                model,
                variant,
                caliber,
                serial_number,
                condition_grade,
                is_current_production,
                modifications,
                confidence,
            }),
            _ => Err(violations),
        }
    }

    /// Structural checks for records that did not come through `from_json`.
    pub fn violations(&self) -> Vec<Violation> {
        let mut violations = Vec::new();
        if self.make.trim().is_empty() {
            violations.push(Violation::new("make", "must be a non-empty string"));
        }
        if self.model.trim().is_empty() {
            violations.push(Violation::new("model", "must be a non-empty string"));
        }
        if let Some(message) = check_confidence(self.confidence) {
            violations.push(Violation::new("confidence", message));
        }
        violations
    }

    /// Human-readable label such as `Winchester Model 70 Pre-64`.
    pub fn display_name(&self) -> String {
        let variant = self.variant.as_deref().unwrap_or("");
        format!("{} {} {}", self.make, self.model, variant)
            .trim()
            .to_string()
    }
}

/// Market value estimate for an identified item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationRecord {
    pub source: ValuationSource,
    #[serde(default)]
    pub wholesale_price: Option<f64>,
    /// MAP-style ceiling.
    #[serde(default)]
    pub reference_price: Option<f64>,
    pub estimated_value: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub comparables: Vec<String>,
    pub confidence: f64,
}

impl ValuationRecord {
    pub fn violations(&self) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (field, price) in [
            ("wholesalePrice", self.wholesale_price),
            ("referencePrice", self.reference_price),
            ("estimatedValue", Some(self.estimated_value)),
        ] {
            if let Some(price) = price {
                if !price.is_finite() || price < 0.0 {
                    violations.push(Violation::new(
                        field,
                        format!("must be a non-negative amount (got {price})"),
                    ));
                }
            }
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            violations.push(Violation::new(
                "currency",
                format!("must be a three-letter ISO code (got {:?})", self.currency),
            ));
        }
        if self.comparables.is_empty() {
            violations.push(Violation::new(
                "comparables",
                "must list at least one reference",
            ));
        }
        if let Some(message) = check_confidence(self.confidence) {
            violations.push(Violation::new("confidence", message));
        }
        violations
    }
}

/// Final pipeline output: one identification, one valuation, one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppraisalResponse {
    pub analysis: IdentificationRecord,
    pub valuation: ValuationRecord,
    pub timestamp: DateTime<Utc>,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn check_confidence(score: f64) -> Option<String> {
    if score.is_finite() && (0.0..=1.0).contains(&score) {
        None
    } else {
        Some(format!("must be within [0.0, 1.0] (got {score})"))
    }
}

fn required_string(
    object: &Map<String, Value>,
    field: &str,
    violations: &mut Vec<Violation>,
) -> Option<String> {
    match object.get(field) {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Some(Value::String(_)) => {
            violations.push(Violation::new(field, "must be a non-empty string"));
            None
        }
        Some(other) => {
            violations.push(Violation::new(
                field,
                format!("expected a string, got {}", json_kind(other)),
            ));
            None
        }
        None => {
            violations.push(Violation::new(field, "missing required field"));
            None
        }
    }
}

/// Strings or null; blank strings normalize to absent.
fn optional_string(
    object: &Map<String, Value>,
    field: &str,
    violations: &mut Vec<Violation>,
) -> Option<String> {
    match object.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(other) => {
            violations.push(Violation::new(
                field,
                format!("expected a string or null, got {}", json_kind(other)),
            ));
            None
        }
    }
}

fn required_grade(
    object: &Map<String, Value>,
    violations: &mut Vec<Violation>,
) -> Option<ConditionGrade> {
    const FIELD: &str = "conditionGrade";
    match object.get(FIELD) {
        Some(Value::String(raw)) => match ConditionGrade::parse(raw.trim()) {
            Some(grade) => Some(grade),
            None => {
                let allowed = ConditionGrade::ALL.map(ConditionGrade::as_str).join(", ");
                violations.push(Violation::new(
                    FIELD,
                    format!("{raw:?} is not one of: {allowed}"),
                ));
                None
            }
        },
        Some(other) => {
            violations.push(Violation::new(
                FIELD,
                format!("expected a string, got {}", json_kind(other)),
            ));
            None
        }
        None => {
            violations.push(Violation::new(FIELD, "missing required field"));
            None
        }
    }
}

fn string_list(
    object: &Map<String, Value>,
    field: &str,
    violations: &mut Vec<Violation>,
) -> Vec<String> {
    match object.get(field) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (idx, item) in items.iter().enumerate() {
                match item {
                    Value::String(text) => out.push(text.trim().to_string()),
                    other => violations.push(Violation::new(
                        format!("{field}[{idx}]"),
                        format!("expected a string, got {}", json_kind(other)),
                    )),
                }
            }
            out
        }
        Some(other) => {
            violations.push(Violation::new(
                field,
                format!("expected an array of strings, got {}", json_kind(other)),
            ));
            Vec::new()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
