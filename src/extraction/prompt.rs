//! Identification prompt assembly.
//!
//! The template is fixed at compile time; only the evidence section varies
//! with the request's OCR hints and owner-supplied context.
use std::collections::BTreeMap;

// Prompt template loaded at compile time
const IDENTIFICATION_BASE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/identification.md"
));

/// Build the identification prompt for one request.
///
/// OCR hints are appended verbatim, one per line, in the order received.
/// Context entries are emitted sorted by key so identical requests produce
/// identical prompts.
pub fn build_identification_prompt(
    ocr_hints: &[String],
    context: &BTreeMap<String, String>,
) -> String {
    let evidence_section = build_evidence_section(ocr_hints, context);
    IDENTIFICATION_BASE.replace("{evidence_section}", &evidence_section)
}

fn build_evidence_section(ocr_hints: &[String], context: &BTreeMap<String, String>) -> String {
    let mut section = String::new();

    let hints: Vec<&String> = ocr_hints
        .iter()
        .filter(|hint| !hint.trim().is_empty())
        .collect();
    if !hints.is_empty() {
        section.push_str("\n## OCR Evidence\n");
        section.push_str(
            "The following text was detected on the item by on-device OCR. \
             Use it as supplementary evidence:\n",
        );
        for hint in hints {
            section.push_str(&format!("- {hint}\n"));
        }
    }

    let context: Vec<(&String, &String)> = context
        .iter()
        .filter(|(key, value)| !key.trim().is_empty() && !value.trim().is_empty())
        .collect();
    if !context.is_empty() {
        section.push_str("\n## Owner Context\n");
        section.push_str("The owner supplied these details. Weigh them against what the photograph shows:\n");
        for (key, value) in context {
            section.push_str(&format!("- {}: {}\n", key.trim(), value.trim()));
        }
    }

    section
}
