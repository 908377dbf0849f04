//! Embedded JSON Schemas for agent payload validation.
//!
//! Agent payloads are loosely-typed JSON from an external process; every one
//! is validated at the stage boundary before deserialization. Schema mismatch
//! is a first-class error kind, never a trusted payload shape.

use jsonschema::Draft;
use serde_json::Value;

pub const MANIFEST: &str = include_str!("../schemas/manifest.schema.json");
pub const PLAN: &str = include_str!("../schemas/refactor_plan.schema.json");
pub const CHANGE_LOG: &str = include_str!("../schemas/change_log.schema.json");
pub const SAMPLE_REVIEW: &str = include_str!("../schemas/sample_review.schema.json");
pub const NARRATIVE: &str = include_str!("../schemas/narrative.schema.json");

/// Validate a payload against an embedded schema (Draft 2020-12).
///
/// Returns all violation messages joined, so the caller can surface one
/// readable error.
pub fn validate(schema_raw: &str, payload: &Value) -> Result<(), String> {
    let schema: Value =
        serde_json::from_str(schema_raw).map_err(|err| format!("invalid embedded schema: {err}"))?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| format!("compile schema: {err}"))?;
    let messages: Vec<String> = compiled
        .iter_errors(payload)
        .map(|err| err.to_string())
        .collect();
    if messages.is_empty() {
        Ok(())
    } else {
        Err(messages.join("; "))
    }
}
