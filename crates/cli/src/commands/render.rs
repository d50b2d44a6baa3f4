//! `ctxpack render` — Pack a render request into a prompt.
//!
//! `model_identifier`, `max_context_tokens` and `max_generation_tokens` may
//! be left out of the request; the `[assembler]` config supplies them.

use super::runtime::{Runtime, read_input};
use ctxpack_config::AssemblerConfig;
use ctxpack_core::render::RenderRequest;
use serde_json::Value;
use std::path::Path;

pub async fn run(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let raw = read_input(input)?;
    let runtime = Runtime::load()?;
    let request = parse_request(&raw, &runtime.config.assembler)?;

    let result = runtime.packer.assemble(&request).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Parse a request, filling missing model and window fields from `defaults`.
fn parse_request(
    raw: &str,
    defaults: &AssemblerConfig,
) -> Result<RenderRequest, Box<dyn std::error::Error>> {
    let mut value: Value =
        serde_json::from_str(raw).map_err(|e| format!("Invalid render request: {e}"))?;
    if let Value::Object(fields) = &mut value {
        fields
            .entry("model_identifier")
            .or_insert_with(|| Value::from(defaults.default_model.clone()));
        fields
            .entry("max_context_tokens")
            .or_insert_with(|| Value::from(defaults.max_context_tokens));
        fields
            .entry("max_generation_tokens")
            .or_insert_with(|| Value::from(defaults.max_generation_tokens));
    }
    let request =
        serde_json::from_value(value).map_err(|e| format!("Invalid render request: {e}"))?;
    Ok(request)
}
