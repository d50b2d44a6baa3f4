//! `ctxpack count` — Count the tokens of a message list.

use super::runtime::{Runtime, read_input};
use ctxpack_core::message::ChatMessage;
use std::path::Path;

pub async fn run(
    input: &Path,
    model: Option<String>,
    apply_template: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = read_input(input)?;
    let messages: Vec<ChatMessage> =
        serde_json::from_str(&raw).map_err(|e| format!("Invalid message list: {e}"))?;

    let runtime = Runtime::load()?;
    let model = model.unwrap_or_else(|| runtime.config.assembler.default_model.clone());
    let count = runtime.counter.count(&messages, &model, apply_template)?;

    println!("{count}");
    Ok(())
}
