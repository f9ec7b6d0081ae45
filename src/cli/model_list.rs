//! `palaver models`: the built-in model catalog.

use crate::core::generation::{ModelSpec, MODEL_CATALOG};

pub fn format_model_line(spec: &ModelSpec, default_model: &str) -> String {
    let marker = if spec.id == default_model { "*" } else { " " };
    format!(
        "{marker} {:<20} {:>7} tokens  ${}/{} prompt  ${}/{} completion",
        spec.id,
        spec.max_context,
        spec.prompt.price,
        spec.prompt.unit,
        spec.completion.price,
        spec.completion.unit
    )
}

pub fn list_models(default_model: &str) {
    println!("🤖 Available Models");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for spec in MODEL_CATALOG {
        println!("{}", format_model_line(spec, default_model));
    }
    println!();
    println!("* default model. Change it with: palaver set model <id>");
}
