//! The `examforge math` command.

use std::path::PathBuf;

use anyhow::Result;

use examforge_core::engine::ExamEngine;
use examforge_core::mathquery::{needs_translation, MathOperation};
use examforge_core::model::Pod;
use examforge_providers::load_config_from;

use super::{completion_service, math_service};

pub async fn execute(
    expression: String,
    operation: Option<MathOperation>,
    provider: Option<String>,
    model: Option<String>,
    config: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config.as_deref())?;
    // Only untyped long phrases go through the completion service.
    let translates = operation.is_none() && needs_translation(&expression);
    let engine = ExamEngine::new(
        completion_service(&config, provider.as_deref(), translates)?,
        math_service(&config, true)?,
        config.engine_config(model.as_deref()),
    );

    let lookup = engine.lookup_math(&expression, operation).await?;

    println!("Query: {}\n", lookup.query);
    print_pod(&lookup.primary);
    for pod in lookup.pods.iter().filter(|p| **p != lookup.primary) {
        print_pod(pod);
    }
    Ok(())
}

fn print_pod(pod: &Pod) {
    println!("{}", pod.title);
    if let Some(text) = pod.text() {
        println!("  {text}");
    }
    if let Some(image) = &pod.image_ref {
        println!("  {image}");
    }
}
