//! The `examforge list-models` command.

use std::path::PathBuf;

use anyhow::Result;

use examforge_providers::{create_completion_service, load_config_from};

pub fn execute(provider_filter: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();

    let mut found_any = false;
    for name in names {
        if provider_filter.as_ref().is_some_and(|filter| filter != name) {
            continue;
        }

        let service = create_completion_service(&config.providers[name])?;
        let models = service.available_models();
        if models.is_empty() {
            continue;
        }

        found_any = true;
        let marker = if *name == config.default_provider { " (default)" } else { "" };
        println!("Provider: {name}{marker}");
        for model in &models {
            println!(
                "  {} - {} ({}K context)",
                model.id,
                model.name,
                model.max_context / 1000
            );
        }
        println!();
    }

    if !found_any {
        println!("No providers configured. Run `examforge init` to create a config file.");
    }

    Ok(())
}
