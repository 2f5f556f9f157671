//! The `examforge init` command.

use std::path::Path;

use anyhow::Result;

pub const CONFIG_FILE: &str = "examforge.toml";

pub fn execute() -> Result<()> {
    if Path::new(CONFIG_FILE).exists() {
        println!("{CONFIG_FILE} already exists, skipping.");
    } else {
        std::fs::write(CONFIG_FILE, SAMPLE_CONFIG)?;
        println!("Created {CONFIG_FILE}");
    }

    println!("\nNext steps:");
    println!("  1. Set OPENAI_API_KEY (or edit {CONFIG_FILE}) and WOLFRAM_APP_ID for math exams");
    println!("  2. Run: examforge take --topic \"Revolución francesa\" --count 5");
    println!("  3. Run: examforge history");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# examforge configuration

default_provider = "openai"
default_model = "gpt-4o"
generation_timeout_secs = 60
question_timeout_secs = 30
evaluation_timeout_secs = 45
max_retries = 2
retry_delay_ms = 1000
grading_parallelism = 4
results_path = "./examforge-results/results.jsonl"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[math]
app_id = "${WOLFRAM_APP_ID}"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_parses() {
        let config: examforge_providers::ExamforgeConfig = toml::from_str(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.grading_parallelism, 4);
        assert_eq!(config.math.app_id, "${WOLFRAM_APP_ID}");
    }
}
