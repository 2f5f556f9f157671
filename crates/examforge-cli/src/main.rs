//! examforge CLI: generate an exam, take it in the terminal and get it graded.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use examforge_core::mathquery::MathOperation;
use examforge_core::model::{OptionCount, QuestionKind};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "examforge", version, about = "LLM-backed exam generator and grader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an exam, answer it and get it graded
    Take(commands::take::TakeArgs),

    /// Parse a saved completion into questions without calling any service
    Parse {
        /// File holding the raw generated exam text
        file: PathBuf,

        /// Exam format: multiple, true_false, open
        #[arg(long, default_value = "multiple")]
        format: QuestionKind,

        /// Options per multiple-choice question (3, 4 or 5)
        #[arg(long, default_value = "4")]
        options: OptionCount,

        /// Topic recorded on each question
        #[arg(long, default_value = "General")]
        topic: String,

        /// Print the parsed questions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Look up an expression or a math phrase
    Math {
        /// Expression or phrase, e.g. "x^2 - 4 = 0"; options go before it
        #[arg(required = true, num_args = 1.., allow_hyphen_values = true)]
        expression: Vec<String>,

        /// Operation applied to the expression (derivative, integral, solve, limit, simplify, expand, factor, plot)
        #[arg(long)]
        operation: Option<MathOperation>,

        /// Completion provider used to translate long phrases
        #[arg(long)]
        provider: Option<String>,

        /// Model used to translate long phrases
        #[arg(long)]
        model: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show stored exam results
    History {
        /// Results file (defaults to the configured results path)
        #[arg(long)]
        results: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List available models
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create a starter config
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("examforge=info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Take(args) => commands::take::execute(args).await,
        Commands::Parse {
            file,
            format,
            options,
            topic,
            json,
        } => commands::parse::execute(file, format, options, topic, json),
        Commands::Math {
            expression,
            operation,
            provider,
            model,
            config,
        } => commands::math::execute(expression.join(" "), operation, provider, model, config).await,
        Commands::History { results, config } => commands::history::execute(results, config),
        Commands::ListModels { provider, config } => {
            commands::list_models::execute(provider, config)
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
