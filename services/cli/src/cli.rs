use crate::demo::{run_demo, DemoArgs};
use crate::evaluate::{run_catalog, run_evaluate, CatalogArgs, EvaluateArgs};
use clap::{Parser, Subcommand};
use tiered_rewards::config::AppConfig;
use tiered_rewards::error::AppError;
use tiered_rewards::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "tiered-rewards",
    about = "Evaluate tiered reward levels from member biometric history",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed scripted members, run a batch evaluation and show progress (default command)
    Demo(DemoArgs),
    /// Evaluate one member from a CSV export of biometric records
    Evaluate(EvaluateArgs),
    /// Validate a rule catalog file and print its levels
    Catalog(CatalogArgs),
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, config.environment)?;

    let command = cli
        .command
        .unwrap_or_else(|| Command::Demo(DemoArgs::default()));

    match command {
        Command::Demo(args) => run_demo(args, &config).await,
        Command::Evaluate(args) => run_evaluate(args, &config),
        Command::Catalog(args) => run_catalog(args),
    }
}
