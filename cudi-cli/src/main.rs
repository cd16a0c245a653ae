use clap::Parser;
use cudi_cli::{logging, run, Cli, CliResult};
use cudi_identity::{Config, IdentityManager};
use tracing::error;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => cli.apply(config),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    };

    // Initialize logging
    let log_guard = logging::init(&config.data_dir);

    let result = execute(cli, &config).await;
    if let Err(e) = &result {
        error!("{}", e);
    }

    // exit() skips destructors; flush the file log first
    drop(log_guard);
    if result.is_err() {
        std::process::exit(1);
    }
}

async fn execute(cli: Cli, config: &Config) -> CliResult<()> {
    let mut manager = IdentityManager::from_config(config)?;
    let mut stdout = std::io::stdout();
    run(cli.command, &mut manager, &mut stdout).await
}
