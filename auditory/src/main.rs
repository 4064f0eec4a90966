//! Auditory Server Entry Point

use auditory::cli::{Cli, Commands};
use auditory::config::AuditoryConfig;
use auditory::shutdown::ShutdownController;
use auditory::{bootstrap, logging, server};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ガードを保持している間だけ非同期ログが書き出される
    let _guard = logging::init()?;

    let config = AuditoryConfig::from_env();
    let config = match cli.command {
        Some(Commands::Serve(args)) => args.apply(config),
        None => config,
    };

    let ctx = bootstrap::initialize(&config, ShutdownController::default())?;
    server::run(ctx, &config).await
}
