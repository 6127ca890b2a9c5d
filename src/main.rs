//! lsp-lm - Language server for language-model completions
//!
//! Serves LSP over stdio or a socket. Stdout may carry the protocol, so
//! logs and errors always go to stderr.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lsp_lm::app::App;
use lsp_lm::cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    // Use RUST_LOG=lsp_lm=trace to see every frame
    let default_filter = if cli.verbose { "lsp_lm=debug" } else { "lsp_lm=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(async_main(cli)) {
        eprintln!("Error: {:#}", e);
        std::process::exit(2);
    }
}

async fn async_main(cli: Cli) -> anyhow::Result<()> {
    let app = App::new(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to initialize: {}", e))?;

    execute_command(cli.command, &app).await
}

async fn execute_command(command: Commands, app: &App) -> anyhow::Result<()> {
    use lsp_lm::cli::commands;

    match command {
        Commands::Serve(args) => commands::serve::execute(args, app).await,
        Commands::Connect(args) => commands::connect::execute(args, app).await,
        Commands::Catalog(args) => commands::catalog::execute(args, app),
    }
}
