use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    bookgate::logging::init().context("init logging")?;

    let cli = bookgate::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        bookgate::cli::Command::Serve(args) => {
            bookgate::server::run(args).await.context("serve")?;
        }
        bookgate::cli::Command::Fetch(args) => {
            bookgate::reader::fetch(args).await.context("fetch")?;
        }
        bookgate::cli::Command::Toc(args) => {
            bookgate::toc::run(args).context("toc")?;
        }
    }

    Ok(())
}
