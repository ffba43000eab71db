use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_UPSTREAM_URL: &str = "https://gutendex.com";

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Serve(ServeArgs),
    Fetch(FetchArgs),
    Toc(TocArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Listen address for the gateway API.
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub addr: SocketAddr,

    /// Base URL of the upstream catalog.
    #[arg(long, default_value = DEFAULT_UPSTREAM_URL)]
    pub upstream_url: String,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Catalog id of the book to fetch.
    #[arg(long)]
    pub id: u64,

    /// Base URL of the upstream catalog.
    #[arg(long, default_value = DEFAULT_UPSTREAM_URL)]
    pub upstream_url: String,

    /// Emit the upstream body as-is instead of sanitizing it.
    #[arg(long, default_value_t = false)]
    pub raw: bool,

    /// Output file path (stdout when omitted).
    #[arg(long)]
    pub out: Option<String>,
}

#[derive(Debug, Args)]
pub struct TocArgs {
    /// Input HTML file.
    #[arg(long)]
    pub input: String,

    /// Emit the outline as JSON instead of indented text.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
