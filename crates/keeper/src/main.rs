// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use certkeeper::config::{KeeperConfig, LogFormat};

#[derive(Parser)]
#[command(name = "certkeeper", version, about = "Keep a client certificate fresh")]
struct Cli {
    #[command(flatten)]
    config: KeeperConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match cli.config.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }

    if let Err(e) = certkeeper::run(cli.config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
