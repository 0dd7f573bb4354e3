// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::error;

use gwbroker::config::BrokerConfig;
use gwbroker::resolver::Broker;

#[derive(Debug, Parser)]
#[command(name = "gwbroker", about = "Local OAuth2 credential broker for Google Workspace tools")]
struct Cli {
    #[command(flatten)]
    config: BrokerConfig,

    /// Log filter (tracing env-filter syntax).
    #[arg(long, default_value = "info", env = "GWBROKER_LOG")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Authenticate an account in the browser and store its credentials.
    Login {
        /// Require this specific account; fails if the browser login
        /// completes with a different one.
        #[arg(long)]
        account: Option<String>,
    },
    /// List authenticated accounts.
    Accounts,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&cli.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Command::Login { .. } = cli.command {
        if let Err(e) = cli.config.validate_for_login() {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    }

    if let Err(e) = run(cli).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let broker = Broker::new(cli.config);

    // Ctrl-C unblocks a pending browser wait instead of killing the process
    // mid-write.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Command::Login { account } => {
            let identity = broker.login(account.as_deref(), &cancel).await?;
            println!("Authenticated as {identity}");

            let others: Vec<String> = broker
                .store()
                .list_identities()?
                .into_iter()
                .filter(|i| *i != identity)
                .collect();
            if !others.is_empty() {
                println!("Other authenticated accounts: {}", others.join(", "));
            }
        }
        Command::Accounts => {
            let identities = broker.store().list_identities()?;
            if identities.is_empty() {
                println!("No authenticated accounts. Run `gwbroker login` to add one.");
            } else {
                for (idx, identity) in identities.iter().enumerate() {
                    if idx == 0 {
                        println!("{identity} (default)");
                    } else {
                        println!("{identity}");
                    }
                }
            }
        }
    }
    Ok(())
}
