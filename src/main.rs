use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use card_vault::config::CatalogConfig;
use card_vault::csv::{read_operations, write_vaults};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::WARN.into()))
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let (Some(catalog_path), Some(operations_path)) = (args.next(), args.next()) else {
        eprintln!("usage: card-vault <catalog.toml> <operations.csv>");
        return ExitCode::from(2);
    };

    if !operations_path.ends_with(".csv") {
        warn!(path = operations_path, "operations file seems to not be a csv file");
    }

    let market = match CatalogConfig::load(&catalog_path).and_then(|catalog| catalog.build()) {
        Ok(market) => market,
        Err(e) => {
            error!(path = catalog_path, "{e}");
            return ExitCode::FAILURE;
        }
    };

    let operations_path = PathBuf::from(operations_path);
    let operations = match read_operations(&operations_path) {
        Ok(operations) => operations,
        Err(e) => {
            error!(path = %operations_path.display(), "{e}");
            return ExitCode::FAILURE;
        }
    };

    let (op_sender, op_receiver) = tokio::sync::mpsc::channel(16);

    let reader = tokio::spawn(async move {
        for result in operations {
            match result {
                Ok(operation) => {
                    if op_sender.send(operation).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    market.run(ReceiverStream::new(op_receiver)).await;

    if let Err(e) = reader.await {
        error!("operation reader failed: {e}");
        return ExitCode::FAILURE;
    }

    if let Err(e) = write_vaults(io::stdout().lock(), market.vault_summaries()) {
        error!("{e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
