use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;
use rs232_probe::{cli, commands, config::Config, error::Error, logging};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                debug!(%e, "No hangup handler");
                let _ = tokio::signal::ctrl_c().await;
                info!("Ctrl-C, stopping");
                cancel.cancel();
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Ctrl-C, stopping"),
            _ = hangup.recv() => info!("Hangup, stopping"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl-C, stopping");
    }

    cancel.cancel();
}

fn exit_code(e: &Error) -> ExitCode {
    match e {
        e if e.is_device_not_found() => ExitCode::from(2),
        Error::PortOpen { .. } => ExitCode::from(3),
        _ => ExitCode::FAILURE,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();

    if let cli::Commands::Examples(example) = cli.command {
        cli::handle_examples(example)?;
        return Ok(ExitCode::SUCCESS);
    }

    logging::init(
        cli.log_level,
        cli.trace_dir.map(|dir| (tracing::Level::TRACE, dir)),
    )
    .await;

    let config = if let Some(config_path) = cli.config {
        debug!(?config_path, "Config from path");
        Config::new_from_path(config_path)?
    } else {
        debug!("Default config");
        Config::default()
    };

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    match commands::run(cli.command, config, cancel).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            error!("{e}");
            let code = exit_code(&e);
            eprintln!("{:?}", color_eyre::eyre::Report::new(e));
            Ok(code)
        }
    }
}
