use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pipeline_runner::cli::{Cli, Command};
use pipeline_runner::client::{PipelineApi, PipelineClient};
use pipeline_runner::config::PipelineConfig;
use pipeline_runner::poller::{PollOutcome, StatusPoller};
use pipeline_runner::ui::{self, PipelineProgress};
use pipeline_runner::{JobService, server};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "pipeline_runner=debug,tower_http=debug"
    } else {
        "pipeline_runner=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    match cli.command {
        Command::Serve { .. } => {
            let service = JobService::from_config(&config);
            let shutdown = shutdown_on_ctrl_c();
            server::serve(&config, service, shutdown).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { theme, server } => {
            let url = server.unwrap_or_else(|| config.server_url.clone());
            let poller = StatusPoller::new(PipelineClient::new(url)?, config.poll_interval());
            Ok(follow(&poller, &theme).await)
        }
        Command::Status {
            pipeline_id,
            server,
        } => {
            let client = PipelineClient::new(server.unwrap_or(config.server_url))?;
            let report = client.status(&pipeline_id).await?;
            ui::print_report(&report);
            Ok(ExitCode::SUCCESS)
        }
        Command::Cancel {
            pipeline_id,
            server,
        } => {
            let client = PipelineClient::new(server.unwrap_or(config.server_url))?;
            client.cancel(&pipeline_id).await?;
            println!("Cancellation requested for {pipeline_id}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Stages => {
            ui::print_stages(pipeline_runner::pipeline::catalog());
            Ok(ExitCode::SUCCESS)
        }
        Command::Demo { theme } => {
            let poller = StatusPoller::new(JobService::from_config(&config), config.poll_interval());
            Ok(follow(&poller, &theme).await)
        }
    }
}

/// Start a pipeline and render its progress until it settles or Ctrl-C.
async fn follow(poller: &StatusPoller<impl PipelineApi>, theme: &str) -> ExitCode {
    let abandon = shutdown_on_ctrl_c();
    let mut progress = PipelineProgress::start(theme);
    let (_, outcome) = poller.run(theme, &abandon, &mut progress).await;
    match outcome {
        PollOutcome::Completed(_) => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received");
            trigger.cancel();
        }
    });
    token
}
