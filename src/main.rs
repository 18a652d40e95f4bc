use std::fs::File;

use anyhow::{Result, anyhow};
use clap::Parser;
use daemonize::Daemonize;
use log::{LevelFilter, info};
use syslog::{BasicLogger, Facility, Formatter3164};

use medimated::{application::Application, cli::Cli, config::ConfigManager};

fn init_log(level: LevelFilter) -> Result<()> {
    syslog::unix(Formatter3164 {
        facility: Facility::LOG_USER,
        hostname: None,
        process: "medimated".into(),
        pid: 0,
    })
    .map_err(|e| anyhow!("{e}"))
    .and_then(|logger| {
        log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
            .map(|_| log::set_max_level(level))
            .map_err(|e| anyhow!("{e}"))
    })
}

fn into_daemon() -> Result<()> {
    File::create("/var/tmp/medimated.log")
        .and_then(|out| Ok((out.try_clone()?, out)))
        .map_err(|e| anyhow!("{e}"))
        .and_then(|(stderr, stdout)| {
            Daemonize::new()
                .stdout(stdout)
                .stderr(stderr)
                .start()
                .map_err(|e| anyhow!("{e}"))
        })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_log(cli.log_level)?;

    // Fork before the runtime starts its worker threads.
    if cli.daemonize {
        into_daemon()?;
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    #[cfg(feature = "tokio-console")]
    console_subscriber::init();

    let config_manager = ConfigManager::load(cli.config).await?;
    info!("Configuration: {}", config_manager.path().display());
    if cli.simulate {
        info!("Using simulated hardware");
        config_manager.force_simulated().await;
    }

    info!("medimated {} starting", env!("CARGO_PKG_VERSION"));
    Application::builder()
        .with_config_manager(config_manager)
        .build()
        .await?
        .run()
        .await
}
