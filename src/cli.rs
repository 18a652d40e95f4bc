use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

/// medimated: daemon for the MediMate medication dispenser
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML config file path (default: $MEDIMATED_CONFIG, then ~/.config/medimated/config.yml, then /etc/medimated/config.yml)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Detach and run as a daemon
    #[arg(short = 'd', long = "daemonize", default_value = "false")]
    pub daemonize: bool,

    /// Use in-memory hardware instead of sysfs and I2C
    #[arg(long = "simulate", default_value = "false")]
    pub simulate: bool,

    /// Maximum log level sent to syslog
    #[arg(short = 'l', long = "log-level", default_value = "info")]
    pub log_level: LevelFilter,
}
