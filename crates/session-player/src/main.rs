use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use session_player::cli::{Args, Command};
use session_player::config::PlayerConfig;
use session_player::runtime::{self, PlayOptions};

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,session_core=info,session_player=info")
        }))
        .init();

    let file_cfg = match args.config.as_deref() {
        Some(path) => PlayerConfig::load(path)?,
        None => PlayerConfig::default(),
    };

    match args.cmd {
        Command::Devices => runtime::list_devices(),
        Command::Play {
            paths,
            start_index,
            title,
        } => {
            let buffer_seconds = args
                .buffer_seconds
                .filter(|s| s.is_finite() && *s > 0.0)
                .unwrap_or_else(|| file_cfg.buffer_seconds());
            runtime::run_play(PlayOptions {
                paths,
                start_index,
                title: title.or_else(|| file_cfg.queue_title.clone()),
                device: args.device.or_else(|| file_cfg.device.clone()),
                buffer_seconds,
                record_path: args.record_path.unwrap_or_else(|| file_cfg.record_path()),
                session: file_cfg.session_config(),
            })
        }
    }
}
