use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "session-player", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use a specific output device by substring match (overrides config)
    #[arg(long)]
    pub device: Option<String>,

    /// Decode-ahead buffer in seconds (overrides config)
    #[arg(long)]
    pub buffer_seconds: Option<f32>,

    /// Resume-position file (overrides config)
    #[arg(long)]
    pub record_path: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Queue files or directories and play them, with an interactive console on stdin
    Play {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Queue position to start from
        #[arg(long, default_value_t = 0)]
        start_index: i64,

        /// Queue title shown to observers
        #[arg(long)]
        title: Option<String>,
    },

    /// List output devices and exit
    Devices,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_play_with_overrides() {
        let args = Args::try_parse_from([
            "session-player",
            "--device",
            "USB",
            "play",
            "a.flac",
            "b.flac",
            "--start-index",
            "1",
        ])
        .unwrap();
        assert_eq!(args.device.as_deref(), Some("USB"));
        match args.cmd {
            Command::Play {
                paths, start_index, ..
            } => {
                assert_eq!(paths.len(), 2);
                assert_eq!(start_index, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn play_requires_a_path() {
        assert!(Args::try_parse_from(["session-player", "play"]).is_err());
    }
}
