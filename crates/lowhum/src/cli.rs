use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "lowhum", version, about = "Looping brown noise for focus and sleep")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Config file (defaults to ~/.lowhum/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Play the noise loop until Ctrl+C or until the output device goes away
    Start {
        /// Output device id, or a substring of its name
        #[arg(long)]
        device: Option<String>,
    },

    /// List output devices
    Devices {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Generate the noise asset ahead of time
    Generate {
        /// Rebuild even when a valid asset exists
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_with_device() {
        let args = Args::try_parse_from(["lowhum", "start", "--device", "USB DAC"]).unwrap();
        assert_eq!(
            args.cmd,
            Command::Start {
                device: Some("USB DAC".to_string())
            }
        );
        assert!(args.config.is_none());
    }

    #[test]
    fn config_flag_is_global() {
        let args =
            Args::try_parse_from(["lowhum", "devices", "--json", "--config", "/tmp/l.toml"]).unwrap();
        assert_eq!(args.cmd, Command::Devices { json: true });
        assert_eq!(args.config, Some(PathBuf::from("/tmp/l.toml")));
    }

    #[test]
    fn generate_defaults_to_no_force() {
        let args = Args::try_parse_from(["lowhum", "generate"]).unwrap();
        assert_eq!(args.cmd, Command::Generate { force: false });
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Args::try_parse_from(["lowhum"]).is_err());
    }
}
