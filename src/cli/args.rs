//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

#[derive(Parser)]
#[command(name = "treewatch")]
#[command(version)]
#[command(about = "Watch directory trees and report file changes")]
#[command(styles = clap_cargo_style())]
pub struct Cli {
    /// Path to a settings file (defaults to .treewatch/settings.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create .treewatch/settings.toml with default values
    Init {
        /// Overwrite an existing settings file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    Config,

    /// Watch paths and print every change
    #[command(
        after_help = "Examples:\n  treewatch watch ./src -r\n  treewatch watch ./logs -p '.*\\.log' -k ENTRY_CREATE --json\n  treewatch watch            # use [[subscriptions]] from settings"
    )]
    Watch {
        /// Directories to watch. Uses configured subscriptions when empty
        paths: Vec<PathBuf>,

        /// Also watch every subdirectory, including ones created later
        #[arg(short, long)]
        recursive: bool,

        /// Only report paths fully matching this regular expression
        #[arg(short, long)]
        pattern: Option<String>,

        /// Event kinds to report: ENTRY_CREATE, ENTRY_DELETE, ENTRY_MODIFY
        #[arg(short, long = "kind")]
        kinds: Vec<String>,

        /// Print one JSON object per line
        #[arg(long)]
        json: bool,

        /// Stop after this many seconds instead of running until killed
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch_flags() {
        let cli = Cli::parse_from([
            "treewatch",
            "watch",
            "/tmp/a",
            "/tmp/b",
            "-r",
            "-p",
            r".*\.rs",
            "-k",
            "ENTRY_CREATE",
            "--kind",
            "ENTRY_DELETE",
            "--timeout",
            "3",
        ]);

        let Commands::Watch {
            paths,
            recursive,
            pattern,
            kinds,
            json,
            timeout,
        } = cli.command
        else {
            panic!("expected watch command");
        };

        assert_eq!(paths, vec![PathBuf::from("/tmp/a"), PathBuf::from("/tmp/b")]);
        assert!(recursive);
        assert_eq!(pattern.as_deref(), Some(r".*\.rs"));
        assert_eq!(kinds, vec!["ENTRY_CREATE", "ENTRY_DELETE"]);
        assert!(!json);
        assert_eq!(timeout, Some(3));
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["treewatch", "config", "--config", "custom.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert!(matches!(cli.command, Commands::Config));
    }
}
