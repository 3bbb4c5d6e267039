//! CLI argument definitions for rmirror

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rmirror")]
#[command(about = "Read memory images through a remote-mirror function table", long_about = None)]
pub struct Cli {
    /// Image manifest (uses configured default if not provided)
    #[arg(short, long, global = true)]
    pub manifest: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(flatten)]
    Memory(MemoryCommand),

    /// Configure default settings
    Configure {
        /// Set default image manifest
        #[arg(long = "default-manifest")]
        default_manifest: Option<PathBuf>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[derive(Subcommand)]
pub enum MemoryCommand {
    /// Show target widths, segments and symbol count
    Info,

    /// Resolve a symbol to an address
    #[command(visible_alias = "sym")]
    Symbol {
        /// Symbol name
        name: String,
    },

    /// Read raw bytes at an address
    Read {
        /// Address (hex with 0x prefix, or decimal)
        address: String,

        /// Number of bytes to read
        #[arg(default_value = "64")]
        size: u64,

        /// Print a plain hex string instead of a hex dump
        #[arg(long)]
        raw: bool,
    },

    /// Read a string at an address
    #[command(visible_alias = "str")]
    String {
        /// Address (hex with 0x prefix, or decimal)
        address: String,
    },

    /// Read a pointer-sized value at an address
    #[command(visible_alias = "ptr")]
    Pointer {
        /// Address (hex with 0x prefix, or decimal)
        address: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_read() {
        let cli = Cli::parse_from(["rmirror", "-m", "image.toml", "read", "0x1000", "16", "--raw"]);
        assert_eq!(cli.manifest, Some(PathBuf::from("image.toml")));
        match cli.command {
            Commands::Memory(MemoryCommand::Read { address, size, raw }) => {
                assert_eq!(address, "0x1000");
                assert_eq!(size, 16);
                assert!(raw);
            }
            _ => panic!("expected read command"),
        }
    }

    #[test]
    fn test_manifest_after_subcommand() {
        let cli = Cli::parse_from(["rmirror", "sym", "main", "--manifest", "a.toml"]);
        assert_eq!(cli.manifest, Some(PathBuf::from("a.toml")));
        assert!(matches!(
            cli.command,
            Commands::Memory(MemoryCommand::Symbol { name }) if name == "main"
        ));
    }

    #[test]
    fn test_parse_configure() {
        let cli = Cli::parse_from(["rmirror", "configure", "--show"]);
        assert!(cli.manifest.is_none());
        assert!(matches!(
            cli.command,
            Commands::Configure {
                default_manifest: None,
                show: true
            }
        ));
    }
}
