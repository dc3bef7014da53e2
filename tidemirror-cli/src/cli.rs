use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tidemirror_types::{ProtocolVersion, Region};

#[derive(Parser)]
#[command(
    name = "tidemirror",
    about = "Fetch through a weighted pool of interchangeable mirrors",
    version = env!("CARGO_PKG_VERSION"),
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, env = "TIDEMIRROR_CONFIG", help = "Path to mirrors.json")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Log every attempt (debug level)")]
    pub verbose: bool,

    #[arg(long, global = true, env = "TIDEMIRROR_LOG", default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Fetch a URL with mirror failover and write the body to stdout")]
    Fetch {
        #[arg(help = "Absolute mirror URL, or a path relative to the primary v2 mirror")]
        url: String,

        #[arg(long, default_value = "v2", value_parser = parse_version)]
        api: ProtocolVersion,

        #[arg(long, help = "Quality tier to keep when failing over across API versions")]
        quality: Option<String>,

        #[arg(long, default_value = "auto", value_parser = parse_region)]
        region: Region,

        #[arg(long, help = "Only accept JSON bodies where this field is a non-empty string")]
        require_field: Option<String>,

        #[arg(short, long, help = "Write the body to a file instead of stdout")]
        output: Option<PathBuf>,

        #[arg(long, help = "Print the attempt log to stderr")]
        report: bool,
    },

    #[command(about = "List the mirrors that serve an API version")]
    Targets {
        #[arg(long, default_value = "v2", value_parser = parse_version)]
        api: ProtocolVersion,

        #[arg(long, default_value = "auto", value_parser = parse_region)]
        region: Region,

        #[arg(short, long, help = "Output as JSON")]
        json: bool,
    },

    #[command(subcommand, about = "View or create the mirror configuration")]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    #[command(about = "Show the effective configuration")]
    Show {
        #[arg(short, long, help = "Output as JSON")]
        json: bool,
    },

    #[command(about = "Write the built-in configuration to the config path")]
    Init {
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
}

fn parse_version(s: &str) -> Result<ProtocolVersion, String> {
    s.parse()
}

fn parse_region(s: &str) -> Result<Region, String> {
    Region::parse(s).ok_or_else(|| format!("unknown region '{}' (expected auto, us or eu)", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_arguments() {
        let cli = Cli::try_parse_from([
            "tidemirror",
            "fetch",
            "https://hifi.tidemirror.net/track/?id=1",
            "--api",
            "v1",
            "--quality",
            "LOSSLESS",
            "--region",
            "eu",
            "-v",
        ])
        .expect("valid arguments");

        assert!(cli.verbose);
        match cli.command {
            Commands::Fetch { api, quality, region, .. } => {
                assert_eq!(api, ProtocolVersion::V1);
                assert_eq!(quality.as_deref(), Some("LOSSLESS"));
                assert_eq!(region, Region::Eu);
            },
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn test_unknown_region_rejected() {
        let result = Cli::try_parse_from(["tidemirror", "targets", "--region", "mars"]);
        assert!(result.is_err());
    }
}
