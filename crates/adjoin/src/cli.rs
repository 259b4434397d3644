use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use adjoin_common::paths::DEFAULT_STATE_DIR;

#[derive(Parser, Debug)]
#[command(
    name = "adjoin",
    version,
    about = "Join this host to an Active Directory realm and keep its keytab fresh"
)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "ADJOIN_LOG", default_value = "info", global = true)]
    pub log_level: String,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write logs to file (in addition to stderr)
    #[arg(long, env = "ADJOIN_LOG_FILE", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Directory holding the initialization marker, refresh schedule and logs
    #[arg(
        long,
        env = "ADJOIN_STATE_DIR",
        value_name = "DIR",
        default_value = DEFAULT_STATE_DIR,
        global = true
    )]
    pub state_dir: PathBuf,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Join (or verify), then keep running: refresh keytab, optional gateway and health route
    Run(RunArgs),
    /// Generate configuration and run the join sequence once
    Init,
    /// Regenerate the keytab and verify its principals
    Refresh,
    /// Check the keytab and the machine account membership
    Health,
    /// Run only the credential proxy gateway
    Proxy,
    /// Classify network interfaces and print the access allow-list
    Topology,
    /// Show the persisted lifecycle state
    Status(StatusArgs),
    /// Delete the initialization marker so the next start joins again
    Reset(ResetArgs),
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Start the credential proxy gateway
    #[arg(long, env = "ADJOIN_PROXY")]
    pub proxy: bool,

    /// Serve GET /healthz on this port
    #[arg(long, env = "ADJOIN_HTTP_PORT", value_name = "PORT")]
    pub http_port: Option<u16>,
}

#[derive(Args, Debug, Default)]
pub struct StatusArgs {
    /// Also run a live membership test
    #[arg(long)]
    pub check: bool,
}

#[derive(Args, Debug, Default)]
pub struct ResetArgs {
    /// Confirm removal of the marker
    #[arg(long)]
    pub yes: bool,
}

impl Cli {
    /// Effective log filter: `-v` and `-vv` override `--log-level`.
    pub fn log_filter(&self) -> &str {
        match self.verbose {
            0 => &self.log_level,
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("adjoin").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_apply_without_flags() {
        let cli = parse(&["init"]);
        assert!(matches!(cli.command, Command::Init));
        assert_eq!(cli.state_dir, PathBuf::from("/var/lib/adjoin"));
        assert_eq!(cli.log_filter(), cli.log_level);
        assert!(!cli.json);
    }

    #[test]
    fn verbosity_overrides_log_level() {
        assert_eq!(parse(&["-v", "health"]).log_filter(), "debug");
        assert_eq!(parse(&["status", "-vv"]).log_filter(), "trace");
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = parse(&["topology", "--json", "--state-dir", "/srv/adjoin"]);
        assert!(cli.json);
        assert_eq!(cli.state_dir, PathBuf::from("/srv/adjoin"));
    }

    #[test]
    fn run_accepts_proxy_and_http_port() {
        let cli = parse(&["run", "--proxy", "--http-port", "8080"]);
        match cli.command {
            Command::Run(args) => {
                assert!(args.proxy);
                assert_eq!(args.http_port, Some(8080));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn reset_and_status_flags() {
        assert!(matches!(
            parse(&["reset", "--yes"]).command,
            Command::Reset(ResetArgs { yes: true })
        ));
        assert!(matches!(
            parse(&["status", "--check"]).command,
            Command::Status(StatusArgs { check: true })
        ));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["adjoin"]).is_err());
    }
}
