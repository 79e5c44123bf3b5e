//! Command-line surface, in the style of `args::CmdArgs`: a top-level
//! `Parser` struct carrying a `#[command(subcommand)]` enum, with
//! boundary-validated newtypes for anything that would otherwise let a
//! malformed value reach the netmap layer.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};

/// A network interface name, validated the way `net::interface::InterfaceName`
/// is: non-empty, ASCII, no interior NUL, no characters outside
/// alphanumerics and `.-_`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceName(String);

impl InterfaceName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors which may occur when mapping a general `String` into an
/// [`InterfaceName`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IllegalInterfaceName {
    #[error("interface name must be at least one character")]
    Empty,
    #[error("interface name {0:?} contains interior null characters")]
    InteriorNull(String),
    #[error("interface name {0:?} is not ascii")]
    NotAscii(String),
    #[error("interface name {0:?} contains illegal characters (only alphanumeric ASCII and .-_ are permitted)")]
    IllegalCharacters(String),
}

impl FromStr for InterfaceName {
    type Err = IllegalInterfaceName;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        const LEGAL_PUNCT: [char; 3] = ['.', '-', '_'];
        if value.is_empty() {
            return Err(IllegalInterfaceName::Empty);
        }
        if value.contains('\0') {
            return Err(IllegalInterfaceName::InteriorNull(value.to_string()));
        }
        if !value.is_ascii() {
            return Err(IllegalInterfaceName::NotAscii(value.to_string()));
        }
        if !value.chars().all(|c| c.is_ascii_alphanumeric() || LEGAL_PUNCT.contains(&c)) {
            return Err(IllegalInterfaceName::IllegalCharacters(value.to_string()));
        }
        Ok(InterfaceName(value.to_string()))
    }
}

#[derive(Parser, Debug)]
#[command(name = "brilter")]
#[command(version = option_env!("VERSION").unwrap_or("dev"))]
#[command(about = "A user-space bridging packet filter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bridge `lan` and `wan`, filtering with either a built-in directional
    /// policy or BPF expressions.
    Run {
        /// LAN-side interface name.
        lan: InterfaceName,
        /// WAN-side interface name.
        wan: InterfaceName,
        /// BPF expression applied to traffic entering the LAN side.
        #[arg(short = 'I', long = "inbound-filter", value_name = "EXPR")]
        inbound_filter: Option<String>,
        /// BPF expression applied to traffic leaving to the WAN side.
        #[arg(short = 'O', long = "outbound-filter", value_name = "EXPR")]
        outbound_filter: Option<String>,
        /// Detach from the controlling terminal after startup.
        #[arg(short = 'd', long)]
        daemonize: bool,
    },
    /// Run a Lua script that wires up its own pipes.
    Script {
        /// Path to the script to run.
        path: PathBuf,
        /// Detach from the controlling terminal after startup.
        #[arg(short = 'd', long)]
        daemonize: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_interface_names() {
        assert_eq!(InterfaceName::from_str("eth0").unwrap().as_str(), "eth0");
        assert_eq!(InterfaceName::from_str("vale0-lan.1").unwrap().as_str(), "vale0-lan.1");
    }

    #[test]
    fn rejects_empty_name() {
        assert_eq!(InterfaceName::from_str(""), Err(IllegalInterfaceName::Empty));
    }

    #[test]
    fn rejects_non_ascii() {
        assert!(matches!(InterfaceName::from_str("ethé"), Err(IllegalInterfaceName::NotAscii(_))));
    }

    #[test]
    fn rejects_illegal_characters() {
        assert!(matches!(InterfaceName::from_str("eth0:lan"), Err(IllegalInterfaceName::IllegalCharacters(_))));
    }

    #[test]
    fn cli_parses_run_subcommand_with_filters() {
        let cli = Cli::parse_from(["brilter", "run", "-I", "icmp6", "-O", "tcp", "lan0", "wan0"]);
        match cli.command {
            Command::Run { lan, wan, inbound_filter, outbound_filter, daemonize } => {
                assert_eq!(lan.as_str(), "lan0");
                assert_eq!(wan.as_str(), "wan0");
                assert_eq!(inbound_filter.as_deref(), Some("icmp6"));
                assert_eq!(outbound_filter.as_deref(), Some("tcp"));
                assert!(!daemonize);
            }
            Command::Script { .. } => panic!("expected Run"),
        }
    }

    #[test]
    fn cli_parses_script_subcommand() {
        let cli = Cli::parse_from(["brilter", "script", "-d", "policy.lua"]);
        match cli.command {
            Command::Script { path, daemonize } => {
                assert_eq!(path, PathBuf::from("policy.lua"));
                assert!(daemonize);
            }
            Command::Run { .. } => panic!("expected Script"),
        }
    }
}
