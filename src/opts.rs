// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use structopt::clap::AppSettings;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "fspolicy", about = "Queries and policies over filesystem metadata.")]
pub struct Opts {
    #[structopt(long = "log-verbosity", name = "LEVEL", default_value = "warn",
                help = "Verbosity of logs (off, error, warn, info, debug, trace)")]
    pub log_verbosity: Verbosity,

    #[structopt(long = "log-file", name = "FILE",
                help = "File to write logs to, in addition to standard error")]
    pub log_file: Option<PathBuf>,

    #[structopt(long = "now", name = "TIMESTAMP",
                parse(try_from_str = humantime::parse_rfc3339_weak),
                help = "Reference instant of relative time predicates")]
    pub now: Option<SystemTime>,

    #[structopt(subcommand)]
    pub command: Command,
}

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Searches backends with a find expression.
    #[structopt(settings = &[AppSettings::TrailingVarArg, AppSettings::AllowLeadingHyphen])]
    Find {
        #[structopt(name = "ARG", allow_hyphen_values = true,
                    help = "Backend URIs followed by the expression")]
        args: Vec<String>,
    },
    /// Runs a policy over the entries of an index.
    Run {
        #[structopt(long = "policy", name = "FILE", help = "Policy file (YAML)")]
        policy: PathBuf,

        #[structopt(long = "index", name = "INDEX",
                    help = "URI of the backend listing the entries")]
        index: String,

        #[structopt(long = "live", name = "LIVE",
                    help = "URI of the backend to act on (defaults to the index)")]
        live: Option<String>,

        #[structopt(long = "dry-run", help = "Log actions instead of applying them")]
        dry_run: bool,

        #[structopt(long = "skip-error", help = "Skip unreadable index entries")]
        skip_error: bool,

        #[structopt(long = "limit", name = "COUNT",
                    help = "Maximum number of entries to process")]
        limit: Option<usize>,
    },
}

/// A newtype wrapper over the log level, parsed from its lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verbosity {
    level: log::LevelFilter,
}

impl Verbosity {

    pub fn level(&self) -> log::LevelFilter {
        self.level
    }
}

impl std::str::FromStr for Verbosity {
    type Err = String;

    fn from_str(string: &str) -> Result<Verbosity, String> {
        let level = match string {
            "off" => log::LevelFilter::Off,
            "error" => log::LevelFilter::Error,
            "warn" => log::LevelFilter::Warn,
            "info" => log::LevelFilter::Info,
            "debug" => log::LevelFilter::Debug,
            "trace" => log::LevelFilter::Trace,
            _ => return Err(format!("invalid verbosity level: {}", string)),
        };

        Ok(Verbosity { level })
    }
}

impl Opts {

    /// The reference instant, in seconds since epoch, for relative time
    /// predicates: `--now` if given, the current time otherwise.
    pub fn now(&self) -> i64 {
        let now = self.now.unwrap_or_else(SystemTime::now);
        match now.duration_since(UNIX_EPOCH) {
            Ok(duration) => duration.as_secs() as i64,
            Err(error) => -(error.duration().as_secs() as i64),
        }
    }
}

/// Parses command-line arguments of the current process.
pub fn from_args() -> Opts {
    Opts::from_args()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity() {
        assert_eq!("debug".parse::<Verbosity>().unwrap().level(),
                   log::LevelFilter::Debug);
        assert!("loud".parse::<Verbosity>().is_err());
    }

    #[test]
    fn test_find_keeps_expression() {
        let opts = Opts::from_iter_safe(&[
            "fspolicy", "--now", "2020-01-01T00:00:00Z",
            "find", "/tmp", "-name", "*.tmp", "-o", "(", "-size", "+1k", ")",
        ]).unwrap();

        assert_eq!(opts.now(), 1_577_836_800);
        match opts.command {
            Command::Find { args } => assert_eq!(args, vec![
                "/tmp", "-name", "*.tmp", "-o", "(", "-size", "+1k", ")",
            ]),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_find_expression_first() {
        let opts = Opts::from_iter_safe(&["fspolicy", "find", "-name", "x"])
            .unwrap();
        match opts.command {
            Command::Find { args } => assert_eq!(args, vec!["-name", "x"]),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_run() {
        let opts = Opts::from_iter_safe(&[
            "fspolicy", "run", "--policy", "p.yaml",
            "--index", "rbh:snapshot:i.jsonl", "--dry-run",
        ]).unwrap();

        match opts.command {
            Command::Run { policy, index, live, dry_run, .. } => {
                assert_eq!(policy, PathBuf::from("p.yaml"));
                assert_eq!(index, "rbh:snapshot:i.jsonl");
                assert!(live.is_none());
                assert!(dry_run);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
