//! Command-line parsing for the `perfgov` binary.

use std::path::PathBuf;

use perfgov_core::{GovernorError, GovernorResult, OperationMode};

use crate::tracing_setup::Verbosity;

pub const DEFAULT_CONFIG_PATH: &str = "perfgov.toml";

pub const USAGE: &str = "\
usage: perfgov [run|check-config|help|version] [options]

commands:
  run             start the governor and a demo tick loop (default)
  check-config    load and validate configuration, print it as JSON

options:
  --config PATH   configuration file (default: perfgov.toml)
  --manual MODE   pin full|lite|basic|emergency at startup
  -v, --verbose   debug-level governor logs
  -q, --quiet     errors only
  --no-color      disable ANSI colors
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliCommand {
    Run,
    CheckConfig,
    Help,
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliInput {
    pub command: CliCommand,
    pub config_path: PathBuf,
    pub manual: Option<OperationMode>,
    pub verbose: bool,
    pub quiet: bool,
    pub no_color: bool,
}

impl Default for CliInput {
    fn default() -> Self {
        Self {
            command: CliCommand::Run,
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            manual: None,
            verbose: false,
            quiet: false,
            no_color: false,
        }
    }
}

impl CliInput {
    #[must_use]
    pub const fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }
}

/// Parse arguments (without the program name).
///
/// # Errors
///
/// Returns [`GovernorError::InvalidConfig`] for unknown flags or missing
/// values, and [`GovernorError::UnknownMode`] for a bad `--manual` value.
pub fn parse_cli_args<I, S>(args: I) -> GovernorResult<CliInput>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let tokens: Vec<String> = args.into_iter().map(Into::into).collect();
    let mut input = CliInput::default();
    let mut idx = 0;

    if let Some(first) = tokens.first()
        && !first.starts_with('-')
    {
        input.command = match first.as_str() {
            "run" => CliCommand::Run,
            "check-config" => CliCommand::CheckConfig,
            "help" => CliCommand::Help,
            "version" => CliCommand::Version,
            other => {
                return Err(GovernorError::invalid_config(
                    "command",
                    other,
                    "expected run|check-config|help|version",
                ));
            }
        };
        idx = 1;
    }

    while idx < tokens.len() {
        let flag = tokens[idx].as_str();
        match flag {
            "--config" => {
                input.config_path = PathBuf::from(expect_value(&tokens, idx, flag)?);
                idx += 2;
            }
            "--manual" => {
                input.manual = Some(expect_value(&tokens, idx, flag)?.parse()?);
                idx += 2;
            }
            "-v" | "--verbose" => {
                input.verbose = true;
                idx += 1;
            }
            "-q" | "--quiet" => {
                input.quiet = true;
                idx += 1;
            }
            "--no-color" => {
                input.no_color = true;
                idx += 1;
            }
            "-h" | "--help" => {
                input.command = CliCommand::Help;
                idx += 1;
            }
            "-V" | "--version" => {
                input.command = CliCommand::Version;
                idx += 1;
            }
            other => {
                return Err(GovernorError::invalid_config(
                    "cli",
                    other,
                    "unknown flag; see `perfgov help`",
                ));
            }
        }
    }
    Ok(input)
}

fn expect_value<'a>(tokens: &'a [String], idx: usize, flag: &str) -> GovernorResult<&'a str> {
    tokens
        .get(idx + 1)
        .map(String::as_str)
        .filter(|value| !value.starts_with('-'))
        .ok_or_else(|| GovernorError::invalid_config("cli", flag, "flag requires a value"))
}
