/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint, value_parser};
use clap_complete::Shell;

const ARGS_CONFIG_FILE: &str = "config-file";
const ARGS_TEST_CONFIG: &str = "test-config";
const ARGS_VERBOSE: &str = "verbose";
const ARGS_COMPLETION: &str = "completion";

/// Process arguments of the collection daemon.
#[derive(Debug, Default)]
pub struct ProcArgs {
    pub config_file: PathBuf,
    /// Load config and plugins, then exit without collecting.
    pub test_config: bool,
    pub verbose_level: u8,
}

impl ProcArgs {
    fn from_matches(args: &ArgMatches) -> anyhow::Result<Self> {
        let config_file = args
            .get_one::<PathBuf>(ARGS_CONFIG_FILE)
            .ok_or_else(|| anyhow!("no config file given"))?;
        if !config_file.is_file() {
            return Err(anyhow!(
                "config file {} is not a regular file",
                config_file.display()
            ));
        }
        Ok(ProcArgs {
            config_file: config_file.clone(),
            test_config: args.get_flag(ARGS_TEST_CONFIG),
            verbose_level: args.get_count(ARGS_VERBOSE),
        })
    }
}

fn build_cli_args() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new(ARGS_CONFIG_FILE)
                .help("YAML file with the global, read and write sections")
                .num_args(1)
                .value_name("CONFIG FILE")
                .value_hint(ValueHint::FilePath)
                .value_parser(value_parser!(PathBuf))
                .required_unless_present(ARGS_COMPLETION)
                .short('c')
                .long(ARGS_CONFIG_FILE),
        )
        .arg(
            Arg::new(ARGS_TEST_CONFIG)
                .help("Check the config and plugin registrations, then exit")
                .action(ArgAction::SetTrue)
                .short('t')
                .long(ARGS_TEST_CONFIG),
        )
        .arg(
            Arg::new(ARGS_VERBOSE)
                .help("Raise the log level, repeat for more")
                .action(ArgAction::Count)
                .short('v')
                .long(ARGS_VERBOSE),
        )
        .arg(
            Arg::new(ARGS_COMPLETION)
                .help("Print the shell completion script")
                .num_args(1)
                .value_name("SHELL")
                .value_parser(value_parser!(Shell))
                .long(ARGS_COMPLETION)
                .exclusive(true),
        )
}

/// Parse the command line, `None` means there is nothing left to run.
pub fn parse_clap() -> anyhow::Result<Option<ProcArgs>> {
    let args = build_cli_args().get_matches();

    if let Some(shell) = args.get_one::<Shell>(ARGS_COMPLETION) {
        let mut cmd = build_cli_args();
        let bin_name = cmd.get_name().to_string();
        clap_complete::generate(*shell, &mut cmd, bin_name, &mut io::stdout());
        return Ok(None);
    }

    ProcArgs::from_matches(&args).map(Some)
}
