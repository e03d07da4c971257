use clap::Parser;

use crate::launcher::CONF_FILENAME;

const CMD_NAME: &str = "sciath";
const DEFAULT_OUTPUT: &str = ".";

/// Stores our command-line args format.
#[derive(Parser, Debug, Default)]
#[command(name = CMD_NAME, version, about = None, long_about = None)]
pub struct Args {
    /// Suite file defining the tests
    #[arg(value_name = "INPUT_FILE")]
    pub input_file: Option<String>,

    /// Directory under which each test writes its output
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_OUTPUT)]
    #[arg(env = "SCIATH_OUTPUT")]
    pub output: String,

    /// Launcher configuration file
    #[arg(short = 'w', long, value_name = "FILE", default_value = CONF_FILENAME)]
    #[arg(env = "SCIATH_CONF")]
    pub conf_file: String,

    /// Write a launcher configuration file from the queue flags, then exit
    #[arg(short, long)]
    pub configure: bool,

    /// Write the default (local) launcher configuration file, then exit
    #[arg(short = 'd', long)]
    pub configure_default: bool,

    /// Queuing system for --configure: none, pbs, slurm or lsf
    #[arg(long, value_name = "TYPE", requires = "configure")]
    pub queue_type: Option<String>,

    /// MPI launch command for --configure, e.g. 'mpiexec -n <ranks>'
    #[arg(long, value_name = "CMD", requires = "configure")]
    pub mpi_launch: Option<String>,

    /// Account to charge, for --configure
    #[arg(long, value_name = "NAME", requires = "configure")]
    pub account: Option<String>,

    /// Queue (partition) name, for --configure
    #[arg(long, value_name = "NAME", requires = "configure")]
    pub queue: Option<String>,

    /// SLURM hardware constraint, for --configure
    #[arg(long, value_name = "NAME", requires = "configure")]
    pub constraint: Option<String>,

    /// Comma-separated list of test names
    #[arg(short = 't', long, value_name = "A,B")]
    pub test_subset: Option<String>,

    /// Comma-separated list of test groups; tests in none of them are excluded
    #[arg(short, long, value_name = "G1,G2")]
    pub groups: Option<String>,

    /// Comma-separated list of test groups; tests in any of them are excluded
    #[arg(short = 'x', long, value_name = "G1,G2")]
    pub exclude_groups: Option<String>,

    /// Delete generated output
    #[arg(short, long)]
    pub purge_output: bool,

    /// Exit with code 1 if any test failed
    #[arg(short = 'f', long)]
    pub error_on_test_failure: bool,

    /// List all registered tests and exit
    #[arg(short, long)]
    pub list: bool,

    /// Verify existing output without executing
    #[arg(short = 'v', long, conflicts_with = "execute")]
    pub verify: bool,

    /// Execute without verifying
    #[arg(short, long)]
    pub execute: bool,

    /// Overwrite expected files with current output, where supported
    #[arg(short, long)]
    pub update_expected: bool,

    /// Bypass user confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Print a TAP report instead of the summary
    #[arg(long)]
    pub tap: bool,

    /// Deactivate colored output
    #[arg(long)]
    pub no_colors: bool,

    /// Print additional debugging info; repeat for more
    #[arg(long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
