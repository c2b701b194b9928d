use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "vocab",
    version,
    about = "Terminal vocabulary trainer: import word lists, listen, and quiz yourself.",
    long_about = None
)]
pub struct Cli {
    /// Import the files and exit without starting the table view
    #[clap(long)]
    pub import_only: bool,

    /// List imported files
    #[clap(short = 'l', long)]
    pub list: bool,

    /// Print the words of an imported file as TSV
    #[clap(long, value_name = "NAME")]
    pub dump: Option<String>,

    /// Use a specific database file
    #[clap(long, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Use a specific configuration file
    #[clap(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Disable speech synthesis for this run
    #[clap(long)]
    pub no_tts: bool,

    /// Increase verbosity (-v, -vv)
    #[clap(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Enable debug output
    #[clap(long)]
    pub debug: bool,

    /// Word lists to import (word<TAB>translation[<TAB>ipa] per line)
    #[clap(name = "FILE")]
    pub files: Vec<PathBuf>,
}
