//! The `food101` command line tool.
//!
//! See `food101 --help` for usage.

use anyhow::Result;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

use food101_lib::config_commands::ConfigCommand;
use food101_lib::dataset_commands::{
    ClassesCommand, CountCommand, DownloadCommand, PickCommand, PrepareCommand, SubsetCommand,
};
#[cfg(feature = "ml")]
use food101_lib::ml_commands::{PredictCommand, TrainCommand};
use food101_lib::model::AppConfig;

/// Food-101 dataset preparation and image classifier fine-tuning
#[derive(Parser)]
#[command(
    name = "food101",
    version,
    after_help = "Typical run:\n\
                  \n  \
                  food101 download\n  \
                  food101 prepare\n  \
                  food101 subset -n 3\n  \
                  food101 train\n  \
                  food101 predict samosa.jpg\n"
)]
struct Food101 {
    /// Configuration file (default: food101.json)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log more (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    subcommand: Subcommand,
}

#[derive(Parser)]
enum Subcommand {
    /// Downloads and extracts the dataset archive
    Download(DownloadCommand),

    /// Lists the food classes
    Classes(ClassesCommand),

    /// Splits images/ into train/ and test/ following the manifests
    Prepare(PrepareCommand),

    /// Counts files and directories
    Count(CountCommand),

    /// Picks random food classes
    Pick(PickCommand),

    /// Builds train_mini/ and test_mini/ from a class subset
    Subset(SubsetCommand),

    /// Trains the classifier
    #[cfg(feature = "ml")]
    Train(TrainCommand),

    /// Classifies images with a trained model
    #[cfg(feature = "ml")]
    Predict(PredictCommand),

    /// Shows or creates the configuration file
    Config(ConfigCommand),
}

impl Food101 {
    /// Executes the command.
    pub fn execute(self) -> Result<()> {
        init_logger(self.verbose);

        let config_path = self.config.unwrap_or_else(AppConfig::default_path);
        let config = AppConfig::load_or_default_from(&config_path);

        match self.subcommand {
            Subcommand::Download(c) => c.execute(&config),
            Subcommand::Classes(c) => c.execute(&config),
            Subcommand::Prepare(c) => c.execute(&config),
            Subcommand::Count(c) => c.execute(&config),
            Subcommand::Pick(c) => c.execute(&config),
            Subcommand::Subset(c) => c.execute(&config),

            #[cfg(feature = "ml")]
            Subcommand::Train(c) => c.execute(&config),

            #[cfg(feature = "ml")]
            Subcommand::Predict(c) => c.execute(&config),

            Subcommand::Config(c) => c.execute(&config, &config_path),
        }
    }
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    // 依存クレート（wgpu など）は warn 以上のみ
    let filter = format!("warn,food101={level},food101_lib={level}");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp(None)
        .init();
}

fn main() -> Result<()> {
    Food101::parse().execute()
}

#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Food101::command().debug_assert()
}

#[cfg(feature = "ml")]
#[test]
fn parse_train_resume() {
    let resume = |args: &[&str]| match Food101::try_parse_from(args).unwrap().subcommand {
        Subcommand::Train(c) => c.resume,
        _ => unreachable!(),
    };
    assert_eq!(resume(&["food101", "train"]), None);
    assert_eq!(resume(&["food101", "train", "--resume"]), Some(None));
    assert_eq!(
        resume(&["food101", "train", "--resume", "ckpt.tar.gz"]),
        Some(Some(PathBuf::from("ckpt.tar.gz")))
    );
}
