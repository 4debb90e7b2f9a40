//! データセット操作のコマンド（download / classes / prepare / count / pick / subset）

use anyhow::Result;
use clap::{Args, Parser, ValueEnum};
use std::path::PathBuf;

use crate::dataset::{
    check_classes_exist, count_entries, create_subset, fetch_dataset, make_rng, pick_n_random_classes, prepare_data,
    DatasetLayout, PrepareReport,
};
use crate::model::AppConfig;

/// データセットのルート指定（省略時は設定ファイルの値）
#[derive(Args, Debug, Clone, Default)]
pub struct DatasetArgs {
    /// Dataset root containing images/ and meta/
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,
}

impl DatasetArgs {
    pub fn layout(&self, config: &AppConfig) -> DatasetLayout {
        match &self.root {
            Some(root) => DatasetLayout::new(root),
            None => DatasetLayout::new(&config.dataset.root),
        }
    }
}

/// Downloads and extracts the Food-101 archive
#[derive(Parser, Debug)]
pub struct DownloadCommand {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Archive URL
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Skip the MD5 check of the archive
    #[arg(long)]
    pub no_verify: bool,
}

impl DownloadCommand {
    pub fn execute(self, config: &AppConfig) -> Result<()> {
        let layout = self.dataset.layout(config);
        let mut settings = config.dataset.clone();
        if let Some(url) = self.url {
            settings.url = url;
        }
        if self.no_verify {
            settings.md5 = None;
        }

        fetch_dataset(&settings, &layout)?;
        println!("{}", layout.root().display());
        Ok(())
    }
}

/// Lists the food classes found under images/
#[derive(Parser, Debug)]
pub struct ClassesCommand {
    #[command(flatten)]
    pub dataset: DatasetArgs,
}

impl ClassesCommand {
    pub fn execute(self, config: &AppConfig) -> Result<()> {
        let classes = self.dataset.layout(config).list_classes()?;
        for class_name in &classes {
            println!("{}", class_name);
        }
        log::info!("{} classes", classes.len());
        Ok(())
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
    All,
}

/// Copies images into train/ and test/ following meta/train.txt and meta/test.txt
#[derive(Parser, Debug)]
pub struct PrepareCommand {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Which split to prepare
    #[arg(long, value_enum, default_value = "all")]
    pub split: Split,
}

impl PrepareCommand {
    pub fn execute(self, config: &AppConfig) -> Result<()> {
        let layout = self.dataset.layout(config);

        if matches!(self.split, Split::Train | Split::All) {
            log::info!("Creating train data...");
            let report = prepare_data(&layout.train_manifest(), &layout.images_dir(), &layout.train_dir())?;
            print_report("train", &report);
        }
        if matches!(self.split, Split::Test | Split::All) {
            log::info!("Creating test data...");
            let report = prepare_data(&layout.test_manifest(), &layout.images_dir(), &layout.test_dir())?;
            print_report("test", &report);
        }
        Ok(())
    }
}

fn print_report(split: &str, report: &PrepareReport) {
    println!(
        "{}: {} classes, {} copied, {} already present, {} classes complete",
        split, report.classes, report.copied, report.already_present, report.complete_classes
    );
}

/// Counts files and directories (like `find DIR -type d -or -type f | wc -l`)
#[derive(Parser, Debug)]
pub struct CountCommand {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Directories to count (default: train/ and test/)
    #[arg(value_name = "DIR")]
    pub dirs: Vec<PathBuf>,
}

impl CountCommand {
    pub fn execute(self, config: &AppConfig) -> Result<()> {
        let dirs = if self.dirs.is_empty() {
            let layout = self.dataset.layout(config);
            vec![layout.train_dir(), layout.test_dir()]
        } else {
            self.dirs
        };

        for dir in dirs {
            println!("{}\t{}", count_entries(&dir)?, dir.display());
        }
        Ok(())
    }
}

/// 抽出するクラス数とシード（省略時は設定ファイルの値）
#[derive(Args, Debug, Clone, Default)]
pub struct PickArgs {
    /// Number of classes to pick
    #[arg(short = 'n', long, value_name = "N")]
    pub num_classes: Option<usize>,

    /// Seed for a reproducible pick
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,
}

impl PickArgs {
    fn pick(&self, config: &AppConfig, classes: &[String]) -> Result<Vec<String>> {
        let n = self.num_classes.unwrap_or(config.subset.num_classes);
        let mut rng = make_rng(self.seed.or(config.subset.seed));
        pick_n_random_classes(classes, n, &mut rng)
    }
}

/// Picks N random food classes
#[derive(Parser, Debug)]
pub struct PickCommand {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    #[command(flatten)]
    pub pick: PickArgs,
}

impl PickCommand {
    pub fn execute(self, config: &AppConfig) -> Result<()> {
        let classes = self.dataset.layout(config).list_classes()?;
        for class_name in self.pick.pick(config, &classes)? {
            println!("{}", class_name);
        }
        Ok(())
    }
}

/// Copies a class subset of train/ and test/ into train_mini/ and test_mini/
#[derive(Parser, Debug)]
pub struct SubsetCommand {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    #[command(flatten)]
    pub pick: PickArgs,

    /// Use these classes instead of a random pick
    #[arg(long, value_delimiter = ',', value_name = "CLASS,...")]
    pub classes: Vec<String>,
}

impl SubsetCommand {
    pub fn execute(self, config: &AppConfig) -> Result<()> {
        let layout = self.dataset.layout(config);
        let classes = if self.classes.is_empty() {
            self.pick.pick(config, &layout.list_classes()?)?
        } else {
            let mut classes = self.classes;
            classes.sort();
            classes.dedup();
            classes
        };

        // train/ と test/ の両方にクラスが揃っていること
        check_classes_exist(&classes, &layout.train_dir())?;
        check_classes_exist(&classes, &layout.test_dir())?;

        log::info!("Creating train data subset...");
        let train = create_subset(&classes, &layout.train_dir(), &layout.train_mini_dir())?;
        log::info!("Creating test data subset...");
        let test = create_subset(&classes, &layout.test_dir(), &layout.test_mini_dir())?;

        println!(
            "{}: {} train / {} test images",
            classes.join(", "),
            train,
            test
        );
        Ok(())
    }
}
