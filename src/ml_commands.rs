//! 学習・推論のコマンド（train / predict）

use anyhow::Result;
use burn::backend::Wgpu;
use burn_wgpu::WgpuDevice;
use clap::Parser;
use std::path::PathBuf;

use crate::dataset_commands::DatasetArgs;
use crate::ml::{train_model, InferenceEngine, TrainingOptions};
use crate::model::{print_metadata_info, AppConfig, DeviceType};

/// Fine-tunes the classifier on train_mini/ and test_mini/ (or train/ and test/)
#[derive(Parser, Debug)]
pub struct TrainCommand {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Number of epochs
    #[arg(long, value_name = "N")]
    pub epochs: Option<usize>,

    /// Batch size
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Learning rate
    #[arg(long, value_name = "LR")]
    pub learning_rate: Option<f64>,

    /// Input image size
    #[arg(long, value_name = "PIXELS")]
    pub image_size: Option<usize>,

    /// Train on the full train/ and test/ splits
    #[arg(long)]
    pub full: bool,

    /// Use the WGPU CPU adapter
    #[arg(long)]
    pub cpu: bool,

    /// Where to save the trained model
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Resume from a saved model (default: the best model of the dataset)
    #[arg(long, value_name = "FILE")]
    pub resume: Option<Option<PathBuf>>,
}

impl TrainCommand {
    pub fn execute(self, config: &AppConfig) -> Result<()> {
        let mut config = config.clone();
        if let Some(epochs) = self.epochs {
            config.training.num_epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.training.batch_size = batch_size;
        }
        if let Some(learning_rate) = self.learning_rate {
            config.training.learning_rate = learning_rate;
        }
        if let Some(image_size) = self.image_size {
            config.training.image_size = image_size;
        }
        if self.full {
            config.training.use_mini = false;
        }
        if self.cpu {
            config.device_type = DeviceType::Cpu;
        }
        if let Some(output) = &self.output {
            config.model.model_path = output.to_string_lossy().into_owned();
        }

        let layout = self.dataset.layout(&config);
        let mut options = TrainingOptions::from_config(&config, &layout);
        options.resume_from = match self.resume {
            Some(Some(path)) => Some(path),
            Some(None) => Some(layout.best_model()),
            None => None,
        };
        let summary = train_model(&options, |record| {
            log::debug!("epoch {} done (val_loss {:.4})", record.epoch, record.val_loss);
        })?;

        if let Some(best) = summary.best_epoch() {
            println!(
                "best epoch {}: val_loss {:.4}, val_accuracy {:.4}",
                best.epoch, best.val_loss, best.val_accuracy
            );
        }
        if let Some(path) = &summary.best_model_path {
            println!("best model: {}", path.display());
        }
        println!("model: {}", summary.model_path.display());
        Ok(())
    }
}

/// Classifies image files with a trained model
#[derive(Parser, Debug)]
pub struct PredictCommand {
    /// Model file (default: model path from the config)
    #[arg(short, long, value_name = "FILE")]
    pub model: Option<PathBuf>,

    /// Use the WGPU CPU adapter
    #[arg(long)]
    pub cpu: bool,

    /// Print the model metadata before predicting
    #[arg(long)]
    pub info: bool,

    /// Images to classify
    #[arg(required = true, value_name = "IMAGE")]
    pub images: Vec<PathBuf>,
}

impl PredictCommand {
    pub fn execute(self, config: &AppConfig) -> Result<()> {
        let model_path = self
            .model
            .unwrap_or_else(|| PathBuf::from(&config.model.model_path));
        let device = if self.cpu || config.device_type == DeviceType::Cpu {
            WgpuDevice::Cpu
        } else {
            WgpuDevice::DiscreteGpu(0)
        };
        let engine = InferenceEngine::<Wgpu>::load(&model_path, device)?;
        if self.info {
            print_metadata_info(engine.metadata());
        }

        let predictions = engine.classify_batch(&self.images)?;
        for (path, prediction) in self.images.iter().zip(predictions) {
            println!(
                "{}\t{}\t{:.2}%",
                path.display(),
                prediction.class_name,
                prediction.confidence * 100.0
            );
        }
        Ok(())
    }
}
