//! モデル学習
//!
//! train/valid のクラス別フォルダから学習し、エポックごとに履歴を記録します。
//! 検証損失が改善したエポックのモデルをベストモデルとして保存します。

use anyhow::{Context, Result};
use burn::{
    backend::{Autodiff, Wgpu},
    data::dataloader::DataLoaderBuilder,
    module::{AutodiffModule, Module},
    optim::{momentum::MomentumConfig, GradientsParams, Optimizer, SgdConfig},
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion, Int, Tensor},
    train::ClassificationOutput,
};
use burn_wgpu::WgpuDevice;
use std::path::{Path, PathBuf};

use crate::dataset::DatasetLayout;
use crate::history::{EpochRecord, HistoryLogger};
use crate::ml::augmentation::AugmentationConfig;
use crate::ml::data::{FoodBatcher, FoodDataset};
use crate::ml::ml_model::{FoodClassifier, ModelConfig};
use crate::model::{
    load_model_with_metadata, save_model_with_metadata, AppConfig, DeviceType, ModelMetadata,
};

/// 学習の入力と出力先
#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub train_dir: PathBuf,
    pub valid_dir: PathBuf,
    /// 学習完了後のモデル
    pub model_path: PathBuf,
    /// 検証損失が最小のモデル
    pub best_model_path: PathBuf,
    /// エポックごとのCSVログ
    pub history_path: PathBuf,
    pub num_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub momentum: f64,
    pub image_size: usize,
    pub dropout: f64,
    pub seed: u64,
    pub device_type: DeviceType,
    pub augmentation: AugmentationConfig,
    /// 指定時はこのモデルの重みから学習を再開
    pub resume_from: Option<PathBuf>,
}

impl TrainingOptions {
    /// 設定ファイルとデータセット配置から組み立てる
    pub fn from_config(config: &AppConfig, layout: &DatasetLayout) -> Self {
        let training = &config.training;
        let (train_dir, valid_dir) = if training.use_mini {
            (layout.train_mini_dir(), layout.test_mini_dir())
        } else {
            (layout.train_dir(), layout.test_dir())
        };

        Self {
            train_dir,
            valid_dir,
            model_path: PathBuf::from(&config.model.model_path),
            best_model_path: layout.best_model(),
            history_path: layout.history_log(),
            num_epochs: training.num_epochs,
            batch_size: training.batch_size,
            learning_rate: training.learning_rate,
            momentum: training.momentum,
            image_size: training.image_size,
            dropout: config.model.dropout,
            seed: training.seed,
            device_type: config.device_type,
            augmentation: AugmentationConfig::default(),
            resume_from: None,
        }
    }
}

/// 学習結果
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub history: Vec<EpochRecord>,
    pub model_path: PathBuf,
    /// 一度も保存されなかった場合は None
    pub best_model_path: Option<PathBuf>,
}

impl TrainingSummary {
    pub fn best_epoch(&self) -> Option<&EpochRecord> {
        self.history
            .iter()
            .min_by(|a, b| a.val_loss.total_cmp(&b.val_loss))
    }
}

/// エポック内の損失と正解数の集計
#[derive(Debug, Default, Clone, Copy)]
struct EpochMetrics {
    loss_sum: f64,
    correct: usize,
    samples: usize,
}

impl EpochMetrics {
    fn add<B: Backend>(&mut self, output: &ClassificationOutput<B>) {
        let n = output.targets.dims()[0];
        let loss = output.loss.clone().into_scalar().elem::<f64>();
        self.loss_sum += loss * n as f64;
        self.correct += count_correct(output.output.clone(), output.targets.clone());
        self.samples += n;
    }

    fn loss(&self) -> f64 {
        if self.samples == 0 {
            return f64::NAN;
        }
        self.loss_sum / self.samples as f64
    }

    fn accuracy(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.correct as f64 / self.samples as f64
    }
}

/// argmax がラベルと一致した数
fn count_correct<B: Backend>(output: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predictions = output.argmax(1).flatten::<1>(0, 1);
    predictions
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

/// モデルの重みをバイト列に変換
pub fn model_to_bytes<B: Backend>(model: &FoodClassifier<B>) -> Result<Vec<u8>> {
    BinBytesRecorder::<FullPrecisionSettings>::default()
        .record(model.clone().into_record(), ())
        .map_err(|e| anyhow::anyhow!("モデル重みの書き出しエラー: {:?}", e))
}

/// バイト列の重みをモデルに読み込む
pub fn load_model_bytes<B: Backend>(
    model: FoodClassifier<B>,
    model_binary: Vec<u8>,
    device: &B::Device,
) -> Result<FoodClassifier<B>> {
    let record = BinBytesRecorder::<FullPrecisionSettings>::default()
        .load(model_binary, device)
        .map_err(|e| anyhow::anyhow!("モデル重みの読み込みエラー: {:?}", e))?;
    Ok(model.load_record(record))
}

/// 保存済みモデルの重みを読み込む（クラス構成が一致する場合のみ）
fn resume_model<B: Backend>(
    model: FoodClassifier<B>,
    path: &Path,
    class_names: &[String],
    device: &B::Device,
) -> Result<FoodClassifier<B>> {
    let (metadata, model_binary) = load_model_with_metadata(path)
        .with_context(|| format!("再開用モデルの読み込みに失敗: {}", path.display()))?;
    if metadata.class_names != class_names {
        anyhow::bail!(
            "再開用モデルのクラスが学習データと一致しません: [{}] / [{}]",
            metadata.class_names.join(", "),
            class_names.join(", ")
        );
    }
    log::info!(
        "{} から学習を再開します (学習済みエポック数: {})",
        path.display(),
        metadata.num_epochs
    );
    load_model_bytes(model, model_binary, device)
}

/// 設定に応じたデバイスでモデル学習を実行
pub fn train_model<F>(options: &TrainingOptions, progress: F) -> Result<TrainingSummary>
where
    F: FnMut(&EpochRecord),
{
    let device = match options.device_type {
        DeviceType::Wgpu => WgpuDevice::DiscreteGpu(0),
        DeviceType::Cpu => WgpuDevice::Cpu,
    };
    log::info!("使用デバイス: {} ({:?})", options.device_type, device);

    fit::<Autodiff<Wgpu>, F>(options, device, progress)
}

/// 学習ループ本体
pub fn fit<B, F>(options: &TrainingOptions, device: B::Device, mut progress: F) -> Result<TrainingSummary>
where
    B: AutodiffBackend,
    F: FnMut(&EpochRecord),
{
    if options.num_epochs == 0 {
        anyhow::bail!("エポック数は1以上を指定してください");
    }
    if options.batch_size == 0 {
        anyhow::bail!("バッチサイズは1以上を指定してください");
    }

    log::info!("学習データ: {}", options.train_dir.display());
    let train_dataset = FoodDataset::from_directory(&options.train_dir)
        .with_context(|| format!("学習データの読み込みに失敗: {}", options.train_dir.display()))?;
    log::info!("検証データ: {}", options.valid_dir.display());
    let valid_dataset = FoodDataset::from_directory(&options.valid_dir)
        .with_context(|| format!("検証データの読み込みに失敗: {}", options.valid_dir.display()))?;

    if train_dataset.class_names() != valid_dataset.class_names() {
        anyhow::bail!(
            "学習データと検証データのクラスが一致しません: [{}] / [{}]",
            train_dataset.class_names().join(", "),
            valid_dataset.class_names().join(", ")
        );
    }
    let class_names = train_dataset.class_names().to_vec();

    let model_config = ModelConfig::new(class_names.len())
        .with_dropout(options.dropout)
        .with_image_size(options.image_size);
    let mut model: FoodClassifier<B> = model_config.init(&device);
    if let Some(path) = &options.resume_from {
        model = resume_model(model, path, &class_names, &device)?;
    }

    let batcher_train =
        FoodBatcher::<B>::train(device.clone(), options.image_size, options.augmentation.clone());
    let batcher_valid = FoodBatcher::<B::InnerBackend>::eval(device.clone(), options.image_size);

    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(options.batch_size)
        .shuffle(options.seed)
        .num_workers(0)
        .build(train_dataset);
    let dataloader_valid = DataLoaderBuilder::new(batcher_valid)
        .batch_size(options.batch_size)
        .num_workers(0)
        .build(valid_dataset);

    let momentum = MomentumConfig::new()
        .with_momentum(options.momentum)
        .with_dampening(0.0);
    let mut optim = SgdConfig::new().with_momentum(Some(momentum)).init();

    let mut logger = HistoryLogger::create(&options.history_path)?;
    let mut history = Vec::with_capacity(options.num_epochs);
    let mut best_val_loss = f64::INFINITY;
    let mut best_model_path = None;

    log::info!(
        "学習を開始します (エポック数: {}, バッチサイズ: {}, 学習率: {}, モーメンタム: {})",
        options.num_epochs,
        options.batch_size,
        options.learning_rate,
        options.momentum
    );

    for epoch in 1..=options.num_epochs {
        let mut train_metrics = EpochMetrics::default();
        for batch in dataloader_train.iter() {
            let output = model.forward_classification(batch.images, batch.targets);
            train_metrics.add(&output);

            let grads = output.loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(options.learning_rate, model, grads);
        }

        let model_valid = model.valid();
        let mut valid_metrics = EpochMetrics::default();
        for batch in dataloader_valid.iter() {
            let output = model_valid.forward_classification(batch.images, batch.targets);
            valid_metrics.add(&output);
        }

        let record = EpochRecord {
            epoch,
            accuracy: train_metrics.accuracy(),
            loss: train_metrics.loss(),
            val_accuracy: valid_metrics.accuracy(),
            val_loss: valid_metrics.loss(),
        };
        log::info!(
            "Epoch {}/{} - loss: {:.4} - accuracy: {:.4} - val_loss: {:.4} - val_accuracy: {:.4}",
            epoch,
            options.num_epochs,
            record.loss,
            record.accuracy,
            record.val_loss,
            record.val_accuracy
        );
        logger.log_epoch(&record)?;

        if record.val_loss < best_val_loss {
            log::info!(
                "val_loss improved from {:.5} to {:.5}, saving model to {}",
                best_val_loss,
                record.val_loss,
                options.best_model_path.display()
            );
            best_val_loss = record.val_loss;
            let metadata = ModelMetadata::new(
                class_names.clone(),
                options.image_size as u32,
                epoch as u32,
            )
            .with_validation(record.val_loss, record.val_accuracy);
            let path = save_model(&options.best_model_path, &metadata, &model_valid)?;
            best_model_path = Some(path);
        }

        progress(&record);
        history.push(record);
    }

    let mut metadata = ModelMetadata::new(class_names, options.image_size as u32, options.num_epochs as u32);
    if best_val_loss.is_finite() {
        let best_accuracy = history
            .iter()
            .find(|r| r.val_loss == best_val_loss)
            .map(|r| r.val_accuracy)
            .unwrap_or_default();
        metadata = metadata.with_validation(best_val_loss, best_accuracy);
    }
    let model_path = save_model(&options.model_path, &metadata, &model.valid())?;
    log::info!("学習完了: {} に保存しました", model_path.display());

    Ok(TrainingSummary {
        history,
        model_path,
        best_model_path,
    })
}

fn save_model<B: Backend>(
    path: &Path,
    metadata: &ModelMetadata,
    model: &FoodClassifier<B>,
) -> Result<PathBuf> {
    let model_binary = model_to_bytes(model)?;
    log::debug!(
        "モデルバイナリサイズ: {} バイト ({:.2} MB)",
        model_binary.len(),
        model_binary.len() as f64 / 1024.0 / 1024.0
    );
    save_model_with_metadata(path, metadata, &model_binary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use image::{Rgb, RgbImage};

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = burn_autodiff::Autodiff<TestBackend>;

    fn write_class(dir: &Path, class: &str, value: u8, count: usize) {
        let class_dir = dir.join(class);
        std::fs::create_dir_all(&class_dir).unwrap();
        for i in 0..count {
            RgbImage::from_pixel(12, 12, Rgb([value, value / 2, 255 - value]))
                .save(class_dir.join(format!("{}.png", i)))
                .unwrap();
        }
    }

    fn options(root: &Path, num_epochs: usize) -> TrainingOptions {
        TrainingOptions {
            train_dir: root.join("train_mini"),
            valid_dir: root.join("test_mini"),
            model_path: root.join("model_trained.tar.gz"),
            best_model_path: root.join("best_model.tar.gz"),
            history_path: root.join("history.log"),
            num_epochs,
            batch_size: 2,
            learning_rate: 1e-3,
            momentum: 0.9,
            image_size: 8,
            dropout: 0.2,
            seed: 7,
            device_type: DeviceType::Cpu,
            augmentation: AugmentationConfig::default(),
            resume_from: None,
        }
    }

    fn write_splits(root: &Path) {
        for split in ["train_mini", "test_mini"] {
            write_class(&root.join(split), "omelette", 220, 3);
            write_class(&root.join(split), "samosa", 30, 2);
        }
    }

    /// 保存されたモデルを読み込んで、全1入力に対する出力を返す
    fn saved_model_output(path: &Path) -> Vec<f32> {
        let device = NdArrayDevice::Cpu;
        let (metadata, binary) = load_model_with_metadata(path).unwrap();
        let model = ModelConfig::new(metadata.num_classes())
            .with_image_size(8)
            .init::<TestBackend>(&device);
        let model = load_model_bytes(model, binary, &device).unwrap();
        model_output(&model)
    }

    fn model_output(model: &FoodClassifier<TestBackend>) -> Vec<f32> {
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 8, 8], &NdArrayDevice::Cpu);
        model.forward(input).into_data().to_vec().unwrap()
    }

    fn outputs_match(a: &[f32], b: &[f32]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn test_count_correct() {
        let device = NdArrayDevice::Cpu;
        let output = Tensor::<TestBackend, 2>::from_floats(
            [[0.9, 0.1], [0.2, 0.8], [0.7, 0.3]],
            &device,
        );
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([0, 1, 1], &device);
        assert_eq!(count_correct(output, targets), 2);
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = EpochMetrics::default();
        assert!(metrics.loss().is_nan());
        assert_eq!(metrics.accuracy(), 0.0);
    }

    #[test]
    fn test_fit_writes_history_and_models() {
        let dir = tempfile::tempdir().unwrap();
        write_splits(dir.path());
        let options = options(dir.path(), 2);

        let mut seen = Vec::new();
        let summary = fit::<TestAutodiffBackend, _>(&options, NdArrayDevice::Cpu, |record| {
            seen.push(record.epoch)
        })
        .unwrap();

        assert_eq!(seen, vec![1, 2]);
        assert_eq!(summary.history.len(), 2);
        assert!(summary.history.iter().all(|r| r.loss.is_finite() && r.val_loss.is_finite()));
        assert!(summary.history.iter().all(|r| (0.0..=1.0).contains(&r.val_accuracy)));

        let logged = crate::history::read_history(&options.history_path).unwrap();
        assert_eq!(logged, summary.history);

        assert_eq!(summary.best_model_path.as_deref(), Some(options.best_model_path.as_path()));
        let (metadata, binary) = load_model_with_metadata(&summary.model_path).unwrap();
        assert_eq!(metadata.class_names, vec!["omelette".to_string(), "samosa".to_string()]);
        assert_eq!(metadata.image_size, 8);
        assert_eq!(metadata.num_epochs, 2);
        assert_eq!(
            metadata.best_val_loss,
            summary.best_epoch().map(|r| r.val_loss)
        );
        assert!(!binary.is_empty());
    }

    #[test]
    fn test_fit_rejects_mismatched_classes() {
        let dir = tempfile::tempdir().unwrap();
        write_class(&dir.path().join("train_mini"), "omelette", 220, 1);
        write_class(&dir.path().join("train_mini"), "samosa", 30, 1);
        write_class(&dir.path().join("test_mini"), "omelette", 220, 1);
        write_class(&dir.path().join("test_mini"), "pizza", 90, 1);

        let result = fit::<TestAutodiffBackend, _>(&options(dir.path(), 1), NdArrayDevice::Cpu, |_| {});
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("クラスが一致しません"));
        assert!(!dir.path().join("model_trained.tar.gz").exists());
    }

    #[test]
    fn test_resume_starts_from_saved_weights() {
        let dir = tempfile::tempdir().unwrap();
        write_splits(dir.path());
        let device = NdArrayDevice::Cpu;

        let saved = ModelConfig::new(2)
            .with_image_size(8)
            .init::<TestBackend>(&device);
        let checkpoint = save_model_with_metadata(
            &dir.path().join("checkpoint.tar.gz"),
            &ModelMetadata::new(vec!["omelette".into(), "samosa".into()], 8, 3),
            &model_to_bytes(&saved).unwrap(),
        )
        .unwrap();

        // 学習率 0 なら重みは変わらない
        let mut resumed = options(dir.path(), 1);
        resumed.learning_rate = 0.0;
        resumed.resume_from = Some(checkpoint);
        let summary = fit::<TestAutodiffBackend, _>(&resumed, NdArrayDevice::Cpu, |_| {}).unwrap();
        assert!(outputs_match(
            &saved_model_output(&summary.model_path),
            &model_output(&saved)
        ));

        let mut fresh = options(dir.path(), 1);
        fresh.learning_rate = 0.0;
        fresh.model_path = dir.path().join("fresh.tar.gz");
        let summary = fit::<TestAutodiffBackend, _>(&fresh, NdArrayDevice::Cpu, |_| {}).unwrap();
        assert!(!outputs_match(
            &saved_model_output(&summary.model_path),
            &model_output(&saved)
        ));
    }

    #[test]
    fn test_resume_rejects_other_classes() {
        let dir = tempfile::tempdir().unwrap();
        write_splits(dir.path());
        let device = NdArrayDevice::Cpu;

        let saved = ModelConfig::new(2)
            .with_image_size(8)
            .init::<TestBackend>(&device);
        let checkpoint = save_model_with_metadata(
            &dir.path().join("checkpoint.tar.gz"),
            &ModelMetadata::new(vec!["pizza".into(), "samosa".into()], 8, 1),
            &model_to_bytes(&saved).unwrap(),
        )
        .unwrap();

        let mut resumed = options(dir.path(), 1);
        resumed.resume_from = Some(checkpoint);
        let err = fit::<TestAutodiffBackend, _>(&resumed, NdArrayDevice::Cpu, |_| {}).unwrap_err();
        assert!(format!("{:#}", err).contains("pizza"));
        assert!(!dir.path().join("model_trained.tar.gz").exists());
    }
}
