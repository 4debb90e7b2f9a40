//! クラス別フォルダからの学習データ読み込み
//!
//! `<dir>/<class>/<image>` の構成を読み、ソートしたクラス名の順にラベルを割り当てます。

use anyhow::Result;
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::{backend::Backend, Int, Tensor},
};
use std::path::{Path, PathBuf};

use crate::dataset::list_subdirectories;
use crate::ml::augmentation::{AugmentationConfig, ImageAugmenter};
use crate::ml::ml_model::{load_rgb_image, rescale_to_chw};

/// 画像として扱う拡張子
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// 学習データセット（パスのリストのみ保持）
#[derive(Debug, Clone)]
pub struct FoodDataset {
    samples: Vec<FoodItem>,
    class_names: Vec<String>,
}

impl FoodDataset {
    /// ディレクトリから読み込む
    pub fn from_directory(data_dir: &Path) -> Result<Self> {
        let class_names = list_subdirectories(data_dir)?;
        if class_names.is_empty() {
            anyhow::bail!("クラスフォルダがありません: {}", data_dir.display());
        }

        let mut samples = Vec::new();
        for (label, class_name) in class_names.iter().enumerate() {
            let mut paths: Vec<PathBuf> = std::fs::read_dir(data_dir.join(class_name))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file() && is_image(path))
                .collect();
            paths.sort();

            log::info!("  Class {}: {} ({} samples)", label, class_name, paths.len());
            samples.extend(paths.into_iter().map(|path| FoodItem { path, label }));
        }

        if samples.is_empty() {
            anyhow::bail!("No training samples found in {}", data_dir.display());
        }
        log::info!(
            "Found {} images belonging to {} classes.",
            samples.len(),
            class_names.len()
        );

        Ok(Self {
            samples,
            class_names,
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }
}

/// データセットアイテム（画像パスのみ保持）
#[derive(Clone, Debug)]
pub struct FoodItem {
    pub path: PathBuf,
    pub label: usize,
}

impl Dataset<FoodItem> for FoodDataset {
    fn get(&self, index: usize) -> Option<FoodItem> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// バッチャー
#[derive(Clone)]
pub struct FoodBatcher<B: Backend> {
    device: B::Device,
    image_size: usize,
    augmenter: Option<ImageAugmenter>,
}

impl<B: Backend> FoodBatcher<B> {
    /// 学習用（データ拡張あり）
    pub fn train(device: B::Device, image_size: usize, config: AugmentationConfig) -> Self {
        Self {
            device,
            image_size,
            augmenter: Some(ImageAugmenter::new(config)),
        }
    }

    /// 検証用（スケーリングのみ）
    pub fn eval(device: B::Device, image_size: usize) -> Self {
        Self {
            device,
            image_size,
            augmenter: None,
        }
    }

    fn load_item(&self, item: &FoodItem) -> Result<Vec<f32>> {
        let img = load_rgb_image(&item.path, self.image_size)?;
        let img = match &self.augmenter {
            Some(augmenter) => augmenter.augment(&img, &mut rand::thread_rng()),
            None => img,
        };
        Ok(rescale_to_chw(&img))
    }
}

/// バッチデータ
#[derive(Clone, Debug)]
pub struct FoodBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, FoodItem, FoodBatch<B>> for FoodBatcher<B> {
    fn batch(&self, items: Vec<FoodItem>, _device: &B::Device) -> FoodBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;
        let mut all_pixels = Vec::with_capacity(batch_size * 3 * size * size);
        let mut targets_vec = Vec::with_capacity(batch_size);

        for item in items {
            match self.load_item(&item) {
                Ok(image_data) => all_pixels.extend_from_slice(&image_data),
                Err(e) => {
                    // 壊れた画像1枚でエポック全体を止めない
                    log::warn!("画像読み込み失敗 {}: {}", item.path.display(), e);
                    all_pixels.extend(std::iter::repeat(0.0f32).take(3 * size * size));
                }
            }
            targets_vec.push(item.label as i64);
        }

        let images = Tensor::<B, 1>::from_floats(all_pixels.as_slice(), &self.device)
            .reshape([batch_size, 3, size, size]);
        let targets = Tensor::<B, 1, Int>::from_ints(targets_vec.as_slice(), &self.device);

        FoodBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use std::fs;

    type TestBackend = NdArray<f32>;

    fn write_image(path: &Path, value: u8) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(6, 6, Rgb([value, value, value]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_labels_follow_sorted_class_names() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("samosa/1.png"), 10);
        write_image(&dir.path().join("omelette/2.jpg"), 20);
        write_image(&dir.path().join("omelette/3.png"), 30);
        fs::write(dir.path().join("omelette/notes.txt"), "skip").unwrap();

        let dataset = FoodDataset::from_directory(dir.path()).unwrap();

        assert_eq!(dataset.class_names(), &["omelette".to_string(), "samosa".to_string()]);
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.get(0).unwrap().label, 0);
        assert_eq!(dataset.get(2).unwrap().label, 1);
        assert!(dataset.get(3).is_none());
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FoodDataset::from_directory(dir.path()).is_err());

        fs::create_dir_all(dir.path().join("pizza")).unwrap();
        assert!(FoodDataset::from_directory(dir.path()).is_err());
    }

    #[test]
    fn test_batch_shapes_and_broken_image() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("pizza/1.png");
        write_image(&good, 255);
        let broken = dir.path().join("pizza/2.jpg");
        fs::write(&broken, "not an image").unwrap();

        let device = burn_ndarray::NdArrayDevice::Cpu;
        let batcher = FoodBatcher::<TestBackend>::eval(device.clone(), 4);
        let batch = batcher.batch(
            vec![
                FoodItem { path: good, label: 0 },
                FoodItem { path: broken, label: 1 },
            ],
            &device,
        );

        assert_eq!(batch.images.dims(), [2, 3, 4, 4]);
        assert_eq!(batch.targets.dims(), [2]);

        let sums: Vec<f32> = batch
            .images
            .sum_dim(3)
            .sum_dim(2)
            .sum_dim(1)
            .into_data()
            .to_vec()
            .unwrap();
        assert!((sums[0] - 48.0).abs() < 1e-4);
        assert_eq!(sums[1], 0.0);
    }
}
