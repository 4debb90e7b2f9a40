//! モデル推論機能

use anyhow::Result;
use burn::{
    backend::Wgpu,
    tensor::{activation::softmax, backend::Backend, Tensor},
};
use std::path::Path;

use crate::ml::ml_model::{load_and_rescale_image, FoodClassifier, ModelConfig};
use crate::ml::training::load_model_bytes;
use crate::model::{load_model_with_metadata, ModelMetadata};

/// 1枚の画像の分類結果
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_name: String,
    /// softmax 確率（0〜1）
    pub confidence: f32,
}

/// 推論エンジン
pub struct InferenceEngine<B: Backend = Wgpu> {
    model: FoodClassifier<B>,
    metadata: ModelMetadata,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    /// モデルを読み込んで推論エンジンを初期化
    pub fn load<P: AsRef<Path>>(model_path: P, device: B::Device) -> Result<Self> {
        let (metadata, model_binary) = load_model_with_metadata(model_path.as_ref())?;
        log::info!(
            "モデルを読み込みました: {} ({} クラス, 入力サイズ: {}x{})",
            model_path.as_ref().display(),
            metadata.num_classes(),
            metadata.image_size,
            metadata.image_size
        );
        Self::from_bytes(metadata, model_binary, device)
    }

    /// メタデータと重みのバイト列から初期化
    pub fn from_bytes(metadata: ModelMetadata, model_binary: Vec<u8>, device: B::Device) -> Result<Self> {
        if metadata.num_classes() == 0 {
            anyhow::bail!("メタデータにクラス名がありません");
        }

        // 推論時はドロップアウトなし
        let model_config = ModelConfig::new(metadata.num_classes())
            .with_dropout(0.0)
            .with_image_size(metadata.image_size as usize);
        let model: FoodClassifier<B> = model_config.init(&device);

        let model = load_model_bytes(model, model_binary, &device)?;

        Ok(Self {
            model,
            metadata,
            device,
        })
    }

    /// 単一画像を分類
    pub fn classify_image<P: AsRef<Path>>(&self, image_path: P) -> Result<Prediction> {
        let size = self.metadata.image_size as usize;
        let image_data = load_and_rescale_image(image_path.as_ref(), size)?;

        let tensor = Tensor::<B, 1>::from_floats(image_data.as_slice(), &self.device)
            .reshape([1, 3, size, size]);

        let probabilities = softmax(self.model.forward(tensor), 1);
        let probabilities = probabilities
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("推論結果の取得エラー: {:?}", e))?;

        let (class_idx, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| anyhow::anyhow!("推論結果が空です"))?;

        let class_name = self
            .metadata
            .class_index_to_label(class_idx)
            .ok_or_else(|| anyhow::anyhow!("クラスインデックス {} は範囲外です", class_idx))?
            .to_string();

        Ok(Prediction {
            class_name,
            confidence,
        })
    }

    /// 複数画像をバッチ分類
    pub fn classify_batch(&self, image_paths: &[impl AsRef<Path>]) -> Result<Vec<Prediction>> {
        let mut results = Vec::with_capacity(image_paths.len());

        for path in image_paths {
            let prediction = self.classify_image(path)?;
            log::debug!(
                "{}: {} ({:.2}%)",
                path.as_ref().display(),
                prediction.class_name,
                prediction.confidence * 100.0
            );
            results.push(prediction);
        }

        Ok(results)
    }

    /// ModelMetadataへの参照を取得
    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}
