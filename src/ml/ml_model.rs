//! 機械学習モデルの共通定義
//!
//! 料理画像分類用のCNNモデルと関連する設定を提供します。

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Int, Tensor},
    train::ClassificationOutput,
};
use image::imageops::FilterType;
use image::RgbImage;

/// 画像サイズ
pub const IMAGE_SIZE: usize = 299;

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// ドロップアウト率
    #[config(default = 0.2)]
    pub dropout: f64,
    /// 入力画像サイズ（正方形）
    #[config(default = 299)]
    pub image_size: usize,
    /// 分類ヘッドの中間次元
    #[config(default = 128)]
    pub hidden: usize,
}

impl ModelConfig {
    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> FoodClassifier<B> {
        log::debug!(
            "[Model] 入力サイズ: {}x{}, クラス数: {}, hidden: {}, dropout: {}",
            self.image_size,
            self.image_size,
            self.num_classes,
            self.hidden,
            self.dropout
        );

        FoodClassifier {
            // Conv: 3x3 (padding 1, stride 2)
            conv1: Conv2dConfig::new([3, 32], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            pool1: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),

            conv2: Conv2dConfig::new([32, 64], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            pool2: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),

            conv3: Conv2dConfig::new([64, 128], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),

            // 空間方向の平均（GlobalAveragePooling）
            gap: AdaptiveAvgPool2dConfig::new([1, 1]).init(),

            fc1: LinearConfig::new(128, self.hidden).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc2: LinearConfig::new(self.hidden, self.num_classes).init(device),

            activation: Relu::new(),
        }
    }
}

/// 料理画像分類用CNNモデル
///
/// # アーキテクチャ
/// - Conv 3x3 (stride 2) + ReLU + MaxPool
/// - Conv 3x3 + ReLU + MaxPool
/// - Conv 3x3 + ReLU
/// - Global Average Pooling
/// - FC: 128 -> hidden + ReLU + Dropout
/// - FC: hidden -> num_classes
///
/// Global Average Pooling の後に全結合層を置くため、入力サイズに依存しません。
#[derive(Module, Debug)]
pub struct FoodClassifier<B: Backend> {
    conv1: Conv2d<B>, // 3 -> 32
    pool1: MaxPool2d,
    conv2: Conv2d<B>, // 32 -> 64
    pool2: MaxPool2d,
    conv3: Conv2d<B>, // 64 -> 128
    gap: AdaptiveAvgPool2d,

    fc1: Linear<B>,
    dropout: Dropout,
    fc2: Linear<B>,

    activation: Relu,
}

impl<B: Backend> FoodClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 3, size, size]
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.conv1.forward(images);
        let x = self.activation.forward(x);
        let x = self.pool1.forward(x);

        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool2.forward(x);

        let x = self.conv3.forward(x);
        let x = self.activation.forward(x);

        // [batch, 128, 1, 1] -> [batch, 128]
        let x = self.gap.forward(x);
        let [_, c, _, _] = x.dims();
        let x = x.reshape([batch_size, c]);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);

        self.fc2.forward(x)
    }

    /// 順伝播と損失計算（学習用）
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

/// 画像を読み込み、指定サイズのRGB画像に変換
pub fn load_rgb_image(path: &std::path::Path, size: usize) -> anyhow::Result<RgbImage> {
    let img = image::open(path)
        .map_err(|e| anyhow::anyhow!("画像読み込みエラー {}: {}", path.display(), e))?;
    let size = size as u32;
    Ok(img.resize_exact(size, size, FilterType::Nearest).to_rgb8())
}

/// RGB画像を 1/255 でスケーリングし、(C, H, W) の順で平坦化
pub fn rescale_to_chw(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let mut data = Vec::with_capacity(3 * (width * height) as usize);

    for channel in 0..3 {
        for y in 0..height {
            for x in 0..width {
                data.push(img.get_pixel(x, y)[channel] as f32 / 255.0);
            }
        }
    }

    data
}

/// 画像を読み込んでリサイズ・スケーリング
///
/// # 戻り値
/// - [0, 1] にスケーリングされたRGB画像データ (C, H, W) の順で平坦化
pub fn load_and_rescale_image(path: &std::path::Path, size: usize) -> anyhow::Result<Vec<f32>> {
    Ok(rescale_to_chw(&load_rgb_image(path, size)?))
}
