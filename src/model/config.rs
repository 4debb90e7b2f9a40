//! アプリケーション設定管理モジュール
//!
//! データセットの配置、サブセット抽出、学習パラメータをJSON形式で保存・読み込みします。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    #[default]
    Wgpu,
    /// WGPU の CPU アダプタ
    Cpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "WGPU (CPU)"),
        }
    }
}

/// Food-101 の公開アーカイブ
pub const FOOD101_URL: &str = "http://data.vision.ee.ethz.ch/cvl/food-101.tar.gz";

/// 公開アーカイブのMD5
pub const FOOD101_MD5: &str = "85eeb15f3717b99a5da872d97d918f87";

/// データセット設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSettings {
    /// データセットのルートディレクトリ（images/ と meta/ を含む）
    pub root: String,
    /// ダウンロード元URL
    pub url: String,
    /// アーカイブのMD5（Noneなら検証しない）
    #[serde(default)]
    pub md5: Option<String>,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            root: "food101".to_string(),
            url: FOOD101_URL.to_string(),
            md5: Some(FOOD101_MD5.to_string()),
        }
    }
}

/// クラスのサブセット設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsetSettings {
    /// ランダムに選ぶクラス数
    pub num_classes: usize,
    /// 乱数シード（Noneなら毎回異なる選択）
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SubsetSettings {
    fn default() -> Self {
        Self {
            num_classes: 3,
            seed: None,
        }
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// エポック数
    pub num_epochs: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// 学習率
    pub learning_rate: f64,
    /// SGDのモーメンタム
    pub momentum: f64,
    /// 入力画像サイズ（正方形）
    pub image_size: usize,
    /// ランダムシード
    pub seed: u64,
    /// train_mini / test_mini を使うかどうか
    #[serde(default = "default_use_mini")]
    pub use_mini: bool,
}

fn default_use_mini() -> bool {
    true
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            num_epochs: 1,
            batch_size: 16,
            learning_rate: 1e-4,
            momentum: 0.9,
            image_size: 299,
            seed: 42,
            use_mini: true,
        }
    }
}

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// 学習完了後のモデルの保存先
    pub model_path: String,
    /// ドロップアウト率
    pub dropout: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_path: "model_trained.tar.gz".to_string(),
            dropout: 0.2,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// 計算デバイスの種類
    pub device_type: DeviceType,
    /// データセット設定
    pub dataset: DatasetSettings,
    /// サブセット設定
    #[serde(default)]
    pub subset: SubsetSettings,
    /// トレーニング設定
    pub training: TrainingSettings,
    /// モデル設定
    pub model: ModelSettings,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("food101.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 設定を読み込む、存在しないか壊れている場合はデフォルト設定を返す
    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("設定ファイルが存在しません。デフォルト設定を使用します");
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => {
                log::info!("設定ファイルを読み込みました: {}", path.display());
                config
            }
            Err(e) => {
                log::warn!(
                    "設定ファイルの読み込みに失敗しました ({}): {}",
                    path.display(),
                    e
                );
                log::warn!("デフォルト設定を使用します");
                Self::default()
            }
        }
    }

    /// デフォルトパスから設定を読み込む
    pub fn load_or_default() -> Self {
        Self::load_or_default_from(Self::default_path())
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 設定情報を表示
    pub fn display(&self) {
        println!("=== アプリケーション設定 ===");
        println!("計算デバイス: {}", self.device_type);
        println!("データセット: {}", self.dataset.root);
        println!("ダウンロード元: {}", self.dataset.url);
        println!("\n--- サブセット設定 ---");
        println!("クラス数: {}", self.subset.num_classes);
        match self.subset.seed {
            Some(seed) => println!("シード: {}", seed),
            None => println!("シード: なし"),
        }
        println!("\n--- トレーニング設定 ---");
        println!("エポック数: {}", self.training.num_epochs);
        println!("バッチサイズ: {}", self.training.batch_size);
        println!("学習率: {}", self.training.learning_rate);
        println!("モーメンタム: {}", self.training.momentum);
        println!("入力サイズ: {}x{}", self.training.image_size, self.training.image_size);
        println!("ミニデータ使用: {}", self.training.use_mini);
        println!("\n--- モデル設定 ---");
        println!("モデルパス: {}", self.model.model_path);
        println!("ドロップアウト率: {}", self.model.dropout);
        println!("========================\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.device_type, DeviceType::Wgpu);
        assert_eq!(config.dataset.root, "food101");
        assert_eq!(config.subset.num_classes, 3);
        assert_eq!(config.training.batch_size, 16);
        assert_eq!(config.training.image_size, 299);
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.device_type, deserialized.device_type);
        assert_eq!(config.dataset.md5, deserialized.dataset.md5);
        assert_eq!(config.training.num_epochs, deserialized.training.num_epochs);
    }

    #[test]
    fn test_device_type_display() {
        assert_eq!(format!("{}", DeviceType::Wgpu), "WGPU (GPU)");
        assert_eq!(format!("{}", DeviceType::Cpu), "WGPU (CPU)");
    }

    #[test]
    fn test_load_or_default_falls_back() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.json");
        let config = AppConfig::load_or_default_from(&missing);
        assert_eq!(config.dataset.root, "food101");

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        let config = AppConfig::load_or_default_from(&broken);
        assert_eq!(config.training.batch_size, 16);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("food101.json");

        let mut config = AppConfig::default();
        config.subset.num_classes = 11;
        config.subset.seed = Some(7);
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.subset.num_classes, 11);
        assert_eq!(loaded.subset.seed, Some(7));
    }
}
