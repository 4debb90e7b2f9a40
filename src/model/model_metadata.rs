//! モデルメタデータの定義と永続化
//!
//! tar.gz形式でモデルと関連するメタデータを保存・読み込みします。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMetadata {
    /// クラス名（インデックス順 = ラベル順）
    /// 例: ["omelette", "pizza", "samosa"]
    pub class_names: Vec<String>,

    /// モデル入力サイズ（正方形、通常299）
    pub image_size: u32,

    /// 学習エポック数
    pub num_epochs: u32,

    /// 検証損失の最良値
    #[serde(default)]
    pub best_val_loss: Option<f64>,

    /// 最良時の検証精度（0〜1）
    #[serde(default)]
    pub best_val_accuracy: Option<f64>,

    /// モデルの学習時刻（ISO8601形式）
    pub trained_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(class_names: Vec<String>, image_size: u32, num_epochs: u32) -> Self {
        let trained_at = chrono::Local::now().to_rfc3339();

        Self {
            class_names,
            image_size,
            num_epochs,
            best_val_loss: None,
            best_val_accuracy: None,
            trained_at,
        }
    }

    /// 検証結果を記録
    pub fn with_validation(mut self, val_loss: f64, val_accuracy: f64) -> Self {
        self.best_val_loss = Some(val_loss);
        self.best_val_accuracy = Some(val_accuracy);
        self
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// クラスインデックスからクラス名を取得
    pub fn class_index_to_label(&self, index: usize) -> Option<&str> {
        self.class_names.get(index).map(String::as_str)
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}
