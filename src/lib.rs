//! Food-101 データセットの準備と料理画像分類器の学習
//!
//! - `dataset`: ダウンロード、train/test への振り分け、クラスのサブセット作成
//! - `ml`: 分類モデルの学習と推論（feature `ml`）
//! - `model`: 設定ファイルと学習済みモデルの保存形式

#![recursion_limit = "256"]

pub mod dataset;
pub mod history;
pub mod model;
#[cfg(feature = "ml")]
pub mod ml;

pub mod config_commands;
pub mod dataset_commands;
#[cfg(feature = "ml")]
pub mod ml_commands;
