//! 学習履歴のCSVログ
//!
//! 列: epoch, accuracy, loss, val_accuracy, val_loss（1エポック1行）

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// 1エポック分の学習結果
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EpochRecord {
    pub epoch: usize,
    pub accuracy: f64,
    pub loss: f64,
    pub val_accuracy: f64,
    pub val_loss: f64,
}

/// ログの列名（EpochRecord のフィールド順）
const HEADER: [&str; 5] = ["epoch", "accuracy", "loss", "val_accuracy", "val_loss"];

/// CSVログ書き込み
pub struct HistoryLogger {
    writer: csv::Writer<File>,
}

impl HistoryLogger {
    /// ログファイルを作成してヘッダーを書き込む（既存の内容は破棄）
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .with_context(|| format!("Failed to create history log: {}", path.display()))?;
        writer
            .write_record(HEADER)
            .context("Failed to write history header")?;
        writer.flush()?;
        Ok(Self { writer })
    }

    /// 1エポック分を追記してフラッシュ
    pub fn log_epoch(&mut self, record: &EpochRecord) -> Result<()> {
        self.writer
            .serialize(record)
            .context("Failed to write history row")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// CSVログを読み込む
pub fn read_history(path: &Path) -> Result<Vec<EpochRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to open history log: {}", path.display()))?;

    let mut records = Vec::new();
    for result in reader.deserialize() {
        records.push(result?);
    }
    Ok(records)
}
