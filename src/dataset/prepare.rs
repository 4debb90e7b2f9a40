//! マニフェストに従って画像をクラス別フォルダへコピー
//!
//! `images/<class>/<id>.jpg` → `<dest>/<class>/<id>.jpg`。
//! 既に存在するファイルはコピーせず、クラスフォルダの枚数がマニフェストと
//! 一致していればそのクラスごと飛ばすため、何度実行しても結果は同じです。
//! クラスごとの英語のログ行は Food-101 のノートブックの出力と同じ文言です。

use anyhow::{Context, Result};
use std::path::Path;

use crate::dataset::layout::count_files;
use crate::dataset::manifest::Manifest;

/// コピー結果の集計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrepareReport {
    /// 処理したクラス数
    pub classes: usize,
    /// 新たにコピーしたファイル数
    pub copied: usize,
    /// 既に存在したためコピーしなかったファイル数
    pub already_present: usize,
    /// 枚数が揃っていたため丸ごと飛ばしたクラス数
    pub complete_classes: usize,
}

/// マニフェストファイルを読み込み、src から dest へコピー
pub fn prepare_data(manifest_path: &Path, src: &Path, dest: &Path) -> Result<PrepareReport> {
    let manifest = Manifest::load(manifest_path)?;
    prepare_from_manifest(&manifest, src, dest)
}

/// 読み込み済みのマニフェストに従ってコピー
pub fn prepare_from_manifest(manifest: &Manifest, src: &Path, dest: &Path) -> Result<PrepareReport> {
    let mut report = PrepareReport::default();

    for (class_name, images) in manifest.iter() {
        log::info!("Copying images into {}", class_name);
        report.classes += 1;

        let class_dest = dest.join(class_name);
        std::fs::create_dir_all(&class_dest)
            .with_context(|| format!("ディレクトリの作成に失敗: {}", class_dest.display()))?;

        if count_files(&class_dest)? == images.len() {
            log::debug!("  {}: {} 枚揃っているためスキップ", class_name, images.len());
            report.complete_classes += 1;
            report.already_present += images.len();
            continue;
        }

        let class_src = src.join(class_name);
        for image in images {
            let target = class_dest.join(image);
            if target.is_file() {
                report.already_present += 1;
                continue;
            }
            let source = class_src.join(image);
            std::fs::copy(&source, &target).with_context(|| {
                format!("コピーに失敗: {} → {}", source.display(), target.display())
            })?;
            report.copied += 1;
        }
    }

    log::info!(
        "コピー完了: {} クラス, {} 枚コピー, {} 枚は既存",
        report.classes,
        report.copied,
        report.already_present
    );
    Ok(report)
}
