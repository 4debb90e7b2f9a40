//! マニフェスト（meta/train.txt, meta/test.txt）の読み込み
//!
//! 各行は `<クラス名>/<画像ID>` 形式。画像IDには拡張子が付かないため、
//! 読み込み時に `.jpg` を補います。

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// 画像ファイルの拡張子
pub const IMAGE_EXTENSION: &str = "jpg";

/// クラス名 → 画像ファイル名のリスト
///
/// クラスはマニフェスト内で最初に現れた順、画像はファイル内の順を保持します。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    classes: Vec<(String, Vec<String>)>,
}

impl Manifest {
    /// マニフェスト文字列をパース
    pub fn parse(text: &str) -> Result<Self> {
        let mut classes: Vec<(String, Vec<String>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut seen: HashSet<(usize, String)> = HashSet::new();

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (class_name, image_id) = line
                .split_once('/')
                .filter(|(c, i)| !c.is_empty() && !i.is_empty())
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "line {}: expected <class>/<image-id>, got {:?}",
                        line_no + 1,
                        line
                    )
                })?;

            let slot = *index.entry(class_name.to_string()).or_insert_with(|| {
                classes.push((class_name.to_string(), Vec::new()));
                classes.len() - 1
            });

            let file_name = format!("{}.{}", image_id, IMAGE_EXTENSION);
            if seen.insert((slot, file_name.clone())) {
                classes[slot].1.push(file_name);
            }
        }

        Ok(Self { classes })
    }

    /// マニフェストファイルを読み込む
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid manifest: {}", path.display()))
    }

    /// クラス名の一覧（出現順）
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(|(name, _)| name.as_str())
    }

    /// 指定クラスの画像ファイル名
    pub fn images(&self, class_name: &str) -> Option<&[String]> {
        self.classes
            .iter()
            .find(|(name, _)| name == class_name)
            .map(|(_, images)| images.as_slice())
    }

    /// (クラス名, 画像ファイル名) の組を順に返す
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.classes
            .iter()
            .map(|(name, images)| (name.as_str(), images.as_slice()))
    }

    /// クラス数
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// 全画像数
    pub fn total_images(&self) -> usize {
        self.classes.iter().map(|(_, images)| images.len()).sum()
    }
}
