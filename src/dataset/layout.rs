//! データセットのディレクトリ構成
//!
//! ```text
//! food101/
//!   images/<class>/<id>.jpg   展開したアーカイブ
//!   meta/train.txt, test.txt  マニフェスト
//!   train/, test/             prepare で作る分割
//!   train_mini/, test_mini/   サブセット
//!   history.log               学習ログ（CSV）
//!   best_model.tar.gz         検証損失が最良のモデル
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// データセットのルートと派生パス
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.root.join("meta")
    }

    pub fn train_manifest(&self) -> PathBuf {
        self.meta_dir().join("train.txt")
    }

    pub fn test_manifest(&self) -> PathBuf {
        self.meta_dir().join("test.txt")
    }

    pub fn train_dir(&self) -> PathBuf {
        self.root.join("train")
    }

    pub fn test_dir(&self) -> PathBuf {
        self.root.join("test")
    }

    pub fn train_mini_dir(&self) -> PathBuf {
        self.root.join("train_mini")
    }

    pub fn test_mini_dir(&self) -> PathBuf {
        self.root.join("test_mini")
    }

    /// 学習ログ（CSV）
    pub fn history_log(&self) -> PathBuf {
        self.root.join("history.log")
    }

    /// 最良モデルのチェックポイント
    pub fn best_model(&self) -> PathBuf {
        self.root.join("best_model.tar.gz")
    }

    /// ダウンロードしたアーカイブの保存先（ルートの隣）
    pub fn archive_path(&self) -> PathBuf {
        let mut name = self
            .root
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "food101".into());
        name.push(".tar.gz");
        self.root.with_file_name(name)
    }

    /// 展開済みかどうか（マニフェストの有無で判定）
    pub fn is_extracted(&self) -> bool {
        self.train_manifest().is_file() && self.test_manifest().is_file()
    }

    /// images/ 配下のクラス名をソートして返す
    pub fn list_classes(&self) -> Result<Vec<String>> {
        list_subdirectories(&self.images_dir())
    }
}

/// ディレクトリ直下のサブディレクトリ名をソートして返す
pub fn list_subdirectories(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// ディレクトリ配下のファイルとディレクトリの数（自身を含む）
///
/// `find <dir> -type d -or -type f | wc -l` と同じ値になります。
pub fn count_entries(dir: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        let file_type = entry.file_type();
        if file_type.is_dir() || file_type.is_file() {
            count += 1;
        }
    }
    Ok(count)
}

/// ディレクトリ内のファイル数（直下のみ）
pub fn count_files(dir: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        if entry?.file_type()?.is_file() {
            count += 1;
        }
    }
    Ok(count)
}
