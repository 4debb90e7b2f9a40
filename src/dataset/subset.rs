//! クラスのランダム抽出とサブセット（train_mini / test_mini）の作成
//!
//! 英語のログ行は Food-101 のノートブックの出力と同じ文言にしています。

use anyhow::{Context, Result};
use rand::Rng;
use std::path::Path;
use walkdir::WalkDir;

/// クラス一覧から n 個を重複なしでランダムに選び、ソートして返す
pub fn pick_n_random_classes<R: Rng + ?Sized>(
    classes: &[String],
    n: usize,
    rng: &mut R,
) -> Result<Vec<String>> {
    if n == 0 {
        anyhow::bail!("クラス数は1以上を指定してください");
    }
    if n > classes.len() {
        anyhow::bail!(
            "{} クラスを選べません（候補は {} クラス）",
            n,
            classes.len()
        );
    }

    let mut picked: Vec<String> = rand::seq::index::sample(rng, classes.len(), n)
        .into_iter()
        .map(|i| classes[i].clone())
        .collect();
    picked.sort();

    log::info!("These are the randomly picked food classes: {}", picked.join(", "));
    Ok(picked)
}

/// 乱数生成器を作る（シード指定時は再現可能）
pub fn make_rng(seed: Option<u64>) -> rand::rngs::StdRng {
    use rand::SeedableRng;
    match seed {
        Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
        None => rand::rngs::StdRng::from_entropy(),
    }
}

/// すべてのクラスフォルダが src にあるか確認
pub fn check_classes_exist(classes: &[String], src: &Path) -> Result<()> {
    let missing: Vec<&str> = classes
        .iter()
        .filter(|class_name| !src.join(class_name).is_dir())
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        anyhow::bail!(
            "クラスフォルダが見つかりません: {} ({})",
            missing.join(", "),
            src.display()
        );
    }
    Ok(())
}

/// 選んだクラスのフォルダを src から dest へ丸ごとコピー
///
/// クラスフォルダが揃っていることを確認してから、既存の dest を削除して作り直します。
/// コピーしたファイル数を返します。
pub fn create_subset(classes: &[String], src: &Path, dest: &Path) -> Result<usize> {
    check_classes_exist(classes, src)?;

    if dest.exists() {
        std::fs::remove_dir_all(dest)
            .with_context(|| format!("ディレクトリの削除に失敗: {}", dest.display()))?;
    }
    std::fs::create_dir_all(dest)
        .with_context(|| format!("ディレクトリの作成に失敗: {}", dest.display()))?;

    let mut copied = 0;
    for class_name in classes {
        log::info!("Copying images into {}", class_name);
        copied += copy_tree(&src.join(class_name), &dest.join(class_name))?;
    }

    Ok(copied)
}

fn copy_tree(src: &Path, dest: &Path) -> Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(src) {
        let entry = entry.with_context(|| format!("走査に失敗: {}", src.display()))?;
        let relative = entry.path().strip_prefix(src)?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("ディレクトリの作成に失敗: {}", target.display()))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target).with_context(|| {
                format!("コピーに失敗: {} → {}", entry.path().display(), target.display())
            })?;
            copied += 1;
        }
    }
    Ok(copied)
}
