//! データセットのダウンロードと展開
//!
//! アーカイブは `food-101/images/...`, `food-101/meta/...` の構成なので、
//! 先頭のディレクトリを取り除いてデータセットのルート直下に展開します。

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use md5::{Digest, Md5};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use tar::Archive;

use crate::dataset::layout::DatasetLayout;
use crate::model::DatasetSettings;

/// 必要ならダウンロードと展開を行う
///
/// マニフェストが既にあれば何もしません。
pub fn fetch_dataset(settings: &DatasetSettings, layout: &DatasetLayout) -> Result<()> {
    if layout.is_extracted() {
        log::info!("展開済みのデータセットを使用します: {}", layout.root().display());
        return Ok(());
    }

    let archive_path = layout.archive_path();
    if archive_path.is_file() {
        log::info!("ダウンロード済みのアーカイブを使用します: {}", archive_path.display());
    } else {
        download_file(&settings.url, &archive_path)?;
    }

    if let Some(expected) = settings.md5.as_deref() {
        verify_md5(&archive_path, expected)?;
    }

    let extracted = extract_archive(&archive_path, layout.root())?;
    log::info!("{} ファイルを展開しました: {}", extracted, layout.root().display());

    if !layout.is_extracted() {
        anyhow::bail!(
            "展開後もマニフェストが見つかりません: {}",
            layout.train_manifest().display()
        );
    }
    Ok(())
}

/// URLからファイルをダウンロードして保存
///
/// 途中で失敗した場合に不完全なファイルが残らないよう、一時ファイルに書いてから置き換えます。
pub fn download_file(url: &str, dest_path: &Path) -> Result<()> {
    log::info!("ダウンロード中: {}", url);

    let response = ureq::get(url)
        .call()
        .with_context(|| format!("HTTP request failed: {}", url))?;

    if response.status() != 200 {
        anyhow::bail!("HTTP status {} for {}", response.status(), url);
    }

    if let Some(parent) = dest_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let partial = partial_path(dest_path);
    {
        let mut reader = response.into_reader();
        let mut writer = BufWriter::new(
            File::create(&partial)
                .with_context(|| format!("Failed to create {}", partial.display()))?,
        );
        let bytes = std::io::copy(&mut reader, &mut writer)
            .with_context(|| format!("Failed to download {}", url))?;
        writer.flush()?;
        log::info!("{:.1} MB をダウンロードしました", bytes as f64 / 1024.0 / 1024.0);
    }
    std::fs::rename(&partial, dest_path)
        .with_context(|| format!("Failed to move download into {}", dest_path.display()))?;

    log::info!("ダウンロード完了: {}", dest_path.display());
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// ファイルのMD5を計算
pub fn file_md5(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
    );
    let mut hasher = Md5::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// MD5を検証
pub fn verify_md5(path: &Path, expected: &str) -> Result<()> {
    let actual = file_md5(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        anyhow::bail!(
            "MD5 mismatch for {}: expected {}, got {}",
            path.display(),
            expected,
            actual
        );
    }
    log::info!("MD5 OK: {}", actual);
    Ok(())
}

/// tar.gz を展開（先頭ディレクトリを取り除く）
///
/// 展開したファイル数を返します。
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    std::fs::create_dir_all(dest)?;

    let mut extracted = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();

        let Some(relative) = strip_top_level(&path) else {
            continue;
        };
        let target = dest.join(&relative);

        if entry.header().entry_type().is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry
            .unpack(&target)
            .with_context(|| format!("Failed to unpack {}", target.display()))?;
        extracted += 1;
    }

    Ok(extracted)
}

/// 先頭の要素を取り除いた相対パス
///
/// 先頭だけのパスや、`..` や絶対パスを含むエントリは None。
fn strip_top_level(path: &Path) -> Option<PathBuf> {
    let mut components = path.components();
    match components.next()? {
        Component::Normal(_) => {}
        Component::CurDir => return strip_top_level(components.as_path()),
        _ => return None,
    }

    let rest: PathBuf = components.collect();
    if rest.as_os_str().is_empty() {
        return None;
    }
    if rest.components().any(|c| !matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn build_archive(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_path(name).unwrap();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, content.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_strip_top_level() {
        assert_eq!(
            strip_top_level(Path::new("food-101/meta/train.txt")),
            Some(PathBuf::from("meta/train.txt"))
        );
        assert_eq!(
            strip_top_level(Path::new("./food-101/images/pizza/1.jpg")),
            Some(PathBuf::from("images/pizza/1.jpg"))
        );
        assert_eq!(strip_top_level(Path::new("food-101")), None);
        assert_eq!(strip_top_level(Path::new("food-101/../etc/passwd")), None);
    }

    #[test]
    fn test_extract_archive_strips_top_level() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("food101.tar.gz");
        build_archive(
            &archive,
            &[
                ("food-101/meta/train.txt", "pizza/1\n"),
                ("food-101/meta/test.txt", "pizza/2\n"),
                ("food-101/images/pizza/1.jpg", "one"),
            ],
        );

        let layout = DatasetLayout::new(dir.path().join("food101"));
        let count = extract_archive(&archive, layout.root()).unwrap();

        assert_eq!(count, 3);
        assert!(layout.is_extracted());
        assert_eq!(
            std::fs::read_to_string(layout.images_dir().join("pizza/1.jpg")).unwrap(),
            "one"
        );
    }

    #[test]
    fn test_fetch_uses_local_archive_and_checks_md5() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DatasetLayout::new(dir.path().join("food101"));
        build_archive(
            &layout.archive_path(),
            &[
                ("food-101/meta/train.txt", "pizza/1\n"),
                ("food-101/meta/test.txt", "pizza/2\n"),
            ],
        );

        let bad = DatasetSettings {
            root: layout.root().to_string_lossy().into_owned(),
            url: "http://127.0.0.1:9/unused".to_string(),
            md5: Some("00000000000000000000000000000000".to_string()),
        };
        assert!(fetch_dataset(&bad, &layout).is_err());
        assert!(!layout.is_extracted());

        let good = DatasetSettings {
            md5: Some(file_md5(&layout.archive_path()).unwrap()),
            ..bad
        };
        fetch_dataset(&good, &layout).unwrap();
        assert!(layout.is_extracted());

        // 展開済みならアーカイブが無くても成功する
        std::fs::remove_file(layout.archive_path()).unwrap();
        fetch_dataset(&good, &layout).unwrap();
    }

    #[test]
    fn test_file_md5() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, "hello").unwrap();
        assert_eq!(file_md5(&path).unwrap(), "5d41402abc4b2a76b9719d911017c592");
        assert!(verify_md5(&path, "5D41402ABC4B2A76B9719D911017C592").is_ok());
    }
}
