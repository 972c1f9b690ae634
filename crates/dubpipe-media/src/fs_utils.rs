//! Filesystem helpers for output placement.
//!
//! Temp directories and the media root may live on different filesystems, so
//! moves fall back to copy-and-delete on EXDEV.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, warn};

use crate::error::{MediaError, MediaResult};

/// Extensions accepted when the produced file cannot be matched by identifier.
pub const MEDIA_EXTENSIONS: &[&str] = &["mkv", "mp4", "webm", "mp3", "m4a"];

/// Move a file from `src` to `dst`, creating parent directories and handling
/// cross-device moves.
///
/// Cross-device moves copy to `dst.tmp` on the destination filesystem first,
/// then rename into place.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if !src.exists() {
        return Err(MediaError::FileNotFound(src.to_path_buf()));
    }

    if let Some(parent) = dst.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            debug!(
                "Cross-device rename, falling back to copy+delete: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// EXDEV is 18 on Linux and macOS.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    let tmp_dst = dst.with_extension("tmp");

    fs::copy(src, &tmp_dst).await.map_err(|e| {
        error!(
            "Failed to copy file during cross-device move: {} -> {}: {}",
            src.display(),
            tmp_dst.display(),
            e
        );
        MediaError::from(e)
    })?;

    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        error!(
            "Failed to rename temp file during cross-device move: {} -> {}: {}",
            tmp_dst.display(),
            dst.display(),
            e
        );
        return Err(MediaError::from(e));
    }

    if let Err(e) = fs::remove_file(src).await {
        warn!(
            "Failed to remove source file after cross-device move: {}: {}",
            src.display(),
            e
        );
    }

    Ok(())
}

/// Remove a directory tree, logging instead of failing.
///
/// Returns whether the directory is gone afterwards.
pub async fn remove_dir_best_effort(dir: impl AsRef<Path>) -> bool {
    let dir = dir.as_ref();
    match fs::remove_dir_all(dir).await {
        Ok(()) => {
            debug!("Removed temp directory {}", dir.display());
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!("Failed to remove temp directory {}: {}", dir.display(), e);
            false
        }
    }
}

/// Locate the media file a fetch produced inside `dir`.
///
/// Only files with a known media extension are candidates, so subtitle and
/// metadata sidecars are never picked. Among the candidates, names containing
/// `identifier` win, then `preferred_ext`, then the first by name.
pub async fn find_media_file(
    dir: impl AsRef<Path>,
    identifier: &str,
    preferred_ext: &str,
) -> MediaResult<Option<PathBuf>> {
    let mut entries = fs::read_dir(dir.as_ref()).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && media_extension(&path).is_some() {
            files.push(path);
        }
    }
    files.sort();

    let pick = |candidates: Vec<&PathBuf>| -> Option<PathBuf> {
        candidates
            .iter()
            .find(|p| media_extension(p.as_path()).as_deref() == Some(preferred_ext))
            .or_else(|| candidates.first())
            .map(|p| (*p).clone())
    };

    if !identifier.is_empty() {
        let named: Vec<&PathBuf> = files
            .iter()
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().contains(identifier))
                    .unwrap_or(false)
            })
            .collect();
        if let Some(found) = pick(named) {
            return Ok(Some(found));
        }
    }

    Ok(pick(files.iter().collect()))
}

/// Lowercased extension of `path` when it is one of [`MEDIA_EXTENSIONS`].
fn media_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    MEDIA_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Size of a file in bytes, if it can be read.
pub async fn file_size(path: impl AsRef<Path>) -> Option<u64> {
    fs::metadata(path.as_ref()).await.ok().map(|m| m.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_file_same_filesystem() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.txt");
        let dst = dir.path().join("dest.txt");

        fs::write(&src, b"test content").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists(), "Source file should be removed");
        assert_eq!(fs::read_to_string(&dst).await.unwrap(), "test content");
    }

    #[tokio::test]
    async fn test_move_file_creates_parents() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.txt");
        let dst = dir.path().join("a").join("b").join("dest.txt");

        fs::write(&src, b"x").await.unwrap();
        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert!(dst.exists());
    }

    #[tokio::test]
    async fn test_move_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = move_file(dir.path().join("nope"), dir.path().join("dst"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[test]
    fn test_is_cross_device_error() {
        assert!(is_cross_device_error(&std::io::Error::from_raw_os_error(18)));
        assert!(!is_cross_device_error(&std::io::Error::from_raw_os_error(2)));
    }

    #[tokio::test]
    async fn test_find_media_file_prefers_identifier() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("aaa.mp4"), b"").await.unwrap();
        fs::write(dir.path().join("xyz123.mkv"), b"").await.unwrap();
        fs::write(dir.path().join("zzz.txt"), b"").await.unwrap();

        let found = find_media_file(dir.path(), "xyz123", "mp4").await.unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "xyz123.mkv");

        let found = find_media_file(dir.path(), "missing", "mkv").await.unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "xyz123.mkv");

        let found = find_media_file(dir.path(), "missing", "webm").await.unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "aaa.mp4");
    }

    #[tokio::test]
    async fn test_find_media_file_skips_subtitle_sidecars() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("abc123.en.vtt"), b"WEBVTT").await.unwrap();
        fs::write(dir.path().join("abc123.info.json"), b"{}").await.unwrap();
        fs::write(dir.path().join("abc123.mkv"), b"media").await.unwrap();

        let found = find_media_file(dir.path(), "abc123", "mkv").await.unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "abc123.mkv");
    }

    #[tokio::test]
    async fn test_find_media_file_prefers_requested_container() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("abc123.f137.mp4"), b"").await.unwrap();
        fs::write(dir.path().join("abc123.mkv"), b"").await.unwrap();

        let found = find_media_file(dir.path(), "abc123", "mkv").await.unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "abc123.mkv");
    }

    #[tokio::test]
    async fn test_find_media_file_empty_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), b"").await.unwrap();
        fs::write(dir.path().join("abc123.en.vtt"), b"").await.unwrap();
        assert!(find_media_file(dir.path(), "abc123", "mkv").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_dir_best_effort() {
        let dir = TempDir::new().unwrap();
        let job_dir = dir.path().join("job");
        fs::create_dir_all(job_dir.join("nested")).await.unwrap();
        fs::write(job_dir.join("nested").join("f"), b"x").await.unwrap();

        assert!(remove_dir_best_effort(&job_dir).await);
        assert!(!job_dir.exists());
        assert!(remove_dir_best_effort(&job_dir).await);
    }
}
