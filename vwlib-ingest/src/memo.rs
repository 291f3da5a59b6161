//! Per-work local file memo
//!
//! Scans a work directory and records, per audio file, the modification
//! time and measured duration, plus a work-level lyric flag set by any
//! subtitle file in the tree. Durations come from an external `ffprobe`
//! invocation admitted through the shared limiter.
//!
//! Rebuilds are memoized on modification time: an unchanged mtime reuses
//! the previously recorded duration verbatim, a changed mtime always
//! re-probes. This is a correctness contract, not a cache expiry.

use crate::limiter::TaskLimiter;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::UNIX_EPOCH;
use vwlib_common::{Error, Result};
use walkdir::WalkDir;

/// Recorded state of one audio file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStamp {
    /// Modification time, unix seconds
    pub mtime: i64,
    /// Measured duration in seconds; `None` when probing failed
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Per-work file memo, persisted as JSON on the work record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Memo {
    /// Relative path (slash-separated) -> stamp, audio files only
    #[serde(default)]
    pub files: BTreeMap<String, FileStamp>,
    /// A subtitle file exists somewhere in the work tree
    #[serde(default)]
    pub lyric: bool,
}

/// File classification by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Audio,
    Subtitle,
    Image,
    Text,
    Other,
}

impl FileKind {
    pub fn of(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return FileKind::Other;
        };
        match ext.to_ascii_lowercase().as_str() {
            "mp3" | "mp4" | "m4a" | "wav" | "flac" | "ogg" | "opus" => FileKind::Audio,
            "lrc" | "srt" | "ass" | "vtt" => FileKind::Subtitle,
            "jpg" | "jpeg" | "png" | "gif" | "webp" => FileKind::Image,
            "txt" | "pdf" | "html" => FileKind::Text,
            _ => FileKind::Other,
        }
    }
}

/// Builds file memos for work directories
pub struct MemoBuilder {
    limiter: TaskLimiter,
    probe_command: String,
}

impl MemoBuilder {
    pub fn new(limiter: TaskLimiter) -> Self {
        Self {
            limiter,
            probe_command: "ffprobe".to_string(),
        }
    }

    /// Override the probe executable (tests use a stub)
    pub fn with_probe_command(mut self, command: impl Into<String>) -> Self {
        self.probe_command = command.into();
        self
    }

    /// Build the memo for `dir`, reusing `previous` measurements for files
    /// whose modification time is unchanged.
    pub async fn build(&self, dir: &Path, previous: &Memo) -> Result<Memo> {
        let mut memo = Memo::default();
        let mut to_probe: Vec<(String, std::path::PathBuf, i64)> = Vec::new();

        for entry in WalkDir::new(dir).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if is_permission_denied(&e) => {
                    tracing::warn!(error = %e, "Permission denied inside work dir, skipping entry");
                    continue;
                }
                Err(e) => {
                    return Err(Error::Io(std::io::Error::other(format!(
                        "cannot list {}: {e}",
                        dir.display()
                    ))))
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            match FileKind::of(entry.path()) {
                FileKind::Subtitle => memo.lyric = true,
                FileKind::Audio => {
                    let relative = relative_key(dir, entry.path())?;
                    let mtime = file_mtime(entry.path())?;
                    match previous.files.get(&relative) {
                        Some(stamp) if stamp.mtime == mtime => {
                            // unchanged: reuse the previous measurement verbatim
                            memo.files.insert(relative, stamp.clone());
                        }
                        _ => to_probe.push((relative, entry.path().to_path_buf(), mtime)),
                    }
                }
                _ => {}
            }
        }

        let mut probes: FuturesUnordered<_> = to_probe
            .into_iter()
            .map(|(relative, path, mtime)| async move {
                let duration = self.probe_duration(&path).await;
                (relative, FileStamp { mtime, duration })
            })
            .collect();

        while let Some((relative, stamp)) = probes.next().await {
            memo.files.insert(relative, stamp);
        }

        Ok(memo)
    }

    /// Measure one file's duration via the probe subprocess.
    ///
    /// Any probe failure is recorded as unknown duration, never an error.
    async fn probe_duration(&self, path: &Path) -> Option<f64> {
        let mut command = tokio::process::Command::new(&self.probe_command);
        command
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path);

        let output = self.limiter.run(async move { command.output().await }).await;

        match output {
            Ok(out) if out.status.success() => {
                String::from_utf8_lossy(&out.stdout).trim().parse::<f64>().ok()
            }
            Ok(out) => {
                tracing::warn!(
                    file = %path.display(),
                    status = %out.status,
                    "Duration probe exited with failure"
                );
                None
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Cannot run duration probe");
                None
            }
        }
    }
}

fn is_permission_denied(e: &walkdir::Error) -> bool {
    e.io_error()
        .map(|io| io.kind() == std::io::ErrorKind::PermissionDenied)
        .unwrap_or(false)
}

fn relative_key(base: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(base).map_err(|_| {
        Error::Internal(format!(
            "{} is outside work dir {}",
            path.display(),
            base.display()
        ))
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

fn file_mtime(path: &Path) -> Result<i64> {
    let modified = std::fs::metadata(path)?.modified()?;
    let seconds = modified
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::Internal(format!("mtime before epoch: {e}")))?
        .as_secs();
    Ok(seconds as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn builder_with(probe: &str) -> MemoBuilder {
        MemoBuilder::new(TaskLimiter::new(4)).with_probe_command(probe)
    }

    #[cfg(unix)]
    fn write_probe_stub(dir: &Path, log: &Path) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let script = dir.join("fake-ffprobe");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho run >> \"{}\"\necho 12.5\n", log.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unchanged_mtime_reuses_previous_duration() {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("RJ123456");
        std::fs::create_dir(&work).unwrap();
        std::fs::write(work.join("track.mp3"), b"audio").unwrap();

        let log = tmp.path().join("probe.log");
        let probe = write_probe_stub(tmp.path(), &log);
        let builder = builder_with(probe.to_str().unwrap());

        let first = builder.build(&work, &Memo::default()).await.unwrap();
        assert_eq!(first.files["track.mp3"].duration, Some(12.5));
        assert_eq!(std::fs::read_to_string(&log).unwrap().lines().count(), 1);

        // same mtime: no new probe, identical stamp
        let second = builder.build(&work, &first).await.unwrap();
        assert_eq!(second.files["track.mp3"], first.files["track.mp3"]);
        assert_eq!(std::fs::read_to_string(&log).unwrap().lines().count(), 1);

        // bumped mtime: probe runs again
        let file = std::fs::File::options()
            .write(true)
            .open(work.join("track.mp3"))
            .unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(30))
            .unwrap();
        drop(file);

        let third = builder.build(&work, &second).await.unwrap();
        assert_eq!(std::fs::read_to_string(&log).unwrap().lines().count(), 2);
        assert_ne!(third.files["track.mp3"].mtime, second.files["track.mp3"].mtime);
    }

    #[tokio::test]
    async fn probe_failure_records_unknown_duration() {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("RJ000002");
        std::fs::create_dir(&work).unwrap();
        std::fs::write(work.join("broken.wav"), b"x").unwrap();

        let builder = builder_with("false");
        let memo = builder.build(&work, &Memo::default()).await.unwrap();
        assert_eq!(memo.files["broken.wav"].duration, None);
    }

    #[tokio::test]
    async fn subtitle_anywhere_sets_lyric_flag() {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("RJ000003");
        std::fs::create_dir_all(work.join("sub")).unwrap();
        std::fs::write(work.join("sub/lyrics.lrc"), b"[00:00] la").unwrap();
        std::fs::write(work.join("readme.txt"), b"hello").unwrap();

        let builder = builder_with("false");
        let memo = builder.build(&work, &Memo::default()).await.unwrap();
        assert!(memo.lyric);
        assert!(memo.files.is_empty());
    }

    #[test]
    fn classifies_by_extension() {
        assert_eq!(FileKind::of(Path::new("a/b.MP3")), FileKind::Audio);
        assert_eq!(FileKind::of(Path::new("c.ass")), FileKind::Subtitle);
        assert_eq!(FileKind::of(Path::new("cover.webp")), FileKind::Image);
        assert_eq!(FileKind::of(Path::new("notes.txt")), FileKind::Text);
        assert_eq!(FileKind::of(Path::new("archive.zip")), FileKind::Other);
        assert_eq!(FileKind::of(Path::new("noext")), FileKind::Other);
    }

    #[test]
    fn memo_round_trips_through_json() {
        let mut memo = Memo::default();
        memo.lyric = true;
        memo.files.insert(
            "a.mp3".into(),
            FileStamp {
                mtime: 1_700_000_000,
                duration: Some(61.5),
            },
        );
        memo.files.insert(
            "b.mp3".into(),
            FileStamp {
                mtime: 1_700_000_001,
                duration: None,
            },
        );

        let json = serde_json::to_string(&memo).unwrap();
        let back: Memo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, memo);
    }
}
