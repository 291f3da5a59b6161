//! Cover image cache
//!
//! Flat directory of downloaded cover variants, one file per
//! (work code, variant). Deletion is best-effort: reconciliation removes
//! covers for works that no longer exist, and a missing file is not an
//! error there.

use std::path::{Path, PathBuf};
use vwlib_common::{Error, Result};

/// Cover image variants downloaded per work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoverVariant {
    /// Full-size main image
    Main,
    /// Sample/thumbnail crop
    Sam,
    /// 240x240 resized thumbnail
    Thumb240,
}

/// Every variant the pipeline maintains, in download order
pub const ALL_VARIANTS: [CoverVariant; 3] =
    [CoverVariant::Main, CoverVariant::Sam, CoverVariant::Thumb240];

impl CoverVariant {
    /// Stable key used in file names and image URLs
    pub fn key(self) -> &'static str {
        match self {
            CoverVariant::Main => "main",
            CoverVariant::Sam => "sam",
            CoverVariant::Thumb240 => "240x240",
        }
    }
}

impl std::fmt::Display for CoverVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Filesystem-backed cover cache
#[derive(Debug, Clone)]
pub struct CoverCache {
    dir: PathBuf,
}

impl CoverCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the cache directory. Bootstrap treats failure as fatal.
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("cannot create cover cache {}: {e}", self.dir.display()),
            ))
        })
    }

    /// Path of one cached variant
    pub fn path(&self, code: &str, variant: CoverVariant) -> PathBuf {
        self.dir.join(format!("{code}_img_{}.jpg", variant.key()))
    }

    pub fn exists(&self, code: &str, variant: CoverVariant) -> bool {
        self.path(code, variant).is_file()
    }

    /// Variants not yet present for this code
    pub fn missing_variants(&self, code: &str) -> Vec<CoverVariant> {
        ALL_VARIANTS
            .into_iter()
            .filter(|v| !self.exists(code, *v))
            .collect()
    }

    pub async fn save(&self, code: &str, variant: CoverVariant, bytes: &[u8]) -> Result<()> {
        let path = self.path(code, variant);
        tokio::fs::write(&path, bytes).await.map_err(Error::Io)
    }

    /// Remove every cached variant for a code; missing files are fine
    pub async fn delete_all(&self, code: &str) -> Result<()> {
        for variant in ALL_VARIANTS {
            match tokio::fs::remove_file(self.path(code, variant)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_exists_missing_delete_cycle() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CoverCache::new(tmp.path().join("covers"));
        cache.ensure_dir().unwrap();

        let code = "RJ123456";
        assert_eq!(cache.missing_variants(code), ALL_VARIANTS.to_vec());

        cache.save(code, CoverVariant::Main, b"jpeg").await.unwrap();
        cache.save(code, CoverVariant::Sam, b"jpeg").await.unwrap();

        assert!(cache.exists(code, CoverVariant::Main));
        assert!(!cache.exists(code, CoverVariant::Thumb240));
        assert_eq!(cache.missing_variants(code), vec![CoverVariant::Thumb240]);

        cache.delete_all(code).await.unwrap();
        assert_eq!(cache.missing_variants(code), ALL_VARIANTS.to_vec());

        // deleting again hits only missing files, still fine
        cache.delete_all(code).await.unwrap();
    }

    #[test]
    fn file_naming_scheme() {
        let cache = CoverCache::new("/tmp/covers");
        assert_eq!(
            cache.path("RJ000001", CoverVariant::Thumb240),
            PathBuf::from("/tmp/covers/RJ000001_img_240x240.jpg")
        );
    }
}
