//! Per-user directories where model artifacts are looked up.

use std::path::{Path, PathBuf};

use crate::common::DEFAULT_WEIGHTS_FILE;

#[derive(Debug)]
pub enum FsAccess {
    Cache,
}

impl FsAccess {
    /// Base directory for this kind, with the `pneumo` subdirectory appended.
    fn get_path(&self) -> anyhow::Result<PathBuf> {
        let base_path = match self {
            FsAccess::Cache => dirs::cache_dir(),
        };

        let mut path = base_path.ok_or_else(|| {
            anyhow::anyhow!("Unsupported operating system. Supported OS: Linux, MacOS, Windows.")
        })?;
        path.push("pneumo");
        Ok(path)
    }

    /// Well-known location of a model artifact, without touching the filesystem.
    ///
    /// Example: `~/.cache/pneumo/models/conv_MLP_84.onnx`.
    pub fn model_file(&self, file_name: &str) -> anyhow::Result<PathBuf> {
        Ok(self.get_path()?.join("models").join(file_name))
    }

    /// Resolves a configured weights path: used as-is when it exists, otherwise the file
    /// name is looked up in the per-user cache. Returns the configured path unchanged when
    /// neither exists so the engine can report it.
    pub fn resolve_weights(configured: &str) -> PathBuf {
        let configured_path = Path::new(configured);
        if configured_path.exists() {
            return configured_path.to_path_buf();
        }

        let file_name = configured_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_WEIGHTS_FILE);

        match FsAccess::Cache.model_file(file_name) {
            Ok(cached) if cached.exists() => {
                log::info!("Using cached model artifact {}", cached.display());
                cached
            }
            _ => configured_path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_model_lives_under_models() {
        if let Ok(path) = FsAccess::Cache.model_file("weights.onnx") {
            assert!(path.ends_with("pneumo/models/weights.onnx"));
        }
    }

    #[test]
    fn existing_path_is_kept() {
        let here = std::env::temp_dir();
        assert_eq!(FsAccess::resolve_weights(&here.to_string_lossy()), here);
    }

    #[test]
    fn unknown_path_is_returned_unchanged() {
        let missing = "/definitely/not/here/model_xyz_0.onnx";
        assert_eq!(FsAccess::resolve_weights(missing), PathBuf::from(missing));
    }
}
