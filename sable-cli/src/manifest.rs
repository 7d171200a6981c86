//! `sable.json` package manifest: name, version, and the main source file.
//! Absence of a manifest is not an error; the compiler then works on bare
//! source files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE_NAME: &str = "sable.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Entry-point source file, relative to the manifest.
    #[serde(default = "default_main")]
    pub main: String,
}

fn default_main() -> String {
    "main.sb".to_string()
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Manifest> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid manifest {}", path.display()))
    }

    /// Finds a manifest in `dir` and resolves its main file.
    pub fn discover(dir: &Path) -> Result<Option<(Manifest, PathBuf)>> {
        let manifest_path = dir.join(MANIFEST_FILE_NAME);
        if !manifest_path.exists() {
            return Ok(None);
        }
        let manifest = Manifest::load(&manifest_path)?;
        let main = dir.join(&manifest.main);
        Ok(Some((manifest, main)))
    }
}
