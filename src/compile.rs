//! Loading compiled artifacts, compiling source targets on the fly.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

use tayt_types::CompiledArtifact;
use tracing::debug;

/// How source targets are turned into artifacts.
#[derive(Debug, Clone)]
pub struct Compiler {
    pub command: String,
    pub cairo_path: Vec<PathBuf>,
}

impl Compiler {
    pub fn new(command: impl Into<String>, cairo_path: Vec<PathBuf>) -> Self {
        Self {
            command: command.into(),
            cairo_path,
        }
    }

    /// Load `path`: `.json` files are read as-is, anything else is compiled first.
    ///
    /// A missing ABI is not an error here; setup reports it.
    pub fn load(&self, path: &Path) -> Result<CompiledArtifact> {
        let bytes = if is_compiled(path) {
            std::fs::read(path).with_context(|| format!("read artifact {}", path.display()))?
        } else {
            self.compile(path)?
        };
        match CompiledArtifact::from_slice(&bytes) {
            Ok(artifact) => Ok(artifact),
            Err(tayt_types::ArtifactError::MissingAbi) => Err(anyhow!("No abi generated.")),
            Err(e) => Err(anyhow!(e)).with_context(|| format!("parse artifact {}", path.display())),
        }
    }

    fn compile(&self, path: &Path) -> Result<Vec<u8>> {
        let mut cmd = Command::new(&self.command);
        cmd.arg(path);
        if !self.cairo_path.is_empty() {
            let joined = std::env::join_paths(&self.cairo_path)
                .context("join cairo path entries")?;
            cmd.arg("--cairo_path").arg(joined);
        }
        cmd.arg("--debug_info_with_source");

        debug!(compiler = %self.command, target = %path.display(), "compiling");
        let output = cmd
            .output()
            .with_context(|| format!("run compiler '{}'", self.command))?;
        if !output.status.success() {
            return Err(anyhow!(
                "compiling {} failed ({}):\n{}",
                path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim_end()
            ));
        }
        Ok(output.stdout)
    }
}

fn is_compiled(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}
