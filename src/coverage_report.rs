//! Line coverage report: source files with executed lines starred.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tayt_core::fuzz::CoverageSnapshot;
use tayt_core::ClassHash;
use tayt_types::CompiledArtifact;
use tracing::{info, warn};

/// Source files touched by the covered instructions, in first-seen order.
#[derive(Debug, Default)]
pub struct CoverageReport {
    files: Vec<(String, Vec<String>)>,
}

impl CoverageReport {
    /// Map every covered instruction back to its source spans. Source files
    /// are read relative to `source_root`; generated files are skipped.
    pub fn build(
        snapshot: &CoverageSnapshot,
        classes: &HashMap<ClassHash, Arc<CompiledArtifact>>,
        source_root: &Path,
    ) -> Self {
        let mut files: Vec<(String, Vec<String>)> = Vec::new();
        let mut index: BTreeMap<String, Option<usize>> = BTreeMap::new();

        for (instance, pcs) in &snapshot.pcs {
            let Some(artifact) = snapshot
                .classes
                .get(instance)
                .and_then(|class_hash| classes.get(class_hash))
            else {
                warn!(instance = %instance.to_hex_string(), "no program known for covered instance");
                continue;
            };

            for pc in pcs {
                for span in artifact.source_spans(*pc) {
                    if span.filename.starts_with("autogen/") {
                        continue;
                    }
                    let slot = *index.entry(span.filename.clone()).or_insert_with(|| {
                        let path = source_root.join(&span.filename);
                        match std::fs::read_to_string(&path) {
                            Ok(text) => {
                                files.push((
                                    span.filename.clone(),
                                    text.split_inclusive('\n').map(str::to_string).collect(),
                                ));
                                Some(files.len() - 1)
                            }
                            Err(e) => {
                                warn!(file = %path.display(), error = %e, "cannot read source file");
                                None
                            }
                        }
                    });
                    let Some(slot) = slot else { continue };

                    let lines = &mut files[slot].1;
                    let start = (span.start_line as usize).saturating_sub(1);
                    let end = (span.end_line as usize).min(lines.len());
                    for line in lines.iter_mut().take(end).skip(start) {
                        if !line.starts_with('*') {
                            line.insert(0, '*');
                        }
                    }
                }
            }
        }

        Self { files }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (filename, lines) in &self.files {
            let _ = writeln!(out, "\n{filename}");
            for line in lines {
                out.push_str(line);
            }
        }
        out
    }

    /// Write `covered.<unix-seconds>.txt` into `dir` and return its path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(format!("covered.{}.txt", chrono::Utc::now().timestamp()));
        std::fs::write(&path, self.render())
            .with_context(|| format!("write coverage report {}", path.display()))?;
        info!("Coverage in {}", path.display());
        Ok(path)
    }
}
