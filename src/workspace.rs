// Work unit: one dump, its analysis and its output directory.
// This is the explicit context handed to extraction; nothing is kept in globals,
// so several dumps can be served side by side without sharing state.

use crate::catalog::Analysis;
use crate::error::{DumpError, Result};
use crate::extractor::{self, ExtractMode, ExtractOptions, ExtractionOutcome};
use crate::input;
use crate::progress::ProgressManager;
use crate::scanner::{DumpScanner, ScanOptions};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, Serialize)]
pub struct OutputFile {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

pub struct WorkUnit {
    pub id: String,
    pub source: PathBuf,
    pub dump_path: PathBuf,
    pub output_dir: PathBuf,
    pub analysis: Analysis,
}

// Stable id for a dump: blake3 over its path, size and modification time, so a
// dump rewritten in place gets fresh work and split directories.
fn work_unit_id(path: &Path, meta: &fs::Metadata) -> String {
    let modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_nanos());
    let mut hasher = blake3::Hasher::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update(&meta.len().to_le_bytes());
    hasher.update(&modified.to_le_bytes());
    hex::encode(&hasher.finalize().as_bytes()[..8])
}

impl WorkUnit {
    /// Prepare (decompressing if needed) and scan a dump.
    ///
    /// Everything this unit writes lives under `output_root`.
    pub fn analyze(
        source: &Path,
        output_root: &Path,
        options: ScanOptions,
        progress: &ProgressManager,
    ) -> Result<Self> {
        let meta = fs::metadata(source).map_err(|e| DumpError::input(source, e))?;
        let id = work_unit_id(source, &meta);
        let work_dir = output_root.join(format!("{}_work", id));
        let dump_path = input::prepare_dump(source, &work_dir)?;

        let bar = progress.new_file_bar(&dump_path, "Analyzing");
        let analysis = DumpScanner::scan_file(&dump_path, options, bar.as_ref())?;
        tracing::info!(
            "Analyzed {}: {} tables, {} INSERT statements, ~{} rows",
            source.display(),
            analysis.catalog.len(),
            analysis.summary.total_inserts,
            analysis.summary.total_rows_estimated
        );

        Ok(Self {
            output_dir: output_root.join(format!("{}_split", id)),
            id,
            source: source.to_path_buf(),
            dump_path,
            analysis,
        })
    }

    /// Extract the given tables into this unit's output directory.
    pub fn split(
        &self,
        tables: &[String],
        options: &ExtractOptions,
        progress: &ProgressManager,
    ) -> Vec<ExtractionOutcome> {
        let bar = match options.mode {
            ExtractMode::Shared => {
                progress.new_line_bar(self.analysis.summary.total_lines, "Splitting")
            }
            ExtractMode::PerTable => progress.new_table_bar(tables.len() as u64),
        };
        let outcomes = extractor::extract_tables(
            &self.dump_path,
            &self.analysis.catalog,
            tables,
            &self.output_dir,
            options,
            bar.as_ref(),
        );
        let failed = outcomes.iter().filter(|o| !o.success).count();
        if failed > 0 {
            tracing::warn!("{} of {} tables failed to extract", failed, outcomes.len());
        } else {
            tracing::info!("Extracted {} tables to {}", outcomes.len(), self.output_dir.display());
        }
        outcomes
    }

    // Names of every table in the catalog, in dump order.
    pub fn table_names(&self) -> Vec<String> {
        self.analysis.catalog.names().map(str::to_string).collect()
    }

    /// Resolve a produced file by name, refusing anything that could leave the output directory.
    pub fn output_file(&self, name: &str) -> Result<PathBuf> {
        let bad = name.is_empty()
            || name.contains("..")
            || name.contains('/')
            || name.contains('\\')
            || name.contains('\0')
            || name.chars().any(|c| matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*'));
        if bad {
            return Err(DumpError::InvalidFileName(name.to_string()));
        }
        let path = self.output_dir.join(name);
        if !path.is_file() {
            return Err(DumpError::input(
                &path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such output file"),
            ));
        }
        Ok(path)
    }

    // Files produced so far, sorted by name.
    pub fn list_outputs(&self) -> Result<Vec<OutputFile>> {
        let entries = match fs::read_dir(&self.output_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DumpError::input(&self.output_dir, e)),
        };
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DumpError::input(&self.output_dir, e))?;
            let meta = entry
                .metadata()
                .map_err(|e| DumpError::input(entry.path(), e))?;
            if meta.is_file() {
                files.push(OutputFile {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    path: entry.path(),
                    size_bytes: meta.len(),
                });
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    // Remove the split output and any decompressed copy of the dump.
    pub fn cleanup(self) -> Result<()> {
        if self.output_dir.exists() {
            fs::remove_dir_all(&self.output_dir)
                .map_err(|e| DumpError::output(&self.output_dir, e))?;
        }
        if self.dump_path != self.source {
            if let Some(work_dir) = self.dump_path.parent() {
                fs::remove_dir_all(work_dir).map_err(|e| DumpError::output(work_dir, e))?;
            }
        }
        tracing::debug!("workspace: cleaned up {}", self.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "CREATE TABLE `a` (\n  `id` int\n);\nINSERT INTO `a` VALUES (1),(2);\nINSERT INTO `b` VALUES (1);\n";

    fn unit(dir: &Path) -> WorkUnit {
        let dump = dir.join("shop.sql");
        fs::write(&dump, DUMP).unwrap();
        WorkUnit::analyze(
            &dump,
            &dir.join("outputs"),
            ScanOptions::default(),
            &ProgressManager::disabled(),
        )
        .unwrap()
    }

    #[test]
    fn analyze_split_list_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let unit = unit(dir.path());
        assert_eq!(unit.table_names(), vec!["a", "b"]);
        assert_eq!(unit.dump_path, dir.path().join("shop.sql"));

        let outcomes = unit.split(
            &unit.table_names(),
            &ExtractOptions::default(),
            &ProgressManager::disabled(),
        );
        assert!(outcomes.iter().all(|o| o.success));

        let files = unit.list_outputs().unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.sql", "b.sql"]);
        assert_eq!(files[1].size_bytes, "INSERT INTO `b` VALUES (1);\n".len() as u64);

        let out_dir = unit.output_dir.clone();
        unit.cleanup().unwrap();
        assert!(!out_dir.exists());
        assert!(dir.path().join("shop.sql").exists());
    }

    #[test]
    fn output_names_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        let unit = unit(dir.path());
        unit.split(&["a".to_string()], &ExtractOptions::default(), &ProgressManager::disabled());

        assert!(unit.output_file("a.sql").is_ok());
        for bad in ["../shop.sql", "x/a.sql", "a?.sql", ""] {
            assert!(matches!(
                unit.output_file(bad),
                Err(DumpError::InvalidFileName(_))
            ));
        }
        assert!(matches!(
            unit.output_file("b.sql"),
            Err(DumpError::InputUnreadable { .. })
        ));
    }

    #[test]
    fn separate_units_do_not_share_output() {
        let dir = tempfile::tempdir().unwrap();
        let first = unit(dir.path());
        let other = dir.path().join("other.sql");
        fs::write(&other, "INSERT INTO `z` VALUES (1);\n").unwrap();
        let second = WorkUnit::analyze(
            &other,
            &dir.path().join("outputs"),
            ScanOptions::default(),
            &ProgressManager::disabled(),
        )
        .unwrap();
        assert_ne!(first.id, second.id);
        assert_ne!(first.output_dir, second.output_dir);
        assert!(second.analysis.catalog.get("a").is_none());
    }

    #[test]
    fn rewritten_dump_gets_a_new_id() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("shop.sql");
        fs::write(&dump, "INSERT INTO `a` VALUES (1);\n").unwrap();
        let before = work_unit_id(&dump, &fs::metadata(&dump).unwrap());
        assert_eq!(before, work_unit_id(&dump, &fs::metadata(&dump).unwrap()));

        // Same length, different content and timestamp.
        fs::write(&dump, "INSERT INTO `b` VALUES (2);\n").unwrap();
        let file = fs::File::options().write(true).open(&dump).unwrap();
        file.set_modified(UNIX_EPOCH + std::time::Duration::from_secs(1_000_000))
            .unwrap();
        drop(file);
        let after = work_unit_id(&dump, &fs::metadata(&dump).unwrap());
        assert_ne!(before, after);
    }
}
