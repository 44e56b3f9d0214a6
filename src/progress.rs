// Progress bar management using indicatif.
// We keep all bars under one MultiProgress so they render on separate lines.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::fs;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct ProgressManager {
    multi: Option<Arc<MultiProgress>>,
}

impl ProgressManager {
    // Create a new manager. If enabled=false, no bars are created.
    pub fn new(enabled: bool) -> Self {
        let multi = if enabled {
            Some(Arc::new(MultiProgress::new()))
        } else {
            None
        };
        Self { multi }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    // Create a bar for file-byte progress with a label (the analysis pass).
    pub fn new_file_bar(&self, path: &Path, label: &str) -> Option<ProgressBar> {
        let mp = self.multi.as_ref()?;
        let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let bar = mp.add(ProgressBar::new(size));
        bar.set_style(progress_style());
        bar.set_prefix(label.to_string());
        Some(bar)
    }

    // Create a bar counting dump lines (the shared extraction pass).
    pub fn new_line_bar(&self, total_lines: u64, label: &str) -> Option<ProgressBar> {
        let mp = self.multi.as_ref()?;
        let bar = mp.add(ProgressBar::new(total_lines));
        bar.set_style(count_style());
        bar.set_prefix(label.to_string());
        Some(bar)
    }

    // Create a bar counting finished tables (per-table extraction).
    pub fn new_table_bar(&self, total: u64) -> Option<ProgressBar> {
        let mp = self.multi.as_ref()?;
        let bar = mp.add(ProgressBar::new(total));
        bar.set_style(count_style());
        bar.set_prefix("Extracting tables".to_string());
        Some(bar)
    }
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:20} {bytes:>10}/{total_bytes:<10} [{bar:50}] {percent:>3}%",
    )
    .expect("valid progress template")
    .progress_chars("█ ")
}

// Alternative style for non-byte counters (lines, tables).
fn count_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:20} {pos:>10}/{len:<10} [{bar:50}] {percent:>3}%")
        .expect("valid progress template")
        .progress_chars("█ ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_manager_creates_no_bars() {
        let pm = ProgressManager::disabled();
        assert!(pm.new_table_bar(3).is_none());
        assert!(pm.new_line_bar(10, "Splitting").is_none());
        assert!(pm.new_file_bar(Path::new("/nope"), "Scanning").is_none());
    }
}
