// Human-readable reporting for the CLI: sizes, structure previews and the
// summary tables printed to stderr.

use crate::catalog::{Analysis, TableRecord};
use crate::extractor::ExtractionOutcome;
use std::io::{self, Write};

// Longest structure text shown in reports; extraction never uses this.
pub const STRUCTURE_PREVIEW_BYTES: usize = 50_000;

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

// Structure text cut to `limit` bytes on a char boundary, with a marker when cut.
pub fn structure_preview(structure: &str, limit: usize) -> String {
    if structure.len() <= limit {
        return structure.to_string();
    }
    let mut end = limit;
    while !structure.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}\n\n... (truncated, structure too large) ...",
        &structure[..end]
    )
}

fn describe(table: &TableRecord) -> String {
    if table.has_create() {
        format!("lines {}-{}", table.create_start, table.create_end)
    } else {
        "no CREATE".to_string()
    }
}

pub fn print_summary<W: Write>(out: &mut W, analysis: &Analysis) -> io::Result<()> {
    let s = &analysis.summary;
    let sep = "=".repeat(60);
    writeln!(out, "\n{}\nSUMMARY\n{}", sep, sep)?;
    writeln!(out, "Size:     {}", format_bytes(s.total_size_bytes))?;
    writeln!(out, "Lines:    {}", s.total_lines)?;
    writeln!(out, "Tables:   {} ({} CREATE blocks)", analysis.catalog.len(), s.total_tables)?;
    writeln!(out, "Inserts:  {}", s.total_inserts)?;
    writeln!(out, "Rows:     ~{}", s.total_rows_estimated)?;
    if s.has_create_database {
        writeln!(out, "Contains CREATE DATABASE")?;
    }
    if s.has_drop_statements {
        writeln!(out, "Contains DROP TABLE")?;
    }
    for stmt in &s.use_statements {
        writeln!(out, "Uses:     {}", stmt)?;
    }
    writeln!(out, "{}", sep)
}

pub fn print_tables<W: Write>(out: &mut W, analysis: &Analysis) -> io::Result<()> {
    writeln!(
        out,
        "{:<32} {:>10} {:>12} {:>12} {:<10} {:<10} {}",
        "TABLE", "INSERTS", "ROWS", "SIZE", "ENGINE", "CHARSET", "CREATE"
    )?;
    for (name, t) in analysis.catalog.iter() {
        writeln!(
            out,
            "{:<32} {:>10} {:>12} {:>12} {:<10} {:<10} {}",
            name,
            t.insert_count,
            t.estimated_rows,
            format_bytes(t.size_bytes),
            t.engine,
            t.charset,
            describe(t)
        )?;
    }
    Ok(())
}

pub fn print_outcomes<W: Write>(out: &mut W, outcomes: &[ExtractionOutcome]) -> io::Result<()> {
    for o in outcomes {
        let status = if o.success { "ok" } else { "FAILED" };
        writeln!(out, "{:<6} {:<32} {}", status, o.table, o.message)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{DumpScanner, ScanOptions};

    #[test]
    fn bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024 * 1024), "3072 GB");
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(structure_preview("short", 10), "short");
        let cut = structure_preview("ééé", 3);
        assert!(cut.starts_with("é\n\n..."));
        assert!(cut.ends_with("(truncated, structure too large) ..."));
    }

    #[test]
    fn tables_listing() {
        let dump = "CREATE TABLE t (`a` int) ENGINE=InnoDB;\nINSERT INTO u VALUES (1);\n";
        let analysis =
            DumpScanner::scan_reader(dump.as_bytes(), ScanOptions::default(), None).unwrap();
        let mut buf = Vec::new();
        print_tables(&mut buf, &analysis).unwrap();
        print_summary(&mut buf, &analysis).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("lines 1-1"));
        assert!(text.contains("no CREATE"));
        assert!(text.contains("InnoDB"));
        assert!(text.contains("Inserts:  1"));
    }
}
