// Dump scanner: one forward pass that records where every table's CREATE block
// and INSERT statements live, plus database-level signals.
// The CREATE state machine is per scan: at most one CREATE TABLE block is open at a time.

use crate::catalog::{Analysis, Catalog, DatabaseSummary, TableRecord};
use crate::error::{DumpError, Result};
use crate::parser::insert::estimate_rows;
use crate::parser::schema::analyze_structure;
use crate::parser::{self, LineClass};
use indicatif::ProgressBar;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

const READ_BUFFER: usize = 1024 * 1024;
const LOG_EVERY_BYTES: u64 = 100 * 1024 * 1024;

/// What to do when a CREATE TABLE names a table that is already in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Last write wins: the new record replaces the old one, including its INSERT statistics.
    #[default]
    Replace,
    /// The new record takes over INSERT statistics already attributed to the name.
    Merge,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub duplicate_policy: DuplicatePolicy,
    // Cap on buffered CREATE TABLE text per table. Positions stay exact when it trips;
    // only the stored structure (and what is derived from it) is cut short.
    pub max_structure_bytes: Option<usize>,
}

// CREATE TABLE block currently being collected.
struct OpenCreate {
    name: String,
    record: TableRecord,
    text: String,
    truncated: bool,
}

enum ScanState {
    Outside,
    InCreate(OpenCreate),
}

pub struct DumpScanner {
    options: ScanOptions,
    catalog: Catalog,
    summary: DatabaseSummary,
    state: ScanState,
    line_no: u64,
}

impl DumpScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            catalog: Catalog::new(),
            summary: DatabaseSummary::default(),
            state: ScanState::Outside,
            line_no: 0,
        }
    }

    // Scan a dump file from disk. Failing to open or read it aborts the analysis.
    pub fn scan_file(
        path: &Path,
        options: ScanOptions,
        bar: Option<&ProgressBar>,
    ) -> Result<Analysis> {
        tracing::debug!("scan: opening {}", path.display());
        let file = File::open(path).map_err(|e| DumpError::input(path, e))?;
        let reader = BufReader::with_capacity(READ_BUFFER, file);
        let analysis =
            Self::scan_reader(reader, options, bar).map_err(|e| DumpError::input(path, e))?;
        tracing::debug!(
            "scan: {} lines, {} bytes, {} tables in {}",
            analysis.summary.total_lines,
            analysis.summary.total_size_bytes,
            analysis.catalog.len(),
            path.display()
        );
        Ok(analysis)
    }

    // Scan any buffered stream of dump text.
    pub fn scan_reader<R: BufRead>(
        mut reader: R,
        options: ScanOptions,
        bar: Option<&ProgressBar>,
    ) -> io::Result<Analysis> {
        let mut scanner = Self::new(options);
        let mut line = Vec::new();
        let mut last_logged: u64 = 0;

        while reader.read_until(b'\n', &mut line)? > 0 {
            scanner.feed_line(&line);
            if let Some(b) = bar {
                b.inc(line.len() as u64);
            } else if scanner.summary.total_size_bytes - last_logged > LOG_EVERY_BYTES {
                tracing::debug!("scan: {} bytes read", scanner.summary.total_size_bytes);
                last_logged = scanner.summary.total_size_bytes;
            }
            line.clear();
        }

        if let Some(b) = bar {
            b.finish();
        }
        Ok(scanner.finish())
    }

    // Process one raw line, newline included. Invalid UTF-8 is matched lossily,
    // byte counts always use the raw length.
    pub fn feed_line(&mut self, raw: &[u8]) {
        self.line_no += 1;
        let len = raw.len() as u64;
        self.summary.total_size_bytes += len;

        let text = String::from_utf8_lossy(raw);
        let trimmed = text.trim();
        let class = parser::classify_line(trimmed);

        if let Some(name) = &class.create_table {
            if let ScanState::InCreate(open) =
                std::mem::replace(&mut self.state, ScanState::Outside)
            {
                self.close_create(open, self.line_no - 1);
            }
            tracing::debug!("scan: CREATE TABLE {} at line {}", name, self.line_no);
            self.state = ScanState::InCreate(OpenCreate {
                name: name.to_string(),
                record: TableRecord::with_create_start(self.line_no),
                text: String::new(),
                truncated: false,
            });
            self.append_create_text(&text);
        } else if matches!(self.state, ScanState::InCreate(_)) {
            self.append_create_text(&text);
        }

        if let Some(name) = &class.insert_into {
            let rows = estimate_rows(trimmed);
            self.catalog.entry(name).record_insert(self.line_no, len, rows);
            self.summary.total_inserts += 1;
            self.summary.total_rows_estimated += rows;
        }

        if parser::has_terminator(trimmed) {
            if let ScanState::InCreate(open) =
                std::mem::replace(&mut self.state, ScanState::Outside)
            {
                self.close_create(open, self.line_no);
            }
        }

        self.record_signals(&class, trimmed);
    }

    // Close any CREATE block still open at end of input and hand back the results.
    pub fn finish(mut self) -> Analysis {
        if let ScanState::InCreate(open) = std::mem::replace(&mut self.state, ScanState::Outside)
        {
            tracing::debug!("scan: CREATE TABLE {} still open at end of input", open.name);
            self.close_create(open, self.line_no);
        }
        self.summary.total_lines = self.line_no;
        Analysis {
            catalog: self.catalog,
            summary: self.summary,
        }
    }

    fn append_create_text(&mut self, text: &str) {
        let cap = self.options.max_structure_bytes;
        if let ScanState::InCreate(open) = &mut self.state {
            if open.truncated {
                return;
            }
            if let Some(cap) = cap {
                if open.text.len() + text.len() > cap {
                    tracing::warn!(
                        "scan: CREATE TABLE {} exceeds {} bytes, structure truncated",
                        open.name,
                        cap
                    );
                    open.truncated = true;
                    return;
                }
            }
            open.text.push_str(text);
        }
    }

    fn close_create(&mut self, open: OpenCreate, end_line: u64) {
        let OpenCreate {
            name,
            mut record,
            text,
            ..
        } = open;
        record.create_end = end_line;
        analyze_structure(&text).apply_to(&mut record);
        record.structure = text;
        record.finalize_stats();

        if let Some(previous) = self.catalog.insert(&name, record) {
            match self.options.duplicate_policy {
                DuplicatePolicy::Replace => {
                    if previous.insert_count > 0 {
                        tracing::debug!(
                            "scan: CREATE TABLE {} replaces an earlier record, dropping {} INSERT statements",
                            name,
                            previous.insert_count
                        );
                    }
                }
                DuplicatePolicy::Merge => self.catalog.entry(&name).absorb_inserts(previous),
            }
        }
        self.summary.total_tables += 1;
        tracing::debug!(
            "scan: table {} structure spans lines {}..={}",
            name,
            self.catalog.get(&name).map_or(0, |t| t.create_start),
            end_line
        );
    }

    fn record_signals(&mut self, class: &LineClass<'_>, trimmed: &str) {
        if class.drop_table {
            self.summary.has_drop_statements = true;
        }
        if class.create_database {
            self.summary.has_create_database = true;
        }
        if class.set {
            self.summary.set_statements.push(trimmed.to_string());
        }
        if class.use_database {
            self.summary.use_statements.push(trimmed.to_string());
        }
    }
}
