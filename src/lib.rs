// sqldumpsplit: analyze a SQL dump in one streaming pass, then split selected
// tables into standalone files using the recorded line positions.

pub mod catalog;
pub mod error;
pub mod extractor;
pub mod input;
pub mod logger;
pub mod parser;
pub mod progress;
pub mod report;
pub mod scanner;
pub mod workspace;

pub use catalog::{Analysis, Catalog, DatabaseSummary, TableRecord};
pub use error::{DumpError, Result};
pub use extractor::{ExtractMode, ExtractOptions, ExtractionOutcome};
pub use scanner::{DumpScanner, DuplicatePolicy, ScanOptions};
pub use workspace::WorkUnit;
