// Parser module: line signatures, INSERT row estimation and CREATE TABLE structure.
// Each signature is its own small matcher; nothing here tokenizes SQL.

pub mod insert;
pub mod schema;

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

// Optional backticks; a schema-qualified name (`db`.`t` or db.t) keeps its qualifier.
// The first part stops at backtick, whitespace or '(' and never ends with a dot.
static CREATE_TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?",
        r"`?([^`\s(]*[^`\s(.])`?(?:\.`?([^`\s(]+)`?)?"
    ))
    .expect("valid create table regex")
});

static INSERT_INTO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)INSERT\s+INTO\s+`?([^`\s(]*[^`\s(.])`?(?:\.`?([^`\s(]+)`?)?")
        .expect("valid insert regex")
});

static DROP_TABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^DROP\s+TABLE").expect("valid drop table regex"));

static CREATE_DATABASE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^CREATE\s+DATABASE").expect("valid create database regex"));

// Case-sensitive on purpose: mysqldump writes SET in upper case.
static SET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^SET").expect("valid set regex"));

static USE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^USE\s+`").expect("valid use regex"));

fn table_name<'a>(re: &Regex, line: &'a str) -> Option<Cow<'a, str>> {
    let cap = re.captures(line)?;
    let first = cap.get(1)?.as_str();
    match cap.get(2) {
        Some(table) => Some(Cow::Owned(format!("{}.{}", first, table.as_str()))),
        None => Some(Cow::Borrowed(first)),
    }
}

// Table named by a CREATE TABLE statement on this line.
pub fn create_table_name(line: &str) -> Option<Cow<'_, str>> {
    table_name(&CREATE_TABLE_RE, line)
}

// Table named by an INSERT INTO statement on this line.
pub fn insert_table_name(line: &str) -> Option<Cow<'_, str>> {
    table_name(&INSERT_INTO_RE, line)
}

pub fn is_drop_table(line: &str) -> bool {
    DROP_TABLE_RE.is_match(line.trim_start())
}

pub fn is_create_database(line: &str) -> bool {
    CREATE_DATABASE_RE.is_match(line.trim_start())
}

pub fn is_set(line: &str) -> bool {
    SET_RE.is_match(line.trim_start())
}

pub fn is_use(line: &str) -> bool {
    USE_RE.is_match(line.trim_start())
}

// True when the line ends (or contains the end of) a statement.
pub fn has_terminator(line: &str) -> bool {
    line.contains(';')
}

/// Every signature found on one line. A line may carry several.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineClass<'a> {
    pub create_table: Option<Cow<'a, str>>,
    pub insert_into: Option<Cow<'a, str>>,
    pub drop_table: bool,
    pub create_database: bool,
    pub set: bool,
    pub use_database: bool,
}

/// Match a trimmed line against all statement signatures.
pub fn classify_line(line: &str) -> LineClass<'_> {
    LineClass {
        create_table: create_table_name(line),
        insert_into: insert_table_name(line),
        drop_table: is_drop_table(line),
        create_database: is_create_database(line),
        set: is_set(line),
        use_database: is_use(line),
    }
}
