// Schema analysis: derives table options, columns and keys from one CREATE TABLE block.
// Like the rest of the parser this favors speed over perfect SQL parsing: every
// attribute is an independent regex and column lines are classified one at a time.

use crate::catalog::{Column, ColumnKey, ForeignKey, Index, TableRecord, UNKNOWN};
use once_cell::sync::Lazy;
use regex::Regex;

fn attr(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid table attribute regex")
}

static ENGINE_RE: Lazy<Regex> = Lazy::new(|| attr(r"(?i)ENGINE\s*=\s*(\w+)"));
static CHARSET_RE: Lazy<Regex> = Lazy::new(|| attr(r"(?i)CHARSET\s*=\s*(\w+)"));
static CHARACTER_SET_RE: Lazy<Regex> = Lazy::new(|| attr(r"(?i)CHARACTER\s+SET\s+(\w+)"));
static COLLATE_RE: Lazy<Regex> = Lazy::new(|| attr(r"(?i)COLLATE\s*=\s*([^\s;]+)"));
static AUTO_INCREMENT_RE: Lazy<Regex> = Lazy::new(|| attr(r"(?i)AUTO_INCREMENT\s*=\s*(\d+)"));
static ROW_FORMAT_RE: Lazy<Regex> = Lazy::new(|| attr(r"(?i)ROW_FORMAT\s*=\s*(\w+)"));
static DEFAULT_CHARSET_RE: Lazy<Regex> =
    Lazy::new(|| attr(r"(?i)DEFAULT\s+CHARSET\s*=\s*(\w+)"));

// `name` type[(args)] options...  (options stop at the first comma)
static COLUMN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^`([^`]+)`\s+([^\s,(]+(?:\([^)]+\))?)\s*(.*?)(?:,|$)")
        .expect("valid column regex")
});
static COLUMN_DEFAULT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)DEFAULT\s+([^,\s]+)").expect("valid default regex"));
static PRIMARY_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)PRIMARY\s+KEY\s*\(([^)]*)\)").expect("valid primary key regex"));
// Anchored so that `CONSTRAINT ... FOREIGN KEY (...)` lines are left for the FK matcher.
static INDEX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)^(?:(?:UNIQUE|FULLTEXT|SPATIAL)\s+)?(?:KEY|INDEX)\s+",
        r"(?:`?([^`\s(]+)`?)?\s*\((.+)\)"
    ))
    .expect("valid index regex")
});
static FOREIGN_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)FOREIGN\s+KEY").expect("valid foreign key regex"));
static REFERENCES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)REFERENCES\s+(?:`?[^`\s(]+`?\.)?`?([^`\s(]+)`?(?:\s*\(\s*`?([^`),]+)`?)?")
        .expect("valid references regex")
});

const QUOTES: &[char] = &['`', '\'', '"'];

/// Structural facts about one table, derived only from its CREATE TABLE text.
#[derive(Debug, Clone, PartialEq)]
pub struct TableStructure {
    pub engine: String,
    pub charset: String,
    pub collation: Option<String>,
    pub row_format: Option<String>,
    pub auto_increment: Option<u64>,
    pub columns: Vec<Column>,
    pub primary_key: Option<String>,
    pub indexes: Vec<Index>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Default for TableStructure {
    fn default() -> Self {
        Self {
            engine: UNKNOWN.to_string(),
            charset: UNKNOWN.to_string(),
            collation: None,
            row_format: None,
            auto_increment: None,
            columns: Vec::new(),
            primary_key: None,
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }
}

impl TableStructure {
    // Copy the structural fields onto a catalog record, leaving positions untouched.
    pub fn apply_to(self, record: &mut TableRecord) {
        record.engine = self.engine;
        record.charset = self.charset;
        record.collation = self.collation;
        record.row_format = self.row_format;
        record.auto_increment = self.auto_increment;
        record.columns = self.columns;
        record.primary_key = self.primary_key;
        record.indexes = self.indexes;
        record.foreign_keys = self.foreign_keys;
    }
}

fn first_capture<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Analyze the raw text of a CREATE TABLE block.
pub fn analyze_structure(block: &str) -> TableStructure {
    let mut s = TableStructure::default();

    if let Some(engine) = first_capture(&ENGINE_RE, block) {
        s.engine = engine.to_string();
    }
    if let Some(charset) = first_capture(&CHARSET_RE, block)
        .or_else(|| first_capture(&CHARACTER_SET_RE, block))
    {
        s.charset = charset.to_string();
    }
    s.collation = first_capture(&COLLATE_RE, block).map(|c| c.trim_matches(QUOTES).to_string());
    s.auto_increment = first_capture(&AUTO_INCREMENT_RE, block).and_then(|v| v.parse().ok());
    s.row_format = first_capture(&ROW_FORMAT_RE, block).map(str::to_string);
    if s.charset == UNKNOWN {
        if let Some(charset) = first_capture(&DEFAULT_CHARSET_RE, block) {
            s.charset = charset.to_string();
        }
    }

    if let Some(body) = definition_body(block) {
        for line in body.lines() {
            classify_definition(line.trim(), &mut s);
        }
    }
    s
}

// Text between the first '(' and the last ')' of the block.
fn definition_body(block: &str) -> Option<&str> {
    let open = block.find('(')?;
    let close = block.rfind(')')?;
    if close <= open {
        return None;
    }
    Some(&block[open + 1..close])
}

// Try each definition pattern in priority order; the first match wins.
fn classify_definition(line: &str, s: &mut TableStructure) {
    if let Some(cap) = COLUMN_RE.captures(line) {
        let options = cap.get(3).map_or("", |m| m.as_str().trim());
        let column = parse_column(&cap[1], &cap[2], options);
        // UNIQUE wins the key flag, but the column is still the primary key.
        if options.to_uppercase().contains("PRIMARY KEY") {
            s.primary_key = Some(column.name.clone());
        }
        s.columns.push(column);
    } else if let Some(list) = first_capture(&PRIMARY_KEY_RE, line) {
        let cols = column_list(list);
        if !cols.is_empty() {
            s.primary_key = Some(cols);
        }
    } else if let Some(cap) = INDEX_RE.captures(line) {
        let column = column_list(&cap[2]);
        if !column.is_empty() {
            let name = cap
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "index".to_string());
            s.indexes.push(Index { name, column });
        }
    } else if FOREIGN_KEY_RE.is_match(line) {
        if let Some(cap) = REFERENCES_RE.captures(line) {
            s.foreign_keys.push(ForeignKey {
                referenced_table: cap[1].to_string(),
                referenced_column: cap.get(2).map(|m| m.as_str().trim().to_string()),
            });
        }
    }
}

fn parse_column(name: &str, data_type: &str, options: &str) -> Column {
    let upper = options.to_uppercase();
    let key = if upper.contains("UNIQUE") {
        ColumnKey::Unique
    } else if upper.contains("PRIMARY KEY") {
        ColumnKey::Primary
    } else {
        ColumnKey::None
    };
    Column {
        name: name.to_string(),
        data_type: data_type.to_string(),
        nullable: !upper.contains("NOT NULL"),
        default: first_capture(&COLUMN_DEFAULT_RE, options)
            .map(|d| d.trim_matches(QUOTES).to_string()),
        extra: if upper.contains("AUTO_INCREMENT") {
            "auto_increment".to_string()
        } else {
            String::new()
        },
        key,
    }
}

// "`a`,`b`(10)" -> "a,b": quotes and prefix lengths removed.
fn column_list(list: &str) -> String {
    list.split(',')
        .map(|part| {
            let part = part.trim();
            let part = part.split('(').next().unwrap_or(part);
            part.trim().trim_matches(QUOTES).trim()
        })
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS: &str = "CREATE TABLE `users` (\n  `id` int(11) unsigned NOT NULL AUTO_INCREMENT,\n  `email` varchar(255) NOT NULL,\n  `name` varchar(100) DEFAULT 'anon',\n  `price` decimal(10,2) DEFAULT NULL,\n  `org_id` int(11) DEFAULT NULL,\n  PRIMARY KEY (`id`),\n  UNIQUE KEY `uk_email` (`email`),\n  KEY `idx_name` (`name`),\n  KEY `idx_org_name` (`org_id`,`name`(10)),\n  CONSTRAINT `fk_org` FOREIGN KEY (`org_id`) REFERENCES `orgs` (`id`) ON DELETE CASCADE\n) ENGINE=InnoDB AUTO_INCREMENT=42 DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci ROW_FORMAT=DYNAMIC;\n";

    #[test]
    fn table_options() {
        let s = analyze_structure(USERS);
        assert_eq!(s.engine, "InnoDB");
        assert_eq!(s.charset, "utf8mb4");
        assert_eq!(s.collation.as_deref(), Some("utf8mb4_unicode_ci"));
        assert_eq!(s.auto_increment, Some(42));
        assert_eq!(s.row_format.as_deref(), Some("DYNAMIC"));
    }

    #[test]
    fn columns() {
        let s = analyze_structure(USERS);
        let names: Vec<_> = s.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "email", "name", "price", "org_id"]);

        let id = &s.columns[0];
        assert_eq!(id.data_type, "int(11)");
        assert!(!id.nullable);
        assert_eq!(id.extra, "auto_increment");
        assert_eq!(id.default, None);

        let name = &s.columns[2];
        assert!(name.nullable);
        assert_eq!(name.default.as_deref(), Some("anon"));

        assert_eq!(s.columns[3].data_type, "decimal(10,2)");
        assert_eq!(s.columns[3].default.as_deref(), Some("NULL"));
    }

    #[test]
    fn keys() {
        let s = analyze_structure(USERS);
        assert_eq!(s.primary_key.as_deref(), Some("id"));
        assert_eq!(
            s.indexes,
            vec![
                Index { name: "uk_email".into(), column: "email".into() },
                Index { name: "idx_name".into(), column: "name".into() },
                Index { name: "idx_org_name".into(), column: "org_id,name".into() },
            ]
        );
        assert_eq!(
            s.foreign_keys,
            vec![ForeignKey {
                referenced_table: "orgs".into(),
                referenced_column: Some("id".into()),
            }]
        );
    }

    #[test]
    fn defaults_when_options_missing() {
        let s = analyze_structure("CREATE TABLE t (\n  `a` int\n);\n");
        assert_eq!(s.engine, "Unknown");
        assert_eq!(s.charset, "Unknown");
        assert_eq!(s.collation, None);
        assert_eq!(s.auto_increment, None);
        assert_eq!(s.columns.len(), 1);
        assert_eq!(s.columns[0].data_type, "int");
    }

    #[test]
    fn character_set_fallback() {
        let s = analyze_structure("CREATE TABLE t (\n  `a` text CHARACTER SET latin1\n);\n");
        assert_eq!(s.charset, "latin1");
    }

    #[test]
    fn inline_primary_and_unique() {
        let s = analyze_structure(
            "CREATE TABLE t (\n  `id` int NOT NULL PRIMARY KEY,\n  `code` char(3) UNIQUE\n);\n",
        );
        assert_eq!(s.columns[0].key, ColumnKey::Primary);
        assert_eq!(s.columns[1].key, ColumnKey::Unique);
        assert_eq!(s.primary_key.as_deref(), Some("id"));
    }

    #[test]
    fn constraint_primary_key_overrides_column_flag() {
        let s = analyze_structure(
            "CREATE TABLE t (\n  `id` int PRIMARY KEY,\n  `b` int,\n  PRIMARY KEY (`b`)\n);\n",
        );
        assert_eq!(s.primary_key.as_deref(), Some("b"));
    }

    #[test]
    fn composite_primary_key() {
        let s = analyze_structure(
            "CREATE TABLE t (\n  `a` int,\n  `b` int,\n  PRIMARY KEY (`a`,`b`)\n);\n",
        );
        assert_eq!(s.primary_key.as_deref(), Some("a,b"));
    }

    #[test]
    fn unnamed_index() {
        let s = analyze_structure("CREATE TABLE t (\n  `a` int,\n  INDEX (`a`)\n);\n");
        assert_eq!(s.indexes, vec![Index { name: "index".into(), column: "a".into() }]);
    }

    #[test]
    fn unrecognized_lines_are_ignored() {
        let s = analyze_structure("CREATE TABLE t (\n  -- note\n  CHECK (a > 0)\n);\n");
        assert!(s.columns.is_empty());
        assert!(s.indexes.is_empty());
        assert!(s.primary_key.is_none());
    }

    #[test]
    fn apply_keeps_positions() {
        let mut record = TableRecord::with_create_start(4);
        record.record_insert(9, 10, 2);
        analyze_structure(USERS).apply_to(&mut record);
        assert_eq!(record.engine, "InnoDB");
        assert_eq!(record.insert_positions, vec![9]);
        assert_eq!(record.create_start, 4);
    }
}
