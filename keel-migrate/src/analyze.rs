//! Structural analysis of migration scripts.
//!
//! This is a best-effort heuristic, not a SQL parser. It extracts what a
//! script *creates* (tables and their columns) and what it *references*
//! (indexed columns, foreign key targets, qualified column names) so the
//! resolver can order scripts. Its output only drives ordering and advisory
//! warnings; the schema validator is the correctness backstop.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex_lite::Regex;
use serde::Serialize;

/// A table or column name used as a dependency token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum SchemaObject {
    /// A table.
    Table(String),
    /// A column qualified by its table.
    Column {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
}

impl SchemaObject {
    /// Create a table token.
    pub fn table(name: impl Into<String>) -> Self {
        Self::Table(name.into().to_lowercase())
    }

    /// Create a column token.
    pub fn column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::Column {
            table: table.into().to_lowercase(),
            column: column.into().to_lowercase(),
        }
    }

    /// The table this object belongs to.
    pub fn table_name(&self) -> &str {
        match self {
            Self::Table(name) => name,
            Self::Column { table, .. } => table,
        }
    }
}

impl fmt::Display for SchemaObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table(name) => write!(f, "{}", name),
            Self::Column { table, column } => write!(f, "{}.{}", table, column),
        }
    }
}

/// What a single script creates and references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptAnalysis {
    /// Tables and columns the script defines.
    pub creates: BTreeSet<SchemaObject>,
    /// Tables and columns the script assumes already exist.
    pub references: BTreeSet<SchemaObject>,
    /// Whether the script is safe to run more than once.
    pub idempotent: bool,
    /// Advisory warnings. Never fatal.
    pub warnings: Vec<String>,
}

/// Filename suffix (before `.sql`) that flags a script as idempotent.
pub const IDEMPOTENT_SUFFIX: &str = "_idempotent";

/// Qualifiers that never name an application table.
const SYSTEM_PREFIXES: &[&str] = &[
    "pg_catalog",
    "information_schema",
    "public",
    "excluded",
    "new",
    "old",
];

/// Type keywords recognized in column definitions.
const TYPE_KEYWORDS: &[&str] = &[
    "smallint", "integer", "int", "int2", "int4", "int8", "bigint", "serial", "serial4",
    "serial8", "smallserial", "bigserial", "real", "double", "float", "float4", "float8",
    "numeric", "decimal", "money", "text", "varchar", "char", "character", "bpchar", "citext",
    "name", "boolean", "bool", "date", "time", "timetz", "timestamp", "timestamptz",
    "interval", "uuid", "json", "jsonb", "bytea", "inet", "cidr", "macaddr", "tsvector",
    "tsquery", "xml", "point", "line", "polygon", "box", "circle", "vector", "bit", "varbit",
    "oid", "int4range", "int8range", "tstzrange", "daterange",
];

/// Leading words of table-level constraint clauses.
const CONSTRAINT_KEYWORDS: &[&str] = &[
    "constraint", "primary", "foreign", "unique", "check", "exclude", "like",
];

const IDENT: &str = r"[a-z_][a-z0-9_$]*(?:\.[a-z_][a-z0-9_$]*)?";

static CREATE_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^create\s+(?:(?:global|local)\s+)?(?:(?:temp|temporary|unlogged)\s+)?table\s+(?:if\s+not\s+exists\s+)?({IDENT})\s*(\(|as\b)"
    ))
    .expect("valid create table pattern")
});

static ALTER_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^alter\s+table\s+(?:if\s+exists\s+)?(?:only\s+)?({IDENT})\s+"
    ))
    .expect("valid alter table pattern")
});

static ADD_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\badd\s+(?:column\s+)?(?:if\s+not\s+exists\s+)?([a-z_][a-z0-9_$]*)\s+([a-z_][a-z0-9_]*)",
    )
    .expect("valid add column pattern")
});

static CREATE_INDEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^create\s+(?:unique\s+)?index\s+(?:concurrently\s+)?(?:if\s+not\s+exists\s+)?(?:[a-z_][a-z0-9_$]*\s+)?on\s+(?:only\s+)?({IDENT})\s*(?:using\s+[a-z_]+\s*)?\("
    ))
    .expect("valid create index pattern")
});

static FOREIGN_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\breferences\s+({IDENT})\s*(\(\s*[^)]*\))?"))
        .expect("valid references pattern")
});

static DML_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?:insert\s+into|update(?:\s+only)?|delete\s+from)\s+({IDENT})\b"
    ))
    .expect("valid dml pattern")
});

static DOTTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([a-z_][a-z0-9_$]*)\.([a-z_][a-z0-9_$]*)\b").expect("valid dotted pattern")
});

static DESTRUCTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(drop\s+(?:table|column|index|view|materialized\s+view|schema|type|function|sequence|constraint|trigger))\s+(if\s+exists\b)?",
    )
    .expect("valid drop pattern")
});

static TRUNCATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^truncate\b").expect("valid truncate pattern"));

/// Analyze a script's text.
pub fn analyze(filename: &str, sql: &str) -> ScriptAnalysis {
    let normalized = normalize(sql);
    let mut analysis = ScriptAnalysis {
        idempotent: is_idempotent(filename, &normalized),
        ..Default::default()
    };
    let mut qualified_names = BTreeSet::new();

    for statement in split_normalized(&normalized) {
        analyze_statement(&statement, &mut analysis, &mut qualified_names);
    }

    for (prefix, name) in dotted_references(&normalized, &qualified_names) {
        analysis.references.insert(SchemaObject::column(prefix, name));
    }

    let creates = analysis.creates.clone();
    analysis
        .references
        .retain(|reference| !creates.contains(reference));

    if !analysis.idempotent {
        analysis.warnings.extend(destructive_warnings(filename, &normalized));
    }

    analysis
}

/// Check whether a script is safe to re-run.
pub fn is_idempotent(filename: &str, normalized: &str) -> bool {
    let stem = filename.strip_suffix(".sql").unwrap_or(filename);
    stem.to_lowercase().ends_with(IDEMPOTENT_SUFFIX)
        || normalized.contains("if not exists")
        || normalized.contains("create or replace")
}

fn analyze_statement(
    statement: &str,
    analysis: &mut ScriptAnalysis,
    qualified_names: &mut BTreeSet<(String, String)>,
) {
    if let Some(caps) = CREATE_TABLE.captures(statement) {
        let table = bare_name(&caps[1], qualified_names);
        analysis.creates.insert(SchemaObject::table(&table));
        if &caps[2] == "(" {
            let open = caps.get(2).map(|m| m.start()).unwrap_or_default();
            if let Some(body) = paren_body(statement, open) {
                for column in column_definitions(body) {
                    analysis.creates.insert(SchemaObject::column(&table, column));
                }
            }
        }
    }

    if let Some(caps) = ALTER_TABLE.captures(statement) {
        let table = bare_name(&caps[1], qualified_names);
        analysis.references.insert(SchemaObject::table(&table));
        let rest = &statement[caps.get(0).map(|m| m.end()).unwrap_or_default()..];
        for add in ADD_COLUMN.captures_iter(rest) {
            let column = &add[1];
            if !CONSTRAINT_KEYWORDS.contains(&column) && is_type_keyword(&add[2]) {
                analysis.creates.insert(SchemaObject::column(&table, column));
            }
        }
    }

    if let Some(caps) = CREATE_INDEX.captures(statement) {
        let table = bare_name(&caps[1], qualified_names);
        let open = caps.get(0).map(|m| m.end() - 1).unwrap_or_default();
        match paren_body(statement, open) {
            Some(body) => {
                for item in split_top_level(body) {
                    if let Some(column) = plain_identifier(item) {
                        analysis.references.insert(SchemaObject::column(&table, column));
                    }
                }
            }
            None => {
                analysis.references.insert(SchemaObject::table(&table));
            }
        }
    }

    for caps in FOREIGN_REFERENCE.captures_iter(statement) {
        let table = bare_name(&caps[1], qualified_names);
        match caps.get(2) {
            Some(columns) => {
                let inner = columns.as_str().trim_start_matches('(').trim_end_matches(')');
                for column in inner.split(',').filter_map(plain_identifier) {
                    analysis.references.insert(SchemaObject::column(&table, column));
                }
            }
            None => {
                analysis.references.insert(SchemaObject::table(&table));
            }
        }
    }

    if let Some(caps) = DML_TARGET.captures(statement) {
        let table = bare_name(&caps[1], qualified_names);
        analysis.references.insert(SchemaObject::table(table));
    }
}

/// Strip a schema qualifier, remembering the qualified pair so the dotted
/// scan does not mistake it for a column reference.
fn bare_name(name: &str, qualified_names: &mut BTreeSet<(String, String)>) -> String {
    match name.split_once('.') {
        Some((schema, table)) => {
            qualified_names.insert((schema.to_string(), table.to_string()));
            table.to_string()
        }
        None => name.to_string(),
    }
}

fn dotted_references(
    normalized: &str,
    qualified_names: &BTreeSet<(String, String)>,
) -> Vec<(String, String)> {
    DOTTED
        .captures_iter(normalized)
        .filter_map(|caps| {
            let prefix = caps[1].to_string();
            let name = caps[2].to_string();
            let system = SYSTEM_PREFIXES.contains(&prefix.as_str()) || prefix.starts_with("pg_");
            let qualified = qualified_names.contains(&(prefix.clone(), name.clone()));
            (!system && !qualified).then_some((prefix, name))
        })
        .collect()
}

fn destructive_warnings(filename: &str, normalized: &str) -> Vec<String> {
    let mut warnings = Vec::new();
    for statement in split_normalized(normalized) {
        for caps in DESTRUCTIVE.captures_iter(&statement) {
            if caps.get(2).is_none() {
                warnings.push(format!(
                    "{}: destructive statement `{}` without IF EXISTS",
                    filename,
                    caps[1].to_uppercase()
                ));
            }
        }
        if TRUNCATE.is_match(&statement) {
            warnings.push(format!("{}: destructive statement `TRUNCATE`", filename));
        }
    }
    warnings
}

/// Names of columns defined in a `CREATE TABLE` body.
fn column_definitions(body: &str) -> Vec<String> {
    split_top_level(body)
        .into_iter()
        .filter_map(|item| {
            let mut tokens = item.split_whitespace();
            let name = tokens.next()?;
            if CONSTRAINT_KEYWORDS.contains(&name) {
                return None;
            }
            let type_word = tokens.next()?;
            is_type_keyword(type_word).then(|| name.to_string())
        })
        .collect()
}

fn is_type_keyword(token: &str) -> bool {
    let word: String = token
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    TYPE_KEYWORDS.contains(&word.as_str())
}

fn plain_identifier(item: &str) -> Option<&str> {
    let first = item.split_whitespace().next()?;
    let valid = first
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && first
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$');
    valid.then_some(first)
}

/// The text between the parenthesis at `open` and its matching close.
fn paren_body(text: &str, open: usize) -> Option<&str> {
    if text.as_bytes().get(open) != Some(&b'(') {
        return None;
    }
    let mut depth = 0usize;
    for (i, byte) in text.bytes().enumerate().skip(open) {
        match byte {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open + 1..i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on commas that are not nested inside parentheses.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, byte) in text.bytes().enumerate() {
        match byte {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                items.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = text[start..].trim();
    if !last.is_empty() {
        items.push(last);
    }
    items
}

/// Normalize script text for analysis.
///
/// Removes comments, blanks string literals and dollar-quoted bodies,
/// unquotes identifiers, collapses whitespace and lower-cases.
pub fn normalize(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '-' if next == Some('-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                push_space(&mut out);
            }
            '/' if next == Some('*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
                push_space(&mut out);
            }
            '\'' => {
                i += 1;
                while i < chars.len() {
                    if chars[i] == '\'' {
                        if chars.get(i + 1) == Some(&'\'') {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
                out.push_str("''");
            }
            '"' => {
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    out.extend(chars[i].to_lowercase());
                    i += 1;
                }
                i += 1;
            }
            '$' if dollar_tag(&chars, i).is_some() => {
                let tag = dollar_tag(&chars, i).unwrap_or_default();
                i += tag.len();
                while i < chars.len() && !starts_with_at(&chars, i, &tag) {
                    i += 1;
                }
                i += tag.len();
                out.push_str("$$");
            }
            c if c.is_whitespace() => {
                push_space(&mut out);
                i += 1;
            }
            c => {
                out.extend(c.to_lowercase());
                i += 1;
            }
        }
    }

    out.trim().to_string()
}

fn push_space(out: &mut String) {
    if !out.ends_with(' ') {
        out.push(' ');
    }
}

/// Split script text into normalized statements.
pub fn split_statements(sql: &str) -> Vec<String> {
    split_normalized(&normalize(sql))
}

fn split_normalized(normalized: &str) -> Vec<String> {
    normalized
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// A dollar-quote opener (`$$` or `$tag$`) starting at `i`.
fn dollar_tag(chars: &[char], i: usize) -> Option<String> {
    let mut j = i + 1;
    while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
        if j == i + 1 && chars[j].is_ascii_digit() {
            return None;
        }
        j += 1;
    }
    (chars.get(j) == Some(&'$')).then(|| chars[i..=j].iter().collect())
}

fn starts_with_at(chars: &[char], i: usize, tag: &str) -> bool {
    tag.chars()
        .enumerate()
        .all(|(offset, c)| chars.get(i + offset) == Some(&c))
}
