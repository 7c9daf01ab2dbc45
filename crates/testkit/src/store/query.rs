//! Query descriptors and the statement subset the application issues.
//!
//! Supported text:
//!
//! ```text
//! SELECT * | COUNT(*) FROM t [WHERE c = ? [AND c = 'x']...] [ORDER BY c [ASC|DESC]] [LIMIT n]
//! INSERT INTO t (c1, c2, ...) VALUES (?, 'x', ...)
//! ```
//!
//! Predicates are equality only. Anything else is `UnsupportedQuery`.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::Value;

use super::schema::Row;
use crate::infrastructure::ports::StoreError;

static SELECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*SELECT\s+(\*|COUNT\s*\(\s*\*\s*\))\s+FROM\s+(\w+)(?:\s+WHERE\s+(.+?))?(?:\s+ORDER\s+BY\s+(\w+)(?:\s+(ASC|DESC))?)?(?:\s+LIMIT\s+(\d+))?\s*;?\s*$",
    )
    .expect("valid regex")
});
static INSERT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*INSERT\s+INTO\s+(\w+)\s*\(([^)]*)\)\s*VALUES\s*\(([^)]*)\)\s*;?\s*$")
        .expect("valid regex")
});
static AND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+AND\s+").expect("valid regex"));
static CONDITION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\w+)\s*=\s*(.+?)\s*$").expect("valid regex"));
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(?:\.\d+)?$").expect("valid regex"));

/// Right-hand side of an equality predicate or an inserted value.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Bound positionally at execution (`?`)
    Param,
    Literal(Value),
}

impl Operand {
    fn parse(text: &str, statement: &str) -> Result<Self, StoreError> {
        let text = text.trim();
        if text == "?" {
            return Ok(Operand::Param);
        }
        if let Some(inner) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
            return Ok(Operand::Literal(Value::String(inner.replace("''", "'"))));
        }
        match text.to_ascii_uppercase().as_str() {
            "NULL" => return Ok(Operand::Literal(Value::Null)),
            "TRUE" => return Ok(Operand::Literal(Value::Bool(true))),
            "FALSE" => return Ok(Operand::Literal(Value::Bool(false))),
            _ => {}
        }
        if NUMBER_RE.is_match(text) {
            if let Ok(value) = serde_json::from_str::<Value>(text) {
                return Ok(Operand::Literal(value));
            }
        }
        Err(StoreError::UnsupportedQuery(format!(
            "unsupported operand `{text}` in `{statement}`"
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    All,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// Typed equivalent of a `SELECT` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub projection: Projection,
    pub filters: Vec<(String, Operand)>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    /// `SELECT * FROM table`
    pub fn select(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            projection: Projection::All,
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    /// `SELECT COUNT(*) FROM table`
    pub fn count(table: impl Into<String>) -> Self {
        Self {
            projection: Projection::Count,
            ..Self::select(table)
        }
    }

    /// `column = ?`, bound at execution.
    pub fn filter(mut self, column: impl Into<String>) -> Self {
        self.filters.push((column.into(), Operand::Param));
        self
    }

    /// `column = <value>`
    pub fn filter_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters
            .push((column.into(), Operand::Literal(value.into())));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((column.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Number of `?` placeholders.
    pub fn param_count(&self) -> usize {
        self.filters
            .iter()
            .filter(|(_, operand)| *operand == Operand::Param)
            .count()
    }

    /// Evaluate against `rows` (in insertion order).
    pub(crate) fn evaluate<'a>(
        &self,
        rows: impl Iterator<Item = &'a Row>,
        params: &[Value],
    ) -> Result<Vec<Row>, StoreError> {
        let expected = self.param_count();
        if params.len() != expected {
            return Err(StoreError::ParameterCount {
                expected,
                actual: params.len(),
            });
        }

        let mut bound = params.iter();
        let predicates: Vec<(&str, &Value)> = self
            .filters
            .iter()
            .filter_map(|(column, operand)| {
                let value = match operand {
                    Operand::Param => bound.next()?,
                    Operand::Literal(value) => value,
                };
                Some((column.as_str(), value))
            })
            .collect();

        let mut matched: Vec<Row> = rows
            .filter(|row| {
                predicates
                    .iter()
                    .all(|(column, expected)| values_equal(row.get(*column), expected))
            })
            .cloned()
            .collect();

        if let Some((column, direction)) = &self.order_by {
            matched.sort_by(|a, b| {
                let ordering = compare_values(a.get(column), b.get(column));
                match direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }

        match self.projection {
            Projection::All => {
                if let Some(limit) = self.limit {
                    matched.truncate(limit);
                }
                Ok(matched)
            }
            Projection::Count => {
                let mut row = Row::new();
                row.insert("count".to_string(), Value::from(matched.len()));
                Ok(vec![row])
            }
        }
    }
}

/// A parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedStatement {
    Select(Query),
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<Operand>,
    },
}

impl ParsedStatement {
    pub fn parse(sql: &str) -> Result<Self, StoreError> {
        if let Some(caps) = SELECT_RE.captures(sql) {
            let projection = if caps[1].starts_with('*') {
                Projection::All
            } else {
                Projection::Count
            };
            let mut query = Query {
                projection,
                ..Query::select(&caps[2])
            };
            if let Some(conditions) = caps.get(3) {
                for condition in AND_RE.split(conditions.as_str()) {
                    let parts = CONDITION_RE.captures(condition).ok_or_else(|| {
                        StoreError::UnsupportedQuery(format!(
                            "only equality predicates are supported: `{condition}`"
                        ))
                    })?;
                    let operand = Operand::parse(&parts[2], sql)?;
                    query.filters.push((parts[1].to_string(), operand));
                }
            }
            if let Some(column) = caps.get(4) {
                let direction = match caps.get(5) {
                    Some(d) if d.as_str().eq_ignore_ascii_case("desc") => Direction::Desc,
                    _ => Direction::Asc,
                };
                query.order_by = Some((column.as_str().to_string(), direction));
            }
            if let Some(limit) = caps.get(6) {
                let limit = limit.as_str().parse::<usize>().map_err(|_| {
                    StoreError::UnsupportedQuery(format!("invalid LIMIT in `{sql}`"))
                })?;
                query.limit = Some(limit);
            }
            return Ok(ParsedStatement::Select(query));
        }

        if let Some(caps) = INSERT_RE.captures(sql) {
            let columns: Vec<String> = caps[2]
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            let values = caps[3]
                .split(',')
                .map(|v| Operand::parse(v, sql))
                .collect::<Result<Vec<_>, _>>()?;
            if columns.len() != values.len() {
                return Err(StoreError::UnsupportedQuery(format!(
                    "{} columns but {} values in `{sql}`",
                    columns.len(),
                    values.len()
                )));
            }
            return Ok(ParsedStatement::Insert {
                table: caps[1].to_string(),
                columns,
                values,
            });
        }

        Err(StoreError::UnsupportedQuery(sql.trim().to_string()))
    }

    pub fn table(&self) -> &str {
        match self {
            ParsedStatement::Select(query) => &query.table,
            ParsedStatement::Insert { table, .. } => table,
        }
    }
}

/// Equality with SQL-ish coercion: numbers compare by value, and a number
/// matches its decimal text. `NULL` never equals anything.
pub(crate) fn values_equal(actual: Option<&Value>, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match (actual, expected) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(a), Value::Number(b)) | (Value::Number(b), Value::String(a)) => {
            a.parse::<f64>().ok() == b.as_f64()
        }
        (a, b) => a == b,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
