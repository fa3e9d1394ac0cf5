//! Statement analysis: table identification and shard-key binding.

use std::collections::HashMap;

use sqlparser::ast::{
    BinaryOperator, Delete, Expr, FromTable, Ident, Insert, ObjectName, Query, SetExpr,
    Statement, TableFactor, TableWithJoins, Value,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use thiserror::Error;
use tracing::debug;

/// Analysis failures that surface to the client as bad requests.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalyzeError {
    #[error("failed to parse query: {0}")]
    Parse(String),

    #[error("unsupported statement type: {0}")]
    UnsupportedStatement(String),
}

/// Result of analyzing one statement.
///
/// `table` is the statement's first resolvable table reference; `None` when
/// the FROM clause is a join, a subquery, or absent. `shard_key` is the
/// normalized literal bound to the table's shard-key column, when exactly
/// such a binding was found. No shard key means scatter-gather — that is a
/// success, not a failure.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Analysis {
    pub table: Option<String>,
    pub shard_key: Option<String>,
}

impl Analysis {
    pub fn has_shard_key(&self) -> bool {
        self.shard_key.is_some()
    }

    fn table_only(table: Option<String>) -> Self {
        Self {
            table,
            shard_key: None,
        }
    }
}

/// Analyze a SQL statement against the configured table → shard-key map.
///
/// Coverage: SELECT, INSERT, UPDATE, DELETE. Anything else is
/// [`AnalyzeError::UnsupportedStatement`]; malformed SQL is
/// [`AnalyzeError::Parse`]. Multi-statement input is analyzed on its first
/// statement.
pub fn analyze(
    sql: &str,
    shard_keys: &HashMap<String, String>,
) -> Result<Analysis, AnalyzeError> {
    let statements = Parser::parse_sql(&MySqlDialect {}, sql)
        .map_err(|e| AnalyzeError::Parse(e.to_string()))?;

    let statement = statements
        .first()
        .ok_or_else(|| AnalyzeError::Parse("empty statement".to_string()))?;

    match statement {
        Statement::Query(query) => analyze_select(query, shard_keys),
        Statement::Insert(insert) => Ok(analyze_insert(insert, shard_keys)),
        Statement::Update {
            table, selection, ..
        } => Ok(analyze_filtered(
            first_table(std::slice::from_ref(table)),
            selection.as_ref(),
            shard_keys,
        )),
        Statement::Delete(delete) => Ok(analyze_delete(delete, shard_keys)),
        other => Err(AnalyzeError::UnsupportedStatement(
            statement_kind(other).to_string(),
        )),
    }
}

fn analyze_delete(delete: &Delete, shard_keys: &HashMap<String, String>) -> Analysis {
    let from = match &delete.from {
        FromTable::WithFromKeyword(tables) => tables,
        FromTable::WithoutKeyword(tables) => tables,
    };
    analyze_filtered(
        first_table(from),
        delete.selection.as_ref(),
        shard_keys,
    )
}

fn analyze_select(
    query: &Query,
    shard_keys: &HashMap<String, String>,
) -> Result<Analysis, AnalyzeError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(select) => select,
        // UNION, VALUES and friends span shards by construction.
        _ => return Ok(Analysis::default()),
    };

    Ok(analyze_filtered(
        first_table(&select.from),
        select.selection.as_ref(),
        shard_keys,
    ))
}

/// Shared path for SELECT/UPDATE/DELETE: resolve the table, then walk the
/// WHERE expression for a shard-key binding.
fn analyze_filtered(
    table: Option<String>,
    selection: Option<&Expr>,
    shard_keys: &HashMap<String, String>,
) -> Analysis {
    let Some(table) = table else {
        // Join, subquery, or missing FROM: no single table, scatter-gather.
        debug!("no resolvable table reference, falling back to scatter-gather");
        return Analysis::default();
    };

    let Some(key_column) = shard_keys.get(&table) else {
        return Analysis::table_only(Some(table));
    };

    let shard_key = selection.and_then(|expr| find_key_binding(expr, key_column));
    Analysis {
        table: Some(table),
        shard_key,
    }
}

fn analyze_insert(insert: &Insert, shard_keys: &HashMap<String, String>) -> Analysis {
    let table = object_name(&insert.table_name);

    let Some(key_column) = shard_keys.get(&table) else {
        return Analysis::table_only(Some(table));
    };

    // Locate the key column positionally, then read the matching literal
    // out of the first VALUES row. Multi-row inserts bind the first row's
    // value; later rows may hash elsewhere and that is the caller's
    // problem to arbitrate.
    let Some(position) = insert
        .columns
        .iter()
        .position(|c: &Ident| c.value == *key_column)
    else {
        return Analysis::table_only(Some(table));
    };

    let shard_key = insert
        .source
        .as_deref()
        .and_then(|query: &Query| match query.body.as_ref() {
            SetExpr::Values(values) => values.rows.first(),
            _ => None,
        })
        .and_then(|row| row.get(position))
        .and_then(literal_value);

    Analysis {
        table: Some(table),
        shard_key,
    }
}

/// First table reference in a FROM list, unwrapped through a single-table
/// alias. Joins and derived tables yield `None`.
fn first_table(from: &[TableWithJoins]) -> Option<String> {
    let item = from.first()?;
    if !item.joins.is_empty() {
        return None;
    }
    match &item.relation {
        TableFactor::Table { name, .. } => Some(object_name(name)),
        _ => None,
    }
}

/// Unqualified table name (last path segment).
fn object_name(name: &ObjectName) -> String {
    name.0
        .last()
        .map(|ident| ident.value.clone())
        .unwrap_or_default()
}

/// Walk a WHERE expression for a `key = literal` binding.
///
/// AND conjunctions are traversed on both sides, first match wins.
/// An OR disqualifies its entire branch: the predicate may legitimately
/// select rows on more than one shard. Operators other than `=` never
/// bind, even on the key column.
fn find_key_binding(expr: &Expr, key_column: &str) -> Option<String> {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            BinaryOperator::Eq => {
                if column_matches(left, key_column) {
                    literal_value(right)
                } else {
                    None
                }
            }
            BinaryOperator::And => find_key_binding(left, key_column)
                .or_else(|| find_key_binding(right, key_column)),
            _ => None,
        },
        Expr::Nested(inner) => find_key_binding(inner, key_column),
        _ => None,
    }
}

/// Whether an expression names the shard-key column, bare or qualified.
fn column_matches(expr: &Expr, key_column: &str) -> bool {
    match expr {
        Expr::Identifier(ident) => ident.value == key_column,
        Expr::CompoundIdentifier(parts) => parts
            .last()
            .map(|ident| ident.value == key_column)
            .unwrap_or(false),
        _ => false,
    }
}

/// Normalize a literal to a hash-stable string: raw digits for numbers,
/// the unquoted body for strings. Parameter markers, function calls, and
/// subqueries yield no binding.
fn literal_value(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Value(Value::Number(digits, _)) => Some(digits.clone()),
        Expr::Value(Value::SingleQuotedString(body))
        | Expr::Value(Value::DoubleQuotedString(body)) => Some(body.clone()),
        _ => None,
    }
}

fn statement_kind(statement: &Statement) -> &'static str {
    match statement {
        Statement::CreateTable { .. } => "CREATE TABLE",
        Statement::Drop { .. } => "DROP",
        Statement::AlterTable { .. } => "ALTER TABLE",
        Statement::Truncate { .. } => "TRUNCATE",
        Statement::StartTransaction { .. } => "START TRANSACTION",
        _ => "other",
    }
}
