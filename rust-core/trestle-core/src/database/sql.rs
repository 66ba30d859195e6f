//! Statement rendering shared by every dialect
//!
//! Everything is rendered with `?` placeholders. PostgreSQL runs the
//! result through [`number_placeholders`].

use super::{DbValue, Record};
use crate::error::{Error, Result};

/// `INSERT INTO t (a, b) VALUES (?, ?)` plus its bindings
///
/// # Errors
///
/// Returns `Error::Query` when `data` is empty.
pub fn insert(table: &str, data: &Record) -> Result<(String, Vec<DbValue>)> {
    if data.is_empty() {
        return Err(Error::query(format!("insert into {table} has no columns")));
    }
    let columns: Vec<&str> = data.keys().map(String::as_str).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!("INSERT INTO {table} ({}) VALUES ({placeholders})", columns.join(", "));
    Ok((sql, data.values().cloned().collect()))
}

/// `UPDATE t SET a = ? WHERE c = ? AND d = ?`; set values bind before
/// condition values
///
/// # Errors
///
/// Returns `Error::Query` when `data` or `conditions` is empty. An update
/// without conditions would touch every row.
pub fn update(table: &str, data: &Record, conditions: &Record) -> Result<(String, Vec<DbValue>)> {
    if data.is_empty() {
        return Err(Error::query(format!("update of {table} has no columns")));
    }
    if conditions.is_empty() {
        return Err(Error::query(format!("update of {table} has no conditions")));
    }
    let sql = format!(
        "UPDATE {table} SET {} WHERE {}",
        assignments(data, ", "),
        assignments(conditions, " AND ")
    );
    let params = data.values().chain(conditions.values()).cloned().collect();
    Ok((sql, params))
}

/// `DELETE FROM t WHERE c = ? AND d = ?`
///
/// # Errors
///
/// Returns `Error::Query` when `conditions` is empty.
pub fn delete(table: &str, conditions: &Record) -> Result<(String, Vec<DbValue>)> {
    if conditions.is_empty() {
        return Err(Error::query(format!("delete from {table} has no conditions")));
    }
    let sql = format!("DELETE FROM {table} WHERE {}", assignments(conditions, " AND "));
    Ok((sql, conditions.values().cloned().collect()))
}

fn assignments(columns: &Record, separator: &str) -> String {
    columns
        .keys()
        .map(|column| format!("{column} = ?"))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Rewrite `?` placeholders to `$1, $2, ...`
///
/// Question marks inside single-quoted literals and double-quoted
/// identifiers are left alone.
#[must_use]
pub fn number_placeholders(sql: &str) -> String {
    scan(sql, |index| format!("${index}")).0
}

/// Number of `?` placeholders outside quotes
#[must_use]
pub fn placeholder_count(sql: &str) -> usize {
    scan(sql, |_| "?".to_string()).1
}

fn scan(sql: &str, mut placeholder: impl FnMut(usize) -> String) -> (String, usize) {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut quote: Option<char> = None;

    for c in sql.chars() {
        match (quote, c) {
            (None, '\'' | '"') => {
                quote = Some(c);
                out.push(c);
            }
            (Some(open), _) if c == open => {
                quote = None;
                out.push(c);
            }
            (None, '?') => {
                index += 1;
                out.push_str(&placeholder(index));
            }
            _ => out.push(c),
        }
    }

    (out, index)
}
