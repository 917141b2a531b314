//! Diagnostic SQL echo.
//!
//! The text produced here is for humans only; it is never sent to the server.

use crate::param::ParamList;

/// Target used for every SQL echo event.
pub const SQL_TARGET: &str = "tgsql.sql";

/// Substitute `$n` placeholders with the SQL literal of the n-th parameter.
///
/// Placeholders inside quoted literals or identifiers are left alone, and a
/// placeholder without a matching parameter is kept verbatim.
pub fn format_sql(sql: &str, params: &ParamList) -> String {
    let mut out = String::with_capacity(sql.len() + params.len() * 8);
    let mut chars = sql.char_indices().peekable();
    let mut quote: Option<char> = None;

    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            '$' => {
                let start = i + 1;
                let mut end = start;
                while let Some(&(j, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    end = j + d.len_utf8();
                    chars.next();
                }
                let literal = sql[start..end]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|idx| params.get(idx));
                match literal {
                    Some(p) => out.push_str(p.literal()),
                    None => out.push_str(&sql[i..end]),
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Emit one statement: INFO when echo is on, TRACE otherwise.
pub(crate) fn echo(enabled: bool, table: &str, sql: &str, params: &ParamList) {
    if enabled {
        tracing::info!(target: SQL_TARGET, table, "[SQL] {}", format_sql(sql, params));
    } else if tracing::enabled!(target: SQL_TARGET, tracing::Level::TRACE) {
        tracing::trace!(target: SQL_TARGET, table, "[SQL] {}", format_sql(sql, params));
    }
}
