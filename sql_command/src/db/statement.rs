//! Statement splitting and placeholder rewriting
//!
//! Command files may hold several statements and may use psycopg-style `%s`
//! placeholders. PostgreSQL only understands `$n`, one statement per
//! prepared statement, so the text is scanned once: top-level `;` ends a
//! statement, `%s` becomes `$1..$k` (numbered per statement) and `%%`
//! becomes `%`. String literals, quoted identifiers, comments and
//! dollar-quoted bodies are copied untouched.

use std::collections::HashMap;

use crate::value::SqlValue;

/// One statement of a command file, after placeholder rewriting
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    /// Number of `%s` placeholders rewritten in this statement
    pub placeholders: usize,
    /// Highest native `$n` written in the statement itself
    pub native: usize,
}

/// A statement together with the parameters it binds
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Split command text into statements.
///
/// Statements that contain nothing but whitespace and comments are dropped,
/// so an empty result means there is nothing to send.
pub fn split_statements(text: &str) -> Vec<Statement> {
    let chars: Vec<char> = text.chars().collect();
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut placeholders = 0;
    let mut native = 0;
    let mut has_content = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(next) = copy_non_code(&chars, i, &mut current) {
            // comments alone do not make a statement
            has_content |= !matches!(c, '-' | '/');
            i = next;
            continue;
        }

        match c {
            '$' if starts_parameter(&chars, i) => {
                let (number, next) = parameter_number(&chars, i);
                native = native.max(number);
                current.extend(&chars[i..next]);
                has_content = true;
                i = next;
            }
            '%' if chars.get(i + 1) == Some(&'s') => {
                placeholders += 1;
                current.push_str(&format!("${}", placeholders));
                has_content = true;
                i += 2;
            }
            '%' if chars.get(i + 1) == Some(&'%') => {
                current.push('%');
                has_content = true;
                i += 2;
            }
            ';' => {
                if has_content {
                    statements.push(Statement {
                        sql: current.trim().to_string(),
                        placeholders,
                        native,
                    });
                }
                current.clear();
                placeholders = 0;
                native = 0;
                has_content = false;
                i += 1;
            }
            _ => {
                if !c.is_whitespace() {
                    has_content = true;
                }
                current.push(c);
                i += 1;
            }
        }
    }

    if has_content {
        statements.push(Statement {
            sql: current.trim().to_string(),
            placeholders,
            native,
        });
    }

    statements
}

/// Rewrite `$n` to `($n::text::<type>)` for every `n` in `casts`.
///
/// The parameter is then sent as text and converted by the server, the same
/// way a quoted literal would be.
pub fn cast_parameters(sql: &str, casts: &HashMap<usize, String>) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;

    while i < chars.len() {
        if let Some(next) = copy_non_code(&chars, i, &mut out) {
            i = next;
            continue;
        }
        if starts_parameter(&chars, i) {
            let (number, next) = parameter_number(&chars, i);
            match casts.get(&number) {
                Some(type_name) => out.push_str(&format!("(${}::text::{})", number, type_name)),
                None => out.extend(&chars[i..next]),
            }
            i = next;
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }

    out
}

/// Assign parameters to statements.
///
/// With `%s` placeholders the parameters are consumed in order and their
/// total must match. Without them the parameters are native `$n` values
/// shared by the whole file: each statement receives `$1` up to the highest
/// `$n` it references, and that highest reference must match the count.
pub fn plan_parameters(
    statements: Vec<Statement>,
    params: &[SqlValue],
) -> Result<Vec<PreparedStatement>, String> {
    let expected: usize = statements.iter().map(|s| s.placeholders).sum();

    if expected == 0 {
        let referenced = statements.iter().map(|s| s.native).max().unwrap_or(0);
        if referenced != params.len() {
            return Err(format!(
                "command references {} parameter(s) but {} were supplied",
                referenced,
                params.len()
            ));
        }
        return Ok(statements
            .into_iter()
            .map(|s| PreparedStatement {
                params: params[..s.native].to_vec(),
                sql: s.sql,
            })
            .collect());
    }

    if expected != params.len() {
        return Err(format!(
            "command expects {} parameter(s) but {} were supplied",
            expected,
            params.len()
        ));
    }

    let mut remaining = params.iter().cloned();
    Ok(statements
        .into_iter()
        .map(|s| PreparedStatement {
            params: remaining.by_ref().take(s.placeholders).collect(),
            sql: s.sql,
        })
        .collect())
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Copy the literal, quoted identifier, comment or dollar-quoted body that
/// starts at `i`. Returns the index after it, or `None` when `chars[i]` is
/// plain SQL.
fn copy_non_code(chars: &[char], i: usize, out: &mut String) -> Option<usize> {
    let follows_ident = i > 0 && is_ident_char(chars[i - 1]);
    match chars[i] {
        '\'' => {
            let escapes = i > 0
                && matches!(chars[i - 1], 'E' | 'e')
                && (i < 2 || !is_ident_char(chars[i - 2]));
            Some(copy_quoted(chars, i, '\'', escapes, out))
        }
        '"' => Some(copy_quoted(chars, i, '"', false, out)),
        '-' if chars.get(i + 1) == Some(&'-') => {
            let end = chars[i..]
                .iter()
                .position(|&c| c == '\n')
                .map_or(chars.len(), |offset| i + offset);
            out.extend(&chars[i..end]);
            Some(end)
        }
        '/' if chars.get(i + 1) == Some(&'*') => Some(copy_block_comment(chars, i, out)),
        '$' if !follows_ident => {
            let tag = dollar_tag(chars, i)?;
            Some(copy_dollar_quoted(chars, i, &tag, out))
        }
        _ => None,
    }
}

/// `$` followed by digits, not glued to an identifier
fn starts_parameter(chars: &[char], i: usize) -> bool {
    chars[i] == '$'
        && (i == 0 || !is_ident_char(chars[i - 1]))
        && chars.get(i + 1).map_or(false, char::is_ascii_digit)
}

/// Number of the `$n` at `i` and the index after it
fn parameter_number(chars: &[char], i: usize) -> (usize, usize) {
    let end = chars[i + 1..]
        .iter()
        .position(|c| !c.is_ascii_digit())
        .map_or(chars.len(), |offset| i + 1 + offset);
    let number = chars[i + 1..end]
        .iter()
        .fold(0usize, |n, c| n.saturating_mul(10).saturating_add(c.to_digit(10).unwrap_or(0) as usize));
    (number, end)
}

/// Copy a quoted run starting at `start`; a doubled quote is an escaped quote.
/// Returns the index after the closing quote (or the end of input).
fn copy_quoted(chars: &[char], start: usize, quote: char, backslash_escapes: bool, out: &mut String) -> usize {
    out.push(quote);
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        out.push(c);
        i += 1;
        if backslash_escapes && c == '\\' {
            if let Some(&next) = chars.get(i) {
                out.push(next);
                i += 1;
            }
        } else if c == quote {
            if chars.get(i) == Some(&quote) {
                out.push(quote);
                i += 1;
            } else {
                return i;
            }
        }
    }
    i
}

fn copy_block_comment(chars: &[char], start: usize, out: &mut String) -> usize {
    let mut depth = 0;
    let mut i = start;
    while i < chars.len() {
        if chars[i] == '/' && chars.get(i + 1) == Some(&'*') {
            depth += 1;
            out.push_str("/*");
            i += 2;
        } else if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
            depth -= 1;
            out.push_str("*/");
            i += 2;
            if depth == 0 {
                return i;
            }
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    i
}

/// `$$` or `$tag$` opening at `start`; `$1` is a positional parameter, not a tag.
fn dollar_tag(chars: &[char], start: usize) -> Option<String> {
    let mut i = start + 1;
    match chars.get(i) {
        Some('$') => return Some("$$".to_string()),
        Some(&c) if c.is_alphabetic() || c == '_' => {}
        _ => return None,
    }
    while let Some(&c) = chars.get(i) {
        if c == '$' {
            return Some(chars[start..=i].iter().collect());
        }
        if !is_ident_char(c) {
            return None;
        }
        i += 1;
    }
    None
}

fn copy_dollar_quoted(chars: &[char], start: usize, tag: &str, out: &mut String) -> usize {
    let tag: Vec<char> = tag.chars().collect();
    out.extend(&tag);
    let mut i = start + tag.len();
    while i < chars.len() {
        if chars[i..].starts_with(&tag) {
            out.extend(&tag);
            return i + tag.len();
        }
        out.push(chars[i]);
        i += 1;
    }
    i
}
