//! Typed values and command results
//!
//! `SqlValue` is the single value type that flows in both directions: caller
//! parameters are bound from it, and result columns are decoded into it.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::encode::IsNull;
use sqlx::postgres::{PgArgumentBuffer, PgRow, PgTypeInfo};
use sqlx::types::Decimal;
use sqlx::{Encode, Postgres, Row, Type, TypeInfo, ValueRef};
use std::fmt;
use uuid::Uuid;

/// A single scalar, either a bound parameter or a decoded column value.
///
/// Parameters parsed from a caller payload only ever use `Null`, `Bool`,
/// `Int`, `Float` and `Text`; the remaining variants show up in result rows.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Decimal(Decimal),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::Date(_) => "date",
            SqlValue::Time(_) => "time",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::TimestampTz(_) => "timestamptz",
            SqlValue::Uuid(_) => "uuid",
            SqlValue::Json(_) => "json",
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value.into())
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "None"),
            SqlValue::Bool(true) => write!(f, "True"),
            SqlValue::Bool(false) => write!(f, "False"),
            SqlValue::Int(i) => write!(f, "{}", i),
            SqlValue::Float(v) => write!(f, "{:?}", v),
            SqlValue::Text(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            SqlValue::Decimal(d) => write!(f, "{}", d),
            SqlValue::Date(d) => write!(f, "{}", d),
            SqlValue::Time(t) => write!(f, "{}", t),
            SqlValue::Timestamp(ts) => write!(f, "{}", ts),
            SqlValue::TimestampTz(ts) => write!(f, "{}", ts.to_rfc3339()),
            SqlValue::Uuid(u) => write!(f, "{}", u),
            SqlValue::Json(v) => write!(f, "{}", v),
        }
    }
}

/// Render a row as a tuple, e.g. `('alice', 3)` or `('alice',)`
pub fn format_row(row: &[SqlValue]) -> String {
    let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
    match cells.len() {
        1 => format!("({},)", cells[0]),
        _ => format!("({})", cells.join(", ")),
    }
}

/// Outcome of one command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// The last statement had a result descriptor. `rows` may be empty.
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<SqlValue>>,
    },
    /// The last statement was a pure mutation (or DDL).
    NoRows { rows_affected: u64 },
}

impl CommandResult {
    pub fn rows(&self) -> Option<&[Vec<SqlValue>]> {
        match self {
            CommandResult::Rows { rows, .. } => Some(rows),
            CommandResult::NoRows { .. } => None,
        }
    }

    pub fn columns(&self) -> Option<&[String]> {
        match self {
            CommandResult::Rows { columns, .. } => Some(columns),
            CommandResult::NoRows { .. } => None,
        }
    }

    pub fn into_rows(self) -> Option<Vec<Vec<SqlValue>>> {
        match self {
            CommandResult::Rows { rows, .. } => Some(rows),
            CommandResult::NoRows { .. } => None,
        }
    }

    pub fn is_rows(&self) -> bool {
        matches!(self, CommandResult::Rows { .. })
    }
}

/// A parameter as it goes over the wire for one placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum BoundParam {
    /// `NULL`, typed as its placeholder when the server knows that type
    Null(Option<PgTypeInfo>),
    Int2(i16),
    Int4(i32),
    Float4(f32),
    Value(SqlValue),
}

/// How one parameter is bound.
///
/// With `text_cast` set the parameter goes out as TEXT and its placeholder
/// must be read as `($n::text::<type>)`, which lets the server parse the
/// string the same way it parses a quoted literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub param: BoundParam,
    pub text_cast: bool,
}

impl Binding {
    fn plain(param: BoundParam) -> Self {
        Self {
            param,
            text_cast: false,
        }
    }
}

fn is_text_like(type_name: &str) -> bool {
    matches!(type_name, "TEXT" | "VARCHAR" | "CHAR" | "\"CHAR\"" | "NAME" | "UNKNOWN")
}

/// Pick the wire form of `value` for a placeholder the server inferred as
/// `inferred`.
///
/// Integers and floats take the numeric width of the placeholder, scalars
/// bound to a text placeholder are sent as their text, and text bound to any
/// other type is parsed by the server. Values that cannot fit are refused.
pub fn bind_parameter(value: &SqlValue, inferred: Option<&PgTypeInfo>) -> Result<Binding, String> {
    let Some(type_info) = inferred else {
        return Ok(Binding::plain(match value {
            SqlValue::Null => BoundParam::Null(None),
            other => BoundParam::Value(other.clone()),
        }));
    };
    let target = type_info.name();
    let does_not_fit = || format!("{} {} does not fit {}", value.type_name(), value, target);

    let param = match value {
        _ if value.is_null() => BoundParam::Null(Some(type_info.clone())),
        SqlValue::Int(v) => match target {
            "INT2" => BoundParam::Int2(i16::try_from(*v).map_err(|_| does_not_fit())?),
            "INT4" => BoundParam::Int4(i32::try_from(*v).map_err(|_| does_not_fit())?),
            "FLOAT4" => BoundParam::Float4(*v as f32),
            "FLOAT8" => BoundParam::Value(SqlValue::Float(*v as f64)),
            "NUMERIC" => BoundParam::Value(SqlValue::Decimal(Decimal::from(*v))),
            t if is_text_like(t) => BoundParam::Value(SqlValue::Text(v.to_string())),
            _ => BoundParam::Value(value.clone()),
        },
        SqlValue::Float(v) => match target {
            "FLOAT4" => BoundParam::Float4(*v as f32),
            "NUMERIC" => BoundParam::Value(SqlValue::Decimal(
                Decimal::try_from(*v).map_err(|_| does_not_fit())?,
            )),
            t if is_text_like(t) => BoundParam::Value(SqlValue::Text(format!("{:?}", v))),
            _ => BoundParam::Value(value.clone()),
        },
        SqlValue::Bool(v) if is_text_like(target) => BoundParam::Value(SqlValue::Text(v.to_string())),
        SqlValue::Text(_) if !is_text_like(target) => {
            return Ok(Binding {
                param: BoundParam::Value(value.clone()),
                text_cast: true,
            })
        }
        other => BoundParam::Value(other.clone()),
    };

    Ok(Binding::plain(param))
}

impl Type<Postgres> for BoundParam {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }

    fn compatible(_ty: &PgTypeInfo) -> bool {
        true
    }
}

impl<'q> Encode<'q, Postgres> for BoundParam {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> IsNull {
        match self {
            BoundParam::Null(_) => IsNull::Yes,
            BoundParam::Int2(v) => <i16 as Encode<Postgres>>::encode_by_ref(v, buf),
            BoundParam::Int4(v) => <i32 as Encode<Postgres>>::encode_by_ref(v, buf),
            BoundParam::Float4(v) => <f32 as Encode<Postgres>>::encode_by_ref(v, buf),
            BoundParam::Value(value) => encode_value(value, buf),
        }
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        match self {
            BoundParam::Null(type_info) => type_info.clone(),
            BoundParam::Int2(_) => Some(<i16 as Type<Postgres>>::type_info()),
            BoundParam::Int4(_) => Some(<i32 as Type<Postgres>>::type_info()),
            BoundParam::Float4(_) => Some(<f32 as Type<Postgres>>::type_info()),
            BoundParam::Value(value) => value_type(value),
        }
    }
}

fn encode_value(value: &SqlValue, buf: &mut PgArgumentBuffer) -> IsNull {
    match value {
        SqlValue::Null => IsNull::Yes,
        SqlValue::Bool(v) => <bool as Encode<Postgres>>::encode_by_ref(v, buf),
        SqlValue::Int(v) => <i64 as Encode<Postgres>>::encode_by_ref(v, buf),
        SqlValue::Float(v) => <f64 as Encode<Postgres>>::encode_by_ref(v, buf),
        SqlValue::Text(v) => <String as Encode<Postgres>>::encode_by_ref(v, buf),
        SqlValue::Decimal(v) => <Decimal as Encode<Postgres>>::encode_by_ref(v, buf),
        SqlValue::Date(v) => <NaiveDate as Encode<Postgres>>::encode_by_ref(v, buf),
        SqlValue::Time(v) => <NaiveTime as Encode<Postgres>>::encode_by_ref(v, buf),
        SqlValue::Timestamp(v) => <NaiveDateTime as Encode<Postgres>>::encode_by_ref(v, buf),
        SqlValue::TimestampTz(v) => <DateTime<Utc> as Encode<Postgres>>::encode_by_ref(v, buf),
        SqlValue::Uuid(v) => <Uuid as Encode<Postgres>>::encode_by_ref(v, buf),
        SqlValue::Json(v) => <serde_json::Value as Encode<Postgres>>::encode_by_ref(v, buf),
    }
}

fn value_type(value: &SqlValue) -> Option<PgTypeInfo> {
    let type_info = match value {
        SqlValue::Null => return None,
        SqlValue::Bool(_) => <bool as Type<Postgres>>::type_info(),
        SqlValue::Int(_) => <i64 as Type<Postgres>>::type_info(),
        SqlValue::Float(_) => <f64 as Type<Postgres>>::type_info(),
        SqlValue::Text(_) => <String as Type<Postgres>>::type_info(),
        SqlValue::Decimal(_) => <Decimal as Type<Postgres>>::type_info(),
        SqlValue::Date(_) => <NaiveDate as Type<Postgres>>::type_info(),
        SqlValue::Time(_) => <NaiveTime as Type<Postgres>>::type_info(),
        SqlValue::Timestamp(_) => <NaiveDateTime as Type<Postgres>>::type_info(),
        SqlValue::TimestampTz(_) => <DateTime<Utc> as Type<Postgres>>::type_info(),
        SqlValue::Uuid(_) => <Uuid as Type<Postgres>>::type_info(),
        SqlValue::Json(_) => <serde_json::Value as Type<Postgres>>::type_info(),
    };
    Some(type_info)
}

/// Decode every column of a row
pub fn decode_row(row: &PgRow) -> Result<Vec<SqlValue>, sqlx::Error> {
    (0..row.len()).map(|index| decode_column(row, index)).collect()
}

fn decode_column(row: &PgRow, index: usize) -> Result<SqlValue, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "BOOL" => SqlValue::Bool(row.try_get(index)?),
        "INT2" => SqlValue::Int(row.try_get::<i16, _>(index)?.into()),
        "INT4" => SqlValue::Int(row.try_get::<i32, _>(index)?.into()),
        "INT8" => SqlValue::Int(row.try_get::<i64, _>(index)?),
        "FLOAT4" => SqlValue::Float(row.try_get::<f32, _>(index)?.into()),
        "FLOAT8" => SqlValue::Float(row.try_get::<f64, _>(index)?),
        "NUMERIC" => SqlValue::Decimal(row.try_get(index)?),
        "DATE" => SqlValue::Date(row.try_get(index)?),
        "TIME" => SqlValue::Time(row.try_get(index)?),
        "TIMESTAMP" => SqlValue::Timestamp(row.try_get(index)?),
        "TIMESTAMPTZ" => SqlValue::TimestampTz(row.try_get(index)?),
        "UUID" => SqlValue::Uuid(row.try_get(index)?),
        "JSON" | "JSONB" => SqlValue::Json(row.try_get(index)?),
        // text-like types, enums and anything else with a textual wire form
        _ => SqlValue::Text(row.try_get_unchecked::<String, _>(index)?),
    };

    Ok(value)
}
