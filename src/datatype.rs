// used for persistence
use rusqlite::types::Value;

// used for timestamps and dates in the database
use chrono::{DateTime, NaiveDate, Utc};

// used to print out readable forms of a data type
use std::fmt;

/// A column value type.
///
/// Every type that can be stored in a column knows how to convert itself to and
/// from the raw SQLite representation (a [`Value`]), and to and from the raw
/// string representation used by CSV backups. Null is handled one level up, by
/// the column, so implementations only ever see non-null values.
pub trait DataType: fmt::Debug + Clone + PartialEq + Send + Sync + Sized + 'static {
    // static stuff which needs to be implemented downstream
    const UID: u8;
    const DATA_TYPE: &'static str;
    const SQL_TYPE: &'static str;
    /// True when the empty string is a legitimate value, which makes the
    /// raw-string form unable to tell it apart from null.
    const HOLDS_EMPTY_STRING: bool = false;

    fn to_raw(&self) -> Value;
    fn from_raw(value: &Value) -> Result<Self, String>;
    fn to_raw_string(&self) -> String;
    fn from_raw_string(s: &str) -> Result<Self, String>;

    /// Placeholder text for one bound value of this type.
    fn placeholder() -> &'static str {
        "?"
    }
    // instance callable with pre-made implementation
    fn data_type(&self) -> &'static str {
        Self::DATA_TYPE
    }
    fn identifier(&self) -> u8 {
        Self::UID
    }
}

fn unexpected(expected: &str, value: &Value) -> String {
    format!("expected {}, found {:?}", expected, value.data_type())
}

// ------------- Data Types --------------
impl DataType for i64 {
    const UID: u8 = 1;
    const DATA_TYPE: &'static str = "i64";
    const SQL_TYPE: &'static str = "INTEGER";
    fn to_raw(&self) -> Value {
        Value::Integer(*self)
    }
    fn from_raw(value: &Value) -> Result<i64, String> {
        match value {
            Value::Integer(i) => Ok(*i),
            Value::Text(s) => i64::from_raw_string(s),
            other => Err(unexpected("integer", other)),
        }
    }
    fn to_raw_string(&self) -> String {
        self.to_string()
    }
    fn from_raw_string(s: &str) -> Result<i64, String> {
        s.trim().parse::<i64>().map_err(|e| e.to_string())
    }
}
impl DataType for f64 {
    const UID: u8 = 2;
    const DATA_TYPE: &'static str = "f64";
    const SQL_TYPE: &'static str = "REAL";
    fn to_raw(&self) -> Value {
        Value::Real(*self)
    }
    fn from_raw(value: &Value) -> Result<f64, String> {
        match value {
            Value::Real(f) => Ok(*f),
            // REAL affinity hands back whole numbers as integers
            Value::Integer(i) => Ok(*i as f64),
            Value::Text(s) => f64::from_raw_string(s),
            other => Err(unexpected("real", other)),
        }
    }
    fn to_raw_string(&self) -> String {
        self.to_string()
    }
    fn from_raw_string(s: &str) -> Result<f64, String> {
        s.trim().parse::<f64>().map_err(|e| e.to_string())
    }
}
impl DataType for bool {
    const UID: u8 = 3;
    const DATA_TYPE: &'static str = "bool";
    const SQL_TYPE: &'static str = "INTEGER";
    fn to_raw(&self) -> Value {
        Value::Integer(*self as i64)
    }
    fn from_raw(value: &Value) -> Result<bool, String> {
        match value {
            Value::Integer(0) => Ok(false),
            Value::Integer(1) => Ok(true),
            Value::Integer(i) => Err(format!("{} is not a boolean", i)),
            Value::Text(s) => bool::from_raw_string(s),
            other => Err(unexpected("integer 0 or 1", other)),
        }
    }
    fn to_raw_string(&self) -> String {
        self.to_string()
    }
    fn from_raw_string(s: &str) -> Result<bool, String> {
        match s.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(format!("'{}' is not a boolean", other)),
        }
    }
}
impl DataType for String {
    const UID: u8 = 4;
    const DATA_TYPE: &'static str = "String";
    const SQL_TYPE: &'static str = "TEXT";
    const HOLDS_EMPTY_STRING: bool = true;
    fn to_raw(&self) -> Value {
        Value::Text(self.clone())
    }
    fn from_raw(value: &Value) -> Result<String, String> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            other => Err(unexpected("text", other)),
        }
    }
    fn to_raw_string(&self) -> String {
        self.clone()
    }
    fn from_raw_string(s: &str) -> Result<String, String> {
        Ok(String::from(s))
    }
}
impl DataType for NaiveDate {
    const UID: u8 = 5;
    const DATA_TYPE: &'static str = "NaiveDate";
    const SQL_TYPE: &'static str = "TEXT";
    fn to_raw(&self) -> Value {
        Value::Text(self.to_raw_string())
    }
    fn from_raw(value: &Value) -> Result<NaiveDate, String> {
        match value {
            Value::Text(s) => NaiveDate::from_raw_string(s),
            other => Err(unexpected("date text", other)),
        }
    }
    fn to_raw_string(&self) -> String {
        self.format("%Y-%m-%d").to_string()
    }
    fn from_raw_string(s: &str) -> Result<NaiveDate, String> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| e.to_string())
    }
    // SQLite normalizes the bound text through its date function
    fn placeholder() -> &'static str {
        "DATE(?)"
    }
}
/// A point in time with millisecond precision, stored as milliseconds since
/// the Unix epoch.
///
/// Converting from a [`DateTime<Utc>`] truncates to whole milliseconds, so
/// every `Timestamp` survives storage unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn from_millis(millis: i64) -> Option<Timestamp> {
        DateTime::<Utc>::from_timestamp_millis(millis).map(Timestamp)
    }
    pub fn now() -> Timestamp {
        Timestamp::from(Utc::now())
    }
    pub fn millis(&self) -> i64 {
        self.0.timestamp_millis()
    }
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}
impl From<DateTime<Utc>> for Timestamp {
    fn from(time: DateTime<Utc>) -> Timestamp {
        let millis = time.timestamp_millis();
        // whole milliseconds of a valid DateTime are always in range
        DateTime::<Utc>::from_timestamp_millis(millis).map_or(Timestamp(time), Timestamp)
    }
}
impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

impl DataType for Timestamp {
    const UID: u8 = 6;
    const DATA_TYPE: &'static str = "Timestamp";
    const SQL_TYPE: &'static str = "INTEGER";
    fn to_raw(&self) -> Value {
        Value::Integer(self.millis())
    }
    fn from_raw(value: &Value) -> Result<Timestamp, String> {
        match value {
            Value::Integer(millis) => timestamp_from_millis(*millis),
            Value::Text(s) => Timestamp::from_raw_string(s),
            other => Err(unexpected("epoch milliseconds", other)),
        }
    }
    fn to_raw_string(&self) -> String {
        self.millis().to_string()
    }
    fn from_raw_string(s: &str) -> Result<Timestamp, String> {
        let millis = s.trim().parse::<i64>().map_err(|e| e.to_string())?;
        timestamp_from_millis(millis)
    }
}

fn timestamp_from_millis(millis: i64) -> Result<Timestamp, String> {
    Timestamp::from_millis(millis).ok_or_else(|| format!("{} is out of range for a timestamp", millis))
}

/// The current time, as the default for timestamp columns.
pub fn now_millis() -> Timestamp {
    Timestamp::now()
}
