use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Per-operation durability/visibility contract. `None` at every override
/// layer leaves the driver/session default in charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    LocalOne,
    Serial,
    LocalSerial,
}

impl ConsistencyLevel {
    /// The two serial levels are only valid as the serial consistency of a
    /// conditional statement.
    pub fn is_serial(&self) -> bool {
        matches!(self, ConsistencyLevel::Serial | ConsistencyLevel::LocalSerial)
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsistencyLevel::Any => "ANY",
            ConsistencyLevel::One => "ONE",
            ConsistencyLevel::Two => "TWO",
            ConsistencyLevel::Three => "THREE",
            ConsistencyLevel::Quorum => "QUORUM",
            ConsistencyLevel::All => "ALL",
            ConsistencyLevel::LocalQuorum => "LOCAL_QUORUM",
            ConsistencyLevel::EachQuorum => "EACH_QUORUM",
            ConsistencyLevel::LocalOne => "LOCAL_ONE",
            ConsistencyLevel::Serial => "SERIAL",
            ConsistencyLevel::LocalSerial => "LOCAL_SERIAL",
        };
        write!(f, "{}", name)
    }
}

/// Declared CQL column types, as carried by entity metadata and result
/// schemas. Collections carry their declared element/key/value types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CqlType {
    Boolean,
    Int,
    BigInt,
    Counter,
    Float,
    Double,
    Text,
    Blob,
    Uuid,
    Timestamp,
    List(Box<CqlType>),
    Set(Box<CqlType>),
    Map(Box<CqlType>, Box<CqlType>),
}

impl fmt::Display for CqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CqlType::Boolean => write!(f, "boolean"),
            CqlType::Int => write!(f, "int"),
            CqlType::BigInt => write!(f, "bigint"),
            CqlType::Counter => write!(f, "counter"),
            CqlType::Float => write!(f, "float"),
            CqlType::Double => write!(f, "double"),
            CqlType::Text => write!(f, "text"),
            CqlType::Blob => write!(f, "blob"),
            CqlType::Uuid => write!(f, "uuid"),
            CqlType::Timestamp => write!(f, "timestamp"),
            CqlType::List(inner) => write!(f, "list<{}>", inner),
            CqlType::Set(inner) => write!(f, "set<{}>", inner),
            CqlType::Map(k, v) => write!(f, "map<{}, {}>", k, v),
        }
    }
}

/// A decoded column value. Maps keep the server's ordering, so they are
/// stored as ordered pairs rather than a hash map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnValue {
    Null,
    Boolean(bool),
    Int(i32),
    BigInt(i64),
    Counter(i64),
    Float(f32),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
    Uuid(Uuid),
    /// Milliseconds since the epoch.
    Timestamp(i64),
    List(Vec<ColumnValue>),
    Set(Vec<ColumnValue>),
    Map(Vec<(ColumnValue, ColumnValue)>),
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    /// Convert an ad-hoc JSON value into a column value. Numbers become
    /// bigint or double, arrays become lists, objects become text-keyed maps.
    pub fn from_json(value: &serde_json::Value) -> ColumnValue {
        match value {
            serde_json::Value::Null => ColumnValue::Null,
            serde_json::Value::Bool(b) => ColumnValue::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ColumnValue::BigInt(i)
                } else if let Some(f) = n.as_f64() {
                    ColumnValue::Double(f)
                } else {
                    ColumnValue::Null
                }
            }
            serde_json::Value::String(s) => ColumnValue::Text(s.clone()),
            serde_json::Value::Array(items) => {
                ColumnValue::List(items.iter().map(ColumnValue::from_json).collect())
            }
            serde_json::Value::Object(fields) => ColumnValue::Map(
                fields
                    .iter()
                    .map(|(k, v)| (ColumnValue::Text(k.clone()), ColumnValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Renders the CQL literal form, used by DML logging and the counter-table
/// key string.
impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Null => write!(f, "null"),
            ColumnValue::Boolean(b) => write!(f, "{}", b),
            ColumnValue::Int(v) => write!(f, "{}", v),
            ColumnValue::BigInt(v) => write!(f, "{}", v),
            ColumnValue::Counter(v) => write!(f, "{}", v),
            ColumnValue::Float(v) => write!(f, "{}", v),
            ColumnValue::Double(v) => write!(f, "{}", v),
            ColumnValue::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            ColumnValue::Blob(bytes) => {
                write!(f, "0x")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            ColumnValue::Uuid(u) => write!(f, "{}", u),
            ColumnValue::Timestamp(ms) => write!(f, "{}", ms),
            ColumnValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            ColumnValue::Set(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "}}")
            }
            ColumnValue::Map(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// One column of a result schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub cql_type: CqlType,
}

/// Driver-independent result of a statement execution: the ordered column
/// schema, decoded rows, and the server tracing id when tracing was on.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Vec<ColumnValue>>,
    pub tracing_id: Option<Uuid>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The single row of a conditional-statement result, if present.
    pub fn single_row(&self) -> Option<&Vec<ColumnValue>> {
        if self.rows.len() == 1 {
            self.rows.first()
        } else {
            None
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn value(&self, row: usize, name: &str) -> Option<&ColumnValue> {
        let idx = self.column_index(name)?;
        self.rows.get(row)?.get(idx)
    }
}

/// Server-side batch kinds. COUNTER batches are restricted to counter
/// mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchKind {
    Logged,
    Unlogged,
    Counter,
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchKind::Logged => write!(f, "LOGGED"),
            BatchKind::Unlogged => write!(f, "UNLOGGED"),
            BatchKind::Counter => write!(f, "COUNTER"),
        }
    }
}
