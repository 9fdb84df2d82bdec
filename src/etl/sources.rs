//! Loading of the three raw sources: customer CSV, transaction parquet, label JSON
//!
//! Transactions may also be given as a columnar JSON object (`{column: [cells]}`).

use super::dates::normalize_column;
use crate::error::{PipelineError, Result};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use serde_json::{Number, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Locations of one dataset version's raw sources
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePaths {
    pub customers: PathBuf,
    pub transactions: PathBuf,
    pub fraud: PathBuf,
}

impl SourcePaths {
    fn all(&self) -> [&Path; 3] {
        [&self.customers, &self.transactions, &self.fraud]
    }

    /// True when at least one of the files is on disk.
    pub fn any_exists(&self) -> bool {
        self.all().iter().any(|p| p.exists())
    }
}

/// Customer row before date parsing
#[derive(Debug, Clone, PartialEq)]
pub struct RawCustomer {
    pub cc_num: u64,
    pub lat: Option<f64>,
    pub long: Option<f64>,
    pub dob: Option<String>,
    pub demographics: BTreeMap<String, String>,
}

/// Transaction timestamp as found in the source
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    Text(String),
    EpochMillis(i64),
}

/// Transaction row before timestamp parsing and joins
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransaction {
    pub trans_num: String,
    pub trans_date_trans_time: RawTimestamp,
    pub unix_time: Option<i64>,
    pub cc_num: u64,
    pub merchant: Option<String>,
    pub category: Option<String>,
    pub amt: Option<f64>,
    pub merch_lat: Option<f64>,
    pub merch_long: Option<f64>,
    pub extra: BTreeMap<String, String>,
}

/// Everything `extract` read, with normalized column names.
#[derive(Debug, Clone, Default)]
pub struct RawSources {
    pub customer_columns: Vec<String>,
    pub customers: Vec<RawCustomer>,
    pub transaction_columns: Vec<String>,
    pub transactions: Vec<RawTransaction>,
    /// Sparse `trans_num -> label` mapping
    pub labels: HashMap<String, u8>,
}

/// Load all three sources of a dataset version.
pub fn extract(paths: &SourcePaths) -> Result<RawSources> {
    for path in paths.all() {
        if !path.exists() {
            return Err(PipelineError::SourceNotFound(path.to_path_buf()));
        }
    }

    let (customer_columns, customers) = read_customers(&paths.customers)?;
    let (transaction_columns, transactions) = read_transactions(&paths.transactions)?;
    let labels = read_labels(&paths.fraud)?;

    info!(
        customers = customers.len(),
        transactions = transactions.len(),
        labels = labels.len(),
        "Raw sources extracted"
    );

    Ok(RawSources {
        customer_columns,
        customers,
        transaction_columns,
        transactions,
        labels,
    })
}

fn read_customers(path: &Path) -> Result<(Vec<String>, Vec<RawCustomer>)> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| PipelineError::format(path, e))?;
    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| PipelineError::format(path, e))?
        .iter()
        .map(normalize_column)
        .collect();

    let position = |name: &str| columns.iter().position(|c| c == name);
    let cc_idx = position("cc_num").ok_or_else(|| PipelineError::Schema(vec!["cc_num".into()]))?;
    let lat_idx = position("lat");
    let long_idx = position("long");
    let dob_idx = position("dob");
    let modeled = [Some(cc_idx), lat_idx, long_idx, dob_idx];

    let mut customers = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| PipelineError::format(path, e))?;
        let field = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };
        let located = |reason: String| PipelineError::format(path, format!("row {}: {}", row + 1, reason));

        let cc_num = field(Some(cc_idx))
            .ok_or_else(|| located("empty cc_num".into()))
            .and_then(|s| parse_u64(s).map_err(located))?;
        let lat = field(lat_idx).map(parse_f64).transpose().map_err(located)?;
        let long = field(long_idx).map(parse_f64).transpose().map_err(located)?;

        let demographics = columns
            .iter()
            .enumerate()
            .filter(|(i, _)| !modeled.contains(&Some(*i)))
            .filter_map(|(i, name)| field(Some(i)).map(|v| (name.clone(), v.to_string())))
            .collect();

        customers.push(RawCustomer {
            cc_num,
            lat,
            long,
            dob: field(dob_idx).map(str::to_string),
            demographics,
        });
    }

    debug!(path = %path.display(), rows = customers.len(), "Customer file read");
    Ok((columns, customers))
}

static NULL: Value = Value::Null;

const TRANSACTION_REQUIRED: [&str; 3] = ["trans_num", "trans_date_trans_time", "cc_num"];
/// Transaction columns with a typed field; every other column lands in `extra`.
pub(super) const TRANSACTION_MODELED: [&str; 9] = [
    "trans_num",
    "trans_date_trans_time",
    "unix_time",
    "cc_num",
    "merchant",
    "category",
    "amt",
    "merch_lat",
    "merch_long",
];

type ColumnTable = BTreeMap<String, Vec<Value>>;

fn read_transactions(path: &Path) -> Result<(Vec<String>, Vec<RawTransaction>)> {
    let table = match path.extension().and_then(|e| e.to_str()) {
        Some("parquet") => read_parquet_table(path)?,
        _ => read_json_table(path)?,
    };

    let table: ColumnTable = table
        .into_iter()
        .map(|(name, cells)| (normalize_column(&name), cells))
        .collect();
    let columns: Vec<String> = table.keys().cloned().collect();

    let missing: Vec<String> = TRANSACTION_REQUIRED
        .iter()
        .filter(|c| !table.contains_key(**c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::Schema(missing));
    }

    let n_rows = table.values().next().map(Vec::len).unwrap_or(0);
    if let Some((name, cells)) = table.iter().find(|(_, cells)| cells.len() != n_rows) {
        return Err(PipelineError::format(
            path,
            format!("column {} has {} cells, expected {}", name, cells.len(), n_rows),
        ));
    }

    let column = |name: &str| table.get(name);
    let mut transactions = Vec::with_capacity(n_rows);

    for row in 0..n_rows {
        let cell = |name: &str| column(name).map(|cells| &cells[row]).unwrap_or(&NULL);
        let located = |reason: String| {
            PipelineError::format(path, format!("row {}: {}", row, reason))
        };

        let trans_num = cell_str(cell("trans_num")).ok_or_else(|| located("empty trans_num".into()))?;
        let cc_num = cell_u64(cell("cc_num"))
            .map_err(located)?
            .ok_or_else(|| located("empty cc_num".into()))?;
        let trans_date_trans_time = match cell("trans_date_trans_time") {
            Value::Number(n) => RawTimestamp::EpochMillis(
                n.as_i64()
                    .ok_or_else(|| located(format!("timestamp {} is not an integer", n)))?,
            ),
            other => RawTimestamp::Text(cell_str(other).unwrap_or_default()),
        };

        let extra = table
            .iter()
            .filter(|(name, _)| !TRANSACTION_MODELED.contains(&name.as_str()))
            .filter_map(|(name, cells)| cell_str(&cells[row]).map(|v| (name.clone(), v)))
            .collect();

        transactions.push(RawTransaction {
            trans_num,
            trans_date_trans_time,
            unix_time: cell_i64(cell("unix_time")).map_err(located)?,
            cc_num,
            merchant: cell_str(cell("merchant")),
            category: cell_str(cell("category")),
            amt: cell_f64(cell("amt")).map_err(located)?,
            merch_lat: cell_f64(cell("merch_lat")).map_err(located)?,
            merch_long: cell_f64(cell("merch_long")).map_err(located)?,
            extra,
        });
    }

    debug!(path = %path.display(), rows = transactions.len(), "Transaction file read");
    Ok((columns, transactions))
}

fn read_json_table(path: &Path) -> Result<ColumnTable> {
    let text = fs::read_to_string(path).map_err(|e| PipelineError::format(path, e))?;
    serde_json::from_str(&text).map_err(|e| PipelineError::format(path, e))
}

/// Flatten a parquet file into the same column table the JSON form yields.
fn read_parquet_table(path: &Path) -> Result<ColumnTable> {
    let file = fs::File::open(path).map_err(|e| PipelineError::format(path, e))?;
    let reader = SerializedFileReader::new(file).map_err(|e| PipelineError::format(path, e))?;
    debug!(
        path = %path.display(),
        row_groups = reader.metadata().num_row_groups(),
        rows = reader.metadata().file_metadata().num_rows(),
        "Parquet metadata read"
    );

    let mut table = ColumnTable::new();
    let rows = reader.get_row_iter(None).map_err(|e| PipelineError::format(path, e))?;
    for row in rows {
        let row = row.map_err(|e| PipelineError::format(path, e))?;
        for (name, field) in row.get_column_iter() {
            table.entry(name.clone()).or_default().push(field_value(field));
        }
    }
    Ok(table)
}

/// Timestamps become epoch millis, dates midnight of that day.
fn field_value(field: &Field) -> Value {
    match field {
        Field::Null => Value::Null,
        Field::Bool(b) => Value::Bool(*b),
        Field::Byte(v) => Value::from(*v),
        Field::Short(v) => Value::from(*v),
        Field::Int(v) => Value::from(*v),
        Field::Long(v) => Value::from(*v),
        Field::UByte(v) => Value::from(*v),
        Field::UShort(v) => Value::from(*v),
        Field::UInt(v) => Value::from(*v),
        Field::ULong(v) => Value::from(*v),
        Field::Float(v) => Number::from_f64(f64::from(*v)).map_or(Value::Null, Value::Number),
        Field::Double(v) => Number::from_f64(*v).map_or(Value::Null, Value::Number),
        Field::Str(s) => Value::String(s.clone()),
        Field::TimestampMillis(ms) => Value::from(*ms),
        Field::TimestampMicros(us) => Value::from(us.div_euclid(1_000)),
        Field::Date(days) => Value::from(i64::from(*days) * 86_400_000),
        other => Value::String(other.to_string()),
    }
}

/// Read the label file. Accepts a `{trans_num: label}` mapping, a single
/// `{"trans_num", "is_fraud"}` record, or an array of either.
fn read_labels(path: &Path) -> Result<HashMap<String, u8>> {
    let text = fs::read_to_string(path).map_err(|e| PipelineError::format(path, e))?;
    let value: Value = serde_json::from_str(&text).map_err(|e| PipelineError::format(path, e))?;

    let mut labels = HashMap::new();
    match &value {
        Value::Array(items) => {
            for item in items {
                collect_labels(item, &mut labels).map_err(|e| PipelineError::format(path, e))?;
            }
        }
        other => collect_labels(other, &mut labels).map_err(|e| PipelineError::format(path, e))?,
    }

    debug!(path = %path.display(), labels = labels.len(), "Label file read");
    Ok(labels)
}

fn collect_labels(value: &Value, labels: &mut HashMap<String, u8>) -> std::result::Result<(), String> {
    let map = value
        .as_object()
        .ok_or_else(|| format!("expected a JSON object, found {}", value))?;

    if let (Some(trans_num), Some(label)) = (map.get("trans_num"), map.get("is_fraud")) {
        let trans_num = cell_str(trans_num).ok_or("record with empty trans_num")?;
        if let Some(label) = parse_label(label)? {
            labels.insert(trans_num, label);
        }
        return Ok(());
    }

    for (trans_num, label) in map {
        if let Some(label) = parse_label(label)? {
            labels.insert(trans_num.clone(), label);
        }
    }
    Ok(())
}

/// Null labels count as absent and later default to 0.
fn parse_label(value: &Value) -> std::result::Result<Option<u8>, String> {
    let label = match value {
        Value::Null => return Ok(None),
        Value::Bool(b) => u8::from(*b),
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 0.0 => 0,
            Some(x) if x == 1.0 => 1,
            _ => return Err(format!("label {} is not 0 or 1", n)),
        },
        Value::String(s) => match s.trim() {
            "0" | "false" => 0,
            "1" | "true" => 1,
            other => return Err(format!("label {:?} is not 0 or 1", other)),
        },
        other => return Err(format!("label {} is not 0 or 1", other)),
    };
    Ok(Some(label))
}

fn cell_str(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn cell_f64(value: &Value) -> std::result::Result<Option<f64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => parse_f64(s.trim()).map(Some),
        other => Err(format!("expected a number, found {}", other)),
    }
}

fn cell_i64(value: &Value) -> std::result::Result<Option<i64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| format!("expected an integer, found {}", n)),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("expected an integer, found {:?}", s)),
        other => Err(format!("expected an integer, found {}", other)),
    }
}

fn cell_u64(value: &Value) -> std::result::Result<Option<u64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| format!("expected a card number, found {}", n)),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => parse_u64(s.trim()).map(Some),
        other => Err(format!("expected a card number, found {}", other)),
    }
}

fn parse_f64(raw: &str) -> std::result::Result<f64, String> {
    raw.parse().map_err(|_| format!("expected a number, found {:?}", raw))
}

fn parse_u64(raw: &str) -> std::result::Result<u64, String> {
    raw.parse().map_err(|_| format!("expected a card number, found {:?}", raw))
}
