//! Strict decoding of the numeric arrays a pipeline server returns.
//!
//! Accepted forms:
//! * a JSON number (0-d array);
//! * a rectangular, arbitrarily nested JSON list of numbers;
//! * `{"shape": [..], "data": [..], "dtype": ".."}` with a flat `data` list whose
//!   length equals the product of `shape`. `dtype` is optional.
//!
//! Anything else is rejected with an [`ArrayParseError`]; nothing is evaluated.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArrayParseError {
    #[error("not a JSON literal: {0}")]
    Syntax(String),
    #[error("non-numeric element at {path}")]
    NotNumeric { path: String },
    #[error("ragged array at {path}: expected {expected}, found {found}")]
    Ragged { path: String, expected: String, found: String },
    #[error("shape {shape:?} needs {expected} values, found {found}")]
    ShapeMismatch { shape: Vec<usize>, expected: usize, found: usize },
    #[error("shape {0:?} has more elements than fit in memory")]
    ShapeOverflow(Vec<usize>),
    #[error("integer at {path} is out of range for {dtype}")]
    IntegerRange { path: String, dtype: String },
    #[error("unknown dtype `{0}`")]
    UnknownDtype(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumericArray {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl NumericArray {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, ArrayParseError> {
        let Some(expected) = shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim)) else {
            return Err(ArrayParseError::ShapeOverflow(shape));
        };
        if expected != data.len() {
            return Err(ArrayParseError::ShapeMismatch { shape, expected, found: data.len() });
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] { &self.shape }

    pub fn data(&self) -> &[f64] { &self.data }

    pub fn ndim(&self) -> usize { self.shape.len() }

    /// Shape in tuple notation: `(2, 2)`, `(3,)`, `()`.
    pub fn shape_tuple(&self) -> String {
        match self.shape.as_slice() {
            [only] => format!("({only},)"),
            dims => format!("({})", dims.iter().map(usize::to_string).collect::<Vec<_>>().join(", ")),
        }
    }

    /// Row-major lookup.
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.shape.len() { return None; }
        let mut flat = 0;
        for (&i, &dim) in index.iter().zip(&self.shape) {
            if i >= dim { return None; }
            flat = flat * dim + i;
        }
        self.data.get(flat).copied()
    }
}

const MAX_EXACT_INT: i64 = 1 << 53;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ShapedPayload {
    shape: Vec<usize>,
    data: Vec<Value>,
    #[serde(default)]
    dtype: Option<String>,
}

pub fn parse_array(text: &str) -> Result<NumericArray, ArrayParseError> {
    let value: Value = serde_json::from_str(text.trim()).map_err(|e| ArrayParseError::Syntax(e.to_string()))?;
    match value {
        Value::Object(_) => {
            let payload: ShapedPayload =
                serde_json::from_value(value).map_err(|e| ArrayParseError::Syntax(e.to_string()))?;
            from_payload(payload)
        }
        value => from_nested(&value),
    }
}

fn from_payload(payload: ShapedPayload) -> Result<NumericArray, ArrayParseError> {
    // integers are stored as f64, so int64 is limited to the exactly representable range
    let int_range = match payload.dtype.as_deref() {
        None | Some("float32") | Some("float64") => None,
        Some("int32") => Some(i64::from(i32::MIN)..=i64::from(i32::MAX)),
        Some("int64") => Some(-MAX_EXACT_INT..=MAX_EXACT_INT),
        Some(other) => return Err(ArrayParseError::UnknownDtype(other.to_string())),
    };
    let mut data = Vec::with_capacity(payload.data.len());
    for (i, v) in payload.data.iter().enumerate() {
        let path = || format!("data[{i}]");
        let n = match &int_range {
            None => v.as_f64().ok_or_else(|| ArrayParseError::NotNumeric { path: path() })?,
            Some(range) => {
                if !v.is_i64() && !v.is_u64() {
                    return Err(ArrayParseError::NotNumeric { path: path() });
                }
                match v.as_i64().filter(|n| range.contains(n)) {
                    Some(n) => n as f64,
                    None => {
                        let dtype = payload.dtype.clone().unwrap_or_default();
                        return Err(ArrayParseError::IntegerRange { path: path(), dtype });
                    }
                }
            }
        };
        data.push(n);
    }
    NumericArray::new(payload.shape, data)
}

fn from_nested(root: &Value) -> Result<NumericArray, ArrayParseError> {
    // the first element at each depth fixes the shape
    let mut shape = Vec::new();
    let mut probe = root;
    while let Value::Array(items) = probe {
        shape.push(items.len());
        match items.first() {
            Some(first) => probe = first,
            None => break,
        }
    }
    let mut data = Vec::new();
    let mut path = Vec::new();
    collect(root, &shape, &mut path, &mut data)?;
    NumericArray::new(shape, data)
}

fn collect(value: &Value, shape: &[usize], path: &mut Vec<usize>, out: &mut Vec<f64>) -> Result<(), ArrayParseError> {
    let depth = path.len();
    match (value, shape.get(depth)) {
        (Value::Array(items), Some(&len)) => {
            if items.len() != len {
                return Err(ArrayParseError::Ragged { path: render_path(path), expected: format!("{len} elements"), found: format!("{}", items.len()) });
            }
            for (i, item) in items.iter().enumerate() {
                path.push(i);
                collect(item, shape, path, out)?;
                path.pop();
            }
            Ok(())
        }
        (Value::Number(n), None) => {
            out.push(n.as_f64().ok_or_else(|| ArrayParseError::NotNumeric { path: render_path(path) })?);
            Ok(())
        }
        (Value::Array(_), None) => Err(ArrayParseError::Ragged { path: render_path(path), expected: "a number".into(), found: "a list".into() }),
        (Value::Number(_), Some(_)) => Err(ArrayParseError::Ragged { path: render_path(path), expected: "a list".into(), found: "a number".into() }),
        _ => Err(ArrayParseError::NotNumeric { path: render_path(path) }),
    }
}

fn render_path(path: &[usize]) -> String {
    if path.is_empty() {
        return "root".into();
    }
    path.iter().map(|i| format!("[{i}]")).collect()
}

impl fmt::Display for NumericArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.shape.is_empty() {
            return match self.data.first() {
                Some(v) => write!(f, "{v}"),
                None => f.write_str("[]"),
            };
        }
        if self.data.is_empty() {
            return f.write_str("[]");
        }
        write_level(f, &self.shape, &self.data, 0)
    }
}

fn write_level(f: &mut fmt::Formatter<'_>, shape: &[usize], data: &[f64], depth: usize) -> fmt::Result {
    f.write_str("[")?;
    if shape.len() == 1 {
        for (i, v) in data.iter().enumerate() {
            if i > 0 { f.write_str(" ")?; }
            write!(f, "{v}")?;
        }
        return f.write_str("]");
    }
    let stride: usize = shape[1..].iter().product();
    for i in 0..shape[0] {
        if i > 0 {
            f.write_str("\n")?;
            for _ in 0..=depth { f.write_str(" ")?; }
        }
        write_level(f, &shape[1..], &data[i * stride..(i + 1) * stride], depth + 1)?;
    }
    f.write_str("]")
}
