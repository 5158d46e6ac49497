//! Runtime values and the operators defined on them.
//!
//! Values have copy semantics: assigning a list to a second name copies it.
//! Maps are string-keyed and iterate in key order.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use super::ast::{BinaryOp, CompareOp};

/// Approximate per-value bookkeeping cost used by the memory budget.
pub const VALUE_OVERHEAD: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// A failure raised while evaluating an operator or built-in. The
/// interpreter attaches the source line.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    Message(String),
    Memory,
}

impl From<String> for Fault {
    fn from(message: String) -> Self {
        Fault::Message(message)
    }
}

impl From<&str> for Fault {
    fn from(message: &str) -> Self {
        Fault::Message(message.to_string())
    }
}

pub type Eval<T> = Result<T, Fault>;

/// Fails with [`Fault::Memory`] if `bytes` exceeds what the script may still
/// allocate.
pub fn reserve(bytes: usize, allowance: usize) -> Eval<()> {
    if bytes > allowance {
        Err(Fault::Memory)
    } else {
        Ok(())
    }
}

fn overflow() -> Fault {
    Fault::Message("integer overflow".into())
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    pub fn footprint(&self) -> usize {
        match self {
            Value::Str(s) => VALUE_OVERHEAD + s.len(),
            Value::List(items) => VALUE_OVERHEAD + items.iter().map(Value::footprint).sum::<usize>(),
            Value::Map(map) => {
                VALUE_OVERHEAD
                    + map
                        .iter()
                        .map(|(k, v)| VALUE_OVERHEAD + k.len() + v.footprint())
                        .sum::<usize>()
            }
            _ => VALUE_OVERHEAD,
        }
    }

    /// Numeric view used by arithmetic. Booleans count as 0/1.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Bool(b) => Some(Number::Int(i64::from(*b))),
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(Number::to_f64)
    }

    /// Representation used inside containers: strings are quoted.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            other => other.to_string(),
        }
    }

    /// Materialises the items a `for` loop or comprehension walks over. Fails
    /// with [`Fault::Memory`] before copying when the items do not fit in
    /// `allowance`.
    pub fn iterate(&self, allowance: usize) -> Eval<Vec<Value>> {
        match self {
            Value::List(items) => {
                reserve(self.footprint(), allowance)?;
                Ok(items.clone())
            }
            Value::Str(s) => {
                let size = s.chars().count().saturating_mul(VALUE_OVERHEAD).saturating_add(s.len());
                reserve(size, allowance)?;
                Ok(s.chars().map(|c| Value::Str(c.to_string())).collect())
            }
            Value::Map(map) => {
                let size = map
                    .keys()
                    .map(|k| VALUE_OVERHEAD + k.len())
                    .fold(0usize, usize::saturating_add);
                reserve(size, allowance)?;
                Ok(map.keys().cloned().map(Value::Str).collect())
            }
            other => Err(format!("'{}' object is not iterable", other.type_name()).into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn to_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Map(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("'{}': {}", k, v.repr()))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

/// Structural equality with numeric cross-type comparison (`1 == 1.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Map(x), Value::Map(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y)
                    .all(|((kl, vl), (kr, vr))| kl == kr && values_equal(vl, vr))
        }
        _ => match (a.as_number(), b.as_number()) {
            (Some(Number::Int(x)), Some(Number::Int(y))) => x == y,
            (Some(x), Some(y)) => x.to_f64() == y.to_f64(),
            _ => a == b,
        },
    }
}

/// Ordering for `<`-style operators, `min`, `max` and `sorted`. `Ok(None)`
/// means the operands are comparable but unordered (NaN).
pub fn compare_values(a: &Value, b: &Value) -> Eval<Option<Ordering>> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.cmp(y))),
        (Value::List(x), Value::List(y)) => {
            for (l, r) in x.iter().zip(y) {
                if values_equal(l, r) {
                    continue;
                }
                return compare_values(l, r);
            }
            Ok(Some(x.len().cmp(&y.len())))
        }
        _ => match (a.as_number(), b.as_number()) {
            (Some(Number::Int(x)), Some(Number::Int(y))) => Ok(Some(x.cmp(&y))),
            (Some(x), Some(y)) => Ok(x.to_f64().partial_cmp(&y.to_f64())),
            _ => Err(format!(
                "cannot order '{}' and '{}'",
                a.type_name(),
                b.type_name()
            )
            .into()),
        },
    }
}

pub fn contains(container: &Value, item: &Value) -> Eval<bool> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(needle.as_str())),
            other => Err(format!(
                "'in <str>' requires a string on the left, not '{}'",
                other.type_name()
            )
            .into()),
        },
        Value::List(items) => Ok(items.iter().any(|v| values_equal(v, item))),
        Value::Map(map) => match item {
            Value::Str(key) => Ok(map.contains_key(key)),
            _ => Ok(false),
        },
        other => Err(format!("argument of type '{}' is not a container", other.type_name()).into()),
    }
}

pub fn compare(op: CompareOp, left: &Value, right: &Value) -> Eval<bool> {
    Ok(match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::NotEq => !values_equal(left, right),
        CompareOp::In => contains(right, left)?,
        CompareOp::NotIn => !contains(right, left)?,
        CompareOp::Lt => compare_values(left, right)? == Some(Ordering::Less),
        CompareOp::LtE => matches!(
            compare_values(left, right)?,
            Some(Ordering::Less | Ordering::Equal)
        ),
        CompareOp::Gt => compare_values(left, right)? == Some(Ordering::Greater),
        CompareOp::GtE => matches!(
            compare_values(left, right)?,
            Some(Ordering::Greater | Ordering::Equal)
        ),
    })
}

fn unsupported(op: BinaryOp, a: &Value, b: &Value) -> Fault {
    Fault::Message(format!(
        "unsupported operand types for {}: '{}' and '{}'",
        op.symbol(),
        a.type_name(),
        b.type_name()
    ))
}

fn repeat_count(count: i64) -> usize {
    usize::try_from(count.max(0)).unwrap_or(usize::MAX)
}

pub fn floor_div_int(a: i64, b: i64) -> Eval<i64> {
    if b == 0 {
        return Err("integer division by zero".into());
    }
    let q = a.checked_div(b).ok_or_else(overflow)?;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

pub fn mod_int(a: i64, b: i64) -> Eval<i64> {
    if b == 0 {
        return Err("integer modulo by zero".into());
    }
    let r = a.checked_rem(b).unwrap_or(0);
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn mod_float(a: f64, b: f64) -> Eval<f64> {
    if b == 0.0 {
        return Err("float modulo by zero".into());
    }
    let r = a % b;
    if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

pub fn pow_numbers(base: Number, exponent: Number) -> Eval<Value> {
    match (base, exponent) {
        (Number::Int(b), Number::Int(e)) if e >= 0 => {
            let e = u32::try_from(e).map_err(|_| overflow())?;
            b.checked_pow(e).map(Value::Int).ok_or_else(overflow)
        }
        (b, e) => {
            let (b, e) = (b.to_f64(), e.to_f64());
            if b == 0.0 && e < 0.0 {
                return Err("zero cannot be raised to a negative power".into());
            }
            Ok(Value::Float(b.powf(e)))
        }
    }
}

/// Applies a binary arithmetic operator. `allowance` is the number of bytes
/// the script may still allocate; sequence concatenation and repetition are
/// checked against it before anything is built.
pub fn binary_op(op: BinaryOp, a: &Value, b: &Value, allowance: usize) -> Eval<Value> {
    match (op, a, b) {
        (BinaryOp::Add, Value::Str(x), Value::Str(y)) => {
            reserve(x.len() + y.len(), allowance)?;
            return Ok(Value::Str(format!("{x}{y}")));
        }
        (BinaryOp::Add, Value::List(x), Value::List(y)) => {
            reserve(a.footprint() + b.footprint(), allowance)?;
            let mut out = x.clone();
            out.extend(y.iter().cloned());
            return Ok(Value::List(out));
        }
        (BinaryOp::Mul, Value::Str(s), Value::Int(n)) | (BinaryOp::Mul, Value::Int(n), Value::Str(s)) => {
            let count = repeat_count(*n);
            reserve(s.len().saturating_mul(count), allowance)?;
            return Ok(Value::Str(s.repeat(count)));
        }
        (BinaryOp::Mul, Value::List(items), Value::Int(n))
        | (BinaryOp::Mul, Value::Int(n), Value::List(items)) => {
            let count = if items.is_empty() { 0 } else { repeat_count(*n) };
            let unit = items.iter().map(Value::footprint).sum::<usize>();
            reserve(unit.saturating_mul(count), allowance)?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            return Ok(Value::List(out));
        }
        _ => {}
    }

    let (x, y) = match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(unsupported(op, a, b)),
    };

    match (x, y) {
        (Number::Int(x), Number::Int(y)) => match op {
            BinaryOp::Add => x.checked_add(y).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Sub => x.checked_sub(y).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Mul => x.checked_mul(y).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Div => {
                if y == 0 {
                    Err("division by zero".into())
                } else {
                    Ok(Value::Float(x as f64 / y as f64))
                }
            }
            BinaryOp::FloorDiv => floor_div_int(x, y).map(Value::Int),
            BinaryOp::Mod => mod_int(x, y).map(Value::Int),
            BinaryOp::Pow => pow_numbers(Number::Int(x), Number::Int(y)),
        },
        (x, y) => {
            let (x, y) = (x.to_f64(), y.to_f64());
            match op {
                BinaryOp::Add => Ok(Value::Float(x + y)),
                BinaryOp::Sub => Ok(Value::Float(x - y)),
                BinaryOp::Mul => Ok(Value::Float(x * y)),
                BinaryOp::Div => {
                    if y == 0.0 {
                        Err("division by zero".into())
                    } else {
                        Ok(Value::Float(x / y))
                    }
                }
                BinaryOp::FloorDiv => {
                    if y == 0.0 {
                        Err("float floor division by zero".into())
                    } else {
                        Ok(Value::Float((x / y).floor()))
                    }
                }
                BinaryOp::Mod => mod_float(x, y).map(Value::Float),
                BinaryOp::Pow => pow_numbers(Number::Float(x), Number::Float(y)),
            }
        }
    }
}

/// Resolves a possibly negative index against a sequence length.
pub fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len_i = i64::try_from(len).ok()?;
    let idx = if index < 0 { index + len_i } else { index };
    if (0..len_i).contains(&idx) {
        usize::try_from(idx).ok()
    } else {
        None
    }
}

fn index_int(index: &Value) -> Eval<i64> {
    match index {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(format!("indices must be integers, not '{}'", other.type_name()).into()),
    }
}

pub fn get_index(base: &Value, index: &Value) -> Eval<Value> {
    match base {
        Value::List(items) => {
            let i = index_int(index)?;
            resolve_index(i, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| Fault::Message("list index out of range".into()))
        }
        Value::Str(s) => {
            let i = index_int(index)?;
            let count = s.chars().count();
            resolve_index(i, count)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::Str(c.to_string()))
                .ok_or_else(|| Fault::Message("string index out of range".into()))
        }
        Value::Map(map) => match index {
            Value::Str(key) => map
                .get(key)
                .cloned()
                .ok_or_else(|| Fault::Message(format!("key not found: '{key}'"))),
            other => Err(format!("map keys must be strings, not '{}'", other.type_name()).into()),
        },
        other => Err(format!("'{}' object is not subscriptable", other.type_name()).into()),
    }
}

fn slice_bound(bound: Option<&Value>, len: usize, default: usize) -> Eval<usize> {
    let Some(bound) = bound else {
        return Ok(default);
    };
    if matches!(bound, Value::None) {
        return Ok(default);
    }
    let i = index_int(bound)?;
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let idx = if i < 0 { (i + len_i).max(0) } else { i.min(len_i) };
    Ok(usize::try_from(idx).unwrap_or(0))
}

pub fn get_slice(base: &Value, start: Option<&Value>, end: Option<&Value>) -> Eval<Value> {
    match base {
        Value::List(items) => {
            let lo = slice_bound(start, items.len(), 0)?;
            let hi = slice_bound(end, items.len(), items.len())?;
            Ok(Value::List(if lo < hi { items[lo..hi].to_vec() } else { Vec::new() }))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let lo = slice_bound(start, chars.len(), 0)?;
            let hi = slice_bound(end, chars.len(), chars.len())?;
            Ok(Value::Str(if lo < hi {
                chars[lo..hi].iter().collect()
            } else {
                String::new()
            }))
        }
        other => Err(format!("'{}' object cannot be sliced", other.type_name()).into()),
    }
}
