//! The whitelisted function surface available to grading scripts.
//!
//! Nothing here touches the host: no I/O, clocks, randomness or environment.
//! Every function is pure over [`Value`]s.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::value::{
    Eval, Fault, Number, Value, compare_values, contains, format_float, pow_numbers, reserve,
    values_equal,
};

/// Every callable name. Calls to anything else are rejected at compile time.
pub const NAMES: &[&str] = &[
    "abs", "all", "any", "append", "bool", "ceil", "contains", "count", "endswith", "enumerate",
    "extend", "find", "float", "floor", "format", "get", "int", "isalpha", "isdigit", "isnumeric",
    "items", "join", "keys", "len", "list", "lower", "lstrip", "max", "min", "pow", "range",
    "replace", "reversed", "round", "rstrip", "sorted", "split", "sqrt", "startswith", "str",
    "strip", "sum", "upper", "values", "zip",
];

/// Built-ins that update their first argument in place when it is a plain
/// variable (`xs.append(1)`).
pub const MUTATING: &[&str] = &["append", "extend"];

pub fn is_builtin(name: &str) -> bool {
    NAMES.contains(&name)
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Eval<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(format!(
            "{name}() takes {expected} argument(s) but {} were given",
            args.len()
        )
        .into());
    }
    Ok(())
}

fn type_error(name: &str, value: &Value) -> Fault {
    Fault::Message(format!(
        "{name}() does not accept an argument of type '{}'",
        value.type_name()
    ))
}

fn as_str<'a>(name: &str, value: &'a Value) -> Eval<&'a str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(type_error(name, other)),
    }
}

fn as_int(name: &str, value: &Value) -> Eval<i64> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(type_error(name, other)),
    }
}

fn as_number(name: &str, value: &Value) -> Eval<Number> {
    value.as_number().ok_or_else(|| type_error(name, value))
}

fn float_to_int(name: &str, f: f64) -> Eval<i64> {
    if !f.is_finite() || f >= 9.223_372_036_854_776e18 || f < -9.223_372_036_854_776e18 {
        return Err(format!("{name}() cannot convert {} to an integer", format_float(f)).into());
    }
    Ok(f as i64)
}

/// The items of an iterable argument. Running out of memory is reported as
/// such rather than as a type error.
fn items_of(name: &str, value: &Value, allowance: usize) -> Eval<Vec<Value>> {
    value.iterate(allowance).map_err(|fault| match fault {
        Fault::Memory => Fault::Memory,
        Fault::Message(_) => type_error(name, value),
    })
}

/// Either `f(iterable)` or `f(a, b, ...)`.
fn spread(name: &str, args: Vec<Value>, allowance: usize) -> Eval<Vec<Value>> {
    if args.len() == 1 {
        items_of(name, &args[0], allowance)
    } else {
        Ok(args)
    }
}

fn extreme(name: &str, args: Vec<Value>, want: Ordering, allowance: usize) -> Eval<Value> {
    if args.is_empty() {
        return Err(format!("{name}() expects at least one argument").into());
    }
    let items = spread(name, args, allowance)?;
    let mut iter = items.into_iter();
    let mut best = iter
        .next()
        .ok_or_else(|| Fault::Message(format!("{name}() arg is an empty sequence")))?;
    for item in iter {
        if compare_values(&item, &best)? == Some(want) {
            best = item;
        }
    }
    Ok(best)
}

fn sort_values(items: &mut [Value]) -> Eval<()> {
    let mut failure = None;
    items.sort_by(|a, b| match compare_values(a, b) {
        Ok(Some(ordering)) => ordering,
        Ok(None) => Ordering::Equal,
        Err(err) => {
            failure.get_or_insert(err);
            Ordering::Equal
        }
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn strip_with<'a>(s: &'a str, chars: Option<&str>, left: bool, right: bool) -> &'a str {
    let matcher = |c: char| match chars {
        Some(set) => set.contains(c),
        None => c.is_whitespace(),
    };
    let mut out = s;
    if left {
        out = out.trim_start_matches(matcher);
    }
    if right {
        out = out.trim_end_matches(matcher);
    }
    out
}

fn strip(name: &str, args: &[Value], left: bool, right: bool) -> Eval<Value> {
    arity(name, args, 1, 2)?;
    let s = as_str(name, &args[0])?;
    let chars = match args.get(1) {
        Some(v) => Some(as_str(name, v)?),
        None => None,
    };
    Ok(Value::Str(strip_with(s, chars, left, right).to_string()))
}

fn round_value(args: &[Value]) -> Eval<Value> {
    arity("round", args, 1, 2)?;
    let x = as_number("round", &args[0])?;
    match args.get(1) {
        None | Some(Value::None) => match x {
            Number::Int(i) => Ok(Value::Int(i)),
            Number::Float(f) => float_to_int("round", f.round_ties_even()).map(Value::Int),
        },
        Some(digits) => {
            let digits = as_int("round", digits)?.clamp(-300, 300);
            match x {
                Number::Int(i) if digits >= 0 => Ok(Value::Int(i)),
                n => {
                    let scale = 10f64.powi(digits as i32);
                    Ok(Value::Float((n.to_f64() * scale).round_ties_even() / scale))
                }
            }
        }
    }
}

fn sum_values(args: &[Value], allowance: usize) -> Eval<Value> {
    arity("sum", args, 1, 2)?;
    let items = items_of("sum", &args[0], allowance)?;
    let mut total = match args.get(1) {
        Some(start) => as_number("sum", start)?,
        None => Number::Int(0),
    };
    for item in &items {
        let n = as_number("sum", item)?;
        total = match (total, n) {
            (Number::Int(a), Number::Int(b)) => Number::Int(
                a.checked_add(b)
                    .ok_or_else(|| Fault::Message("integer overflow".into()))?,
            ),
            (a, b) => Number::Float(a.to_f64() + b.to_f64()),
        };
    }
    Ok(match total {
        Number::Int(i) => Value::Int(i),
        Number::Float(f) => Value::Float(f),
    })
}

fn range_values(args: &[Value], allowance: usize) -> Eval<Value> {
    arity("range", args, 1, 3)?;
    let ints = args
        .iter()
        .map(|v| as_int("range", v))
        .collect::<Eval<Vec<i64>>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err("range() expects 1 to 3 arguments".into()),
    };
    if step == 0 {
        return Err("range() step must not be zero".into());
    }
    let span = if step > 0 {
        (i128::from(stop) - i128::from(start) + i128::from(step) - 1) / i128::from(step)
    } else {
        (i128::from(start) - i128::from(stop) - i128::from(step) - 1) / -i128::from(step)
    };
    let count = usize::try_from(span.max(0)).unwrap_or(usize::MAX);
    reserve(count.saturating_mul(super::value::VALUE_OVERHEAD), allowance)?;
    let mut out = Vec::with_capacity(count);
    let mut current = start;
    for _ in 0..count {
        out.push(Value::Int(current));
        current = current.wrapping_add(step);
    }
    Ok(Value::List(out))
}

fn split_values(args: &[Value]) -> Eval<Value> {
    arity("split", args, 1, 2)?;
    let s = as_str("split", &args[0])?;
    let parts: Vec<Value> = match args.get(1) {
        None | Some(Value::None) => s.split_whitespace().map(|p| Value::Str(p.to_string())).collect(),
        Some(sep) => {
            let sep = as_str("split", sep)?;
            if sep.is_empty() {
                return Err("split() separator must not be empty".into());
            }
            s.split(sep).map(|p| Value::Str(p.to_string())).collect()
        }
    };
    Ok(Value::List(parts))
}

fn join_values(args: &[Value], allowance: usize) -> Eval<Value> {
    arity("join", args, 2, 2)?;
    let sep = as_str("join", &args[0])?;
    let items = items_of("join", &args[1], allowance)?;
    let mut parts = Vec::with_capacity(items.len());
    for item in &items {
        match item {
            Value::Str(s) => parts.push(s.as_str()),
            other => {
                return Err(format!(
                    "join() expects strings, found '{}'",
                    other.type_name()
                )
                .into());
            }
        }
    }
    let total = parts.iter().map(|p| p.len()).sum::<usize>()
        + sep.len().saturating_mul(parts.len().saturating_sub(1));
    reserve(total, allowance)?;
    Ok(Value::Str(parts.join(sep)))
}

fn replace_values(args: &[Value], allowance: usize) -> Eval<Value> {
    arity("replace", args, 3, 3)?;
    let s = as_str("replace", &args[0])?;
    let old = as_str("replace", &args[1])?;
    let new = as_str("replace", &args[2])?;
    let hits = if old.is_empty() {
        s.chars().count() + 1
    } else {
        s.matches(old).count()
    };
    let grown = s.len() + hits.saturating_mul(new.len());
    reserve(grown, allowance)?;
    Ok(Value::Str(s.replace(old, new)))
}

fn format_one(value: &Value, spec: &str) -> Eval<String> {
    if spec.is_empty() {
        return Ok(value.to_string());
    }
    if let Some(precision) = spec.strip_prefix('.') {
        let kind = precision.chars().last().unwrap_or('f');
        let digits = &precision[..precision.len() - kind.len_utf8().min(precision.len())];
        let digits: usize = digits
            .parse()
            .map_err(|_| Fault::Message(format!("unsupported format spec '{spec}'")))?;
        let digits = digits.min(30);
        let x = as_number("format", value)?.to_f64();
        return match kind {
            'f' => Ok(format!("{x:.digits$}")),
            '%' => Ok(format!("{:.digits$}%", x * 100.0)),
            _ => Err(format!("unsupported format spec '{spec}'").into()),
        };
    }
    match spec {
        "d" => Ok(as_int("format", value)?.to_string()),
        "%" => Ok(format!("{:.6}%", as_number("format", value)?.to_f64() * 100.0)),
        _ => Err(format!("unsupported format spec '{spec}'").into()),
    }
}

/// `"{} of {:.1f}".format(a, b)` with positional and automatic numbering.
fn format_values(args: &[Value], allowance: usize) -> Eval<Value> {
    if args.is_empty() {
        return Err("format() expects a template".into());
    }
    let template = as_str("format", &args[0])?;
    let values = &args[1..];
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut auto = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => return Err("format() template has an unclosed '{'".into()),
                    }
                }
                let (index, spec) = match field.split_once(':') {
                    Some((i, s)) => (i, s),
                    None => (field.as_str(), ""),
                };
                let position = if index.is_empty() {
                    auto += 1;
                    auto - 1
                } else {
                    index
                        .parse::<usize>()
                        .map_err(|_| Fault::Message(format!("invalid format field '{index}'")))?
                };
                let value = values.get(position).ok_or_else(|| {
                    Fault::Message(format!("format() has no argument for field {position}"))
                })?;
                out.push_str(&format_one(value, spec)?);
                reserve(out.len(), allowance)?;
            }
            '}' => return Err("format() template has a single '}'".into()),
            c => out.push(c),
        }
    }
    Ok(Value::Str(out))
}

fn to_int(args: &[Value]) -> Eval<Value> {
    arity("int", args, 1, 1)?;
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) => float_to_int("int", f.trunc()).map(Value::Int),
        Value::Str(s) => s
            .trim()
            .replace('_', "")
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| Fault::Message(format!("invalid literal for int(): '{s}'"))),
        other => Err(type_error("int", other)),
    }
}

fn to_float(args: &[Value]) -> Eval<Value> {
    arity("float", args, 1, 1)?;
    match &args[0] {
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| Fault::Message(format!("could not convert string to float: '{s}'"))),
        other => as_number("float", other).map(|n| Value::Float(n.to_f64())),
    }
}

fn pairs(items: Vec<Value>) -> Value {
    Value::List(items)
}

/// Calls built-in `name`. `allowance` is the number of bytes the script may
/// still allocate; functions whose output can outgrow their input check it.
pub fn call(name: &str, args: Vec<Value>, allowance: usize) -> Eval<Value> {
    match name {
        "len" => {
            arity(name, &args, 1, 1)?;
            let n = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Map(map) => map.len(),
                other => return Err(type_error(name, other)),
            };
            Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
        }
        "str" => {
            arity(name, &args, 0, 1)?;
            Ok(Value::Str(args.first().map(Value::to_string).unwrap_or_default()))
        }
        "int" => to_int(&args),
        "float" => to_float(&args),
        "bool" => {
            arity(name, &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::truthy)))
        }
        "abs" => {
            arity(name, &args, 1, 1)?;
            match as_number(name, &args[0])? {
                Number::Int(i) => i
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| Fault::Message("integer overflow".into())),
                Number::Float(f) => Ok(Value::Float(f.abs())),
            }
        }
        "round" => round_value(&args),
        "min" => extreme(name, args, Ordering::Less, allowance),
        "max" => extreme(name, args, Ordering::Greater, allowance),
        "sum" => sum_values(&args, allowance),
        "sorted" => {
            arity(name, &args, 1, 1)?;
            let mut items = items_of(name, &args[0], allowance)?;
            sort_values(&mut items)?;
            Ok(Value::List(items))
        }
        "reversed" => {
            arity(name, &args, 1, 1)?;
            let mut items = items_of(name, &args[0], allowance)?;
            items.reverse();
            Ok(Value::List(items))
        }
        "range" => range_values(&args, allowance),
        "any" | "all" => {
            arity(name, &args, 1, 1)?;
            let items = items_of(name, &args[0], allowance)?;
            Ok(Value::Bool(if name == "any" {
                items.iter().any(Value::truthy)
            } else {
                items.iter().all(Value::truthy)
            }))
        }
        "list" => {
            arity(name, &args, 0, 1)?;
            match args.first() {
                Some(v) => items_of(name, v, allowance).map(Value::List),
                None => Ok(Value::List(Vec::new())),
            }
        }
        "keys" | "values" | "items" => {
            arity(name, &args, 1, 1)?;
            let Value::Map(map) = &args[0] else {
                return Err(type_error(name, &args[0]));
            };
            Ok(Value::List(match name {
                "keys" => map.keys().cloned().map(Value::Str).collect(),
                "values" => map.values().cloned().collect(),
                _ => map
                    .iter()
                    .map(|(k, v)| pairs(vec![Value::Str(k.clone()), v.clone()]))
                    .collect(),
            }))
        }
        "get" => {
            arity(name, &args, 2, 3)?;
            let Value::Map(map) = &args[0] else {
                return Err(type_error(name, &args[0]));
            };
            let key = as_str(name, &args[1])?;
            Ok(map
                .get(key)
                .cloned()
                .or_else(|| args.get(2).cloned())
                .unwrap_or(Value::None))
        }
        "contains" => {
            arity(name, &args, 2, 2)?;
            contains(&args[0], &args[1]).map(Value::Bool)
        }
        "lower" | "upper" => {
            arity(name, &args, 1, 1)?;
            let s = as_str(name, &args[0])?;
            Ok(Value::Str(if name == "lower" {
                s.to_lowercase()
            } else {
                s.to_uppercase()
            }))
        }
        "strip" => strip(name, &args, true, true),
        "lstrip" => strip(name, &args, true, false),
        "rstrip" => strip(name, &args, false, true),
        "split" => split_values(&args),
        "join" => join_values(&args, allowance),
        "startswith" | "endswith" => {
            arity(name, &args, 2, 2)?;
            let s = as_str(name, &args[0])?;
            let affix = as_str(name, &args[1])?;
            Ok(Value::Bool(if name == "startswith" {
                s.starts_with(affix)
            } else {
                s.ends_with(affix)
            }))
        }
        "replace" => replace_values(&args, allowance),
        "find" => {
            arity(name, &args, 2, 2)?;
            let s = as_str(name, &args[0])?;
            let needle = as_str(name, &args[1])?;
            Ok(Value::Int(match s.find(needle) {
                Some(byte) => i64::try_from(s[..byte].chars().count()).unwrap_or(i64::MAX),
                None => -1,
            }))
        }
        "count" => {
            arity(name, &args, 2, 2)?;
            let n = match (&args[0], &args[1]) {
                (Value::Str(s), Value::Str(needle)) if needle.is_empty() => s.chars().count() + 1,
                (Value::Str(s), Value::Str(needle)) => s.matches(needle.as_str()).count(),
                (Value::List(items), item) => items.iter().filter(|v| values_equal(v, item)).count(),
                (other, _) => return Err(type_error(name, other)),
            };
            Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
        }
        "format" => format_values(&args, allowance),
        "isdigit" | "isnumeric" | "isalpha" => {
            arity(name, &args, 1, 1)?;
            let s = as_str(name, &args[0])?;
            let test: fn(char) -> bool = match name {
                "isdigit" => |c| c.is_ascii_digit(),
                "isnumeric" => char::is_numeric,
                _ => char::is_alphabetic,
            };
            Ok(Value::Bool(!s.is_empty() && s.chars().all(test)))
        }
        "pow" => {
            arity(name, &args, 2, 2)?;
            pow_numbers(as_number(name, &args[0])?, as_number(name, &args[1])?)
        }
        "sqrt" => {
            arity(name, &args, 1, 1)?;
            let x = as_number(name, &args[0])?.to_f64();
            if x < 0.0 {
                return Err("sqrt() of a negative number".into());
            }
            Ok(Value::Float(x.sqrt()))
        }
        "floor" | "ceil" => {
            arity(name, &args, 1, 1)?;
            match as_number(name, &args[0])? {
                Number::Int(i) => Ok(Value::Int(i)),
                Number::Float(f) => {
                    let rounded = if name == "floor" { f.floor() } else { f.ceil() };
                    float_to_int(name, rounded).map(Value::Int)
                }
            }
        }
        "append" => {
            arity(name, &args, 2, 2)?;
            let mut args = args;
            let item = args.pop().unwrap_or(Value::None);
            match args.pop() {
                Some(Value::List(mut items)) => {
                    reserve(item.footprint(), allowance)?;
                    items.push(item);
                    Ok(Value::List(items))
                }
                Some(other) => Err(type_error(name, &other)),
                None => Err("append() expects a list".into()),
            }
        }
        "extend" => {
            arity(name, &args, 2, 2)?;
            let extra = items_of(name, &args[1], allowance)?;
            let Value::List(items) = &args[0] else {
                return Err(type_error(name, &args[0]));
            };
            reserve(extra.iter().map(Value::footprint).sum(), allowance)?;
            let mut out = items.clone();
            out.extend(extra);
            Ok(Value::List(out))
        }
        "enumerate" => {
            arity(name, &args, 1, 1)?;
            let items = items_of(name, &args[0], allowance)?;
            reserve(items.len().saturating_mul(96), allowance)?;
            Ok(Value::List(
                items
                    .into_iter()
                    .zip(0i64..)
                    .map(|(v, i)| pairs(vec![Value::Int(i), v]))
                    .collect(),
            ))
        }
        "zip" => {
            arity(name, &args, 2, 2)?;
            let left = items_of(name, &args[0], allowance)?;
            let right = items_of(name, &args[1], allowance)?;
            reserve(left.len().min(right.len()).saturating_mul(96), allowance)?;
            Ok(Value::List(
                left.into_iter()
                    .zip(right)
                    .map(|(a, b)| pairs(vec![a, b]))
                    .collect(),
            ))
        }
        _ => Err(format!("'{name}' is not an available function").into()),
    }
}

/// Builds the `student_answers` map binding.
pub fn answers_map(answers: &BTreeMap<String, String>) -> Value {
    Value::Map(
        answers
            .iter()
            .map(|(k, v)| (k.clone(), Value::Str(v.clone())))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLENTY: usize = 1 << 20;

    fn s(v: &str) -> Value {
        Value::Str(v.to_string())
    }

    fn call_ok(name: &str, args: Vec<Value>) -> Value {
        call(name, args, PLENTY).unwrap()
    }

    #[test]
    fn test_every_listed_name_is_dispatched() {
        for name in NAMES {
            let result = call(name, Vec::new(), PLENTY);
            if let Err(Fault::Message(msg)) = result {
                assert!(!msg.contains("not an available function"), "{name} is not wired up");
            }
        }
    }

    #[test]
    fn test_string_helpers() {
        assert_eq!(call_ok("strip", vec![s("  Paris \n")]), s("Paris"));
        assert_eq!(call_ok("rstrip", vec![s("xx--"), s("-")]), s("xx"));
        assert_eq!(
            call_ok("split", vec![s("a, b,c"), s(",")]),
            Value::List(vec![s("a"), s(" b"), s("c")])
        );
        assert_eq!(
            call_ok("join", vec![s("-"), Value::List(vec![s("a"), s("b")])]),
            s("a-b")
        );
        assert_eq!(call_ok("find", vec![s("héllo"), s("l")]), Value::Int(2));
        assert_eq!(call_ok("count", vec![s("banana"), s("an")]), Value::Int(2));
        assert_eq!(call_ok("isdigit", vec![s("0123")]), Value::Bool(true));
        assert_eq!(call_ok("isdigit", vec![s("")]), Value::Bool(false));
    }

    #[test]
    fn test_numeric_helpers() {
        assert_eq!(call_ok("round", vec![Value::Float(2.5)]), Value::Int(2));
        assert_eq!(
            call_ok("round", vec![Value::Float(3.14159), Value::Int(2)]),
            Value::Float(3.14)
        );
        assert_eq!(
            call_ok("sum", vec![Value::List(vec![Value::Int(1), Value::Float(0.5)])]),
            Value::Float(1.5)
        );
        assert_eq!(call_ok("max", vec![Value::Int(3), Value::Int(9), Value::Int(4)]), Value::Int(9));
        assert_eq!(call_ok("floor", vec![Value::Float(-1.5)]), Value::Int(-2));
        assert!(call("min", vec![Value::List(vec![])], PLENTY).is_err());
        assert!(call("sqrt", vec![Value::Int(-1)], PLENTY).is_err());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call_ok("int", vec![s(" 42 ")]), Value::Int(42));
        assert_eq!(call_ok("int", vec![Value::Float(-3.9)]), Value::Int(-3));
        assert_eq!(call_ok("float", vec![s("2.5")]), Value::Float(2.5));
        assert!(call("int", vec![s("4.2")], PLENTY).is_err());
        assert!(call("int", vec![Value::Float(f64::INFINITY)], PLENTY).is_err());
        assert_eq!(call_ok("str", vec![Value::Float(3.0)]), s("3.0"));
    }

    #[test]
    fn test_range_and_budget() {
        assert_eq!(
            call_ok("range", vec![Value::Int(5), Value::Int(0), Value::Int(-2)]),
            Value::List(vec![Value::Int(5), Value::Int(3), Value::Int(1)])
        );
        assert_eq!(
            call("range", vec![Value::Int(1_000_000_000_000)], PLENTY).unwrap_err(),
            Fault::Memory
        );
        assert!(call("range", vec![Value::Int(1), Value::Int(2), Value::Int(0)], PLENTY).is_err());
    }

    #[test]
    fn test_iterating_builtins_report_memory() {
        let text = s(&"a".repeat(10_000));
        for name in ["sorted", "list", "reversed", "enumerate"] {
            assert_eq!(
                call(name, vec![text.clone()], 4096).unwrap_err(),
                Fault::Memory,
                "{name}"
            );
        }
        assert_eq!(call("max", vec![text.clone()], 4096).unwrap_err(), Fault::Memory);
        assert_eq!(call_ok("sorted", vec![s("cab")]), Value::List(vec![s("a"), s("b"), s("c")]));
        assert!(matches!(
            call("sorted", vec![Value::Int(3)], 4096).unwrap_err(),
            Fault::Message(_)
        ));
    }

    #[test]
    fn test_format_template() {
        let out = call_ok(
            "format",
            vec![s("{} of {:.1f} ({0}) {{ok}}"), Value::Int(3), Value::Float(4.26)],
        );
        assert_eq!(out, s("3 of 4.3 (3) {ok}"));
        assert!(call("format", vec![s("{5}"), Value::Int(1)], PLENTY).is_err());
    }

    #[test]
    fn test_map_helpers() {
        let mut map = BTreeMap::new();
        map.insert("q1".to_string(), s("A"));
        let map = Value::Map(map);
        assert_eq!(call_ok("get", vec![map.clone(), s("q1")]), s("A"));
        assert_eq!(call_ok("get", vec![map.clone(), s("q9"), s("-")]), s("-"));
        assert_eq!(
            call_ok("items", vec![map]),
            Value::List(vec![Value::List(vec![s("q1"), s("A")])])
        );
    }

    #[test]
    fn test_sorted_rejects_mixed_types() {
        assert!(call("sorted", vec![Value::List(vec![Value::Int(1), s("a")])], PLENTY).is_err());
        assert_eq!(
            call_ok("sorted", vec![Value::List(vec![Value::Int(3), Value::Float(1.5)])]),
            Value::List(vec![Value::Float(1.5), Value::Int(3)])
        );
    }
}
