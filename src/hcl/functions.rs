//! Stdlib function table reachable from resource/locals blocks
//!. Grounded on Terraform's own function
//! library, restricted to the subset actually useful without a real
//! module graph.

use crate::error::{DriftError, ErrorCode};
use crate::value::Value;

pub fn call(name: &str, args: &[Value]) -> Result<Value, DriftError> {
    match name {
        "upper" => string_fn(args, |s| s.to_uppercase()),
        "lower" => string_fn(args, |s| s.to_lowercase()),
        "trimspace" => string_fn(args, |s| s.trim().to_string()),
        "join" => join(args),
        "split" => split(args),
        "replace" => replace(args),
        "format" => format_fn(args),
        "substr" => substr(args),

        "max" => numeric_fold(args, f64::max),
        "min" => numeric_fold(args, f64::min),
        "abs" => abs(args),
        "ceil" => ceil(args),
        "floor" => floor(args),

        "length" => length(args),
        "concat" => concat(args),
        "merge" => merge(args),
        "contains" => contains(args),
        "keys" => keys(args),
        "values" => values(args),
        "lookup" => lookup(args),
        "coalesce" => coalesce(args),

        "jsonencode" => jsonencode(args),
        "jsondecode" => jsondecode(args),
        "csvdecode" => csvdecode(args),

        // Synthetic helpers introduced by the HCL→Expression conversion for
        // array/object literals that contain non-literal elements — not
        // part of the public stdlib table, never user-callable by name.
        "__list" => Ok(Value::Seq(args.to_vec())),
        "__map" => map_pairs(args),

        other => Err(DriftError::new(
            ErrorCode::HclEvalError,
            format!("unsupported function: {other}"),
        )),
    }
}

fn unsupported_args(name: &str) -> DriftError {
    DriftError::new(ErrorCode::HclEvalError, format!("invalid arguments to {name}"))
}

fn string_fn(args: &[Value], f: impl Fn(&str) -> String) -> Result<Value, DriftError> {
    let s = args.first().and_then(Value::as_str).ok_or_else(|| unsupported_args("string function"))?;
    Ok(Value::string(f(s)))
}

fn join(args: &[Value]) -> Result<Value, DriftError> {
    let sep = args.first().and_then(Value::as_str).ok_or_else(|| unsupported_args("join"))?;
    let list = args.get(1).and_then(Value::as_seq).ok_or_else(|| unsupported_args("join"))?;
    let parts: Vec<String> = list
        .iter()
        .map(|v| v.as_str().map(String::from).unwrap_or_else(|| display_value(v)))
        .collect();
    Ok(Value::string(parts.join(sep)))
}

fn split(args: &[Value]) -> Result<Value, DriftError> {
    let sep = args.first().and_then(Value::as_str).ok_or_else(|| unsupported_args("split"))?;
    let s = args.get(1).and_then(Value::as_str).ok_or_else(|| unsupported_args("split"))?;
    Ok(Value::Seq(s.split(sep).map(Value::string).collect()))
}

fn replace(args: &[Value]) -> Result<Value, DriftError> {
    let s = args.first().and_then(Value::as_str).ok_or_else(|| unsupported_args("replace"))?;
    let from = args.get(1).and_then(Value::as_str).ok_or_else(|| unsupported_args("replace"))?;
    let to = args.get(2).and_then(Value::as_str).ok_or_else(|| unsupported_args("replace"))?;
    Ok(Value::string(s.replace(from, to)))
}

fn format_fn(args: &[Value]) -> Result<Value, DriftError> {
    let spec = args.first().and_then(Value::as_str).ok_or_else(|| unsupported_args("format"))?;
    let mut out = String::new();
    let mut rest = args[1..].iter();
    let mut chars = spec.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' && chars.peek() == Some(&'s') {
            chars.next();
            if let Some(v) = rest.next() {
                out.push_str(&display_value(v));
            }
        } else {
            out.push(c);
        }
    }
    Ok(Value::string(out))
}

fn substr(args: &[Value]) -> Result<Value, DriftError> {
    let s = args.first().and_then(Value::as_str).ok_or_else(|| unsupported_args("substr"))?;
    let offset = args.get(1).and_then(Value::as_int64).ok_or_else(|| unsupported_args("substr"))?;
    let length = args.get(2).and_then(Value::as_int64).ok_or_else(|| unsupported_args("substr"))?;

    let chars: Vec<char> = s.chars().collect();
    let start = if offset < 0 {
        chars.len().saturating_sub((-offset) as usize)
    } else {
        (offset as usize).min(chars.len())
    };
    let end = if length < 0 {
        chars.len()
    } else {
        (start + length as usize).min(chars.len())
    };
    Ok(Value::string(chars[start..end].iter().collect::<String>()))
}

fn numeric_fold(args: &[Value], f: impl Fn(f64, f64) -> f64) -> Result<Value, DriftError> {
    let mut nums = args.iter().filter_map(Value::as_numeric);
    let first = nums.next().ok_or_else(|| unsupported_args("numeric function"))?;
    Ok(Value::from_f64(nums.fold(first, f)))
}

fn abs(args: &[Value]) -> Result<Value, DriftError> {
    let n = args.first().and_then(Value::as_numeric).ok_or_else(|| unsupported_args("abs"))?;
    Ok(Value::from_f64(n.abs()))
}

fn ceil(args: &[Value]) -> Result<Value, DriftError> {
    let n = args.first().and_then(Value::as_numeric).ok_or_else(|| unsupported_args("ceil"))?;
    Ok(Value::Int64(n.ceil() as i64))
}

fn floor(args: &[Value]) -> Result<Value, DriftError> {
    let n = args.first().and_then(Value::as_numeric).ok_or_else(|| unsupported_args("floor"))?;
    Ok(Value::Int64(n.floor() as i64))
}

fn length(args: &[Value]) -> Result<Value, DriftError> {
    match args.first() {
        Some(Value::Seq(v)) => Ok(Value::Int64(v.len() as i64)),
        Some(Value::Map(m)) => Ok(Value::Int64(m.len() as i64)),
        Some(Value::String(s)) => Ok(Value::Int64(s.chars().count() as i64)),
        _ => Err(unsupported_args("length")),
    }
}

fn concat(args: &[Value]) -> Result<Value, DriftError> {
    let mut out = Vec::new();
    for a in args {
        match a {
            Value::Seq(v) => out.extend(v.clone()),
            other => return Err(unsupported_args(&format!("concat: non-list argument {other:?}"))),
        }
    }
    Ok(Value::Seq(out))
}

fn merge(args: &[Value]) -> Result<Value, DriftError> {
    let mut out = std::collections::BTreeMap::new();
    for a in args {
        match a {
            Value::Map(m) => out.extend(m.clone()),
            other => return Err(unsupported_args(&format!("merge: non-map argument {other:?}"))),
        }
    }
    Ok(Value::Map(out))
}

fn contains(args: &[Value]) -> Result<Value, DriftError> {
    let list = args.first().and_then(Value::as_seq).ok_or_else(|| unsupported_args("contains"))?;
    let needle = args.get(1).ok_or_else(|| unsupported_args("contains"))?;
    Ok(Value::Bool(list.contains(needle)))
}

fn keys(args: &[Value]) -> Result<Value, DriftError> {
    let m = args.first().and_then(Value::as_map).ok_or_else(|| unsupported_args("keys"))?;
    Ok(Value::Seq(m.keys().map(Value::string).collect()))
}

fn values(args: &[Value]) -> Result<Value, DriftError> {
    let m = args.first().and_then(Value::as_map).ok_or_else(|| unsupported_args("values"))?;
    Ok(Value::Seq(m.values().cloned().collect()))
}

fn lookup(args: &[Value]) -> Result<Value, DriftError> {
    let m = args.first().and_then(Value::as_map).ok_or_else(|| unsupported_args("lookup"))?;
    let key = args.get(1).and_then(Value::as_str).ok_or_else(|| unsupported_args("lookup"))?;
    match m.get(key) {
        Some(v) => Ok(v.clone()),
        None => args.get(2).cloned().ok_or_else(|| unsupported_args("lookup: key not found and no default")),
    }
}

fn coalesce(args: &[Value]) -> Result<Value, DriftError> {
    args.iter()
        .find(|v| !matches!(v, Value::Null))
        .cloned()
        .ok_or_else(|| unsupported_args("coalesce: all arguments null"))
}

fn jsonencode(args: &[Value]) -> Result<Value, DriftError> {
    let v = args.first().ok_or_else(|| unsupported_args("jsonencode"))?;
    Ok(Value::string(v.to_json().to_string()))
}

fn jsondecode(args: &[Value]) -> Result<Value, DriftError> {
    let s = args.first().and_then(Value::as_str).ok_or_else(|| unsupported_args("jsondecode"))?;
    let json: serde_json::Value = serde_json::from_str(s)
        .map_err(|e| DriftError::wrap(ErrorCode::HclEvalError, "jsondecode: invalid JSON", e))?;
    Ok(Value::from_json(&json))
}

fn csvdecode(args: &[Value]) -> Result<Value, DriftError> {
    let s = args.first().and_then(Value::as_str).ok_or_else(|| unsupported_args("csvdecode"))?;
    let mut lines = s.lines();
    let header: Vec<&str> = lines.next().map(|h| h.split(',').collect()).unwrap_or_default();
    let rows: Vec<Value> = lines
        .map(|line| {
            let cells: Vec<&str> = line.split(',').collect();
            Value::map_from(
                header
                    .iter()
                    .zip(cells.iter())
                    .map(|(k, v)| (k.to_string(), Value::string(v.trim()))),
            )
        })
        .collect();
    Ok(Value::Seq(rows))
}

fn map_pairs(args: &[Value]) -> Result<Value, DriftError> {
    let mut out = std::collections::BTreeMap::new();
    let mut iter = args.iter();
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        let key = k.as_str().map(String::from).ok_or_else(|| unsupported_args("__map"))?;
        out.insert(key, v.clone());
    }
    Ok(Value::Map(out))
}

fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Int64(i) => i.to_string(),
        Value::Float64(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_json().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_formats_mixed_list() {
        let result = call("join", &[Value::string(","), Value::Seq(vec![Value::string("a"), Value::Int64(1)])]).unwrap();
        assert_eq!(result, Value::string("a,1"));
    }

    #[test]
    fn unsupported_function_is_fatal() {
        let err = call("nope", &[]).unwrap_err();
        assert_eq!(err.code, ErrorCode::HclEvalError);
    }

    #[test]
    fn lookup_falls_back_to_default() {
        let m = Value::map_from([("a".to_string(), Value::Int64(1))]);
        let result = call("lookup", &[m, Value::string("b"), Value::Int64(42)]).unwrap();
        assert_eq!(result, Value::Int64(42));
    }
}
