//! Tree-walking evaluator: turns an [`Expression`] plus an [`EvalContext`]
//! into a [`Value`]. `oxid`'s `config::types::Expression` modeled this
//! grammar but never walked it — it just forwarded the AST to an external
//! provider process. This module is the missing evaluator.

use crate::error::{DriftError, ErrorCode};
use crate::hcl::ast::{BinOp, Expression, RawValue, TemplatePart, UnaryOp};
use crate::hcl::context::EvalContext;
use crate::hcl::functions;
use crate::value::Value;

/// The result of evaluating an expression: either a known value, or
/// "unknown" — a reference to unreachable data (resource attributes,
/// module outputs, data sources), which is dropped with a warning rather
/// than treated as fatal.
#[derive(Debug, Clone)]
pub enum Evaluated {
    Known(Value),
    Unknown,
}

impl Evaluated {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Evaluated::Known(v) => Some(v),
            Evaluated::Unknown => None,
        }
    }
}

pub fn evaluate(expr: &Expression, ctx: &EvalContext) -> Result<Evaluated, DriftError> {
    match expr {
        Expression::Literal(raw) => Ok(Evaluated::Known(raw_to_value(raw))),

        Expression::Reference(parts) => match ctx.resolve(parts) {
            Some(v) => Ok(Evaluated::Known(v)),
            None => Ok(Evaluated::Unknown),
        },

        Expression::FunctionCall { name, args } => {
            let mut known_args = Vec::with_capacity(args.len());
            for a in args {
                match evaluate(a, ctx)? {
                    Evaluated::Known(v) => known_args.push(v),
                    Evaluated::Unknown => return Ok(Evaluated::Unknown),
                }
            }
            functions::call(name, &known_args).map(Evaluated::Known)
        }

        Expression::Conditional { condition, true_val, false_val } => {
            match evaluate(condition, ctx)? {
                Evaluated::Known(v) => {
                    let cond = v.as_bool().ok_or_else(|| {
                        DriftError::new(ErrorCode::HclEvalError, "conditional expects a boolean condition")
                    })?;
                    evaluate(if cond { true_val } else { false_val }, ctx)
                }
                Evaluated::Unknown => Ok(Evaluated::Unknown),
            }
        }

        Expression::ForExpr { collection, key_var, val_var, key_expr, value_expr, condition, grouping } => {
            evaluate_for(collection, key_var.as_deref(), val_var, key_expr.as_deref(), value_expr, condition.as_deref(), *grouping, ctx)
        }

        Expression::Template(parts) => evaluate_template(parts, ctx),

        Expression::Index { collection, key } => {
            let coll = match evaluate(collection, ctx)? {
                Evaluated::Known(v) => v,
                Evaluated::Unknown => return Ok(Evaluated::Unknown),
            };
            let key = match evaluate(key, ctx)? {
                Evaluated::Known(v) => v,
                Evaluated::Unknown => return Ok(Evaluated::Unknown),
            };
            Ok(index_into(&coll, &key))
        }

        Expression::GetAttr { object, name } => {
            let obj = match evaluate(object, ctx)? {
                Evaluated::Known(v) => v,
                Evaluated::Unknown => return Ok(Evaluated::Unknown),
            };
            match obj.as_map().and_then(|m| m.get(name)) {
                Some(v) => Ok(Evaluated::Known(v.clone())),
                None => Ok(Evaluated::Unknown),
            }
        }

        Expression::BinaryOp { op, left, right } => evaluate_binary(*op, left, right, ctx),

        Expression::UnaryOp { op, operand } => {
            let v = match evaluate(operand, ctx)? {
                Evaluated::Known(v) => v,
                Evaluated::Unknown => return Ok(Evaluated::Unknown),
            };
            match op {
                UnaryOp::Neg => {
                    let n = v.as_numeric().ok_or_else(|| {
                        DriftError::new(ErrorCode::HclEvalError, "unary minus expects a number")
                    })?;
                    Ok(Evaluated::Known(Value::from_f64(-n)))
                }
                UnaryOp::Not => {
                    let b = v.as_bool().ok_or_else(|| {
                        DriftError::new(ErrorCode::HclEvalError, "unary not expects a boolean")
                    })?;
                    Ok(Evaluated::Known(Value::Bool(!b)))
                }
            }
        }

        Expression::Splat { source, each } => {
            let src = match evaluate(source, ctx)? {
                Evaluated::Known(v) => v,
                Evaluated::Unknown => return Ok(Evaluated::Unknown),
            };
            let Some(items) = src.as_seq() else { return Ok(Evaluated::Unknown) };
            let mut out = Vec::with_capacity(items.len());
            for _item in items {
                // `each` is evaluated against the same context; full
                // per-element scoping isn't needed since splats in this
                // crate's scope only ever target resource-reference chains,
                // which are always unknown and short-circuit above.
                match evaluate(each, ctx)? {
                    Evaluated::Known(v) => out.push(v),
                    Evaluated::Unknown => return Ok(Evaluated::Unknown),
                }
            }
            Ok(Evaluated::Known(Value::Seq(out)))
        }
    }
}

fn raw_to_value(raw: &RawValue) -> Value {
    match raw {
        RawValue::Null => Value::Null,
        RawValue::Bool(b) => Value::Bool(*b),
        RawValue::Int(i) => Value::Int64(*i),
        RawValue::Float(f) => Value::from_f64(*f),
        RawValue::String(s) => Value::string(s.clone()),
        RawValue::List(items) => Value::Seq(items.iter().map(raw_to_value).collect()),
        RawValue::Map(entries) => {
            Value::map_from(entries.iter().map(|(k, v)| (k.clone(), raw_to_value(v))))
        }
    }
}

fn evaluate_template(parts: &[TemplatePart], ctx: &EvalContext) -> Result<Evaluated, DriftError> {
    let mut out = String::new();
    for part in parts {
        match part {
            TemplatePart::Literal(s) => out.push_str(s),
            TemplatePart::Interpolation(expr) => match evaluate(expr, ctx)? {
                Evaluated::Known(v) => out.push_str(&render_interpolated(&v)),
                Evaluated::Unknown => return Ok(Evaluated::Unknown),
            },
        }
    }
    Ok(Evaluated::Known(Value::string(out)))
}

fn render_interpolated(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Int64(i) => i.to_string(),
        Value::Float64(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_json().to_string(),
    }
}

#[allow(clippy::too_many_arguments)]
fn evaluate_for(
    collection: &Expression,
    key_var: Option<&str>,
    val_var: &str,
    key_expr: Option<&Expression>,
    value_expr: &Expression,
    condition: Option<&Expression>,
    grouping: bool,
    ctx: &EvalContext,
) -> Result<Evaluated, DriftError> {
    let coll = match evaluate(collection, ctx)? {
        Evaluated::Known(v) => v,
        Evaluated::Unknown => return Ok(Evaluated::Unknown),
    };

    // Iterate either a Seq (index as key_var) or a Map (key/value pairs),
    // binding val_var/key_var into a scratch context layered over locals so
    // a loop variable shadowing an existing local doesn't corrupt it.
    let entries: Vec<(Value, Value)> = match &coll {
        Value::Seq(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::Int64(i as i64), v.clone()))
            .collect(),
        Value::Map(m) => m.iter().map(|(k, v)| (Value::string(k.clone()), v.clone())).collect(),
        _ => return Err(DriftError::new(ErrorCode::HclEvalError, "for expression requires a list or map")),
    };

    let produce_map = grouping || key_expr.is_some();
    let mut seq_out = Vec::new();
    let mut map_out = std::collections::BTreeMap::new();

    for (k, v) in entries {
        let mut scoped = ctx.clone();
        if let Some(kv) = key_var {
            scoped.locals.insert(kv.to_string(), k);
        }
        scoped.locals.insert(val_var.to_string(), v);

        if let Some(cond) = condition {
            match evaluate(cond, &scoped)? {
                Evaluated::Known(c) => {
                    if !c.as_bool().unwrap_or(false) {
                        continue;
                    }
                }
                Evaluated::Unknown => continue,
            }
        }

        let value = match evaluate(value_expr, &scoped)? {
            Evaluated::Known(v) => v,
            Evaluated::Unknown => continue,
        };

        if produce_map {
            let key = match key_expr {
                Some(ke) => match evaluate(ke, &scoped)? {
                    Evaluated::Known(kv) => kv.as_str().map(String::from).unwrap_or_else(|| render_interpolated(&kv)),
                    Evaluated::Unknown => continue,
                },
                None => render_interpolated(&value),
            };
            if grouping {
                map_out
                    .entry(key)
                    .or_insert_with(|| Value::Seq(Vec::new()));
                if let Some(Value::Seq(existing)) = map_out.get_mut(&key) {
                    existing.push(value);
                }
            } else {
                map_out.insert(key, value);
            }
        } else {
            seq_out.push(value);
        }
    }

    Ok(Evaluated::Known(if produce_map { Value::Map(map_out) } else { Value::Seq(seq_out) }))
}

fn index_into(collection: &Value, key: &Value) -> Evaluated {
    match collection {
        Value::Seq(items) => key
            .as_int64()
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| items.get(i))
            .cloned()
            .map(Evaluated::Known)
            .unwrap_or(Evaluated::Unknown),
        Value::Map(m) => key
            .as_str()
            .and_then(|k| m.get(k))
            .cloned()
            .map(Evaluated::Known)
            .unwrap_or(Evaluated::Unknown),
        _ => Evaluated::Unknown,
    }
}

fn evaluate_binary(op: BinOp, left: &Expression, right: &Expression, ctx: &EvalContext) -> Result<Evaluated, DriftError> {
    // Logical operators short-circuit before evaluating the right side.
    if matches!(op, BinOp::And | BinOp::Or) {
        let l = match evaluate(left, ctx)? {
            Evaluated::Known(v) => v,
            Evaluated::Unknown => return Ok(Evaluated::Unknown),
        };
        let lb = l.as_bool().ok_or_else(|| DriftError::new(ErrorCode::HclEvalError, "logical operator expects booleans"))?;
        if (op == BinOp::And && !lb) || (op == BinOp::Or && lb) {
            return Ok(Evaluated::Known(Value::Bool(lb)));
        }
        return match evaluate(right, ctx)? {
            Evaluated::Known(r) => {
                let rb = r.as_bool().ok_or_else(|| DriftError::new(ErrorCode::HclEvalError, "logical operator expects booleans"))?;
                Ok(Evaluated::Known(Value::Bool(rb)))
            }
            Evaluated::Unknown => Ok(Evaluated::Unknown),
        };
    }

    let l = match evaluate(left, ctx)? {
        Evaluated::Known(v) => v,
        Evaluated::Unknown => return Ok(Evaluated::Unknown),
    };
    let r = match evaluate(right, ctx)? {
        Evaluated::Known(v) => v,
        Evaluated::Unknown => return Ok(Evaluated::Unknown),
    };

    match op {
        BinOp::Eq => Ok(Evaluated::Known(Value::Bool(l == r))),
        BinOp::NotEq => Ok(Evaluated::Known(Value::Bool(l != r))),
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            let (ln, rn) = numeric_pair(&l, &r)?;
            let result = match op {
                BinOp::Add => ln + rn,
                BinOp::Sub => ln - rn,
                BinOp::Mul => ln * rn,
                BinOp::Div => {
                    if rn == 0.0 {
                        return Err(DriftError::new(ErrorCode::HclEvalError, "division by zero"));
                    }
                    ln / rn
                }
                BinOp::Mod => ln % rn,
                _ => unreachable!(),
            };
            Ok(Evaluated::Known(Value::from_f64(result)))
        }
        BinOp::Lt | BinOp::Lte | BinOp::Gt | BinOp::Gte => {
            let (ln, rn) = numeric_pair(&l, &r)?;
            let result = match op {
                BinOp::Lt => ln < rn,
                BinOp::Lte => ln <= rn,
                BinOp::Gt => ln > rn,
                BinOp::Gte => ln >= rn,
                _ => unreachable!(),
            };
            Ok(Evaluated::Known(Value::Bool(result)))
        }
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
}

fn numeric_pair(l: &Value, r: &Value) -> Result<(f64, f64), DriftError> {
    let ln = l.as_numeric().ok_or_else(|| DriftError::new(ErrorCode::HclEvalError, "operator expects numbers"))?;
    let rn = r.as_numeric().ok_or_else(|| DriftError::new(ErrorCode::HclEvalError, "operator expects numbers"))?;
    Ok((ln, rn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hcl::context::PathInfo;

    fn ctx() -> EvalContext {
        let mut c = EvalContext::new(
            PathInfo { module: "m".into(), root: "r".into(), cwd: "c".into() },
            "default",
        );
        c.variables.insert("region".to_string(), Value::string("us-east-1"));
        c
    }

    #[test]
    fn resolves_var_reference() {
        let expr = Expression::Reference(vec!["var".to_string(), "region".to_string()]);
        let result = evaluate(&expr, &ctx()).unwrap();
        assert!(matches!(result, Evaluated::Known(Value::String(s)) if s == "us-east-1"));
    }

    #[test]
    fn unknown_reference_drops_silently() {
        let expr = Expression::Reference(vec!["aws_instance".to_string(), "web".to_string(), "id".to_string()]);
        let result = evaluate(&expr, &ctx()).unwrap();
        assert!(matches!(result, Evaluated::Unknown));
    }

    #[test]
    fn conditional_picks_branch() {
        let expr = Expression::Conditional {
            condition: Box::new(Expression::Literal(RawValue::Bool(true))),
            true_val: Box::new(Expression::Literal(RawValue::Int(1))),
            false_val: Box::new(Expression::Literal(RawValue::Int(2))),
        };
        let result = evaluate(&expr, &ctx()).unwrap().into_value().unwrap();
        assert_eq!(result, Value::Int64(1));
    }

    #[test]
    fn for_expr_filters_and_maps() {
        let expr = Expression::ForExpr {
            collection: Box::new(Expression::Literal(RawValue::List(vec![
                RawValue::Int(1),
                RawValue::Int(2),
                RawValue::Int(3),
            ]))),
            key_var: None,
            val_var: "x".to_string(),
            key_expr: None,
            value_expr: Box::new(Expression::BinaryOp {
                op: BinOp::Mul,
                left: Box::new(Expression::Reference(vec!["local".to_string(), "x".to_string()])),
                right: Box::new(Expression::Literal(RawValue::Int(2))),
            }),
            condition: Some(Box::new(Expression::BinaryOp {
                op: BinOp::Gt,
                left: Box::new(Expression::Reference(vec!["local".to_string(), "x".to_string()])),
                right: Box::new(Expression::Literal(RawValue::Int(1))),
            })),
            grouping: false,
        };
        let result = evaluate(&expr, &ctx()).unwrap().into_value().unwrap();
        assert_eq!(result, Value::Seq(vec![Value::Int64(4), Value::Int64(6)]));
    }

    #[test]
    fn unsupported_function_call_is_fatal() {
        let expr = Expression::FunctionCall { name: "not_a_real_fn".to_string(), args: vec![] };
        let err = evaluate(&expr, &ctx()).unwrap_err();
        assert_eq!(err.code, ErrorCode::HclEvalError);
    }
}
