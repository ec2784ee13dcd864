//! Variable declaration, tfvars precedence, and declared-type conversion.

use std::collections::{BTreeMap, HashMap};

use crate::error::{DriftError, ErrorCode};
use crate::hcl::ast::{Expression, VarType, VariableDecl};
use crate::hcl::context::{EvalContext, PathInfo};
use crate::hcl::eval::{evaluate, Evaluated};
use crate::value::Value;

/// Resolve final variable values in precedence order: tfvars > default >
/// fatal. Duplicate variable names across files are fatal. Declared-type
/// conversion failures are fatal, naming the variable.
pub fn resolve_variables(
    decls: &[VariableDecl],
    tfvars: &HashMap<String, Expression>,
    path: &PathInfo,
    workspace: &str,
) -> Result<BTreeMap<String, Value>, DriftError> {
    let mut seen = std::collections::HashSet::new();
    for decl in decls {
        if !seen.insert(decl.name.clone()) {
            return Err(DriftError::new(
                ErrorCode::StateParseError,
                format!("duplicate variable declaration: {}", decl.name),
            ));
        }
    }

    for name in tfvars.keys() {
        if !seen.contains(name) {
            tracing::warn!("value assigned to undeclared variable \"{name}\" in tfvars, ignoring");
        }
    }

    // A minimal context for evaluating defaults/tfvars assignments: no
    // var/local namespace yet, since variable expressions can't reference
    // other variables (mirrors real HCL semantics).
    let bootstrap = EvalContext::new(path.clone(), workspace);

    let mut resolved = BTreeMap::new();
    for decl in decls {
        let expr = tfvars
            .get(&decl.name)
            .or(decl.default.as_ref())
            .ok_or_else(|| {
                DriftError::new(
                    ErrorCode::StateParseError,
                    format!("variable \"{}\" has no default and no assigned value", decl.name),
                )
                .user_facing(format!("set -var=\"{}=...\" or provide a tfvars file", decl.name))
            })?;

        let value = match evaluate(expr, &bootstrap)? {
            Evaluated::Known(v) => v,
            Evaluated::Unknown => Value::Null,
        };

        resolved.insert(decl.name.clone(), convert_to_type(&decl.name, value, decl.var_type)?);
    }

    Ok(resolved)
}

fn convert_to_type(name: &str, value: Value, ty: VarType) -> Result<Value, DriftError> {
    match ty {
        VarType::Any => Ok(value),
        VarType::String => match value.as_str() {
            Some(s) => Ok(Value::string(s.to_string())),
            None => type_error(name, "string", &value),
        },
        VarType::Number => match value.as_numeric() {
            Some(n) => Ok(Value::from_f64(n)),
            None => type_error(name, "number", &value),
        },
        VarType::Bool => match value.as_bool() {
            Some(b) => Ok(Value::Bool(b)),
            None => type_error(name, "bool", &value),
        },
    }
}

fn type_error(name: &str, expected: &str, actual: &Value) -> Result<Value, DriftError> {
    Err(DriftError::new(
        ErrorCode::StateParseError,
        format!("variable \"{name}\" declared as {expected} but value {actual:?} cannot convert"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hcl::ast::RawValue;

    fn path() -> PathInfo {
        PathInfo { module: "m".into(), root: "r".into(), cwd: "c".into() }
    }

    #[test]
    fn tfvars_override_default() {
        let decls = vec![VariableDecl {
            name: "region".to_string(),
            var_type: VarType::String,
            description: None,
            default: Some(Expression::Literal(RawValue::String("us-east-1".to_string()))),
            sensitive: false,
        }];
        let mut tfvars = HashMap::new();
        tfvars.insert("region".to_string(), Expression::Literal(RawValue::String("eu-west-1".to_string())));

        let resolved = resolve_variables(&decls, &tfvars, &path(), "default").unwrap();
        assert_eq!(resolved.get("region"), Some(&Value::string("eu-west-1")));
    }

    #[test]
    fn missing_value_is_fatal_naming_variable() {
        let decls = vec![VariableDecl {
            name: "count".to_string(),
            var_type: VarType::Number,
            description: None,
            default: None,
            sensitive: false,
        }];
        let err = resolve_variables(&decls, &HashMap::new(), &path(), "default").unwrap_err();
        assert!(err.message.contains("count"));
    }

    #[test]
    fn undeclared_tfvars_name_does_not_fail_resolution() {
        let decls = vec![VariableDecl {
            name: "region".to_string(),
            var_type: VarType::String,
            description: None,
            default: Some(Expression::Literal(RawValue::String("us-east-1".to_string()))),
            sensitive: false,
        }];
        let mut tfvars = HashMap::new();
        tfvars.insert("region".to_string(), Expression::Literal(RawValue::String("eu-west-1".to_string())));
        tfvars.insert("typo_nmae".to_string(), Expression::Literal(RawValue::String("oops".to_string())));

        let resolved = resolve_variables(&decls, &tfvars, &path(), "default").unwrap();
        assert_eq!(resolved.get("region"), Some(&Value::string("eu-west-1")));
        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn duplicate_variable_is_fatal() {
        let decls = vec![
            VariableDecl { name: "x".to_string(), var_type: VarType::Any, description: None, default: Some(Expression::Literal(RawValue::Int(1))), sensitive: false },
            VariableDecl { name: "x".to_string(), var_type: VarType::Any, description: None, default: Some(Expression::Literal(RawValue::Int(2))), sensitive: false },
        ];
        let err = resolve_variables(&decls, &HashMap::new(), &path(), "default").unwrap_err();
        assert_eq!(err.code, ErrorCode::StateParseError);
    }
}
