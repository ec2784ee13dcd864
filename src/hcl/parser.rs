//! Parses `.tf` (via `hcl-rs`) and `.tf.json` files into [`ParsedModule`]
//! fragments, and converts `hcl::Expression` into our own [`Expression`]
//! AST. Adapted from `oxid::hcl::parser` (the `hcl_expr_to_expression`
//! conversion in particular is kept close to the original, since the
//! teacher already modeled the full HCL expression grammar — this crate's
//! job is to *evaluate* that AST, not re-parse it).

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::error::{DriftError, ErrorCode};
use crate::hcl::ast::*;

pub fn parse_tf_file(content: &str, file_path: &Path) -> Result<ParsedModule, DriftError> {
    let body: hcl::Body = hcl::from_str(content).map_err(|e| {
        DriftError::wrap(
            ErrorCode::HclParseError,
            format!("failed to parse HCL in {}", file_path.display()),
            e,
        )
    })?;

    let mut module = ParsedModule::default();
    let file_str = file_path.to_string_lossy().to_string();

    for structure in body.into_inner() {
        match structure {
            hcl::Structure::Block(block) => match block.identifier() {
                "resource" => {
                    if let Some(r) = parse_resource_block(&block, &file_str) {
                        module.resources.push(r);
                    }
                }
                "data" => {
                    if let Some(r) = parse_resource_block(&block, &file_str) {
                        module.data_sources.push(r);
                    }
                }
                "variable" => {
                    if let Some(v) = parse_variable_block(&block) {
                        module.variables.push(v);
                    }
                }
                "locals" => {
                    for (name, expr) in parse_locals_block(&block) {
                        module.locals.push((name, expr, file_str.clone()));
                    }
                }
                // provider/terraform/output/module blocks are out of scope
                // — parsed-and-ignored so a file
                // containing them doesn't fail to parse.
                other => {
                    tracing::debug!("ignoring top-level block type: {other}");
                }
            },
            hcl::Structure::Attribute(attr) => {
                tracing::debug!("ignoring top-level attribute: {}", attr.key);
            }
        }
    }

    Ok(module)
}

/// `.tf.json` files encode the same structure as plain JSON objects, e.g.
/// `{"resource": {"aws_instance": {"web": {...}}}}`.
pub fn parse_tf_json_file(
    content: &str,
    file_path: &Path,
) -> Result<ParsedModule, DriftError> {
    let root: serde_json::Value = serde_json::from_str(content).map_err(|e| {
        DriftError::wrap(
            ErrorCode::HclParseError,
            format!("failed to parse JSON in {}", file_path.display()),
            e,
        )
    })?;

    let mut module = ParsedModule::default();
    let file_str = file_path.to_string_lossy().to_string();
    let Some(obj) = root.as_object() else {
        return Ok(module);
    };

    if let Some(resources) = obj.get("resource").and_then(|v| v.as_object()) {
        for (tf_type, names) in resources {
            let Some(names) = names.as_object() else { continue };
            for (name, body) in names {
                module
                    .resources
                    .push(json_resource_block(tf_type, name, body, &file_str));
            }
        }
    }

    if let Some(variables) = obj.get("variable").and_then(|v| v.as_object()) {
        for (name, body) in variables {
            module.variables.push(json_variable_decl(name, body));
        }
    }

    if let Some(locals) = obj.get("locals").and_then(|v| v.as_object()) {
        for (name, expr_json) in locals {
            module
                .locals
                .push((name.clone(), json_to_expression(expr_json), file_str.clone()));
        }
    }

    Ok(module)
}

fn json_resource_block(
    tf_type: &str,
    name: &str,
    body: &serde_json::Value,
    file: &str,
) -> ResourceBlock {
    let mut attributes = HashMap::new();
    if let Some(obj) = body.as_object() {
        for (k, v) in obj {
            attributes.insert(k.clone(), json_to_expression(v));
        }
    }
    ResourceBlock {
        tf_type: tf_type.to_string(),
        name: name.to_string(),
        file: file.to_string(),
        attributes,
        nested: NestedBlocks::default(),
    }
}

fn json_variable_decl(name: &str, body: &serde_json::Value) -> VariableDecl {
    let obj = body.as_object();
    VariableDecl {
        name: name.to_string(),
        var_type: obj
            .and_then(|o| o.get("type"))
            .and_then(|v| v.as_str())
            .map(VarType::parse)
            .unwrap_or(VarType::Any),
        description: obj
            .and_then(|o| o.get("description"))
            .and_then(|v| v.as_str())
            .map(String::from),
        default: obj.and_then(|o| o.get("default")).map(json_to_expression),
        sensitive: obj
            .and_then(|o| o.get("sensitive"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    }
}

fn json_to_expression(v: &serde_json::Value) -> Expression {
    match v {
        serde_json::Value::Null => Expression::Literal(RawValue::Null),
        serde_json::Value::Bool(b) => Expression::Literal(RawValue::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Expression::Literal(RawValue::Int(i))
            } else {
                Expression::Literal(RawValue::Float(n.as_f64().unwrap_or_default()))
            }
        }
        serde_json::Value::String(s) => {
            if s.contains("${") {
                parse_template_string(s)
            } else {
                Expression::Literal(RawValue::String(s.clone()))
            }
        }
        serde_json::Value::Array(items) => Expression::Literal(RawValue::List(
            items.iter().filter_map(json_to_raw_value).collect(),
        )),
        serde_json::Value::Object(obj) => Expression::Literal(RawValue::Map(
            obj.iter()
                .filter_map(|(k, v)| json_to_raw_value(v).map(|rv| (k.clone(), rv)))
                .collect(),
        )),
    }
}

fn json_to_raw_value(v: &serde_json::Value) -> Option<RawValue> {
    match v {
        serde_json::Value::Null => Some(RawValue::Null),
        serde_json::Value::Bool(b) => Some(RawValue::Bool(*b)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(RawValue::Int)
            .or_else(|| n.as_f64().map(RawValue::Float)),
        serde_json::Value::String(s) => Some(RawValue::String(s.clone())),
        serde_json::Value::Array(items) => {
            Some(RawValue::List(items.iter().filter_map(json_to_raw_value).collect()))
        }
        serde_json::Value::Object(obj) => Some(RawValue::Map(
            obj.iter()
                .filter_map(|(k, v)| json_to_raw_value(v).map(|rv| (k.clone(), rv)))
                .collect(),
        )),
    }
}

// ─── HCL (.tf) block parsers ────────────────────────────────────────────────

fn parse_resource_block(block: &hcl::Block, file: &str) -> Option<ResourceBlock> {
    let labels: Vec<String> = block.labels().iter().map(|l| l.as_str().to_string()).collect();
    if labels.len() < 2 {
        return None;
    }

    let mut attributes = HashMap::new();
    let mut nested = NestedBlocks::default();

    for structure in block.body().iter() {
        match structure {
            hcl::Structure::Attribute(attr) => {
                let key: &str = &attr.key;
                attributes.insert(key.to_string(), hcl_expr_to_expression(&attr.expr));
            }
            hcl::Structure::Block(inner) => {
                let ident = inner.identifier().to_string();
                let mut fields = HashMap::new();
                for s in inner.body().iter() {
                    if let hcl::Structure::Attribute(a) = s {
                        fields.insert(a.key.to_string(), hcl_expr_to_expression(&a.expr));
                    }
                }
                nested.by_type.entry(ident).or_default().push(fields);
            }
        }
    }

    Some(ResourceBlock {
        tf_type: labels[0].clone(),
        name: labels[1].clone(),
        file: file.to_string(),
        attributes,
        nested,
    })
}

fn parse_variable_block(block: &hcl::Block) -> Option<VariableDecl> {
    let labels: Vec<String> = block.labels().iter().map(|l| l.as_str().to_string()).collect();
    let name = labels.first()?.clone();

    let mut var_type = VarType::Any;
    let mut default = None;
    let mut description = None;
    let mut sensitive = false;

    for structure in block.body().iter() {
        if let hcl::Structure::Attribute(attr) = structure {
            let key: &str = &attr.key;
            match key {
                "type" => var_type = VarType::parse(&expr_to_string(&attr.expr)),
                "default" => default = Some(hcl_expr_to_expression(&attr.expr)),
                "description" => description = Some(expr_to_string(&attr.expr)),
                "sensitive" => sensitive = expr_to_bool(&attr.expr),
                _ => {}
            }
        }
    }

    Some(VariableDecl {
        name,
        var_type,
        description,
        default,
        sensitive,
    })
}

fn parse_locals_block(block: &hcl::Block) -> Vec<(String, Expression)> {
    let mut locals = Vec::new();
    for structure in block.body().iter() {
        if let hcl::Structure::Attribute(attr) = structure {
            locals.push((attr.key.to_string(), hcl_expr_to_expression(&attr.expr)));
        }
    }
    locals
}

/// Parse a `.tfvars` file (HCL-formatted top-level assignments) into a
/// name→Expression map.
pub fn parse_tfvars(content: &str, file_path: &Path) -> Result<HashMap<String, Expression>, DriftError> {
    let body: hcl::Body = hcl::from_str(content).map_err(|e| {
        DriftError::wrap(
            ErrorCode::HclParseError,
            format!("failed to parse tfvars file {}", file_path.display()),
            e,
        )
    })?;

    let mut values = HashMap::new();
    for attr in body.attributes() {
        values.insert(attr.key().to_string(), hcl_expr_to_expression(attr.expr()));
    }
    Ok(values)
}

// ─── Expression conversion ──────────────────────────────────────────────────

pub fn hcl_expr_to_expression(expr: &hcl::Expression) -> Expression {
    match expr {
        hcl::Expression::Null => Expression::Literal(RawValue::Null),
        hcl::Expression::Bool(b) => Expression::Literal(RawValue::Bool(*b)),
        hcl::Expression::Number(n) => {
            if let Some(i) = n.as_i64() {
                Expression::Literal(RawValue::Int(i))
            } else if let Some(f) = n.as_f64() {
                Expression::Literal(RawValue::Float(f))
            } else {
                Expression::Literal(RawValue::Null)
            }
        }
        hcl::Expression::String(s) => {
            if s.contains("${") {
                parse_template_string(s)
            } else {
                Expression::Literal(RawValue::String(s.clone()))
            }
        }
        hcl::Expression::Array(arr) => {
            let items: Vec<Expression> = arr.iter().map(hcl_expr_to_expression).collect();
            // Arrays may contain references, not just literals, so represent
            // them as a literal-of-literals only when every element is one;
            // otherwise fall back to a synthetic function call the evaluator
            // understands as "build a list from these expressions".
            if let Some(vals) = items
                .iter()
                .map(|e| match e {
                    Expression::Literal(v) => Some(v.clone()),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
            {
                Expression::Literal(RawValue::List(vals))
            } else {
                Expression::FunctionCall {
                    name: "__list".to_string(),
                    args: items,
                }
            }
        }
        hcl::Expression::Object(obj) => {
            let entries: Vec<(String, Expression)> = obj
                .iter()
                .map(|(k, v)| (object_key_to_string(k), hcl_expr_to_expression(v)))
                .collect();
            if let Some(vals) = entries
                .iter()
                .map(|(k, e)| match e {
                    Expression::Literal(v) => Some((k.clone(), v.clone())),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
            {
                Expression::Literal(RawValue::Map(vals))
            } else {
                Expression::FunctionCall {
                    name: "__map".to_string(),
                    args: entries
                        .into_iter()
                        .flat_map(|(k, e)| {
                            vec![Expression::Literal(RawValue::String(k)), e]
                        })
                        .collect(),
                }
            }
        }
        hcl::Expression::TemplateExpr(template) => parse_template_string(&template.to_string()),
        hcl::Expression::Variable(var) => {
            let parts: Vec<String> = var.to_string().split('.').map(String::from).collect();
            Expression::Reference(parts)
        }
        hcl::Expression::Traversal(traversal) => {
            let mut parts = Vec::new();
            if let hcl::Expression::Variable(var) = &traversal.expr {
                parts.push(var.to_string());
            } else {
                parts.push(format!("{:?}", traversal.expr));
            }
            for operator in &traversal.operators {
                match operator {
                    hcl::expr::TraversalOperator::GetAttr(ident) => parts.push(ident.to_string()),
                    hcl::expr::TraversalOperator::Index(idx) => {
                        parts.push(format!("[{}]", expr_to_string(idx)))
                    }
                    hcl::expr::TraversalOperator::LegacyIndex(n) => parts.push(format!("[{n}]")),
                    hcl::expr::TraversalOperator::AttrSplat
                    | hcl::expr::TraversalOperator::FullSplat => parts.push("[*]".to_string()),
                }
            }
            Expression::Reference(parts)
        }
        hcl::Expression::FuncCall(func_call) => Expression::FunctionCall {
            name: func_call.name.to_string(),
            args: func_call.args.iter().map(hcl_expr_to_expression).collect(),
        },
        hcl::Expression::Conditional(cond) => Expression::Conditional {
            condition: Box::new(hcl_expr_to_expression(&cond.cond_expr)),
            true_val: Box::new(hcl_expr_to_expression(&cond.true_expr)),
            false_val: Box::new(hcl_expr_to_expression(&cond.false_expr)),
        },
        hcl::Expression::Operation(op) => match op.as_ref() {
            hcl::expr::Operation::Unary(unary) => Expression::UnaryOp {
                op: match unary.operator {
                    hcl::expr::UnaryOperator::Neg => UnaryOp::Neg,
                    hcl::expr::UnaryOperator::Not => UnaryOp::Not,
                },
                operand: Box::new(hcl_expr_to_expression(&unary.expr)),
            },
            hcl::expr::Operation::Binary(binary) => Expression::BinaryOp {
                op: match binary.operator {
                    hcl::expr::BinaryOperator::Eq => BinOp::Eq,
                    hcl::expr::BinaryOperator::NotEq => BinOp::NotEq,
                    hcl::expr::BinaryOperator::Less => BinOp::Lt,
                    hcl::expr::BinaryOperator::LessEq => BinOp::Lte,
                    hcl::expr::BinaryOperator::Greater => BinOp::Gt,
                    hcl::expr::BinaryOperator::GreaterEq => BinOp::Gte,
                    hcl::expr::BinaryOperator::Plus => BinOp::Add,
                    hcl::expr::BinaryOperator::Minus => BinOp::Sub,
                    hcl::expr::BinaryOperator::Mul => BinOp::Mul,
                    hcl::expr::BinaryOperator::Div => BinOp::Div,
                    hcl::expr::BinaryOperator::Mod => BinOp::Mod,
                    hcl::expr::BinaryOperator::And => BinOp::And,
                    hcl::expr::BinaryOperator::Or => BinOp::Or,
                },
                left: Box::new(hcl_expr_to_expression(&binary.lhs_expr)),
                right: Box::new(hcl_expr_to_expression(&binary.rhs_expr)),
            },
        },
        hcl::Expression::ForExpr(for_expr) => Expression::ForExpr {
            collection: Box::new(hcl_expr_to_expression(&for_expr.collection_expr)),
            key_var: for_expr.key_var.as_ref().map(|v| v.to_string()),
            val_var: for_expr.value_var.to_string(),
            key_expr: for_expr.key_expr.as_ref().map(|e| Box::new(hcl_expr_to_expression(e))),
            value_expr: Box::new(hcl_expr_to_expression(&for_expr.value_expr)),
            condition: for_expr.cond_expr.as_ref().map(|e| Box::new(hcl_expr_to_expression(e))),
            grouping: for_expr.grouping,
        },
        hcl::Expression::Parenthesis(inner) => hcl_expr_to_expression(inner),
        other => {
            tracing::debug!("unsupported HCL expression form, treating as opaque string: {other:?}");
            Expression::Literal(RawValue::String(format!("{other:?}")))
        }
    }
}

fn expr_to_string(expr: &hcl::Expression) -> String {
    match expr {
        hcl::Expression::String(s) => s.clone(),
        hcl::Expression::Variable(v) => v.to_string(),
        hcl::Expression::Number(n) => n.to_string(),
        hcl::Expression::Bool(b) => b.to_string(),
        hcl::Expression::Null => "null".to_string(),
        _ => format!("{expr:?}"),
    }
}

fn object_key_to_string(key: &hcl::expr::ObjectKey) -> String {
    match key {
        hcl::expr::ObjectKey::Identifier(id) => id.to_string(),
        hcl::expr::ObjectKey::Expression(expr) => expr_to_string(expr),
        _ => String::new(),
    }
}

fn expr_to_bool(expr: &hcl::Expression) -> bool {
    matches!(expr, hcl::Expression::Bool(true))
}

/// Parse a `"literal ${interp} literal"` string via hcl-rs's own template
/// grammar rather than a hand-rolled `${`/`}` scan, so interpolations
/// containing function calls, indexing, or nested braces (`${upper(var.x)}`,
/// `${var.list[0]}`, `${jsonencode({a = 1})}`) parse as real expressions
/// instead of being mangled by a naive `split('.')`. A template consisting
/// of a single interpolation collapses to the bare expression (so
/// `"${var.x}"` evaluates exactly like `var.x`).
fn parse_template_string(s: &str) -> Expression {
    let template = match hcl::template::Template::from_str(s) {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!("failed to parse template {s:?}, treating as opaque string: {e}");
            return Expression::Literal(RawValue::String(s.to_string()));
        }
    };

    let mut parts = Vec::new();
    for element in template.elements() {
        match element {
            hcl::template::Element::Literal(lit) => {
                parts.push(TemplatePart::Literal(lit.to_string()));
            }
            hcl::template::Element::Interpolation(interp) => {
                parts.push(TemplatePart::Interpolation(Box::new(hcl_expr_to_expression(
                    &interp.expr,
                ))));
            }
            hcl::template::Element::Directive(_) => {
                tracing::debug!("ignoring template if/for directive — not evaluated");
            }
        }
    }

    if parts.len() == 1 {
        if let TemplatePart::Interpolation(expr) = &parts[0] {
            return *expr.clone();
        }
    }
    Expression::Template(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_resource_block_attributes() {
        let src = r#"
resource "aws_instance" "web" {
  ami           = "ami-123"
  instance_type = "t3.micro"
  tags = {
    Name = "web"
  }
}
"#;
        let module = parse_tf_file(src, &PathBuf::from("main.tf")).unwrap();
        assert_eq!(module.resources.len(), 1);
        let r = &module.resources[0];
        assert_eq!(r.tf_type, "aws_instance");
        assert_eq!(r.name, "web");
        assert!(r.attributes.contains_key("ami"));
        assert!(r.attributes.contains_key("tags"));
    }

    #[test]
    fn single_interpolation_template_collapses_to_reference() {
        let expr = parse_template_string("${var.region}");
        assert!(matches!(expr, Expression::Reference(parts) if parts == vec!["var", "region"]));
    }

    #[test]
    fn mixed_template_keeps_parts() {
        let expr = parse_template_string("web-${var.name}-instance");
        match expr {
            Expression::Template(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected Template, got {other:?}"),
        }
    }

    #[test]
    fn template_interpolation_with_function_call_parses_as_call() {
        let expr = parse_template_string("${upper(var.name)}");
        match expr {
            Expression::FunctionCall { name, args } => {
                assert_eq!(name, "upper");
                assert_eq!(args.len(), 1);
                assert!(matches!(&args[0], Expression::Reference(parts) if parts == &vec!["var".to_string(), "name".to_string()]));
            }
            other => panic!("expected FunctionCall, got {other:?}"),
        }
    }

    #[test]
    fn template_interpolation_with_index_parses_as_reference() {
        let expr = parse_template_string("${var.list[0]}");
        match expr {
            Expression::Reference(parts) => {
                assert_eq!(parts, vec!["var", "list", "[0]"]);
            }
            other => panic!("expected Reference, got {other:?}"),
        }
    }

    #[test]
    fn template_interpolation_with_nested_object_literal_parses() {
        let expr = parse_template_string("${jsonencode({a = 1})}");
        match expr {
            Expression::FunctionCall { name, args } => {
                assert_eq!(name, "jsonencode");
                assert_eq!(args.len(), 1);
                assert!(matches!(&args[0], Expression::Literal(RawValue::Map(_))));
            }
            other => panic!("expected FunctionCall, got {other:?}"),
        }
    }
}
