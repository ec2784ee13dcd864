//! The unevaluated HCL expression AST, adapted from `oxid`'s
//! `config::types::Expression`. `oxid` only ever stored this tree (for
//! later hand-off to a Terraform-provider gRPC process); this crate adds
//! the missing piece, a tree-walking evaluator (`hcl::eval`), to turn it
//! into a `crate::value::Value`.

use std::collections::HashMap;

/// A literal scalar/collection as written in source, before evaluation.
/// Distinct from `crate::value::Value`: this is pre-evaluation syntax
/// (e.g. the literal `[1, 2]` in source), not a post-evaluation result.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<RawValue>),
    Map(Vec<(String, RawValue)>),
}

/// Any value or computation appearing in an HCL attribute expression.
#[derive(Debug, Clone)]
pub enum Expression {
    /// A literal value (string, number, bool, null, list, map).
    Literal(RawValue),

    /// A reference path like `var.region`, `local.name`, `aws_vpc.main.id`.
    Reference(Vec<String>),

    /// A function call like `join(",", var.list)`.
    FunctionCall { name: String, args: Vec<Expression> },

    /// Ternary: `condition ? true_val : false_val`.
    Conditional {
        condition: Box<Expression>,
        true_val: Box<Expression>,
        false_val: Box<Expression>,
    },

    /// `for` expression: `[for x in list : transform]`.
    ForExpr {
        collection: Box<Expression>,
        key_var: Option<String>,
        val_var: String,
        key_expr: Option<Box<Expression>>,
        value_expr: Box<Expression>,
        condition: Option<Box<Expression>>,
        grouping: bool,
    },

    /// String template with interpolations: `"Hello ${var.name}"`.
    Template(Vec<TemplatePart>),

    /// Index access: `expr[key]`.
    Index {
        collection: Box<Expression>,
        key: Box<Expression>,
    },

    /// Attribute access: `expr.name`.
    GetAttr { object: Box<Expression>, name: String },

    /// Binary operation: `a + b`, `a == b`, `a && b`, etc.
    BinaryOp {
        op: BinOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    /// Unary operation: `!a`, `-a`.
    UnaryOp { op: UnaryOp, operand: Box<Expression> },

    /// Splat expression: `aws_instance.web[*].id`.
    Splat {
        source: Box<Expression>,
        each: Box<Expression>,
    },
}

#[derive(Debug, Clone)]
pub enum TemplatePart {
    Literal(String),
    Interpolation(Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// A nested block inside a resource body (e.g. `root_block_device { ... }`),
/// grouped by block type into an ordered sequence.
#[derive(Debug, Clone, Default)]
pub struct NestedBlocks {
    pub by_type: HashMap<String, Vec<HashMap<String, Expression>>>,
}

/// A `variable "<name>" { ... }` declaration.
#[derive(Debug, Clone)]
pub struct VariableDecl {
    pub name: String,
    pub var_type: VarType,
    pub description: Option<String>,
    pub default: Option<Expression>,
    pub sensitive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    String,
    Number,
    Bool,
    Any,
}

impl VarType {
    pub fn parse(s: &str) -> VarType {
        match s.trim() {
            "string" => VarType::String,
            "number" => VarType::Number,
            "bool" => VarType::Bool,
            _ => VarType::Any,
        }
    }
}

/// A `resource "<tf_type>" "<name>" { ... }` block, as found (not yet
/// evaluated).
#[derive(Debug, Clone)]
pub struct ResourceBlock {
    pub tf_type: String,
    pub name: String,
    pub file: String,
    pub attributes: HashMap<String, Expression>,
    pub nested: NestedBlocks,
}

impl ResourceBlock {
    pub fn address(&self) -> String {
        format!("{}.{}", self.tf_type, self.name)
    }
}

/// A parsed-but-unevaluated `.tf`/`.tf.json` file, aggregated by
/// `hcl::mod::load_directory` across every file in the directory.
#[derive(Debug, Clone, Default)]
pub struct ParsedModule {
    pub variables: Vec<VariableDecl>,
    pub locals: Vec<(String, Expression, String)>, // (name, expr, file)
    pub resources: Vec<ResourceBlock>,
    /// `data` blocks are parsed (so files containing them don't fail to
    /// parse) but, per the Non-goals, never evaluated or matched.
    pub data_sources: Vec<ResourceBlock>,
}
