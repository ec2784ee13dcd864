//! The namespace an [`Expression`](crate::hcl::ast::Expression) resolves
//! references against: `var.*`, `local.*`, `path.*`, `terraform.workspace`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::value::Value;

#[derive(Debug, Clone)]
pub struct PathInfo {
    pub module: String,
    pub root: String,
    pub cwd: String,
}

impl PathInfo {
    pub fn for_directory(dir: &std::path::Path) -> Self {
        let abs = dir
            .canonicalize()
            .unwrap_or_else(|_| PathBuf::from(dir))
            .to_string_lossy()
            .to_string();
        PathInfo {
            module: abs.clone(),
            root: abs,
            cwd: std::env::current_dir()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
        }
    }
}

/// Resolved variables, locals, and ambient namespaces available while
/// evaluating a resource block. `locals` is populated incrementally as
/// `hcl::mod::evaluate_directory` walks the locals block in declaration
/// order, so a local may reference an earlier local but not a later one.
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub variables: BTreeMap<String, Value>,
    pub locals: BTreeMap<String, Value>,
    pub path: PathInfo,
    pub workspace: String,
}

impl EvalContext {
    pub fn new(path: PathInfo, workspace: impl Into<String>) -> Self {
        Self {
            variables: BTreeMap::new(),
            locals: BTreeMap::new(),
            path,
            workspace: workspace.into(),
        }
    }

    /// Resolve a dotted reference path (`["var", "region"]`,
    /// `["path", "module"]`, `["terraform", "workspace"]`). Returns `None`
    /// for anything else (including `aws_instance.*` resource references
    /// — the evaluator only resolves var/local/path/terraform
    /// namespaces).
    pub fn resolve(&self, parts: &[String]) -> Option<Value> {
        match parts.first().map(String::as_str) {
            Some("var") => {
                let name = parts.get(1)?;
                self.variables.get(name).cloned()
            }
            Some("local") => {
                let name = parts.get(1)?;
                self.locals.get(name).cloned()
            }
            Some("path") => match parts.get(1).map(String::as_str) {
                Some("module") => Some(Value::string(self.path.module.clone())),
                Some("root") => Some(Value::string(self.path.root.clone())),
                Some("cwd") => Some(Value::string(self.path.cwd.clone())),
                _ => None,
            },
            Some("terraform") => match parts.get(1).map(String::as_str) {
                Some("workspace") => Some(Value::string(self.workspace.clone())),
                _ => None,
            },
            _ => None,
        }
    }
}
