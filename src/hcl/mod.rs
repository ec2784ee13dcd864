//! HCL parsing and evaluation: directory scan, variable/locals resolution,
//! resource-block evaluation into [`StateResource`]s, implementing
//! [`StateProvider`]. Adapted from `oxid::hcl::mod`'s
//! `parse_directory` orchestration — but where `oxid` stopped at producing
//! an unevaluated `WorkspaceConfig`, this crate evaluates all the way down
//! to the universal attribute-value tree.

pub mod ast;
pub mod context;
pub mod eval;
pub mod functions;
pub mod parser;
pub mod variables;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{DriftError, ErrorCode};
use crate::hcl::ast::{Expression, ParsedModule, ResourceBlock};
use crate::hcl::context::{EvalContext, PathInfo};
use crate::hcl::eval::{evaluate, Evaluated};
use crate::model::{ResourceKind, ResourceMetadata, StateProvider, StateResource};
use crate::value::Value;

/// Static `tf_type → ResourceKind` table.
fn tf_type_to_kind(tf_type: &str) -> Option<ResourceKind> {
    match tf_type {
        "aws_instance" => Some(ResourceKind::ComputeInstance),
        "aws_s3_bucket" => Some(ResourceKind::StorageBucket),
        _ => None,
    }
}

/// A fully loaded and evaluated HCL directory, implementing `StateProvider`.
pub struct HclStateProvider {
    resources_by_kind: BTreeMap<ResourceKind, Vec<StateResource>>,
}

impl HclStateProvider {
    /// Parse and evaluate every `.tf`/`.tf.json` file in `dir`, applying
    /// tfvars precedence (explicit `var_files` > `terraform.tfvars` >
    /// `*.auto.tfvars` alphabetically > declared defaults, with
    /// `TF_VAR_*` environment variables overriding all of the above).
    pub fn load(dir: &Path, var_files: &[PathBuf], workspace: &str) -> Result<Self, DriftError> {
        let module = scan_directory(dir)?;

        let mut addresses = HashSet::new();
        for r in &module.resources {
            if !addresses.insert(r.address()) {
                return Err(DriftError::new(
                    ErrorCode::StateParseError,
                    format!("duplicate resource address: {}", r.address()),
                ));
            }
        }

        let mut tfvars = load_implicit_tfvars(dir)?;
        for file in var_files {
            let content = std::fs::read_to_string(file).map_err(|e| {
                DriftError::wrap(ErrorCode::StateReadError, format!("failed to read {}", file.display()), e)
            })?;
            tfvars.extend(parser::parse_tfvars(&content, file)?);
        }
        apply_env_overrides(&mut tfvars);

        let path_info = PathInfo::for_directory(dir);
        let variables = variables::resolve_variables(&module.variables, &tfvars, &path_info, workspace)?;

        let mut ctx = EvalContext::new(path_info, workspace);
        ctx.variables = variables;
        evaluate_locals(&module.locals, &mut ctx)?;

        let mut resources_by_kind: BTreeMap<ResourceKind, Vec<StateResource>> = BTreeMap::new();
        for block in &module.resources {
            let Some(kind) = tf_type_to_kind(&block.tf_type) else { continue };
            let attributes = evaluate_resource_block(block, &ctx);
            let mut metadata = ResourceMetadata::new(kind, block.tf_type.clone());
            metadata.source_identifier = Some(block.address());
            resources_by_kind
                .entry(kind)
                .or_default()
                .push(StateResource::new(metadata, attributes));
        }

        Ok(HclStateProvider { resources_by_kind })
    }
}

#[async_trait]
impl StateProvider for HclStateProvider {
    fn provider_type(&self) -> &'static str {
        "hcl"
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<StateResource>, DriftError> {
        Ok(self.resources_by_kind.get(&kind).cloned().unwrap_or_default())
    }

    async fn get(&self, kind: ResourceKind, id: &str) -> Result<StateResource, DriftError> {
        self.resources_by_kind
            .get(&kind)
            .and_then(|resources| {
                resources
                    .iter()
                    .find(|r| r.metadata.source_identifier.as_deref() == Some(id))
            })
            .cloned()
            .ok_or_else(|| DriftError::new(ErrorCode::ResourceNotFound, format!("no declared resource {id}")))
    }
}

fn scan_directory(dir: &Path) -> Result<ParsedModule, DriftError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| DriftError::wrap(ErrorCode::StateReadError, format!("cannot read directory {}", dir.display()), e))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| is_tf_source(p))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(DriftError::new(
            ErrorCode::StateParseError,
            format!("no .tf or .tf.json files found in {}", dir.display()),
        ));
    }

    let mut module = ParsedModule::default();
    for file in &files {
        tracing::debug!("parsing {}", file.display());
        let content = std::fs::read_to_string(file)
            .map_err(|e| DriftError::wrap(ErrorCode::StateReadError, format!("failed to read {}", file.display()), e))?;

        let partial = if file.to_string_lossy().ends_with(".tf.json") {
            parser::parse_tf_json_file(&content, file)?
        } else {
            parser::parse_tf_file(&content, file)?
        };
        merge_module(&mut module, partial);
    }

    Ok(module)
}

fn is_tf_source(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    name.ends_with(".tf.json") || path.extension().map(|e| e == "tf").unwrap_or(false)
}

fn merge_module(main: &mut ParsedModule, partial: ParsedModule) {
    main.variables.extend(partial.variables);
    main.locals.extend(partial.locals);
    main.resources.extend(partial.resources);
    main.data_sources.extend(partial.data_sources);
}

fn load_implicit_tfvars(dir: &Path) -> Result<HashMap<String, Expression>, DriftError> {
    let mut values = HashMap::new();

    let default_tfvars = dir.join("terraform.tfvars");
    if default_tfvars.exists() {
        let content = std::fs::read_to_string(&default_tfvars)
            .map_err(|e| DriftError::wrap(ErrorCode::StateReadError, format!("failed to read {}", default_tfvars.display()), e))?;
        values.extend(parser::parse_tfvars(&content, &default_tfvars)?);
    }

    let entries = std::fs::read_dir(dir)
        .map_err(|e| DriftError::wrap(ErrorCode::StateReadError, format!("cannot read directory {}", dir.display()), e))?;
    let mut auto_files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(".auto.tfvars"))
                .unwrap_or(false)
        })
        .collect();
    auto_files.sort();

    for file in &auto_files {
        let content = std::fs::read_to_string(file)
            .map_err(|e| DriftError::wrap(ErrorCode::StateReadError, format!("failed to read {}", file.display()), e))?;
        values.extend(parser::parse_tfvars(&content, file)?);
    }

    Ok(values)
}

fn apply_env_overrides(tfvars: &mut HashMap<String, Expression>) {
    for (key, val) in std::env::vars() {
        if let Some(name) = key.strip_prefix("TF_VAR_") {
            tfvars.insert(name.to_string(), Expression::Literal(ast::RawValue::String(val)));
        }
    }
}

fn evaluate_locals(locals: &[(String, Expression, String)], ctx: &mut EvalContext) -> Result<(), DriftError> {
    let mut seen = HashSet::new();
    for (name, _, file) in locals {
        if !seen.insert(name.clone()) {
            return Err(DriftError::new(
                ErrorCode::StateParseError,
                format!("duplicate local \"{name}\" (declared again in {file})"),
            ));
        }
    }

    for (name, expr, _file) in locals {
        match evaluate(expr, ctx) {
            Ok(Evaluated::Known(v)) => {
                ctx.locals.insert(name.clone(), v);
            }
            Ok(Evaluated::Unknown) => {
                tracing::warn!("local \"{name}\" evaluated to an unknown value, dropping");
            }
            Err(e) => {
                return Err(DriftError::wrap(ErrorCode::StateParseError, format!("local \"{name}\" failed to evaluate"), e));
            }
        }
    }
    Ok(())
}

fn evaluate_resource_block(block: &ResourceBlock, ctx: &EvalContext) -> BTreeMap<String, Value> {
    let mut attributes = BTreeMap::new();

    for (name, expr) in &block.attributes {
        match evaluate(expr, ctx) {
            Ok(Evaluated::Known(v)) => {
                attributes.insert(name.clone(), v);
            }
            Ok(Evaluated::Unknown) => {
                tracing::debug!("{}: attribute \"{name}\" is unknown, dropping", block.address());
            }
            Err(e) => {
                tracing::warn!("{}: attribute \"{name}\" failed to evaluate: {e}", block.address());
            }
        }
    }

    for (block_type, instances) in &block.nested.by_type {
        let mut seq = Vec::with_capacity(instances.len());
        for fields in instances {
            let mut map = BTreeMap::new();
            for (name, expr) in fields {
                match evaluate(expr, ctx) {
                    Ok(Evaluated::Known(v)) => {
                        map.insert(name.clone(), v);
                    }
                    Ok(Evaluated::Unknown) => {}
                    Err(e) => {
                        tracing::warn!(
                            "{}: nested block \"{block_type}\" field \"{name}\" failed to evaluate: {e}",
                            block.address()
                        );
                    }
                }
            }
            seq.push(Value::Map(map));
        }
        attributes.insert(block_type.clone(), Value::Seq(seq));
    }

    attributes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tf_type_registry_maps_known_types() {
        assert_eq!(tf_type_to_kind("aws_instance"), Some(ResourceKind::ComputeInstance));
        assert_eq!(tf_type_to_kind("aws_s3_bucket"), Some(ResourceKind::StorageBucket));
        assert_eq!(tf_type_to_kind("aws_vpc"), None);
    }

    #[test]
    fn loads_directory_and_evaluates_resource() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("main.tf"),
            r#"
variable "name" {
  type    = string
  default = "web"
}

resource "aws_instance" "example" {
  ami           = "ami-123"
  instance_type = "t3.micro"
  tags = {
    Name = var.name
  }
}
"#,
        )
        .unwrap();

        let provider = HclStateProvider::load(dir.path(), &[], "default").unwrap();
        let resources = futures::executor::block_on(provider.list(ResourceKind::ComputeInstance)).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].attribute("ami"), Some(&Value::string("ami-123")));
    }

    #[test]
    fn empty_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_directory(dir.path()).unwrap_err();
        assert_eq!(err.code, ErrorCode::StateParseError);
    }
}
