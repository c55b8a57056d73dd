//! Descriptor validation.
//!
//! [`SchemaValidator`] is the seam the packager validates through. The
//! built-in [`StructuralValidator`] checks the fields the packaging pipeline
//! depends on; it does not fetch or interpret remote schema documents, it only
//! reports their location so it can be embedded in the package descriptor.

use serde_yaml::{Mapping, Value};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    ServiceDescriptor,
    FunctionDescriptor,
    PackageDescriptor,
}

impl SchemaKind {
    /// Schema document path relative to the schema master location.
    pub fn relative_path(self) -> &'static str {
        match self {
            SchemaKind::ServiceDescriptor => "service-descriptor/nsd-schema.yml",
            SchemaKind::FunctionDescriptor => "function-descriptor/vnfd-schema.yml",
            SchemaKind::PackageDescriptor => "package-descriptor/pd-schema.yml",
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchemaKind::ServiceDescriptor => "service descriptor",
            SchemaKind::FunctionDescriptor => "function descriptor",
            SchemaKind::PackageDescriptor => "package descriptor",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
#[error("{kind} is invalid: {}", .violations.join("; "))]
pub struct ValidationError {
    pub kind: SchemaKind,
    pub violations: Vec<String>,
}

pub trait SchemaValidator {
    fn validate(&self, kind: SchemaKind, descriptor: &Value) -> Result<(), ValidationError>;

    /// Location of the schema document for `kind`, embedded in the
    /// package descriptor's `schema` field.
    fn remote_schema(&self, kind: SchemaKind) -> String;
}

/// Validates required fields and their types.
#[derive(Debug, Clone)]
pub struct StructuralValidator {
    remote_master: String,
}

impl StructuralValidator {
    pub fn new(remote_master: &str) -> Self {
        let mut remote_master = remote_master.to_owned();
        if !remote_master.is_empty() && !remote_master.ends_with('/') {
            remote_master.push('/');
        }
        Self { remote_master }
    }
}

impl SchemaValidator for StructuralValidator {
    fn validate(&self, kind: SchemaKind, descriptor: &Value) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        match descriptor.as_mapping() {
            None => violations.push("descriptor must be a mapping".to_owned()),
            Some(map) => match kind {
                SchemaKind::ServiceDescriptor => check_service(map, &mut violations),
                SchemaKind::FunctionDescriptor => check_function(map, &mut violations),
                SchemaKind::PackageDescriptor => check_package(map, &mut violations),
            },
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { kind, violations })
        }
    }

    fn remote_schema(&self, kind: SchemaKind) -> String {
        format!("{}{}", self.remote_master, kind.relative_path())
    }
}

fn require_str(map: &Mapping, key: &str, ctx: &str, out: &mut Vec<String>) {
    match map.get(key) {
        None | Some(Value::Null) => out.push(format!("{ctx}missing required field '{key}'")),
        Some(Value::String(s)) if s.is_empty() => {
            out.push(format!("{ctx}field '{key}' must not be empty"));
        }
        Some(Value::String(_)) => {}
        Some(_) => out.push(format!("{ctx}field '{key}' must be a string")),
    }
}

fn optional_str(map: &Mapping, key: &str, ctx: &str, out: &mut Vec<String>) {
    match map.get(key) {
        None | Some(Value::Null | Value::String(_)) => {}
        Some(_) => out.push(format!("{ctx}field '{key}' must be a string")),
    }
}

/// Iterate the mappings of an optional list field, reporting non-list values
/// and non-mapping items.
fn for_each_item(
    map: &Mapping,
    key: &str,
    out: &mut Vec<String>,
    mut check: impl FnMut(&Mapping, &str, &mut Vec<String>),
) {
    match map.get(key) {
        None | Some(Value::Null) => {}
        Some(Value::Sequence(items)) => {
            for (i, item) in items.iter().enumerate() {
                let ctx = format!("{key}[{i}]: ");
                match item.as_mapping() {
                    Some(m) => check(m, &ctx, out),
                    None => out.push(format!("{ctx}item must be a mapping")),
                }
            }
        }
        Some(_) => out.push(format!("field '{key}' must be a list")),
    }
}

fn check_identity(map: &Mapping, out: &mut Vec<String>) {
    for key in ["vendor", "name", "version"] {
        require_str(map, key, "", out);
    }
}

fn check_service(map: &Mapping, out: &mut Vec<String>) {
    check_identity(map, out);
    for_each_item(map, "network_functions", out, |item, ctx, out| {
        require_str(item, "vnf_vendor", ctx, out);
        optional_str(item, "vnf_name", ctx, out);
        require_str(item, "vnf_version", ctx, out);
    });
}

fn check_function(map: &Mapping, out: &mut Vec<String>) {
    check_identity(map, out);
    for_each_item(map, "virtual_deployment_units", out, |item, ctx, out| {
        require_str(item, "id", ctx, out);
        optional_str(item, "vm_image", ctx, out);
        optional_str(item, "vm_image_format", ctx, out);
    });
}

fn check_package(map: &Mapping, out: &mut Vec<String>) {
    for key in [
        "descriptor_version",
        "schema",
        "entry_service_template",
        "vendor",
        "name",
        "version",
        "maintainer",
        "description",
    ] {
        require_str(map, key, "", out);
    }
    if !matches!(map.get("sealed"), Some(Value::Bool(_))) {
        out.push("field 'sealed' must be a boolean".to_owned());
    }
    match map.get("package_content") {
        Some(Value::Sequence(items)) if !items.is_empty() => {}
        _ => out.push("field 'package_content' must be a non-empty list".to_owned()),
    }
    for_each_item(map, "package_content", out, |item, ctx, out| {
        for key in ["content-type", "name", "hash"] {
            require_str(item, key, ctx, out);
        }
    });
    for_each_item(map, "package_resolvers", out, |item, ctx, out| {
        require_str(item, "name", ctx, out);
    });
    for_each_item(map, "artifact_dependencies", out, |item, ctx, out| {
        for key in ["name", "url", "hash"] {
            require_str(item, key, ctx, out);
        }
    });
}
