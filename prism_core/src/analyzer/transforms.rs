//! Transform classification and per-site rules.
//!
//! A transform is valid only where its class allows: qualifiers and type
//! tags on bindings, struct family and `return<T>` on definitions,
//! `effects`/`capabilities` on definitions and executions, `mut` on
//! lifecycle helpers, `shared_scope` on loop statements. Placement
//! transforms are rejected everywhere.

use std::collections::HashSet;

use prism_ast::{Definition, Expr, Transform};

use crate::capability::Capability;
use crate::context::{is_placement_name, is_struct_family_name, SharedContext};

/// What one transform is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransformClass {
    Qualifier,
    TypeTag,
    StructFamily,
    CapabilityDecl,
    Return,
    PolicyMarker,
    Placement,
    Unknown,
}

pub(crate) fn classify(transform: &Transform) -> TransformClass {
    let name = transform.name.as_str();
    if is_placement_name(name) {
        return TransformClass::Placement;
    }
    if is_struct_family_name(name) {
        return TransformClass::StructFamily;
    }
    match name {
        "mut" | "copy" | "restrict" | "align_bytes" | "align_kbytes" | "public" | "private"
        | "package" | "static" => TransformClass::Qualifier,
        "effects" | "capabilities" => TransformClass::CapabilityDecl,
        "return" => TransformClass::Return,
        "shared_scope" | "single_type_to_return" => TransformClass::PolicyMarker,
        "i32" | "int" | "i64" | "u64" | "f32" | "float" | "f64" | "bool" | "string" | "array"
        | "vector" | "map" | "Reference" | "Pointer" | "handle" => TransformClass::TypeTag,
        _ => TransformClass::Unknown,
    }
}

/// Pull the capability list out of one `effects(...)`/`capabilities(...)`
/// transform, enforcing its shape. The duplicate check runs before the
/// membership check so `effects(x, x)` reports the duplicate even when `x`
/// is not a capability.
pub(crate) fn parse_capability_transform(transform: &Transform) -> Result<Vec<Capability>, String> {
    let is_effects = transform.name == "effects";
    let label = if is_effects { "effects" } else { "capabilities" };
    if !transform.template_args.is_empty() {
        return Err(format!("{label} transform does not accept template arguments"));
    }
    let mut names = Vec::new();
    for arg in &transform.args {
        match arg {
            Expr::Name(name) if name.namespace.is_empty() => names.push(name.name.clone()),
            _ => {
                return Err(if is_effects {
                    "invalid effects capability".to_string()
                } else {
                    "invalid capability".to_string()
                })
            }
        }
    }
    let mut seen = HashSet::new();
    for name in &names {
        if !seen.insert(name.clone()) {
            return Err(if is_effects {
                "duplicate effects capability".to_string()
            } else {
                "duplicate capability".to_string()
            });
        }
    }
    let mut capabilities = Vec::new();
    for name in &names {
        match Capability::parse(name) {
            Some(cap) => capabilities.push(cap),
            None => {
                return Err(if is_effects {
                    "invalid effects capability".to_string()
                } else {
                    "invalid capability".to_string()
                })
            }
        }
    }
    Ok(capabilities)
}

/// Collect the declared capabilities from a transform list, rejecting
/// repeated `effects`/`capabilities` envelopes.
pub(crate) fn collect_declared_capabilities(
    transforms: &[Transform],
) -> Result<HashSet<Capability>, String> {
    let mut declared = HashSet::new();
    let mut saw_effects = false;
    let mut saw_capabilities = false;
    for transform in transforms {
        if transform.name == "effects" {
            if saw_effects {
                return Err("duplicate effects transform".to_string());
            }
            saw_effects = true;
            declared.extend(parse_capability_transform(transform)?);
        } else if transform.name == "capabilities" {
            if saw_capabilities {
                return Err("duplicate capabilities transform".to_string());
            }
            saw_capabilities = true;
            declared.extend(parse_capability_transform(transform)?);
        }
    }
    Ok(declared)
}

/// Rules for the transform envelope of one definition.
pub(crate) fn validate_definition_transforms(
    ctx: &SharedContext<'_>,
    def: &Definition,
) -> Result<(), String> {
    let is_struct = def.transforms.iter().any(|t| is_struct_family_name(&t.name));
    let is_helper = ctx.is_lifecycle_helper(def);
    let single_type_policy = def.transform("single_type_to_return").is_some();
    let mut mut_count = 0usize;

    collect_declared_capabilities(&def.transforms)?;

    for transform in &def.transforms {
        match classify(transform) {
            TransformClass::Placement => {
                return Err("placement transforms are not supported".to_string());
            }
            TransformClass::StructFamily => {
                if !transform.template_args.is_empty() {
                    return Err(format!(
                        "{} transform does not accept template arguments",
                        transform.name
                    ));
                }
                if !transform.args.is_empty() {
                    return Err(format!("{} transform does not accept arguments", transform.name));
                }
            }
            TransformClass::Return => {
                if is_struct {
                    return Err("struct definitions cannot declare return types".to_string());
                }
                if transform.template_args.len() != 1 {
                    return Err("return transform requires exactly one template argument".to_string());
                }
            }
            TransformClass::Qualifier => match transform.name.as_str() {
                "mut" => {
                    if !is_helper {
                        return Err("mut transform is only supported on lifecycle helpers".to_string());
                    }
                    if !transform.template_args.is_empty() {
                        return Err(format!(
                            "mut transform does not accept template arguments on {}",
                            def.full_path
                        ));
                    }
                    if !transform.args.is_empty() {
                        return Err(format!(
                            "mut transform does not accept arguments on {}",
                            def.full_path
                        ));
                    }
                    mut_count += 1;
                    if mut_count > 1 {
                        return Err(format!("duplicate mut transform on {}", def.full_path));
                    }
                }
                "align_bytes" | "align_kbytes" => {
                    validate_align_transform(transform)?;
                }
                _ => {}
            },
            TransformClass::CapabilityDecl => {}
            TransformClass::PolicyMarker => {
                if transform.name == "shared_scope" {
                    return Err("shared_scope is only valid on loop/while/for statements".to_string());
                }
            }
            TransformClass::TypeTag => {
                // The `[T]` shorthand stands for `return<T>` only under the
                // single_type_to_return policy.
                if !single_type_policy {
                    return Err(format!(
                        "unsupported transform on definition: {}",
                        transform.name
                    ));
                }
                if is_struct {
                    return Err("struct definitions cannot declare return types".to_string());
                }
            }
            TransformClass::Unknown => {
                return Err(format!("unsupported transform on definition: {}", transform.name));
            }
        }
    }

    // Struct family interactions.
    let tagged = |name: &str| def.transforms.iter().any(|t| t.name == name);
    if tagged("pod") && (tagged("handle") || tagged("gpu_lane")) {
        return Err("pod definitions cannot be tagged as handle or gpu_lane".to_string());
    }
    if tagged("handle") && tagged("gpu_lane") {
        return Err("handle definitions cannot be tagged as gpu_lane".to_string());
    }
    Ok(())
}

pub(crate) fn validate_align_transform(transform: &Transform) -> Result<(), String> {
    if !transform.template_args.is_empty() {
        return Err(format!("{} does not accept template arguments", transform.name));
    }
    let positive = match transform.args.as_slice() {
        [Expr::Int(lit)] => {
            if lit.unsigned {
                lit.value > 0
            } else {
                (lit.value as i64) > 0
            }
        }
        _ => false,
    };
    if !positive {
        return Err(format!("{} requires a positive integer argument", transform.name));
    }
    Ok(())
}

/// Rules for the transform envelope of one execution: only capability
/// declarations are allowed there.
pub(crate) fn validate_execution_transforms(transforms: &[Transform]) -> Result<(), String> {
    collect_declared_capabilities(transforms)?;
    for transform in transforms {
        match classify(transform) {
            TransformClass::CapabilityDecl => {}
            TransformClass::StructFamily => {
                return Err("struct transforms are not allowed on executions".to_string());
            }
            TransformClass::Qualifier if transform.name == "mut" => {
                return Err("mut transform is not allowed on executions".to_string());
            }
            TransformClass::Placement => {
                return Err("placement transforms are not supported".to_string());
            }
            _ => {
                return Err(format!(
                    "binding transforms are not allowed on executions: {}",
                    transform.name
                ));
            }
        }
    }
    Ok(())
}

/// Shape rules for a `shared_scope` statement marker.
pub(crate) fn validate_shared_scope_marker(transform: &Transform) -> Result<(), String> {
    if !transform.template_args.is_empty() {
        return Err("shared_scope does not accept template arguments".to_string());
    }
    if !transform.args.is_empty() {
        return Err("shared_scope does not accept arguments".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_ast::builder::*;

    #[test]
    fn effects_duplicates_beat_membership() {
        let transform = Transform::with_args("effects", vec![name("io"), name("io")]);
        let err = parse_capability_transform(&transform).unwrap_err();
        assert!(err.contains("duplicate effects capability"));
    }

    #[test]
    fn capabilities_reject_non_identifier() {
        let transform = Transform::with_args("capabilities", vec![lit_str("io")]);
        let err = parse_capability_transform(&transform).unwrap_err();
        assert!(err.contains("invalid capability"));
    }

    #[test]
    fn repeated_envelopes_are_duplicates() {
        let err = collect_declared_capabilities(&[
            Transform::with_args("effects", vec![name("io_out")]),
            Transform::with_args("effects", vec![name("asset_read")]),
        ])
        .unwrap_err();
        assert!(err.contains("duplicate effects transform"));
    }

    #[test]
    fn align_bytes_needs_positive_integer() {
        let good = Transform::with_args("align_bytes", vec![lit_i32(16)]);
        assert!(validate_align_transform(&good).is_ok());
        let bad = Transform::with_args("align_bytes", vec![name("foo")]);
        assert!(validate_align_transform(&bad)
            .unwrap_err()
            .contains("align_bytes requires a positive integer argument"));
    }
}
