//! Program-level containers: definitions, imports, and executions.

use serde::{Deserialize, Serialize};

use crate::expr::Expr;
use crate::transform::Transform;

/// A named definition. `full_path` always begins with `/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub full_path: String,
    pub namespace: String,
    pub transforms: Vec<Transform>,
    /// Parameter bindings in declaration order.
    pub params: Vec<Expr>,
    /// Optional trailing return expression (distinct from `return(...)`
    /// statements inside the body).
    pub return_expr: Option<Expr>,
    pub body: Vec<Expr>,
}

impl Definition {
    pub fn new(full_path: impl Into<String>) -> Self {
        Self {
            full_path: full_path.into(),
            namespace: String::new(),
            transforms: Vec::new(),
            params: Vec::new(),
            return_expr: None,
            body: Vec::new(),
        }
    }

    /// The leaf name (`min` for `/math/min`).
    pub fn leaf(&self) -> &str {
        path_leaf(&self.full_path)
    }

    /// The parent path (`/math` for `/math/min`), or `""` for a top-level
    /// definition.
    pub fn parent(&self) -> &str {
        path_parent(&self.full_path)
    }

    /// Find a transform by name.
    pub fn transform(&self, name: &str) -> Option<&Transform> {
        self.transforms.iter().find(|t| t.name == name)
    }

    /// Count transforms with the given name.
    pub fn transform_count(&self, name: &str) -> usize {
        self.transforms.iter().filter(|t| t.name == name).count()
    }
}

/// A top-level execution: a call with an optional transform envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub call: Expr,
    pub transforms: Vec<Transform>,
}

/// A parsed program: ordered definitions, imports (absolute paths, possibly
/// wildcarded with a trailing `/*`), and top-level executions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub definitions: Vec<Definition>,
    pub imports: Vec<String>,
    pub executions: Vec<Execution>,
}

impl Program {
    pub fn with_definitions(definitions: Vec<Definition>) -> Self {
        Self {
            definitions,
            imports: Vec::new(),
            executions: Vec::new(),
        }
    }

    /// Look up a definition by its full path.
    pub fn definition(&self, full_path: &str) -> Option<&Definition> {
        self.definitions.iter().find(|d| d.full_path == full_path)
    }
}

/// The leaf segment of a `/`-separated path.
pub fn path_leaf(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Everything before the final `/`, or `""` when the path is top-level.
pub fn path_parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "",
        Some(idx) => &path[..idx],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_helpers() {
        assert_eq!(path_leaf("/math/min"), "min");
        assert_eq!(path_parent("/math/min"), "/math");
        assert_eq!(path_leaf("/main"), "main");
        assert_eq!(path_parent("/main"), "");
    }

    #[test]
    fn definition_lookup() {
        let program = Program::with_definitions(vec![Definition::new("/main")]);
        assert!(program.definition("/main").is_some());
        assert!(program.definition("/other").is_none());
    }
}
