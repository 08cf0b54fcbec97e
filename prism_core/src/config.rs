//! Driver-supplied options for one compilation.
//!
//! The embedding driver decides whether the entry definition may take an
//! `array<string>` parameter (and what the argv is), and which paths get
//! capabilities granted by policy instead of source transforms. Policy files
//! ship as TOML:
//!
//! ```toml
//! [default_effects]
//! "/main" = ["io_out"]
//! "/tools/report" = ["io_out", "io_err"]
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::capability::Capability;

/// Options threaded through validation and lowering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreOptions {
    /// Argv for the entry `array<string>` parameter. `None` means the driver
    /// does not advertise argv support and such an entry is rejected.
    #[serde(default)]
    pub entry_args: Option<Vec<String>>,

    /// Per-path capability grants applied on top of source transforms.
    #[serde(default)]
    pub default_effects: BTreeMap<String, Vec<String>>,
}

impl CoreOptions {
    /// Parse a policy file. Unknown capability names are rejected here so a
    /// bad policy fails loudly instead of silently granting nothing.
    pub fn from_toml_str(text: &str) -> Result<Self, String> {
        let options: CoreOptions = toml::from_str(text).map_err(|e| e.to_string())?;
        for (path, names) in &options.default_effects {
            for cap_name in names {
                if Capability::parse(cap_name).is_none() {
                    return Err(format!(
                        "invalid capability in default effects for {path}: {cap_name}"
                    ));
                }
            }
        }
        Ok(options)
    }

    /// The capabilities granted by policy for a path.
    pub fn default_effects_for(&self, path: &str) -> Vec<Capability> {
        self.default_effects
            .get(path)
            .map(|names| names.iter().filter_map(|n| Capability::parse(n)).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_policy_toml() {
        let options = CoreOptions::from_toml_str(
            r#"
[default_effects]
"/main" = ["io_out"]
"#,
        )
        .unwrap();
        assert_eq!(options.default_effects_for("/main"), vec![Capability::IoOut]);
        assert!(options.default_effects_for("/other").is_empty());
    }

    #[test]
    fn rejects_unknown_capability() {
        let err = CoreOptions::from_toml_str(
            r#"
[default_effects]
"/main" = ["io"]
"#,
        )
        .unwrap_err();
        assert!(err.contains("invalid capability"));
    }
}
