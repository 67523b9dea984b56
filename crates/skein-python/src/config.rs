//! Script adapter configuration.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

use skein_core::EntryPoint;

// ── ScriptConfigError ──────────────────────────────────────────────

/// Errors detected during [`ScriptConfig::validate()`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptConfigError {
    /// A binding name is not a Python identifier.
    InvalidAttribute {
        /// The offending name.
        name: String,
    },
    /// Two bindings share a name.
    DuplicateAttribute {
        /// The shared name.
        name: String,
    },
    /// A binding would shadow a lifecycle entry point.
    ReservedAttribute {
        /// The offending name.
        name: String,
    },
}

impl fmt::Display for ScriptConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAttribute { name } => {
                write!(f, "'{name}' is not a valid Python identifier")
            }
            Self::DuplicateAttribute { name } => {
                write!(f, "binding name '{name}' is used twice")
            }
            Self::ReservedAttribute { name } => {
                write!(f, "binding name '{name}' shadows a lifecycle entry point")
            }
        }
    }
}

impl Error for ScriptConfigError {}

// ── ScriptConfig ───────────────────────────────────────────────────

/// How script modules are resolved and what is bound into them.
#[derive(Clone, Debug)]
pub struct ScriptConfig {
    /// Directories prepended to `sys.path` (once each) before import.
    pub search_paths: Vec<PathBuf>,
    /// Global name of the buffer object. Default: `buffer`.
    pub buffer_attr: String,
    /// Global name of the ordinal callable. Default: `ordinal`.
    pub ordinal_attr: String,
    /// Remove the module from `sys.modules` when unloaded, so the next run
    /// re-executes its top level. Default: `true`.
    pub evict_on_unload: bool,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            buffer_attr: "buffer".into(),
            ordinal_attr: "ordinal".into(),
            evict_on_unload: true,
        }
    }
}

impl ScriptConfig {
    /// Add a module search directory.
    pub fn search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_paths.push(dir.into());
        self
    }

    /// Check binding names.
    pub fn validate(&self) -> Result<(), ScriptConfigError> {
        for name in [&self.buffer_attr, &self.ordinal_attr] {
            if !is_identifier(name) {
                return Err(ScriptConfigError::InvalidAttribute { name: name.clone() });
            }
            if EntryPoint::ALL.iter().any(|e| e.name() == name) {
                return Err(ScriptConfigError::ReservedAttribute { name: name.clone() });
            }
        }
        if self.buffer_attr == self.ordinal_attr {
            return Err(ScriptConfigError::DuplicateAttribute {
                name: self.buffer_attr.clone(),
            });
        }
        Ok(())
    }
}

/// ASCII Python identifier check.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        ScriptConfig::default().validate().unwrap();
    }

    #[test]
    fn identifier_rules() {
        assert!(is_identifier("static_data"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn duplicate_names_rejected() {
        let cfg = ScriptConfig {
            ordinal_attr: "buffer".into(),
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ScriptConfigError::DuplicateAttribute {
                name: "buffer".into()
            })
        );
    }

    #[test]
    fn entry_point_names_reserved() {
        let cfg = ScriptConfig {
            buffer_attr: "main".into(),
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ScriptConfigError::ReservedAttribute { .. })
        ));
    }
}
