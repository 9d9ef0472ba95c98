//! Dependency analysis records
//!
//! The wire form (produced by the source parser) uses camelCase keys; the
//! debug view uses snake_case keys with identical values.

use crate::error::{KilnError, KilnResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One import statement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct JavaImport {
    pub name: String,
    pub is_static: bool,
    pub is_asterisk: bool,
}

impl JavaImport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_static: false,
            is_asterisk: false,
        }
    }

    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    pub fn with_asterisk(mut self, is_asterisk: bool) -> Self {
        self.is_asterisk = is_asterisk;
        self
    }
}

/// Dependency facts extracted from one source file
///
/// Sequence fields keep source order so debug output is reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct JavaSourceDependencyAnalysis {
    pub declared_package: Option<String>,
    pub imports: Vec<JavaImport>,
    pub top_level_types: Vec<String>,
    pub consumed_unqualified_types: Vec<String>,
}

impl JavaSourceDependencyAnalysis {
    /// Decode a wire record
    ///
    /// `declaredPackage` may be absent or null. Every other key is required;
    /// a missing one is reported as `MalformedAnalysis` against `path`.
    pub fn from_wire_json(path: &str, value: Value) -> KilnResult<Self> {
        serde_json::from_value(value).map_err(|e| KilnError::MalformedAnalysis {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Decode a wire record from raw parser output
    pub fn from_wire_bytes(path: &str, bytes: &[u8]) -> KilnResult<Self> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| KilnError::MalformedAnalysis {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_wire_json(path, value)
    }

    /// The snake_case debug view, exactly the derived serialization
    pub fn to_debug_json(&self) -> KilnResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// The camelCase wire form
    pub fn to_wire_json(&self) -> Value {
        serde_json::json!({
            "declaredPackage": self.declared_package,
            "imports": self.imports.iter().map(|imp| serde_json::json!({
                "name": imp.name,
                "isStatic": imp.is_static,
                "isAsterisk": imp.is_asterisk,
            })).collect::<Vec<_>>(),
            "topLevelTypes": self.top_level_types,
            "consumedUnqualifiedTypes": self.consumed_unqualified_types,
        })
    }

    /// Fully qualified names of the types this file declares
    pub fn provided_types(&self) -> Vec<String> {
        self.top_level_types
            .iter()
            .map(|ty| match &self.declared_package {
                Some(pkg) if !pkg.is_empty() && !ty.contains('.') => format!("{}.{}", pkg, ty),
                _ => ty.clone(),
            })
            .collect()
    }
}
