//! Static command catalog
//!
//! The catalog is plain data: a JSON table of command descriptors plus the
//! names hidden from the default tool listing. The built-in table is
//! embedded at compile time; an alternate file with the same shape can be
//! loaded at startup.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::registry::{CommandDescriptor, RegistryError};

/// Built-in catalog shipped with the bridge
pub const BUILTIN_CATALOG: &str = include_str!("../catalog/commands.json");

/// On-disk catalog layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    pub commands: Vec<CommandDescriptor>,
    /// Commands hidden unless the expose-all override is set
    #[serde(default)]
    pub suppressed: Vec<String>,
}

impl CatalogFile {
    pub fn parse(json: &str) -> Result<Self, RegistryError> {
        serde_json::from_str(json).map_err(|e| RegistryError::InvalidCatalog(e.to_string()))
    }

    pub fn builtin() -> Result<Self, RegistryError> {
        Self::parse(BUILTIN_CATALOG)
    }

    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            RegistryError::InvalidCatalog(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&json)
    }
}
