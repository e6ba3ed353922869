//! Command Registry
//!
//! Immutable catalog mapping command names to their descriptors, plus the
//! gating rules that decide which commands are advertised to callers.
//!
//! The registry is purely descriptive: it never validates arguments and
//! never talks to the host. Argument checks happen in the gateway.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use crate::catalog::CatalogFile;

/// Errors raised while building or querying the registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Command not found: {0}")]
    NotFound(String),

    #[error("Duplicate command: {0}")]
    DuplicateCommand(String),

    #[error("Command '{command}' requires undeclared parameter '{field}'")]
    UndeclaredRequired { command: String, field: String },

    #[error("Suppressed command is not registered: {0}")]
    UnknownSuppressed(String),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),
}

/// JSON type of a single parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

/// Schema of one parameter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Absent for parameters accepting any JSON value
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FieldType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    /// Element schema for arrays
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<FieldSchema>>,
}

/// Object schema describing a command's parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type", default = "object_type")]
    pub kind: String,
    #[serde(default)]
    pub properties: BTreeMap<String, FieldSchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

fn object_type() -> String {
    "object".to_string()
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self {
            kind: object_type(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

impl ParameterSchema {
    /// Required parameters absent (or null) in `arguments`
    pub fn missing_required<'a>(&'a self, arguments: &Map<String, Value>) -> Vec<&'a str> {
        self.required
            .iter()
            .filter(|field| arguments.get(field.as_str()).map_or(true, Value::is_null))
            .map(String::as_str)
            .collect()
    }

    /// JSON Schema form, as advertised in tool listings
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }
}

fn enabled_by_default() -> bool {
    true
}

/// Static metadata for one invocable command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "parameters", default)]
    pub parameter_schema: ParameterSchema,
    /// Command name sent to the host when it differs from `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_alias: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl CommandDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema: ParameterSchema::default(),
            remote_alias: None,
            enabled: true,
        }
    }

    pub fn with_schema(mut self, schema: ParameterSchema) -> Self {
        self.parameter_schema = schema;
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.remote_alias = Some(alias.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Name sent to the host in the request envelope
    pub fn wire_name(&self) -> &str {
        self.remote_alias.as_deref().unwrap_or(&self.name)
    }
}

/// Immutable name → descriptor mapping with suppression rules
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    /// Catalog order is preserved for listings
    descriptors: Vec<CommandDescriptor>,
    index: HashMap<String, usize>,
    suppressed: HashSet<String>,
    expose_all: bool,
}

impl CommandRegistry {
    /// Build a registry, checking the catalog invariants
    pub fn new(
        descriptors: Vec<CommandDescriptor>,
        suppressed: impl IntoIterator<Item = String>,
        expose_all: bool,
    ) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(descriptors.len());
        for (position, descriptor) in descriptors.iter().enumerate() {
            let schema = &descriptor.parameter_schema;
            if let Some(field) = schema
                .required
                .iter()
                .find(|field| !schema.properties.contains_key(field.as_str()))
            {
                return Err(RegistryError::UndeclaredRequired {
                    command: descriptor.name.clone(),
                    field: field.clone(),
                });
            }
            if index.insert(descriptor.name.clone(), position).is_some() {
                return Err(RegistryError::DuplicateCommand(descriptor.name.clone()));
            }
        }

        let suppressed: HashSet<String> = suppressed.into_iter().collect();
        if let Some(name) = suppressed.iter().find(|name| !index.contains_key(name.as_str())) {
            return Err(RegistryError::UnknownSuppressed(name.clone()));
        }

        Ok(Self {
            descriptors,
            index,
            suppressed,
            expose_all,
        })
    }

    pub fn from_catalog(catalog: CatalogFile, expose_all: bool) -> Result<Self, RegistryError> {
        Self::new(catalog.commands, catalog.suppressed, expose_all)
    }

    /// Registry over the embedded catalog
    pub fn builtin(expose_all: bool) -> Result<Self, RegistryError> {
        Self::from_catalog(CatalogFile::builtin()?, expose_all)
    }

    /// Registry over a catalog file on disk
    pub fn from_path(path: &Path, expose_all: bool) -> Result<Self, RegistryError> {
        Self::from_catalog(CatalogFile::load(path)?, expose_all)
    }

    /// Look up a command by name, regardless of enablement or suppression
    pub fn resolve(&self, name: &str) -> Result<&CommandDescriptor, RegistryError> {
        self.index
            .get(name)
            .map(|&position| &self.descriptors[position])
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Commands advertised to callers, in catalog order
    pub fn visible_commands(&self, include_suppressed: bool) -> Vec<&CommandDescriptor> {
        self.descriptors
            .iter()
            .filter(|descriptor| self.is_visible(descriptor, include_suppressed))
            .collect()
    }

    /// Whether `name` may be invoked through the default surface
    pub fn is_exposed(&self, name: &str) -> bool {
        self.resolve(name)
            .map(|descriptor| self.is_visible(descriptor, false))
            .unwrap_or(false)
    }

    pub fn is_suppressed(&self, name: &str) -> bool {
        self.suppressed.contains(name)
    }

    pub fn expose_all(&self) -> bool {
        self.expose_all
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    fn is_visible(&self, descriptor: &CommandDescriptor, include_suppressed: bool) -> bool {
        if self.expose_all || include_suppressed {
            return true;
        }
        descriptor.enabled && !self.suppressed.contains(&descriptor.name)
    }
}
