//! Typed region settings.
//!
//! Each region variant declares a [`SettingsSchema`]: property name, type,
//! default and description. Persisted values are loose JSON values; they are
//! coerced against the schema when loaded or written. A mismatched value never
//! reaches a region's state.

use crate::error::RegionError;
use crate::types::Material;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Boolean,
    Integer,
    Double,
    String,
    UniqueId,
    /// List of block materials
    Materials,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyKind::Boolean => "boolean",
            PropertyKind::Integer => "integer",
            PropertyKind::Double => "double",
            PropertyKind::String => "string",
            PropertyKind::UniqueId => "unique id",
            PropertyKind::Materials => "material list",
        };
        f.write_str(name)
    }
}

/// A schema-checked setting value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    UniqueId(Option<Uuid>),
    Materials(Vec<Material>),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Boolean(_) => PropertyKind::Boolean,
            PropertyValue::Integer(_) => PropertyKind::Integer,
            PropertyValue::Double(_) => PropertyKind::Double,
            PropertyValue::String(_) => PropertyKind::String,
            PropertyValue::UniqueId(_) => PropertyKind::UniqueId,
            PropertyValue::Materials(_) => PropertyKind::Materials,
        }
    }

    /// Converts a loose persisted value into `kind`, if it fits.
    ///
    /// Integers are accepted where doubles are expected, and a material list
    /// may be written as one comma separated string.
    pub fn coerce(kind: PropertyKind, value: &Value) -> Option<Self> {
        match (kind, value) {
            (PropertyKind::Boolean, Value::Bool(b)) => Some(PropertyValue::Boolean(*b)),
            (PropertyKind::Integer, Value::Number(n)) => n.as_i64().map(PropertyValue::Integer),
            (PropertyKind::Double, Value::Number(n)) => n.as_f64().map(PropertyValue::Double),
            (PropertyKind::String, Value::String(s)) => Some(PropertyValue::String(s.clone())),
            (PropertyKind::UniqueId, Value::Null) => Some(PropertyValue::UniqueId(None)),
            (PropertyKind::UniqueId, Value::String(s)) if s.trim().is_empty() => {
                Some(PropertyValue::UniqueId(None))
            }
            (PropertyKind::UniqueId, Value::String(s)) => {
                Uuid::parse_str(s.trim()).ok().map(|id| PropertyValue::UniqueId(Some(id)))
            }
            (PropertyKind::Materials, Value::String(s)) => Some(PropertyValue::Materials(
                s.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(Material::new)
                    .collect(),
            )),
            (PropertyKind::Materials, Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(Material::new))
                .collect::<Option<Vec<_>>>()
                .map(PropertyValue::Materials),
            _ => None,
        }
    }

    /// Persistable form. `None` when there is nothing to persist.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            PropertyValue::Boolean(b) => Some(Value::Bool(*b)),
            PropertyValue::Integer(i) => Some(Value::from(*i)),
            PropertyValue::Double(d) => Some(Value::from(*d)),
            PropertyValue::String(s) => Some(Value::String(s.clone())),
            PropertyValue::UniqueId(id) => id.map(|id| Value::String(id.to_string())),
            PropertyValue::Materials(materials) => Some(Value::Array(
                materials
                    .iter()
                    .map(|m| Value::String(m.as_str().to_string()))
                    .collect(),
            )),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "double",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDefinition {
    pub name: &'static str,
    pub kind: PropertyKind,
    pub default: PropertyValue,
    pub description: &'static str,
}

/// Ordered set of property definitions for one variant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsSchema {
    properties: Vec<PropertyDefinition>,
}

impl SettingsSchema {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, name: &'static str, default: PropertyValue, description: &'static str) -> Self {
        self.properties.push(PropertyDefinition {
            name,
            kind: default.kind(),
            default,
            description,
        });
        self
    }

    pub fn boolean(self, name: &'static str, default: bool, description: &'static str) -> Self {
        self.with(name, PropertyValue::Boolean(default), description)
    }

    pub fn integer(self, name: &'static str, default: i64, description: &'static str) -> Self {
        self.with(name, PropertyValue::Integer(default), description)
    }

    pub fn double(self, name: &'static str, default: f64, description: &'static str) -> Self {
        self.with(name, PropertyValue::Double(default), description)
    }

    pub fn string(self, name: &'static str, default: &str, description: &'static str) -> Self {
        self.with(name, PropertyValue::String(default.to_string()), description)
    }

    pub fn unique_id(self, name: &'static str, description: &'static str) -> Self {
        self.with(name, PropertyValue::UniqueId(None), description)
    }

    pub fn materials(self, name: &'static str, description: &'static str) -> Self {
        self.with(name, PropertyValue::Materials(Vec::new()), description)
    }

    pub fn get(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|property| property.name == name)
    }

    pub fn properties(&self) -> &[PropertyDefinition] {
        &self.properties
    }

    /// Checks `value` against the property called `key`.
    pub fn validate(&self, key: &str, value: &Value) -> Result<PropertyValue, RegionError> {
        let definition = self
            .get(key)
            .ok_or_else(|| RegionError::UnknownSetting(key.to_string()))?;

        PropertyValue::coerce(definition.kind, value).ok_or_else(|| RegionError::SettingsType {
            key: key.to_string(),
            expected: definition.kind.to_string(),
            found: json_type_name(value).to_string(),
        })
    }
}

/// Current values of every property in a schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    values: BTreeMap<String, PropertyValue>,
    /// Keys explicitly configured (persisted on export)
    explicit: BTreeMap<String, PropertyValue>,
}

impl Settings {
    /// Settings holding every default of `schema`.
    pub fn defaults(schema: &SettingsSchema) -> Self {
        Self {
            values: schema
                .properties()
                .iter()
                .map(|property| (property.name.to_string(), property.default.clone()))
                .collect(),
            explicit: BTreeMap::new(),
        }
    }

    /// Loads persisted values. Mismatched or unknown entries are logged and
    /// skipped, leaving the default in place.
    pub fn load(schema: &SettingsSchema, document: &BTreeMap<String, Value>, context: &str) -> Self {
        let mut settings = Self::defaults(schema);
        for (key, value) in document {
            match schema.validate(key, value) {
                Ok(parsed) => {
                    settings.values.insert(key.clone(), parsed.clone());
                    settings.explicit.insert(key.clone(), parsed);
                }
                Err(e) => warn!("Region {}: ignoring setting, using default: {}", context, e),
            }
        }
        settings
    }

    /// Validates and stores one value. On error nothing changes.
    pub fn set(&mut self, schema: &SettingsSchema, key: &str, value: &Value) -> Result<(), RegionError> {
        let parsed = schema.validate(key, value)?;
        self.values.insert(key.to_string(), parsed.clone());
        self.explicit.insert(key.to_string(), parsed);
        Ok(())
    }

    /// Puts the schema default back and forgets the explicit value.
    pub fn clear(&mut self, schema: &SettingsSchema, key: &str) -> Result<(), RegionError> {
        let definition = schema
            .get(key)
            .ok_or_else(|| RegionError::UnknownSetting(key.to_string()))?;
        self.values.insert(key.to_string(), definition.default.clone());
        self.explicit.remove(key);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.values.get(key)
    }

    pub fn bool(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(PropertyValue::Boolean(true)))
    }

    pub fn integer(&self, key: &str) -> i64 {
        match self.values.get(key) {
            Some(PropertyValue::Integer(i)) => *i,
            _ => 0,
        }
    }

    pub fn double(&self, key: &str) -> f64 {
        match self.values.get(key) {
            Some(PropertyValue::Double(d)) => *d,
            Some(PropertyValue::Integer(i)) => *i as f64,
            _ => 0.0,
        }
    }

    pub fn string(&self, key: &str) -> &str {
        match self.values.get(key) {
            Some(PropertyValue::String(s)) => s,
            _ => "",
        }
    }

    pub fn unique_id(&self, key: &str) -> Option<Uuid> {
        match self.values.get(key) {
            Some(PropertyValue::UniqueId(id)) => *id,
            _ => None,
        }
    }

    pub fn materials(&self, key: &str) -> &[Material] {
        match self.values.get(key) {
            Some(PropertyValue::Materials(materials)) => materials,
            _ => &[],
        }
    }

    /// Explicitly configured values in persistable form.
    pub fn to_document(&self) -> BTreeMap<String, Value> {
        self.explicit
            .iter()
            .filter_map(|(key, value)| value.to_json().map(|json| (key.clone(), json)))
            .collect()
    }
}
