//! The class/property schema oracle boundary.
//!
//! The schema itself comes from outside (an API dump file); the codecs only
//! consult it: the declared type of `(class, property)` overrides tag-name
//! inference on decode and filters inconsistent properties on encode, and
//! enum-typed properties validate token values against the enum's item list.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::util::Result;
use crate::value::ValueType;

/// Class and enum metadata, deserialized from a JSON API dump.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub classes: HashMap<String, ClassSchema>,
    #[serde(default)]
    pub enums: HashMap<String, EnumSchema>,
}

/// Property name to declared value-type name.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ClassSchema {
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// The items of one enum.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct EnumSchema {
    #[serde(default)]
    pub items: Vec<EnumItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnumItem {
    pub name: String,
    pub value: u32,
}

impl EnumSchema {
    /// Whether a token value is one of the enum's items.
    pub fn contains(&self, value: u32) -> bool {
        self.items.iter().any(|item| item.value == value)
    }
}

/// A declared property type resolved against the schema.
#[derive(Debug, Clone, Copy)]
pub enum DeclaredType<'a> {
    /// A plain value type. References appear as the declared type `Object`.
    Value(ValueType),
    /// An enum type, by name: the property decodes as a token, validated
    /// against the enum's items.
    Enum(&'a str, &'a EnumSchema),
}

impl DeclaredType<'_> {
    /// The value type the property is stored as.
    pub fn value_type(&self) -> ValueType {
        match self {
            DeclaredType::Value(ty) => *ty,
            DeclaredType::Enum(..) => ValueType::Token,
        }
    }
}

impl Schema {
    /// Load a schema from a JSON API dump file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_reader(File::open(path)?)
    }

    pub fn from_reader(mut r: impl Read) -> Result<Self> {
        let mut buf = String::new();
        r.read_to_string(&mut buf)?;
        serde_json::from_str(&buf).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()).into()
        })
    }

    /// Whether the schema knows the class at all.
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    /// The declared type of `(class, property)`, if both the class and the
    /// property are known and the type name resolves.
    pub fn property_type(&self, class: &str, property: &str) -> Option<DeclaredType<'_>> {
        let type_name = self.classes.get(class)?.properties.get(property)?;
        if let Some((name, enum_schema)) = self.enums.get_key_value(type_name) {
            return Some(DeclaredType::Enum(name, enum_schema));
        }
        ValueType::from_tag_name(type_name).map(DeclaredType::Value)
    }
}
