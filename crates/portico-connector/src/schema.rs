//! Connector schema types
//!
//! Types for describing what a connector exposes: object classes, their
//! attributes and the operations each class honors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::OperationKind;

/// Schema describing the objects a connector instance can manage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// The object classes available through this connector.
    pub object_classes: Vec<ObjectClassInfo>,

    /// Feature flags advertised by the connector.
    #[serde(default)]
    pub features: SchemaFeatures,
}

impl Schema {
    /// Create a new empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a schema with the given object classes.
    #[must_use]
    pub fn with_object_classes(object_classes: Vec<ObjectClassInfo>) -> Self {
        Self {
            object_classes,
            features: SchemaFeatures::default(),
        }
    }

    /// Set the feature flags.
    #[must_use]
    pub fn with_features(mut self, features: SchemaFeatures) -> Self {
        self.features = features;
        self
    }

    /// The fallback schema for connectors without schema discovery.
    #[must_use]
    pub fn empty_with_complex_attributes() -> Self {
        Self {
            object_classes: Vec::new(),
            features: SchemaFeatures {
                complex_attributes: true,
                ..SchemaFeatures::default()
            },
        }
    }

    /// Find an object class by name.
    #[must_use]
    pub fn object_class(&self, name: &str) -> Option<&ObjectClassInfo> {
        self.object_classes.iter().find(|oc| oc.name == name)
    }

    /// Check if an object class exists.
    #[must_use]
    pub fn has_object_class(&self, name: &str) -> bool {
        self.object_class(name).is_some()
    }
}

/// Feature flags a connector may advertise.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaFeatures {
    /// Paged search results.
    #[serde(default)]
    pub paging: bool,
    /// Server-side sorting.
    #[serde(default)]
    pub sorting: bool,
    /// Script execution on the connector.
    #[serde(default)]
    pub script_on_connector: bool,
    /// Username resolution.
    #[serde(default)]
    pub resolve_username: bool,
    /// Nested complex attribute values.
    #[serde(default)]
    pub complex_attributes: bool,
}

/// An object class exposed by a connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectClassInfo {
    /// Canonical name (e.g. `User`).
    pub name: String,

    /// Native name in the target system, when it differs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_name: Option<String>,

    /// Attribute carrying the stable identifier.
    #[serde(default = "default_id_attribute")]
    pub id_attribute: String,

    /// Attribute carrying the human-readable name.
    #[serde(default = "default_name_attribute")]
    pub name_attribute: String,

    /// Operations the connector actually honors for this class.
    #[serde(default)]
    pub supports: BTreeSet<OperationKind>,

    /// Attributes belonging to this object class.
    #[serde(default)]
    pub attributes: Vec<SchemaAttribute>,
}

fn default_id_attribute() -> String {
    "id".to_string()
}

fn default_name_attribute() -> String {
    "displayName".to_string()
}

impl ObjectClassInfo {
    /// Create a new object class with the default id/name attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            native_name: None,
            id_attribute: default_id_attribute(),
            name_attribute: default_name_attribute(),
            supports: BTreeSet::new(),
            attributes: Vec::new(),
        }
    }

    /// Set the native name.
    pub fn with_native_name(mut self, native_name: impl Into<String>) -> Self {
        self.native_name = Some(native_name.into());
        self
    }

    /// Set the id attribute.
    pub fn with_id_attribute(mut self, attr: impl Into<String>) -> Self {
        self.id_attribute = attr.into();
        self
    }

    /// Set the name attribute.
    pub fn with_name_attribute(mut self, attr: impl Into<String>) -> Self {
        self.name_attribute = attr.into();
        self
    }

    /// Declare a supported operation.
    #[must_use]
    pub fn supporting(mut self, op: OperationKind) -> Self {
        self.supports.insert(op);
        self
    }

    /// Declare the full CRUD + read surface.
    #[must_use]
    pub fn supporting_all(mut self) -> Self {
        self.supports.extend(OperationKind::all().iter().copied());
        self
    }

    /// Add an attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: SchemaAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Find an attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&SchemaAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Check whether an operation is honored for this class.
    #[must_use]
    pub fn supports(&self, op: OperationKind) -> bool {
        self.supports.contains(&op)
    }

    /// All required attributes.
    #[must_use]
    pub fn required_attributes(&self) -> Vec<&SchemaAttribute> {
        self.attributes.iter().filter(|a| a.required).collect()
    }
}

/// Data type of a schema attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Integer,
    Boolean,
    DateTime,
    Reference,
    Complex,
}

impl AttributeType {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Integer => "integer",
            AttributeType::Boolean => "boolean",
            AttributeType::DateTime => "datetime",
            AttributeType::Reference => "reference",
            AttributeType::Complex => "complex",
        }
    }
}

impl std::fmt::Display for AttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An attribute in an object class schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaAttribute {
    /// Attribute name.
    pub name: String,

    /// Data type.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,

    /// Required on create.
    #[serde(default)]
    pub required: bool,

    /// May hold multiple values.
    #[serde(default)]
    pub multi_valued: bool,

    /// May be set on create.
    #[serde(default = "default_flag_true")]
    pub creatable: bool,

    /// May be changed on update.
    #[serde(default = "default_flag_true")]
    pub updateable: bool,

    /// May be read.
    #[serde(default = "default_flag_true")]
    pub readable: bool,

    /// Returned without an explicit projection.
    #[serde(default = "default_flag_true")]
    pub returned_by_default: bool,

    /// Nested attributes; only meaningful when `attr_type` is `Complex`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_attributes: Vec<SchemaAttribute>,
}

fn default_flag_true() -> bool {
    true
}

impl SchemaAttribute {
    /// Create a new attribute with the given name and type.
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            multi_valued: false,
            creatable: true,
            updateable: true,
            readable: true,
            returned_by_default: true,
            sub_attributes: Vec::new(),
        }
    }

    /// Mark this attribute as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark this attribute as multi-valued.
    #[must_use]
    pub fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    /// Mark this attribute as read-only.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.creatable = false;
        self.updateable = false;
        self
    }

    /// Mark this attribute as write-only (e.g. passwords).
    #[must_use]
    pub fn write_only(mut self) -> Self {
        self.readable = false;
        self.returned_by_default = false;
        self
    }

    /// Add a sub-attribute to a complex attribute.
    #[must_use]
    pub fn with_sub_attribute(mut self, sub: SchemaAttribute) -> Self {
        self.sub_attributes.push(sub);
        self
    }
}
