//! Schema - Define type schemas for resources
//!
//! Providers define schemas for each resource type, enabling type validation
//! of configuration, schema-aware diffing and typed decoding of persisted state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::resource::{Attributes, Value};

/// Validation function attached to a custom type
#[derive(Clone)]
pub struct Validator(Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>);

impl Validator {
    pub fn new(f: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn check(&self, value: &Value) -> Result<(), String> {
        (self.0)(value)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator")
    }
}

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: Validator,
    },
    /// List
    List(Box<AttributeType>),
    /// Unordered collection of unique values
    Set(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
    /// Nested block, stored as a list of maps
    Block(Box<BlockSchema>),
}

impl AttributeType {
    /// Check if a value conforms to this type, running custom validators
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        self.check(value, true)
    }

    /// Structural check only: custom validators and enum variants are not run
    pub fn check_shape(&self, value: &Value) -> Result<(), TypeError> {
        self.check(value, false)
    }

    fn check(&self, value: &Value, full: bool) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if !full || variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { base, validate, .. }, v) => {
                base.check(v, full)?;
                if full {
                    validate
                        .check(v)
                        .map_err(|message| TypeError::ValidationFailed { message })?;
                }
                Ok(())
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner
                        .check(item, full)
                        .map_err(|e| TypeError::ListItemError {
                            index: i,
                            inner: Box::new(e),
                        })?;
                }
                Ok(())
            }

            (AttributeType::Set(inner), Value::Set(items)) => {
                for item in items {
                    inner.check(item, full)?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.check(v, full).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Block(block), Value::List(items)) => {
                if let Some(max) = block.max_items
                    && items.len() > max
                {
                    return Err(TypeError::TooManyItems {
                        max,
                        got: items.len(),
                    });
                }
                for (i, item) in items.iter().enumerate() {
                    let Value::Map(fields) = item else {
                        return Err(TypeError::TypeMismatch {
                            expected: "Block".to_string(),
                            got: item.type_name(),
                        });
                    };
                    block
                        .check(fields, full)
                        .map_err(|e| TypeError::ListItemError {
                            index: i,
                            inner: Box::new(e),
                        })?;
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    /// Typed conversion from JSON. `null` yields `None`.
    pub fn from_json(&self, json: &serde_json::Value) -> Result<Option<Value>, TypeError> {
        if json.is_null() {
            return Ok(None);
        }
        let mismatch = || TypeError::TypeMismatch {
            expected: self.type_name(),
            got: json_type_name(json).to_string(),
        };
        let value = match self {
            AttributeType::String | AttributeType::Enum(_) => {
                Value::String(json.as_str().ok_or_else(mismatch)?.to_string())
            }
            AttributeType::Int => Value::Int(json.as_i64().ok_or_else(mismatch)?),
            AttributeType::Bool => Value::Bool(json.as_bool().ok_or_else(mismatch)?),
            AttributeType::Custom { base, .. } => return base.from_json(json),
            AttributeType::List(inner) => Value::List(
                json.as_array()
                    .ok_or_else(mismatch)?
                    .iter()
                    .filter_map(|item| inner.from_json(item).transpose())
                    .collect::<Result<_, _>>()?,
            ),
            AttributeType::Set(inner) => Value::Set(
                json.as_array()
                    .ok_or_else(mismatch)?
                    .iter()
                    .filter_map(|item| inner.from_json(item).transpose())
                    .collect::<Result<_, _>>()?,
            ),
            AttributeType::Map(inner) => Value::Map(
                json.as_object()
                    .ok_or_else(mismatch)?
                    .iter()
                    .filter_map(|(k, v)| {
                        inner
                            .from_json(v)
                            .map_err(|e| e.in_attribute(k))
                            .transpose()
                            .map(|r| r.map(|v| (k.clone(), v)))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            AttributeType::Block(block) => {
                // A single block may be written as a bare object
                let items: Vec<&serde_json::Value> = match json {
                    serde_json::Value::Array(items) => items.iter().collect(),
                    serde_json::Value::Object(_) => vec![json],
                    _ => return Err(mismatch()),
                };
                let mut blocks = Vec::with_capacity(items.len());
                for item in items {
                    let fields = item.as_object().ok_or_else(mismatch)?;
                    blocks.push(Value::Map(block.decode_json(fields)?));
                }
                Value::List(blocks)
            }
        };
        Ok(Some(value))
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Set(inner) => format!("Set<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Block(_) => "Block".to_string(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

fn json_type_name(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "Null",
        serde_json::Value::Bool(_) => "Bool",
        serde_json::Value::Number(_) => "Number",
        serde_json::Value::String(_) => "String",
        serde_json::Value::Array(_) => "Array",
        serde_json::Value::Object(_) => "Object",
    }
}

/// Type error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{name}' is computed and cannot be set")]
    ComputedAttribute { name: String },

    #[error("At most {max} item(s) allowed, got {got}")]
    TooManyItems { max: usize, got: usize },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },

    #[error("Attribute '{name}': {inner}")]
    AttributeError { name: String, inner: Box<TypeError> },
}

impl TypeError {
    /// Attach the attribute name to an error raised for its value
    pub fn in_attribute(self, name: &str) -> Self {
        match self {
            e @ (TypeError::MissingRequired { .. }
            | TypeError::UnknownAttribute { .. }
            | TypeError::ComputedAttribute { .. }) => e,
            e => TypeError::AttributeError {
                name: name.to_string(),
                inner: Box::new(e),
            },
        }
    }
}

/// Who supplies an attribute's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    /// Must be set in configuration
    Required,
    /// May be set in configuration
    Optional,
    /// Only ever set by the provider
    Computed,
    /// Set in configuration or filled in by the provider when omitted
    OptionalComputed,
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub mutability: Mutability,
    /// A change to this attribute replaces the remote object
    pub force_new: bool,
    /// Values differing only in letter case are equal
    pub case_insensitive: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            mutability: Mutability::Optional,
            force_new: false,
            case_insensitive: false,
            default: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.mutability = Mutability::Required;
        self
    }

    pub fn computed(mut self) -> Self {
        self.mutability = Mutability::Computed;
        self
    }

    pub fn optional_computed(mut self) -> Self {
        self.mutability = Mutability::OptionalComputed;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn is_required(&self) -> bool {
        self.mutability == Mutability::Required
    }

    pub fn is_computed(&self) -> bool {
        matches!(
            self.mutability,
            Mutability::Computed | Mutability::OptionalComputed
        )
    }

    /// Whether configuration may set this attribute
    pub fn is_settable(&self) -> bool {
        self.mutability != Mutability::Computed
    }

    /// Whether moving from `old` to `new` is a change for this attribute.
    ///
    /// An omitted computed value keeps whatever the provider reported, and an
    /// absent value is equal to the zero value of its type.
    pub fn value_changed(&self, old: Option<&Value>, new: Option<&Value>) -> bool {
        match (old, new) {
            (_, None) if self.is_computed() => false,
            (None, None) => false,
            (Some(old), None) => !old.is_zero(),
            (None, Some(new)) => !new.is_zero(),
            (Some(old), Some(new)) => match (&self.attr_type, old, new) {
                (_, Value::String(a), Value::String(b)) if self.case_insensitive => {
                    !a.eq_ignore_ascii_case(b)
                }
                (AttributeType::Block(block), Value::List(a), Value::List(b)) => {
                    a.len() != b.len()
                        || a.iter().zip(b).any(|(a, b)| match (a, b) {
                            (Value::Map(a), Value::Map(b)) => block.fields_changed(a, b),
                            (a, b) => a != b,
                        })
                }
                _ => old != new,
            },
        }
    }
}

/// Schema of a nested block
#[derive(Debug, Clone, Default)]
pub struct BlockSchema {
    pub attributes: BTreeMap<String, AttributeSchema>,
    pub max_items: Option<usize>,
}

impl BlockSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    fn check(&self, fields: &Attributes, full: bool) -> Result<(), TypeError> {
        check_fields(&self.attributes, fields, full)
    }

    fn apply_defaults(&self, fields: &mut Attributes) {
        apply_defaults(&self.attributes, fields);
    }

    fn fields_changed(&self, old: &Attributes, new: &Attributes) -> bool {
        self.attributes
            .values()
            .any(|attr| attr.value_changed(old.get(&attr.name), new.get(&attr.name)))
    }

    fn decode_json(
        &self,
        json: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Attributes, TypeError> {
        decode_fields(&self.attributes, json)
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    /// Version of the persisted state layout
    pub version: u32,
    pub attributes: BTreeMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            version: 0,
            attributes: BTreeMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Validate configured attributes
    pub fn validate(&self, attributes: &Attributes) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        for (name, schema) in &self.attributes {
            if schema.is_required() && !attributes.contains_key(name) && schema.default.is_none()
            {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        for (name, value) in attributes {
            match self.attributes.get(name) {
                None => errors.push(TypeError::UnknownAttribute { name: name.clone() }),
                Some(schema) if !schema.is_settable() => {
                    errors.push(TypeError::ComputedAttribute { name: name.clone() })
                }
                Some(schema) => {
                    if let Err(e) = schema.attr_type.validate(value) {
                        errors.push(e.in_attribute(name));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Fill in defaults for omitted attributes, including inside nested blocks
    pub fn apply_defaults(&self, attributes: &mut Attributes) {
        apply_defaults(&self.attributes, attributes);
    }

    /// Whether attribute `name` differs between `old` and `new`
    pub fn attribute_changed(&self, name: &str, old: Option<&Value>, new: Option<&Value>) -> bool {
        match self.attributes.get(name) {
            Some(attr) => attr.value_changed(old, new),
            None => old != new,
        }
    }

    /// Names of settable attributes that differ between prior and desired
    pub fn changed_attributes(&self, prior: &Attributes, desired: &Attributes) -> Vec<String> {
        self.attributes
            .values()
            .filter(|attr| attr.is_settable())
            .filter(|attr| attr.value_changed(prior.get(&attr.name), desired.get(&attr.name)))
            .map(|attr| attr.name.clone())
            .collect()
    }

    /// Subset of `changed` whose change replaces the remote object
    pub fn requires_replacement(&self, changed: &[String]) -> Vec<String> {
        changed
            .iter()
            .filter(|name| self.attributes.get(*name).is_some_and(|a| a.force_new))
            .cloned()
            .collect()
    }

    /// Typed decoding of a JSON object (configuration or persisted state)
    pub fn decode_json(
        &self,
        json: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Attributes, TypeError> {
        decode_fields(&self.attributes, json)
    }

    /// Encode attributes for persistence
    pub fn encode_json(attributes: &Attributes) -> serde_json::Map<String, serde_json::Value> {
        attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

fn check_fields(
    schemas: &BTreeMap<String, AttributeSchema>,
    fields: &Attributes,
    full: bool,
) -> Result<(), TypeError> {
    for (name, schema) in schemas {
        if schema.is_required() && !fields.contains_key(name) && schema.default.is_none() {
            return Err(TypeError::MissingRequired { name: name.clone() });
        }
    }
    for (name, value) in fields {
        let schema = schemas
            .get(name)
            .ok_or_else(|| TypeError::UnknownAttribute { name: name.clone() })?;
        schema
            .attr_type
            .check(value, full)
            .map_err(|e| e.in_attribute(name))?;
    }
    Ok(())
}

fn apply_defaults(schemas: &BTreeMap<String, AttributeSchema>, fields: &mut Attributes) {
    for (name, schema) in schemas {
        if let Some(default) = &schema.default
            && !fields.contains_key(name)
        {
            fields.insert(name.clone(), default.clone());
        }
        if let AttributeType::Block(block) = &schema.attr_type
            && let Some(Value::List(items)) = fields.get_mut(name)
        {
            for item in items.iter_mut() {
                if let Value::Map(inner) = item {
                    block.apply_defaults(inner);
                }
            }
        }
    }
}

fn decode_fields(
    schemas: &BTreeMap<String, AttributeSchema>,
    json: &serde_json::Map<String, serde_json::Value>,
) -> Result<Attributes, TypeError> {
    let mut attributes = Attributes::new();
    for (name, raw) in json {
        let schema = schemas
            .get(name)
            .ok_or_else(|| TypeError::UnknownAttribute { name: name.clone() })?;
        if let Some(value) = schema
            .attr_type
            .from_json(raw)
            .map_err(|e| e.in_attribute(name))?
        {
            attributes.insert(name.clone(), value);
        }
    }
    Ok(attributes)
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: Validator::new(|value| match value {
                Value::Int(n) if *n > 0 => Ok(()),
                Value::Int(_) => Err("Value must be positive".to_string()),
                _ => Err("Expected integer".to_string()),
            }),
        }
    }

    /// Integer within `min..=max`
    pub fn int_between(min: i64, max: i64) -> AttributeType {
        AttributeType::Custom {
            name: format!("Int({}..={})", min, max),
            base: Box::new(AttributeType::Int),
            validate: Validator::new(move |value| match value {
                Value::Int(n) if (min..=max).contains(n) => Ok(()),
                Value::Int(n) => Err(format!(
                    "expected value to be in the range ({} - {}), got {}",
                    min, max, n
                )),
                _ => Err("Expected integer".to_string()),
            }),
        }
    }

    /// String matching `pattern`
    pub fn string_match(pattern: &str, message: &str) -> AttributeType {
        let re = regex::Regex::new(pattern).map_err(|e| e.to_string());
        let message = message.to_string();
        AttributeType::Custom {
            name: "String".to_string(),
            base: Box::new(AttributeType::String),
            validate: Validator::new(move |value| {
                let Value::String(s) = value else {
                    return Err("Expected string".to_string());
                };
                match &re {
                    Ok(re) if re.is_match(s) => Ok(()),
                    Ok(_) => Err(format!("{}, got '{}'", message, s)),
                    Err(e) => Err(format!("invalid pattern: {}", e)),
                }
            }),
        }
    }

    /// Non-empty string
    pub fn non_empty_string() -> AttributeType {
        AttributeType::Custom {
            name: "NonEmptyString".to_string(),
            base: Box::new(AttributeType::String),
            validate: Validator::new(|value| match value {
                Value::String(s) if !s.is_empty() => Ok(()),
                Value::String(_) => Err("Value must not be empty".to_string()),
                _ => Err("Expected string".to_string()),
            }),
        }
    }

    /// CIDR network type, IPv4 or IPv6 (e.g., "10.0.0.0/16", "::/0")
    pub fn cidr() -> AttributeType {
        AttributeType::Custom {
            name: "Cidr".to_string(),
            base: Box::new(AttributeType::String),
            validate: Validator::new(|value| {
                if let Value::String(s) = value {
                    validate_cidr(s)
                } else {
                    Err("Expected string".to_string())
                }
            }),
        }
    }
}

/// Validate CIDR network notation: an address with no host bits set, then a prefix length
pub fn validate_cidr(cidr: &str) -> Result<(), String> {
    let Some((ip, prefix)) = cidr.split_once('/') else {
        return Err(format!(
            "Invalid CIDR format '{}': expected IP/prefix",
            cidr
        ));
    };

    let ip: std::net::IpAddr = ip
        .parse()
        .map_err(|_| format!("Invalid IP address '{}'", ip))?;
    let max = if ip.is_ipv4() { 32 } else { 128 };
    let prefix: u32 = match prefix.parse() {
        Ok(p) if p <= max => p,
        Ok(p) => return Err(format!("Invalid prefix length '{}': must be 0-{}", p, max)),
        Err(_) => {
            return Err(format!(
                "Invalid prefix length '{}': must be a number",
                prefix
            ));
        }
    };

    let host_bits = match ip {
        std::net::IpAddr::V4(v4) => u128::from(u32::from(v4)) & (u128::from(u32::MAX) >> prefix),
        std::net::IpAddr::V6(v6) => u128::from(v6) & u128::MAX.checked_shr(prefix).unwrap_or(0),
    };
    if host_bits != 0 {
        return Err(format!(
            "'{}' is not a network address: host bits are set",
            cidr
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthcheck_block() -> AttributeType {
        AttributeType::Block(Box::new(
            BlockSchema::new()
                .max_items(1)
                .attribute(AttributeSchema::new("port", types::int_between(1, 65535)).required())
                .attribute(
                    AttributeSchema::new("interval", types::int_between(5, 300))
                        .with_default(Value::Int(10)),
                ),
        ))
    }

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = AttributeType::Enum(vec!["a".to_string(), "b".to_string()]);
        assert!(t.validate(&Value::String("a".to_string())).is_ok());
        assert!(t.validate(&Value::String("c".to_string())).is_err());
        assert!(t.check_shape(&Value::String("c".to_string())).is_ok());
    }

    #[test]
    fn validate_positive_int() {
        let t = types::positive_int();
        assert!(t.validate(&Value::Int(1)).is_ok());
        assert!(t.validate(&Value::Int(0)).is_err());
        assert!(t.validate(&Value::Int(-1)).is_err());
    }

    #[test]
    fn validate_int_between() {
        let t = types::int_between(5, 300);
        assert!(t.validate(&Value::Int(5)).is_ok());
        assert!(t.validate(&Value::Int(300)).is_ok());
        assert!(t.validate(&Value::Int(4)).is_err());
        assert!(t.validate(&Value::Int(301)).is_err());
    }

    #[test]
    fn validate_string_match() {
        let t = types::string_match("^(?:tcp|https?)$", "expected tcp, http or https");
        assert!(t.validate(&Value::from("tcp")).is_ok());
        assert!(t.validate(&Value::from("https")).is_ok());
        let err = t.validate(&Value::from("udp")).unwrap_err();
        assert!(err.to_string().contains("udp"));
    }

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::new("resource")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("count", types::positive_int()))
            .attribute(AttributeSchema::new("enabled", AttributeType::Bool));

        let attrs = Attributes::from([
            ("name".to_string(), Value::from("my-resource")),
            ("count".to_string(), Value::Int(5)),
            ("enabled".to_string(), Value::Bool(true)),
        ]);

        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::new("bucket")
            .attribute(AttributeSchema::new("name", AttributeType::String).required());

        let result = schema.validate(&Attributes::new());
        assert_eq!(
            result.unwrap_err(),
            vec![TypeError::MissingRequired {
                name: "name".to_string()
            }]
        );
    }

    #[test]
    fn unknown_and_computed_attributes_are_rejected() {
        let schema = ResourceSchema::new("r")
            .attribute(AttributeSchema::new("ip_address", AttributeType::String).computed());
        let attrs = Attributes::from([
            ("ip_address".to_string(), Value::from("1.2.3.4")),
            ("bogus".to_string(), Value::Int(1)),
        ]);
        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn nested_block_requires_sub_fields() {
        let schema =
            ResourceSchema::new("r").attribute(AttributeSchema::new("hc", healthcheck_block()));
        let attrs = Attributes::from([(
            "hc".to_string(),
            Value::List(vec![Value::Map(Attributes::new())]),
        )]);
        let errors = schema.validate(&attrs).unwrap_err();
        assert!(errors[0].to_string().contains("port"));
    }

    #[test]
    fn nested_block_max_items() {
        let t = healthcheck_block();
        let item = Value::Map(Attributes::from([("port".to_string(), Value::Int(80))]));
        assert!(t.validate(&Value::List(vec![item.clone()])).is_ok());
        assert!(matches!(
            t.validate(&Value::List(vec![item.clone(), item])),
            Err(TypeError::TooManyItems { max: 1, got: 2 })
        ));
    }

    #[test]
    fn defaults_reach_nested_blocks() {
        let schema =
            ResourceSchema::new("r").attribute(AttributeSchema::new("hc", healthcheck_block()));
        let mut attrs = Attributes::from([(
            "hc".to_string(),
            Value::List(vec![Value::Map(Attributes::from([(
                "port".to_string(),
                Value::Int(80),
            )]))]),
        )]);
        schema.apply_defaults(&mut attrs);
        let block = &attrs["hc"].as_list().unwrap()[0];
        assert_eq!(block.as_map().unwrap()["interval"], Value::Int(10));
    }

    #[test]
    fn case_insensitive_attributes_ignore_case() {
        let attr = AttributeSchema::new("name", AttributeType::String)
            .required()
            .case_insensitive();
        assert!(!attr.value_changed(Some(&Value::from("web")), Some(&Value::from("WEB"))));
        assert!(attr.value_changed(Some(&Value::from("web")), Some(&Value::from("db"))));
    }

    #[test]
    fn omitted_computed_attribute_is_not_a_change() {
        let attr = AttributeSchema::new("hc", healthcheck_block()).optional_computed();
        let prior = Value::List(vec![Value::Map(Attributes::new())]);
        assert!(!attr.value_changed(Some(&prior), None));

        let optional = AttributeSchema::new("reverse_dns", AttributeType::String);
        assert!(optional.value_changed(Some(&Value::from("a.example.net")), None));
        assert!(!optional.value_changed(Some(&Value::from("")), None));
    }

    #[test]
    fn changed_attributes_and_replacement() {
        let schema = ResourceSchema::new("r")
            .attribute(AttributeSchema::new("name", AttributeType::String).force_new())
            .attribute(AttributeSchema::new("description", AttributeType::String));
        let prior = Attributes::from([
            ("name".to_string(), Value::from("a")),
            ("description".to_string(), Value::from("x")),
        ]);
        let desired = Attributes::from([
            ("name".to_string(), Value::from("b")),
            ("description".to_string(), Value::from("y")),
        ]);
        let changed = schema.changed_attributes(&prior, &desired);
        assert_eq!(changed, vec!["description".to_string(), "name".to_string()]);
        assert_eq!(schema.requires_replacement(&changed), vec!["name".to_string()]);
    }

    #[test]
    fn decode_json_builds_sets_and_blocks() {
        let schema = ResourceSchema::new("r")
            .attribute(AttributeSchema::new(
                "sources",
                AttributeType::Set(Box::new(types::cidr())),
            ))
            .attribute(AttributeSchema::new("hc", healthcheck_block()));
        let json = serde_json::json!({
            "sources": ["10.0.0.0/8", "10.0.0.0/8"],
            "hc": {"port": 80},
        });
        let attrs = schema.decode_json(json.as_object().unwrap()).unwrap();
        assert_eq!(attrs["sources"], Value::string_set(["10.0.0.0/8"]));
        assert!(matches!(&attrs["hc"], Value::List(items) if items.len() == 1));

        let bad = serde_json::json!({"sources": "10.0.0.0/8"});
        assert!(schema.decode_json(bad.as_object().unwrap()).is_err());
    }

    #[test]
    fn validate_cidr_type() {
        let t = types::cidr();

        assert!(t.validate(&Value::from("10.0.0.0/16")).is_ok());
        assert!(t.validate(&Value::from("192.168.1.0/24")).is_ok());
        assert!(t.validate(&Value::from("0.0.0.0/0")).is_ok());
        assert!(t.validate(&Value::from("255.255.255.255/32")).is_ok());
        assert!(t.validate(&Value::from("::/0")).is_ok());
        assert!(t.validate(&Value::from("2001:db8::/32")).is_ok());

        assert!(t.validate(&Value::from("10.0.0.0")).is_err()); // no prefix
        assert!(t.validate(&Value::from("10.0.0.0/33")).is_err()); // prefix too large
        assert!(t.validate(&Value::from("10.0.0.256/16")).is_err()); // octet > 255
        assert!(t.validate(&Value::from("10.0.0.1/24")).is_err()); // host bits
        assert!(t.validate(&Value::from("2001:db8::1/32")).is_err());
        assert!(t.validate(&Value::from("invalid")).is_err());
        assert!(t.validate(&Value::Int(42)).is_err()); // wrong type
    }
}
