//! Resource - Representing resources, their state, and the per-invocation state container

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use crate::schema::{ResourceSchema, TypeError};
use crate::timeouts::{Phase, Timeouts};

/// Attribute name -> value mapping
pub type Attributes = BTreeMap<String, Value>;

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    /// Resource type (e.g., "exoscale_elastic_ip")
    pub resource_type: String,
    /// Resource name (logical name given in configuration)
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
///
/// Containers are ordered so that state files and plans are deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    /// Ordered list; nested blocks are stored as a list of maps
    List(Vec<Value>),
    Set(BTreeSet<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String",
            Value::Int(_) => "Int",
            Value::Bool(_) => "Bool",
            Value::List(_) => "List",
            Value::Set(_) => "Set",
            Value::Map(_) => "Map",
        }
        .to_string()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<Value>> {
        match self {
            Value::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Whether this value is the zero value of its type
    pub fn is_zero(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::Int(n) => *n == 0,
            Value::Bool(b) => !b,
            Value::List(items) => items.is_empty(),
            Value::Set(items) => items.is_empty(),
            Value::Map(map) => map.is_empty(),
        }
    }

    /// Build a set of strings
    pub fn string_set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::Set(items.into_iter().map(|s| Value::String(s.into())).collect())
    }

    /// Build a map of strings
    pub fn string_map<I, K, V>(items: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Value::Map(
            items
                .into_iter()
                .map(|(k, v)| (k.into(), Value::String(v.into())))
                .collect(),
        )
    }

    /// Convert to JSON for persistence
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(n) => serde_json::Value::Number((*n).into()),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Set(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Schema-less conversion from JSON. Arrays become lists and `null` is dropped.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        match json {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(Value::Int),
            serde_json::Value::Array(items) => {
                Some(Value::List(items.iter().filter_map(Value::from_json).collect()))
            }
            serde_json::Value::Object(map) => Some(Value::Map(
                map.iter()
                    .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Desired state declared in configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: Attributes,
    /// Per-phase deadlines, already resolved against the provider default
    pub timeouts: Timeouts,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: Attributes::new(),
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// Current state as last observed on the remote side
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Provider-assigned identifier (e.g., an elastic IP UUID)
    pub identifier: Option<String>,
    pub attributes: Attributes,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: Attributes::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: Attributes) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}

/// State container handed to an adapter for the duration of one lifecycle call.
///
/// `prior` is the last persisted state, `desired` comes from configuration and
/// `observed` is what the adapter writes back. Reads fall through
/// desired -> observed -> prior.
#[derive(Debug, Clone)]
pub struct ResourceData {
    schema: Arc<ResourceSchema>,
    id: Option<String>,
    prior: Attributes,
    desired: Attributes,
    observed: Attributes,
    timeouts: Timeouts,
}

impl ResourceData {
    pub fn new(schema: Arc<ResourceSchema>) -> Self {
        Self {
            schema,
            id: None,
            prior: Attributes::new(),
            desired: Attributes::new(),
            observed: Attributes::new(),
            timeouts: Timeouts::default(),
        }
    }

    /// Container for creating `resource`
    pub fn for_create(schema: Arc<ResourceSchema>, resource: &Resource) -> Self {
        Self::new(schema)
            .with_desired(resource.attributes.clone())
            .with_timeouts(resource.timeouts)
    }

    /// Container for refreshing or deleting a tracked object
    pub fn for_state(schema: Arc<ResourceSchema>, state: &State, timeouts: Timeouts) -> Self {
        let mut data = Self::new(schema)
            .with_prior(state.attributes.clone())
            .with_timeouts(timeouts);
        data.id = state.identifier.clone();
        data
    }

    /// Container for updating a tracked object towards `resource`
    pub fn for_update(schema: Arc<ResourceSchema>, state: &State, resource: &Resource) -> Self {
        Self::for_state(schema, state, resource.timeouts).with_desired(resource.attributes.clone())
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Seed the last known state; it is also the starting point of the observed state
    pub fn with_prior(mut self, attributes: Attributes) -> Self {
        self.observed = attributes.clone();
        self.prior = attributes;
        self
    }

    /// Set the configured attributes, filling in schema defaults
    pub fn with_desired(mut self, mut attributes: Attributes) -> Self {
        self.schema.apply_defaults(&mut attributes);
        self.desired = attributes;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    pub fn resource_type(&self) -> &str {
        &self.schema.resource_type
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Drop the identifier and everything observed: the remote object is gone
    pub fn clear_id(&mut self) {
        self.id = None;
        self.observed.clear();
    }

    /// `<type> (ID = <id>)`, used as the log key for lifecycle messages
    pub fn id_string(&self) -> String {
        format!(
            "{} (ID = {})",
            self.resource_type(),
            self.id.as_deref().unwrap_or("")
        )
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.desired
            .get(name)
            .or_else(|| self.observed.get(name))
            .or_else(|| self.prior.get(name))
    }

    /// String attribute, or "" when unset
    pub fn get_string(&self, name: &str) -> String {
        self.get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// (last known, desired) values of an attribute
    pub fn get_change(&self, name: &str) -> (Option<&Value>, Option<&Value>) {
        let new = if self.desired.is_empty() {
            self.prior.get(name)
        } else {
            self.desired.get(name)
        };
        (self.prior.get(name), new)
    }

    pub fn has_change(&self, name: &str) -> bool {
        if self.desired.is_empty() {
            return false;
        }
        let (old, new) = self.get_change(name);
        self.schema.attribute_changed(name, old, new)
    }

    /// Record an observed value, type checked against the schema
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), TypeError> {
        let value = value.into();
        let attr = self
            .schema
            .attributes
            .get(name)
            .ok_or_else(|| TypeError::UnknownAttribute {
                name: name.to_string(),
            })?;
        attr.attr_type
            .check_shape(&value)
            .map_err(|e| e.in_attribute(name))?;
        self.observed.insert(name.to_string(), value);
        Ok(())
    }

    /// Remove an observed value
    pub fn unset(&mut self, name: &str) {
        self.observed.remove(name);
    }

    pub fn timeout(&self, phase: Phase) -> Duration {
        self.timeouts.get(phase)
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn observed(&self) -> &Attributes {
        &self.observed
    }

    pub fn desired(&self) -> &Attributes {
        &self.desired
    }

    /// Decode the current view (desired over observed over prior) into a typed struct
    pub fn decode<T: FromAttributes>(&self) -> Result<T, TypeError> {
        let mut merged = self.prior.clone();
        merged.extend(self.observed.clone());
        merged.extend(self.desired.clone());
        T::from_attributes(&Fields::new(&merged))
    }

    /// Decode the last known state into a typed struct
    pub fn decode_prior<T: FromAttributes>(&self) -> Result<T, TypeError> {
        T::from_attributes(&Fields::new(&self.prior))
    }

    /// Decode the configured attributes alone; omitted optional values stay unset
    pub fn decode_desired<T: FromAttributes>(&self) -> Result<T, TypeError> {
        T::from_attributes(&Fields::new(&self.desired))
    }

    /// State record of an object whose create stopped after the identifier was
    /// set. Configured values fill in whatever was not observed, so the next
    /// refresh can address the object (e.g., find its zone).
    pub fn into_partial_state(mut self, id: ResourceId) -> State {
        for (name, value) in &self.desired {
            if self.schema.attributes.get(name).is_some_and(|a| a.is_settable()) {
                self.observed
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        self.into_state(id)
    }

    /// Turn the container into the host-side state record
    pub fn into_state(self, id: ResourceId) -> State {
        match self.id {
            Some(identifier) => State::existing(id, self.observed).with_identifier(identifier),
            None => State::not_found(id),
        }
    }
}

/// Decoding of a typed configuration struct out of an attribute map
pub trait FromAttributes: Sized {
    fn from_attributes(fields: &Fields<'_>) -> Result<Self, TypeError>;
}

/// Typed accessors over an attribute map. Type mismatches are decode errors.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    attributes: &'a Attributes,
}

impl<'a> Fields<'a> {
    pub fn new(attributes: &'a Attributes) -> Self {
        Self { attributes }
    }

    fn mismatch(name: &str, expected: &str, got: &Value) -> TypeError {
        TypeError::TypeMismatch {
            expected: expected.to_string(),
            got: got.type_name(),
        }
        .in_attribute(name)
    }

    pub fn string(&self, name: &str) -> Result<Option<String>, TypeError> {
        match self.attributes.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(Self::mismatch(name, "String", other)),
        }
    }

    /// String attribute where "" means unset
    pub fn non_empty_string(&self, name: &str) -> Result<Option<String>, TypeError> {
        Ok(self.string(name)?.filter(|s| !s.is_empty()))
    }

    pub fn required_string(&self, name: &str) -> Result<String, TypeError> {
        self.string(name)?
            .ok_or_else(|| TypeError::MissingRequired {
                name: name.to_string(),
            })
    }

    pub fn int(&self, name: &str) -> Result<Option<i64>, TypeError> {
        match self.attributes.get(name) {
            None => Ok(None),
            Some(Value::Int(n)) => Ok(Some(*n)),
            Some(other) => Err(Self::mismatch(name, "Int", other)),
        }
    }

    pub fn required_int(&self, name: &str) -> Result<i64, TypeError> {
        self.int(name)?.ok_or_else(|| TypeError::MissingRequired {
            name: name.to_string(),
        })
    }

    pub fn bool(&self, name: &str) -> Result<Option<bool>, TypeError> {
        match self.attributes.get(name) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(Self::mismatch(name, "Bool", other)),
        }
    }

    pub fn string_set(&self, name: &str) -> Result<BTreeSet<String>, TypeError> {
        let items = match self.attributes.get(name) {
            None => return Ok(BTreeSet::new()),
            Some(Value::Set(items)) => items.iter().collect::<Vec<_>>(),
            Some(Value::List(items)) => items.iter().collect::<Vec<_>>(),
            Some(other) => return Err(Self::mismatch(name, "Set<String>", other)),
        };
        items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.clone()),
                other => Err(Self::mismatch(name, "String", other)),
            })
            .collect()
    }

    pub fn string_map(&self, name: &str) -> Result<Option<BTreeMap<String, String>>, TypeError> {
        match self.attributes.get(name) {
            None => Ok(None),
            Some(Value::Map(map)) => map
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => Ok((k.clone(), s.clone())),
                    other => Err(Self::mismatch(name, "String", other)),
                })
                .collect::<Result<_, _>>()
                .map(Some),
            Some(other) => Err(Self::mismatch(name, "Map<String>", other)),
        }
    }

    /// Single nested block (a list holding at most one map)
    pub fn block(&self, name: &str) -> Result<Option<Fields<'a>>, TypeError> {
        match self.attributes.get(name) {
            None => Ok(None),
            Some(Value::List(items)) => match items.as_slice() {
                [] => Ok(None),
                [Value::Map(inner)] => Ok(Some(Fields::new(inner))),
                [other] => Err(Self::mismatch(name, "Block", other)),
                _ => Err(TypeError::TooManyItems {
                    max: 1,
                    got: items.len(),
                }
                .in_attribute(name)),
            },
            Some(Value::Map(inner)) => Ok(Some(Fields::new(inner))),
            Some(other) => Err(Self::mismatch(name, "Block", other)),
        }
    }
}
