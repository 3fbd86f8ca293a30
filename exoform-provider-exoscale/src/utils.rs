//! Utility functions for import ids and attribute conversion

use std::collections::BTreeMap;

use exoform_core::provider::{ProviderError, ProviderResult};
use exoform_core::resource::{ResourceData, Value};

/// Split an import id into an optional zone and the object id or name.
///
/// Accepts `id`, `id@zone` and `zone:id`.
pub fn parse_import_id(import_id: &str) -> ProviderResult<(Option<&str>, &str)> {
    let (zone, id) = if let Some((id, zone)) = import_id.rsplit_once('@') {
        (Some(zone), id)
    } else if let Some((zone, id)) = import_id.split_once(':') {
        (Some(zone), id)
    } else {
        (None, import_id)
    };

    if id.is_empty() || zone.is_some_and(str::is_empty) {
        return Err(ProviderError::validation(format!(
            "invalid import id '{}': expected ID, ID@ZONE or ZONE:ID",
            import_id
        )));
    }
    Ok((zone, id))
}

/// Identifier of the tracked object, or an error when there is none
pub fn require_id(data: &ResourceData) -> ProviderResult<String> {
    data.id()
        .map(str::to_string)
        .ok_or_else(|| ProviderError::validation(format!("{}: no identifier", data.resource_type())))
}

/// Single nested block value: a list holding one map
pub fn block<const N: usize>(fields: [(&str, Option<Value>); N]) -> Value {
    Value::List(vec![Value::Map(
        fields
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k.to_string(), v)))
            .collect(),
    )])
}

pub fn labels_value(labels: Option<&BTreeMap<String, String>>) -> Value {
    Value::string_map(labels.into_iter().flatten().map(|(k, v)| (k.clone(), v.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_import_id() {
        assert_eq!(parse_import_id("e-1").unwrap(), (None, "e-1"));
        assert_eq!(parse_import_id("e-1@de-fra-1").unwrap(), (Some("de-fra-1"), "e-1"));
        assert_eq!(parse_import_id("de-fra-1:e-1").unwrap(), (Some("de-fra-1"), "e-1"));
        assert!(parse_import_id("").is_err());
        assert!(parse_import_id("e-1@").is_err());
        assert!(parse_import_id(":e-1").is_err());
    }

    #[test]
    fn test_block_skips_absent_fields() {
        let value = block([("port", Some(Value::Int(80))), ("uri", None)]);
        let items = value.as_list().unwrap();
        let map = items[0].as_map().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["port"], Value::Int(80));
    }
}
