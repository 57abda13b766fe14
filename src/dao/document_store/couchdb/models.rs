use serde::Deserialize;
use serde_json::{Map, Value};

pub const PATH_SEPARATOR: &str = "::";
pub const ID_FIELD: &str = "_id";
pub const REV_FIELD: &str = "_rev";

/// Map a slash-separated document path to a CouchDB document id.
pub fn doc_id(path: &str) -> String {
    path.trim_matches('/').replace('/', PATH_SEPARATOR)
}

/// Remove CouchDB bookkeeping fields, returning the revision if present.
pub fn strip_meta(document: &mut Map<String, Value>) -> Option<String> {
    document.remove(ID_FIELD);
    document
        .remove(REV_FIELD)
        .and_then(|rev| rev.as_str().map(str::to_owned))
}

#[derive(Debug, Deserialize)]
pub struct ChangesResponse {
    #[serde(default)]
    pub results: Vec<ChangeRow>,
    pub last_seq: Value,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRow {
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Render a `last_seq` value for the next `since` query parameter.
///
/// CouchDB 1.x returns integers, later versions opaque strings.
pub fn seq_param(seq: &Value) -> String {
    match seq {
        Value::String(value) => value.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn paths_map_to_flat_ids() {
        assert_eq!(doc_id("users/u1"), "users::u1");
        assert_eq!(doc_id("users/u1/gameState/state"), "users::u1::gameState::state");
    }

    #[test]
    fn meta_fields_are_stripped() {
        let mut doc = json!({"_id": "users::u1", "_rev": "2-abc", "a": 1})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(strip_meta(&mut doc).as_deref(), Some("2-abc"));
        assert_eq!(Value::Object(doc), json!({"a": 1}));
    }

    #[test]
    fn seq_param_handles_both_formats() {
        assert_eq!(seq_param(&json!(42)), "42");
        assert_eq!(seq_param(&json!("7-g1AAAA")), "7-g1AAAA");
    }
}
