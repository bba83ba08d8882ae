use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Previous-hash value of the genesis block
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Single block in the audit chain. Immutable after creation; the hash covers
/// every field except `current_hash` itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditBlock {
    pub index: u64,
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub session_id: String,
    pub actor: String,
    pub action: String,
    pub resource: Option<String>,
    pub data: Map<String, Value>,
    pub previous_hash: String,
    pub current_hash: String,
}

impl AuditBlock {
    /// SHA-256 over the canonical serialization of all fields except
    /// `current_hash` (stable key order, compact form).
    pub fn compute_hash(&self) -> String {
        let mut content = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // Struct serialization always yields an object
            _ => Map::new(),
        };
        content.remove("current_hash");
        let canonical = canonical_json(&Value::Object(content));

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Recompute the hash from stored fields and compare
    pub fn verify(&self) -> bool {
        self.current_hash == self.compute_hash()
    }
}

/// Canonicalize by sorting keys recursively and emitting compact JSON.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&sort_keys(value)).unwrap_or_default()
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[&key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Builder for the loose data map handed to [`AuditChain::add`].
///
/// Keeps call sites readable without the chain exposing block construction.
#[derive(Debug, Default, Clone)]
pub struct BlockData(Map<String, Value>);

impl BlockData {
    pub fn new(event_type: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("event_type".to_string(), Value::String(event_type.into()));
        Self(map)
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.0
            .insert("session_id".to_string(), Value::String(session_id.into()));
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.0.insert("actor".to_string(), Value::String(actor.into()));
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.0
            .insert("action".to_string(), Value::String(action.into()));
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.0
            .insert("resource".to_string(), Value::String(resource.into()));
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<BlockData> for Map<String, Value> {
    fn from(data: BlockData) -> Self {
        data.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block() -> AuditBlock {
        let mut block = AuditBlock {
            index: 1,
            event_id: "evt_1".to_string(),
            timestamp: Utc::now(),
            event_type: "state_transition".to_string(),
            session_id: "sess_1".to_string(),
            actor: "system".to_string(),
            action: "transition".to_string(),
            resource: None,
            data: Map::new(),
            previous_hash: GENESIS_HASH.to_string(),
            current_hash: String::new(),
        };
        block.current_hash = block.compute_hash();
        block
    }

    #[test]
    fn test_hash_is_stable() {
        let b = block();
        assert_eq!(b.compute_hash(), b.compute_hash());
        assert!(b.verify());
        assert_eq!(b.current_hash.len(), 64);
    }

    #[test]
    fn test_hash_changes_with_content() {
        let mut b = block();
        let original = b.current_hash.clone();
        b.data.insert("extra".to_string(), json!("tampered"));
        assert_ne!(b.compute_hash(), original);
        assert!(!b.verify());
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({"b": {"z": 1, "a": 2}, "a": [{"y": 1, "x": 2}]});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":[{"x":2,"y":1}],"b":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn test_block_data_builder() {
        let map = BlockData::new("agent_completed")
            .session("sess_1")
            .actor("coordinator")
            .action("analysis_complete")
            .resource("portfolio_a")
            .field("scenarios_generated", 3)
            .into_map();
        assert_eq!(map["event_type"], "agent_completed");
        assert_eq!(map["scenarios_generated"], 3);
    }
}
