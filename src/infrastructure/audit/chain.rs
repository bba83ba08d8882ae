use crate::domain::errors::ChainError;
use crate::infrastructure::audit::block::{AuditBlock, GENESIS_HASH};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const CHAIN_FILE_VERSION: &str = "1.0";

/// Persisted chain file layout
#[derive(Debug, Serialize, Deserialize)]
struct ChainFile {
    version: String,
    block_count: usize,
    root_hash: String,
    blocks: Vec<AuditBlock>,
}

/// Append-only hash-linked block log.
///
/// Every block's `previous_hash` is the prior block's `current_hash`; the
/// genesis block links to a fixed all-zero hash. Tampering with any stored
/// field is detectable via [`AuditChain::verify_integrity`].
#[derive(Debug)]
pub struct AuditChain {
    blocks: Vec<AuditBlock>,
    persistence_path: Option<PathBuf>,
    auto_persist: bool,
}

impl AuditChain {
    /// In-memory chain with a deterministic genesis block
    pub fn new() -> Self {
        let mut chain = Self {
            blocks: Vec::new(),
            persistence_path: None,
            auto_persist: false,
        };
        chain.blocks.push(Self::genesis_block());
        chain
    }

    /// Chain persisted to `path`. Loads and verifies an existing file, or
    /// starts a fresh chain when the file is absent or empty.
    pub fn with_persistence(
        path: impl Into<PathBuf>,
        auto_persist: bool,
    ) -> Result<Self, ChainError> {
        let path = path.into();
        let mut chain = if path.exists() && fs::metadata(&path)?.len() > 0 {
            Self::load(&path)?
        } else {
            Self::new()
        };
        chain.persistence_path = Some(path);
        chain.auto_persist = auto_persist;
        Ok(chain)
    }

    /// Load a persisted chain, refusing to return one that fails verification.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let content = fs::read_to_string(path.as_ref())?;
        let file: ChainFile = serde_json::from_str(&content)?;

        let chain = Self {
            blocks: file.blocks,
            persistence_path: None,
            auto_persist: false,
        };

        if let Some(index) = chain.first_invalid_block() {
            return Err(ChainError::IntegrityFailure {
                index,
                reason: "persisted chain failed verification; refusing to load".to_string(),
            });
        }
        Ok(chain)
    }

    fn genesis_block() -> AuditBlock {
        let mut data = Map::new();
        data.insert(
            "version".to_string(),
            Value::String(CHAIN_FILE_VERSION.to_string()),
        );
        let mut genesis = AuditBlock {
            index: 0,
            event_id: "genesis".to_string(),
            timestamp: Utc::now(),
            event_type: "system_initialized".to_string(),
            session_id: "system".to_string(),
            actor: "system".to_string(),
            action: "chain_initialized".to_string(),
            resource: None,
            data,
            previous_hash: GENESIS_HASH.to_string(),
            current_hash: String::new(),
        };
        genesis.current_hash = genesis.compute_hash();
        genesis
    }

    /// Append a block built from the given data map.
    ///
    /// `event_type` is required; `session_id`, `actor` and `action` default
    /// to "unknown"; `resource` is optional; remaining keys become the
    /// block's data payload. Returns the new block's hash.
    pub fn add(&mut self, mut data: Map<String, Value>) -> Result<String, ChainError> {
        let event_type = match data.remove("event_type") {
            Some(Value::String(s)) if !s.is_empty() => s,
            _ => return Err(ChainError::MissingEventType),
        };
        let session_id = take_string(&mut data, "session_id").unwrap_or_else(|| "unknown".into());
        let actor = take_string(&mut data, "actor").unwrap_or_else(|| "unknown".into());
        let action = take_string(&mut data, "action").unwrap_or_else(|| "unknown".into());
        let resource = take_string(&mut data, "resource");

        let previous_hash = self.root_hash();
        let mut block = AuditBlock {
            index: self.blocks.len() as u64,
            event_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            session_id,
            actor,
            action,
            resource,
            data,
            previous_hash,
            current_hash: String::new(),
        };
        block.current_hash = block.compute_hash();

        let hash = block.current_hash.clone();
        self.blocks.push(block);

        if self.auto_persist {
            self.persist()?;
        }

        Ok(hash)
    }

    /// Verify every block's hash and the chain linkage.
    ///
    /// An empty chain fails verification; the genesis block must carry the
    /// all-zero previous hash.
    pub fn verify_integrity(&self) -> bool {
        self.first_invalid_block().is_none() && !self.blocks.is_empty()
    }

    fn first_invalid_block(&self) -> Option<usize> {
        if self.blocks.is_empty() {
            return Some(0);
        }
        if self.blocks[0].previous_hash != GENESIS_HASH {
            return Some(0);
        }
        for (i, block) in self.blocks.iter().enumerate() {
            if !block.verify() {
                return Some(i);
            }
            if i > 0 && block.previous_hash != self.blocks[i - 1].current_hash {
                return Some(i);
            }
        }
        None
    }

    /// Hash of the most recent block
    pub fn root_hash(&self) -> String {
        self.blocks
            .last()
            .map(|b| b.current_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string())
    }

    pub fn block(&self, index: usize) -> Option<&AuditBlock> {
        self.blocks.get(index)
    }

    pub fn block_by_hash(&self, hash: &str) -> Option<&AuditBlock> {
        self.blocks.iter().find(|b| b.current_hash == hash)
    }

    pub fn blocks_by_session(&self, session_id: &str) -> Vec<&AuditBlock> {
        self.blocks
            .iter()
            .filter(|b| b.session_id == session_id)
            .collect()
    }

    pub fn blocks_by_event_type(&self, event_type: &str) -> Vec<&AuditBlock> {
        self.blocks
            .iter()
            .filter(|b| b.event_type == event_type)
            .collect()
    }

    pub fn blocks_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&AuditBlock> {
        self.blocks
            .iter()
            .filter(|b| b.timestamp >= start && b.timestamp <= end)
            .collect()
    }

    /// Ordered export of the full chain
    pub fn export(&self) -> Vec<AuditBlock> {
        self.blocks.clone()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Write the whole chain to the configured path
    pub fn persist(&self) -> Result<(), ChainError> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = ChainFile {
            version: CHAIN_FILE_VERSION.to_string(),
            block_count: self.blocks.len(),
            root_hash: self.root_hash(),
            blocks: self.blocks.clone(),
        };
        fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn tamper_block(&mut self, index: usize, key: &str, value: Value) {
        if let Some(block) = self.blocks.get_mut(index) {
            block.data.insert(key.to_string(), value);
        }
    }
}

impl Default for AuditChain {
    fn default() -> Self {
        Self::new()
    }
}

fn take_string(data: &mut Map<String, Value>, key: &str) -> Option<String> {
    match data.remove(key) {
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
        None => None,
    }
}

/// Cloneable single-writer handle to the chain.
///
/// All writes go through this lock; components hold the handle, never the
/// chain itself.
#[derive(Debug, Clone)]
pub struct SharedChain {
    inner: Arc<Mutex<AuditChain>>,
}

impl SharedChain {
    pub fn new(chain: AuditChain) -> Self {
        Self {
            inner: Arc::new(Mutex::new(chain)),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(AuditChain::new())
    }

    /// Append a block; see [`AuditChain::add`]
    pub fn append(&self, data: impl Into<Map<String, Value>>) -> Result<String, ChainError> {
        self.lock().add(data.into())
    }

    pub fn root_hash(&self) -> String {
        self.lock().root_hash()
    }

    pub fn verify_integrity(&self) -> bool {
        self.lock().verify_integrity()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run a closure against the locked chain, for queries and exports
    pub fn with_chain<R>(&self, f: impl FnOnce(&AuditChain) -> R) -> R {
        f(&self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AuditChain> {
        // A poisoned lock only means a writer panicked mid-append; the chain
        // itself is still consistent because blocks are pushed atomically.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::audit::block::BlockData;
    use serde_json::json;

    #[test]
    fn test_genesis_block_shape() {
        let chain = AuditChain::new();
        assert_eq!(chain.len(), 1);

        let genesis = chain.block(0).unwrap();
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.event_type, "system_initialized");
        assert_eq!(genesis.previous_hash, GENESIS_HASH);
        assert!(chain.verify_integrity());
    }

    #[test]
    fn test_add_links_blocks() {
        let mut chain = AuditChain::new();
        for i in 0..5 {
            chain
                .add(
                    BlockData::new("state_transition")
                        .session("sess_1")
                        .actor("system")
                        .action("transition")
                        .field("step", i)
                        .into_map(),
                )
                .unwrap();
        }

        assert_eq!(chain.len(), 6);
        assert!(chain.verify_integrity());
        for i in 1..chain.len() {
            assert_eq!(
                chain.block(i).unwrap().previous_hash,
                chain.block(i - 1).unwrap().current_hash
            );
        }
        assert_eq!(chain.root_hash(), chain.block(5).unwrap().current_hash);
    }

    #[test]
    fn test_add_requires_event_type() {
        let mut chain = AuditChain::new();
        let err = chain.add(Map::new()).unwrap_err();
        assert!(matches!(err, ChainError::MissingEventType));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_add_defaults_unknown_fields() {
        let mut chain = AuditChain::new();
        let mut data = Map::new();
        data.insert("event_type".to_string(), json!("webhook"));
        data.insert("payload_kind".to_string(), json!("price_alert"));
        chain.add(data).unwrap();

        let block = chain.block(1).unwrap();
        assert_eq!(block.session_id, "unknown");
        assert_eq!(block.actor, "unknown");
        assert_eq!(block.action, "unknown");
        assert_eq!(block.data["payload_kind"], "price_alert");
    }

    #[test]
    fn test_tamper_detection() {
        let mut chain = AuditChain::new();
        for i in 0..3 {
            chain
                .add(
                    BlockData::new("agent_completed")
                        .session("sess_1")
                        .field("run", i)
                        .into_map(),
                )
                .unwrap();
        }
        assert!(chain.verify_integrity());

        chain.tamper_block(1, "run", json!(99));
        assert!(!chain.verify_integrity());
    }

    #[test]
    fn test_query_filters() {
        let mut chain = AuditChain::new();
        chain
            .add(BlockData::new("session_created").session("sess_a").into_map())
            .unwrap();
        chain
            .add(BlockData::new("permission_denied").session("sess_b").into_map())
            .unwrap();
        chain
            .add(BlockData::new("session_created").session("sess_b").into_map())
            .unwrap();

        assert_eq!(chain.blocks_by_session("sess_b").len(), 2);
        assert_eq!(chain.blocks_by_event_type("session_created").len(), 2);
        assert_eq!(chain.blocks_by_event_type("agent_completed").len(), 0);
    }

    #[test]
    fn test_persist_and_load_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "vigil_chain_test_{}_{}.json",
            std::process::id(),
            Uuid::new_v4().simple()
        ));

        let hashes: Vec<String> = {
            let mut chain = AuditChain::with_persistence(&path, true).unwrap();
            (0..4)
                .map(|i| {
                    chain
                        .add(
                            BlockData::new("state_transition")
                                .session("sess_1")
                                .field("step", i)
                                .into_map(),
                        )
                        .unwrap()
                })
                .collect()
        };

        let loaded = AuditChain::load(&path).unwrap();
        assert_eq!(loaded.len(), 5);
        assert!(loaded.verify_integrity());
        // Hashes survive the round trip unchanged
        for (i, hash) in hashes.iter().enumerate() {
            assert_eq!(&loaded.block(i + 1).unwrap().current_hash, hash);
        }

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_rejects_tampered_file() {
        let path = std::env::temp_dir().join(format!(
            "vigil_chain_tampered_{}_{}.json",
            std::process::id(),
            Uuid::new_v4().simple()
        ));

        {
            let mut chain = AuditChain::with_persistence(&path, true).unwrap();
            for i in 0..3 {
                chain
                    .add(
                        BlockData::new("agent_completed")
                            .session("sess_1")
                            .field("run", i)
                            .into_map(),
                    )
                    .unwrap();
            }
        }

        // Flip a stored field without recomputing hashes
        let content = fs::read_to_string(&path).unwrap();
        let mut file: Value = serde_json::from_str(&content).unwrap();
        file["blocks"][2]["data"]["run"] = json!(42);
        fs::write(&path, serde_json::to_string_pretty(&file).unwrap()).unwrap();

        let err = AuditChain::load(&path).unwrap_err();
        assert!(matches!(err, ChainError::IntegrityFailure { .. }));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_shared_chain_serializes_writers() {
        let shared = SharedChain::in_memory();
        let mut handles = Vec::new();
        for i in 0..8 {
            let chain = shared.clone();
            handles.push(std::thread::spawn(move || {
                chain
                    .append(
                        BlockData::new("state_transition")
                            .session(format!("sess_{i}"))
                            .into_map(),
                    )
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(shared.len(), 9);
        assert!(shared.verify_integrity());
    }
}
