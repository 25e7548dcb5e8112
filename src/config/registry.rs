use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::validate_protocol;
use crate::errors::ValidationError;
use crate::protocol::Protocol;

/// Store of validated protocol definitions keyed by protocol id.
///
/// Definitions are held as `Arc<Protocol>` and replaced wholesale on reload, so a
/// reader that grabbed a definition keeps a consistent snapshot even if a newer
/// version is loaded while it runs. Loads are rare next to reads, so a single
/// table-wide `RwLock` is enough.
///
/// # Example
/// ```
/// use tactical_protocols::config::ProtocolRegistry;
/// use tactical_protocols::protocol::{Protocol, Step};
///
/// let registry = ProtocolRegistry::new();
/// registry.load(Protocol::new("p", "P", vec![Step::new("a", "noop")])).unwrap();
///
/// assert_eq!(registry.get("p").map(|p| p.name.clone()), Some("P".to_string()));
/// assert!(registry.get("missing").is_none());
/// ```
#[derive(Debug, Default)]
pub struct ProtocolRegistry {
    protocols: RwLock<HashMap<String, Arc<Protocol>>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `protocol` and store it, replacing any definition with the same id.
    ///
    /// Returns the definition that was replaced. On a validation error the
    /// registry is left untouched.
    pub fn load(&self, protocol: Protocol) -> Result<Option<Arc<Protocol>>, ValidationError> {
        validate_protocol(&protocol)?;

        let mut guard = self
            .protocols
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(guard.insert(protocol.id.clone(), Arc::new(protocol)))
    }

    pub fn get(&self, id: &str) -> Option<Arc<Protocol>> {
        self.protocols
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.protocols
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Registered protocol ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .protocols
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.protocols
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
