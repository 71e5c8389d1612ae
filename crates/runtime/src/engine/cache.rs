//! Response memoization keyed by the exact `(messages, options)` pair.

use crate::model::{ChatOptions, EngineResponse, Message};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Serialize)]
struct CacheKey<'a> {
    messages: &'a [Message],
    options: &'a ChatOptions,
}

/// Process-lifetime cache of parsed responses. Entries never expire.
///
/// Lookups and inserts take the lock briefly; nothing holds it across a
/// provider call, so two racing misses on one key both call the provider and
/// the last insert wins.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: RwLock<HashMap<String, EngineResponse>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable serialization of a request.
    pub fn key(messages: &[Message], options: &ChatOptions) -> String {
        serde_json::to_string(&CacheKey { messages, options }).unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<EngineResponse> {
        self.entries.read().get(key).cloned()
    }

    pub fn insert(&self, key: String, response: EngineResponse) {
        self.entries.write().insert(key, response);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
