use std::collections::HashMap;

/// Resolves key names to key material.
///
/// Security context parameters never carry long-term key bytes directly; the
/// `key_name` parameter holds a name that is resolved through this store at
/// the moment the key is needed. Key stores are long-lived relative to any
/// single security-block processing episode and may be shared between
/// bundle-processing threads.
pub trait KeyStore: Sync {
    /// Fetch the raw key bytes registered under `name`.
    fn key_get(&self, name: &str) -> Option<Vec<u8>>;
}

/// Simple in-memory key store.
#[derive(Debug, Clone, Default)]
pub struct MemKeyStore {
    keys: HashMap<String, Vec<u8>>,
}

impl MemKeyStore {
    pub fn new() -> MemKeyStore {
        Default::default()
    }
    pub fn insert(&mut self, name: &str, key: Vec<u8>) {
        self.keys.insert(name.to_owned(), key);
    }
}

impl KeyStore for MemKeyStore {
    fn key_get(&self, name: &str) -> Option<Vec<u8>> {
        self.keys.get(name).cloned()
    }
}
