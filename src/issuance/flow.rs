use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use acme_lib::{
    Error as AcmeError,
    persist::{Persist, PersistKey},
};

/// acme-lib storage that lives only as long as one issuance. The account key
/// and any certificate acme-lib caches are dropped with it; the slot on disk
/// is written by the certificate store alone.
#[derive(Clone, Default)]
pub struct EphemeralPersist {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl EphemeralPersist {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> acme_lib::Result<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| AcmeError::Other("acme persistence lock poisoned".into()))
    }
}

impl Persist for EphemeralPersist {
    fn put(&self, key: &PersistKey, value: &[u8]) -> acme_lib::Result<()> {
        self.entries()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &PersistKey) -> acme_lib::Result<Option<Vec<u8>>> {
        Ok(self.entries()?.get(&key.to_string()).cloned())
    }
}
