use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::Response;
use crate::error::{Error, Result};

type Partitions = BTreeMap<String, HashMap<String, Response>>;

/// Named cache partitions keyed by request URL. Clones share storage.
///
/// Each `put`/`get` is atomic on its own; there are no multi-key
/// transactions.
#[derive(Clone, Default)]
pub struct CacheStorage {
    partitions: Arc<Mutex<Partitions>>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Partitions>> {
        self.partitions
            .lock()
            .map_err(|_| Error::Backend("cache storage lock poisoned".into()))
    }

    /// Create the partition if it does not exist yet.
    pub fn open(&self, name: &str) -> Result<()> {
        self.lock()?.entry(name.to_string()).or_default();
        Ok(())
    }

    pub fn put(&self, name: &str, url: &str, response: Response) -> Result<()> {
        self.lock()?
            .entry(name.to_string())
            .or_default()
            .insert(url.to_string(), response);
        Ok(())
    }

    /// Insert many entries at once.
    pub fn put_all(&self, name: &str, entries: Vec<(String, Response)>) -> Result<()> {
        self.lock()?
            .entry(name.to_string())
            .or_default()
            .extend(entries);
        Ok(())
    }

    pub fn get(&self, name: &str, url: &str) -> Result<Option<Response>> {
        Ok(self
            .lock()?
            .get(name)
            .and_then(|p| p.get(url))
            .cloned())
    }

    /// Look `url` up across every partition, in name order.
    pub fn match_any(&self, url: &str) -> Result<Option<Response>> {
        Ok(self
            .lock()?
            .values()
            .find_map(|p| p.get(url))
            .cloned())
    }

    pub fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.lock()?.remove(name).is_some())
    }

    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    pub fn len(&self, name: &str) -> Result<usize> {
        Ok(self.lock()?.get(name).map_or(0, HashMap::len))
    }

    pub fn is_empty(&self, name: &str) -> Result<bool> {
        Ok(self.len(name)? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_are_isolated_and_shared_across_clones() {
        let cache = CacheStorage::new();
        let clone = cache.clone();
        cache.put("a", "http://x/", Response::ok("text/html", "hi")).unwrap();

        assert!(clone.get("a", "http://x/").unwrap().is_some());
        assert!(clone.get("b", "http://x/").unwrap().is_none());
        assert!(clone.match_any("http://x/").unwrap().is_some());
        assert_eq!(clone.len("a").unwrap(), 1);
        assert!(clone.is_empty("b").unwrap());
    }

    #[test]
    fn delete_removes_whole_partition() {
        let cache = CacheStorage::new();
        cache.open("old").unwrap();
        cache.open("new").unwrap();
        assert!(cache.delete("old").unwrap());
        assert!(!cache.delete("old").unwrap());
        assert_eq!(cache.names().unwrap(), vec!["new"]);
    }
}
