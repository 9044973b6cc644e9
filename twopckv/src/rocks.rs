use std::path::Path;

use labrpc::anyhow::Result;
use rocksdb::DB;
use twopc::LocalStore;

/// A [`LocalStore`] persisted in its own RocksDB directory.
///
/// Opening an existing directory picks up the data left there by a previous
/// run.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open (or create) the database at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            db: DB::open_default(path)?,
        })
    }
}

impl LocalStore for RocksStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(v) = self.db.get(key)? {
            Ok(Some(String::from_utf8(v)?))
        } else {
            Ok(None)
        }
    }

    fn insert(&self, key: &str, value: &str) -> Result<()> {
        Ok(self.db.put(key, value)?)
    }

    fn delete(&self, key: &str) -> Result<()> {
        Ok(self.db.delete(key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_all() {
        let dir = TempDir::new().unwrap();
        let s = RocksStore::new(dir.path().join("replica")).unwrap();

        assert!(s.get("key1").unwrap().is_none());
        s.insert("key1", "value1").unwrap();
        s.insert("key1", "value2").unwrap();
        assert_eq!(s.get("key1").unwrap(), Some("value2".to_owned()));
        s.delete("key1").unwrap();
        s.delete("key1").unwrap();
        assert!(s.get("key1").unwrap().is_none());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("replica");
        {
            let s = RocksStore::new(&path).unwrap();
            s.insert("a", "1").unwrap();
        }
        let s = RocksStore::new(&path).unwrap();
        assert_eq!(s.get("a").unwrap(), Some("1".to_owned()));
    }
}
