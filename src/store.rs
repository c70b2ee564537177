//! Per-namespace JSON data store.
//!
//! Each bot namespace owns one `<name>.json` file under the data directory.
//! Reads of missing or empty files yield an empty object; writes go through
//! one coarse lock so concurrent read-modify-write cycles cannot interleave.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Json(serde_json::Error),
    MissingKey { namespace: String, key: String },
    NotAnArray { namespace: String, key: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "store io error: {}", err),
            StoreError::Json(err) => write!(f, "store json error: {}", err),
            StoreError::MissingKey { namespace, key } => {
                write!(f, "no key {} in namespace {}", key, namespace)
            }
            StoreError::NotAnArray { namespace, key } => {
                write!(f, "key {} in namespace {} is not an array", key, namespace)
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        StoreError::Io(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        StoreError::Json(value)
    }
}

#[derive(Clone)]
pub struct Store {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl Store {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn path(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{}.json", namespace))
    }

    /// Read a whole namespace. A namespace that was never written is empty.
    pub fn get(&self, namespace: &str) -> Result<Map<String, Value>, StoreError> {
        let path = self.path(namespace);
        if !path.exists() {
            return Ok(Map::new());
        }
        let contents = fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn get_value(&self, namespace: &str, key: &str) -> Result<Value, StoreError> {
        self.get(namespace)?
            .remove(key)
            .ok_or_else(|| StoreError::MissingKey {
                namespace: namespace.to_string(),
                key: key.to_string(),
            })
    }

    /// Like `get_value` but a missing key decodes as `T::default()`.
    pub fn get_or_default<T>(&self, namespace: &str, key: &str) -> Result<T, StoreError>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        match self.get_value(namespace, key) {
            Ok(value) => Ok(serde_json::from_value(value)?),
            Err(StoreError::MissingKey { .. }) => Ok(T::default()),
            Err(err) => Err(err),
        }
    }

    pub fn set_value(
        &self,
        namespace: &str,
        key: &str,
        value: impl serde::Serialize,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        let _guard = self.write_lock.lock().expect("store lock poisoned");
        let mut data = self.get(namespace)?;
        data.insert(key.to_string(), value);
        self.write(namespace, &data)
    }

    /// Push a value onto the array at `key`, creating the array if needed.
    pub fn append_value(
        &self,
        namespace: &str,
        key: &str,
        value: impl serde::Serialize,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        let _guard = self.write_lock.lock().expect("store lock poisoned");
        let mut data = self.get(namespace)?;
        match data
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            Value::Array(items) => items.push(value),
            _ => {
                return Err(StoreError::NotAnArray {
                    namespace: namespace.to_string(),
                    key: key.to_string(),
                })
            }
        }
        self.write(namespace, &data)
    }

    fn write(&self, namespace: &str, data: &Map<String, Value>) -> Result<(), StoreError> {
        fs::write(self.path(namespace), serde_json::to_string_pretty(data)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn missing_namespace_reads_empty() {
        let (_dir, store) = store();
        assert!(store.get("quotebot").unwrap().is_empty());
    }

    #[test]
    fn missing_key_is_an_error() {
        let (_dir, store) = store();
        store.set_value("quotebot", "quotes", json!({})).unwrap();
        assert!(matches!(
            store.get_value("quotebot", "webhook_id"),
            Err(StoreError::MissingKey { .. })
        ));
    }

    #[test]
    fn set_then_get_roundtrip() {
        let (_dir, store) = store();
        store.set_value("main", "general_channel_id", "1234").unwrap();
        store.set_value("main", "bot_id", "42").unwrap();
        assert_eq!(store.get_value("main", "bot_id").unwrap(), json!("42"));
        assert_eq!(
            store.get_value("main", "general_channel_id").unwrap(),
            json!("1234")
        );
    }

    #[test]
    fn append_creates_and_extends_array() {
        let (_dir, store) = store();
        store
            .append_value("checklist", "items", json!({"item": "melk"}))
            .unwrap();
        store
            .append_value("checklist", "items", json!({"item": "eieren"}))
            .unwrap();
        let items = store.get_value("checklist", "items").unwrap();
        assert_eq!(items.as_array().unwrap().len(), 2);
    }

    #[test]
    fn append_to_non_array_fails() {
        let (_dir, store) = store();
        store.set_value("checklist", "items", "oops").unwrap();
        assert!(matches!(
            store.append_value("checklist", "items", json!(1)),
            Err(StoreError::NotAnArray { .. })
        ));
    }

    #[test]
    fn get_or_default_on_missing_key() {
        let (_dir, store) = store();
        let items: Vec<String> = store.get_or_default("checklist", "items").unwrap();
        assert!(items.is_empty());
    }
}
