//! DatabaseSnapshot — именованная версионированная коллекция object stores.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{Result, SnapshotError};
use crate::object_store::ObjectStoreSnapshot;
use crate::transport::{decode, field_object, field_str, field_u64, Schema, Transport};

const ENTITY: &str = "DatabaseSnapshot";

pub const DATABASE_SCHEMA: Schema = Schema {
    entity: ENTITY,
    required: &["name", "version", "objectStores"],
};

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseSnapshot {
    name: String,
    version: u64,
    object_stores: BTreeMap<String, ObjectStoreSnapshot>,
}

impl DatabaseSnapshot {
    pub fn new(name: &str) -> Result<Self> {
        Self::create(name, 1)
    }

    pub fn create(name: &str, version: i64) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SnapshotError::validation("database name must not be empty"));
        }
        if version <= 0 {
            return Err(SnapshotError::validation(format!(
                "database '{name}': version cannot be <= 0 (got {version})"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            version: version as u64,
            object_stores: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn add_object_store(&mut self, store: ObjectStoreSnapshot) -> Result<()> {
        if self.object_stores.contains_key(store.name()) {
            return Err(SnapshotError::duplicate_name("object store", store.name()));
        }
        self.object_stores.insert(store.name().to_string(), store);
        Ok(())
    }

    pub fn object_store(&self, name: &str) -> Result<&ObjectStoreSnapshot> {
        self.object_stores
            .get(name)
            .ok_or_else(|| SnapshotError::not_found("object store", format!("{}/{name}", self.name)))
    }

    pub fn object_store_mut(&mut self, name: &str) -> Result<&mut ObjectStoreSnapshot> {
        let db = self.name.clone();
        self.object_stores
            .get_mut(name)
            .ok_or_else(|| SnapshotError::not_found("object store", format!("{db}/{name}")))
    }

    pub fn object_stores(&self) -> impl Iterator<Item = &ObjectStoreSnapshot> {
        self.object_stores.values()
    }

    pub fn object_store_count(&self) -> usize {
        self.object_stores.len()
    }
}

impl Transport for DatabaseSnapshot {
    fn to_transport(&self) -> Value {
        let stores: Map<String, Value> = self
            .object_stores
            .iter()
            .map(|(name, os)| (name.clone(), os.to_transport()))
            .collect();
        let mut m = Map::new();
        m.insert("name".into(), Value::String(self.name.clone()));
        m.insert("version".into(), Value::from(self.version));
        m.insert("objectStores".into(), Value::Object(stores));
        Value::Object(m)
    }

    fn from_transport(value: &Value) -> Result<Self> {
        decode_with(value, |_, os| ObjectStoreSnapshot::from_transport(os))
    }
}

/// Общий разбор базы: name + version + objectStores. Каждый object store собирает
/// `build(db_name, os_value)`; capture подставляет сюда свой разбор с фазами.
pub(crate) fn decode_with<F>(value: &Value, mut build: F) -> Result<DatabaseSnapshot>
where
    F: FnMut(&str, &Value) -> Result<ObjectStoreSnapshot>,
{
    decode(value, &DATABASE_SCHEMA, |obj| {
        let name = field_str(obj, "name", ENTITY)?;
        // version == 0 отсекается в create(); отрицательные числа — это уже schema-ошибка
        let version = field_u64(obj, "version", ENTITY)?;
        let version = i64::try_from(version).map_err(|_| {
            SnapshotError::schema(ENTITY, format!("version out of range: {version}"))
        })?;
        let mut db = DatabaseSnapshot::create(name, version)?;
        for os in field_object(obj, "objectStores", ENTITY)?.values() {
            let os = build(db.name(), os)?;
            db.add_object_store(os)?;
        }
        Ok(db)
    })
}
