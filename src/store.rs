//! StoreSnapshot — агрегат IndexedDB-снимка одного сайта (url + базы).
//!
//! Это та единица, что сериализуется в transport-форму `{url, databases}`.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::database::DatabaseSnapshot;
use crate::error::{Result, SnapshotError};
use crate::transport::{decode, field_object, field_str, Schema, Transport};

const ENTITY: &str = "StoreSnapshot";

pub const STORE_SCHEMA: Schema = Schema {
    entity: ENTITY,
    required: &["url", "databases"],
};

#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    site_url: String,
    databases: BTreeMap<String, DatabaseSnapshot>,
}

impl StoreSnapshot {
    pub fn new(site_url: &str) -> Self {
        Self {
            site_url: site_url.trim().to_string(),
            databases: BTreeMap::new(),
        }
    }

    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    pub fn add_database(&mut self, db: DatabaseSnapshot) -> Result<()> {
        if self.databases.contains_key(db.name()) {
            return Err(SnapshotError::duplicate_name("database", db.name()));
        }
        self.databases.insert(db.name().to_string(), db);
        Ok(())
    }

    pub fn get_database(&self, name: &str) -> Result<&DatabaseSnapshot> {
        self.databases
            .get(name)
            .ok_or_else(|| SnapshotError::not_found("database", name))
    }

    pub fn get_database_mut(&mut self, name: &str) -> Result<&mut DatabaseSnapshot> {
        self.databases
            .get_mut(name)
            .ok_or_else(|| SnapshotError::not_found("database", name))
    }

    pub fn databases(&self) -> impl Iterator<Item = &DatabaseSnapshot> {
        self.databases.values()
    }

    pub fn database_count(&self) -> usize {
        self.databases.len()
    }

    /// Общее число записей по всем object stores (для сводок CLI).
    pub fn record_count(&self) -> usize {
        self.databases
            .values()
            .flat_map(|db| db.object_stores())
            .map(|os| os.len())
            .sum()
    }
}

impl Transport for StoreSnapshot {
    fn to_transport(&self) -> Value {
        let dbs: Map<String, Value> = self
            .databases
            .iter()
            .map(|(name, db)| (name.clone(), db.to_transport()))
            .collect();
        let mut m = Map::new();
        m.insert("url".into(), Value::String(self.site_url.clone()));
        m.insert("databases".into(), Value::Object(dbs));
        Value::Object(m)
    }

    fn from_transport(value: &Value) -> Result<Self> {
        decode(value, &STORE_SCHEMA, |obj| {
            let mut store = StoreSnapshot::new(field_str(obj, "url", ENTITY)?);
            for db in field_object(obj, "databases", ENTITY)?.values() {
                store.add_database(DatabaseSnapshot::from_transport(db)?)?;
            }
            Ok(store)
        })
    }
}
