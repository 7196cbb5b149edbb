//! DumpFile — файловый коллаборатор: JSON-дамп страницы, снятый внешним драйвером.
//!
//! Формат:
//! {
//!   "url": "...",
//!   "loggedIn": true,                  // опционально, по умолчанию true
//!   "cookies": {str: str},
//!   "localStorage": {str: str},
//!   "databases": { dbName: DatabaseSnapshot },   // transport-форма, с данными
//!   "special": { dbName: { osName: [ {field: value} ] } }
//! }
//!
//! В "special" бинарное поле (keyMap layout'а) хранится base64-строкой.
//! `split()` отдаёт две непересекающиеся половины: страницу (StorageBackend) и
//! hook (SpecialTreatmentHook), чтобы их можно было передать одновременно.

use base64::Engine;
use log::debug;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::capture::StorageBackend;
use crate::error::{Result, SnapshotError};
use crate::lock::acquire_exclusive;
use crate::object_store::Record;
use crate::session::{read_json, write_json_atomic};
use crate::special::{
    RawRecord, RawValue, SpecialData, SpecialTreatmentHook, SpecialTreatmentLayout,
};
use crate::transport::{
    decode, field_bool, field_object, field_str, field_string_map, kind_of, string_map_value,
    Schema,
};

const ENTITY: &str = "PageDump";

pub const DUMP_SCHEMA: Schema = Schema {
    entity: ENTITY,
    required: &["url", "cookies", "localStorage", "databases"],
};

#[derive(Debug, Clone)]
pub struct DumpFile {
    path: PathBuf,
    url: String,
    logged_in: bool,
    cookies: BTreeMap<String, String>,
    local_storage: BTreeMap<String, String>,
    databases: Map<String, Value>,
    special: Map<String, Value>,
}

impl DumpFile {
    pub fn open(path: &Path) -> Result<Self> {
        let value = read_json(path)?;
        decode(&value, &DUMP_SCHEMA, |obj| {
            let logged_in = match obj.get("loggedIn") {
                Some(_) => field_bool(obj, "loggedIn", ENTITY)?,
                None => true,
            };
            let special = match obj.get("special") {
                Some(_) => field_object(obj, "special", ENTITY)?.clone(),
                None => Map::new(),
            };
            Ok(Self {
                path: path.to_path_buf(),
                url: field_str(obj, "url", ENTITY)?.to_string(),
                logged_in,
                cookies: field_string_map(obj, "cookies", ENTITY)?,
                local_storage: field_string_map(obj, "localStorage", ENTITY)?,
                databases: field_object(obj, "databases", ENTITY)?.clone(),
                special,
            })
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn split(&mut self) -> (DumpPage<'_>, DumpSpecial<'_>) {
        (
            DumpPage {
                logged_in: self.logged_in,
                cookies: &mut self.cookies,
                local_storage: &mut self.local_storage,
                databases: &mut self.databases,
            },
            DumpSpecial {
                special: &mut self.special,
            },
        )
    }

    fn to_value(&self) -> Value {
        let mut m = Map::new();
        m.insert("url".into(), Value::String(self.url.clone()));
        m.insert("loggedIn".into(), Value::Bool(self.logged_in));
        m.insert("cookies".into(), string_map_value(&self.cookies));
        m.insert("localStorage".into(), string_map_value(&self.local_storage));
        m.insert("databases".into(), Value::Object(self.databases.clone()));
        m.insert("special".into(), Value::Object(self.special.clone()));
        Value::Object(m)
    }

    /// Переписать дамп на месте (после restore).
    pub fn save(&self) -> Result<()> {
        let _guard = acquire_exclusive(&self.path)?;
        write_json_atomic(&self.path, &self.to_value())?;
        debug!("dump: written {}", self.path.display());
        Ok(())
    }
}

/// Страница: cookies, localStorage, IndexedDB.
pub struct DumpPage<'a> {
    logged_in: bool,
    cookies: &'a mut BTreeMap<String, String>,
    local_storage: &'a mut BTreeMap<String, String>,
    databases: &'a mut Map<String, Value>,
}

impl StorageBackend for DumpPage<'_> {
    fn wait_for_login(&mut self) -> Result<bool> {
        Ok(self.logged_in)
    }

    fn cookies(&mut self) -> Result<BTreeMap<String, String>> {
        Ok(self.cookies.clone())
    }

    fn set_cookies(&mut self, cookies: &BTreeMap<String, String>) -> Result<()> {
        // document.cookie дописывает, а не заменяет
        for (k, v) in cookies {
            self.cookies.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    fn simple_storage(&mut self) -> Result<BTreeMap<String, String>> {
        Ok(self.local_storage.clone())
    }

    fn set_simple_storage(&mut self, storage: &BTreeMap<String, String>) -> Result<()> {
        for (k, v) in storage {
            self.local_storage.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    fn database_schema(&mut self, layout: &SpecialTreatmentLayout) -> Result<Value> {
        let mut out = self.databases.clone();
        for (db, os) in layout.entries() {
            if let Some(store) = out
                .get_mut(db)
                .and_then(|d| d.get_mut("objectStores"))
                .and_then(|s| s.get_mut(os))
                .and_then(|s| s.as_object_mut())
            {
                store.insert("data".into(), Value::Array(Vec::new()));
            }
        }
        Ok(Value::Object(out))
    }

    fn replace_object_store(
        &mut self,
        database: &str,
        object_store: &str,
        records: &[Record],
    ) -> Result<()> {
        let store = self
            .databases
            .get_mut(database)
            .and_then(|d| d.get_mut("objectStores"))
            .and_then(|s| s.get_mut(object_store))
            .and_then(|s| s.as_object_mut())
            .ok_or_else(|| {
                SnapshotError::not_found("object store", format!("{database}/{object_store}"))
            })?;
        store.insert(
            "data".into(),
            Value::Array(records.iter().cloned().map(Value::Object).collect()),
        );
        Ok(())
    }
}

/// Special-treatment часть дампа.
pub struct DumpSpecial<'a> {
    special: &'a mut Map<String, Value>,
}

impl SpecialTreatmentHook for DumpSpecial<'_> {
    fn capture(&mut self, layout: &SpecialTreatmentLayout) -> Result<SpecialData> {
        let mut out = SpecialData::new();
        for (db, os) in layout.entries() {
            // отсутствие записи — не ошибка здесь: полноту проверяет capture
            let Some(items) = self.special.get(db).and_then(|d| d.get(os)) else {
                continue;
            };
            let items = items.as_array().ok_or_else(|| {
                SnapshotError::schema(ENTITY, format!("special.{db}.{os} must be an array"))
            })?;
            let binary_key = layout.binary_key(os);
            let records = items
                .iter()
                .map(|it| raw_from_dump(it, binary_key))
                .collect::<Result<Vec<_>>>()?;
            out.insert(db, os, records);
        }
        Ok(out)
    }

    fn restore(&mut self, layout: &SpecialTreatmentLayout, data: &SpecialData) -> Result<()> {
        for (db, os) in layout.entries() {
            let records = data
                .get(db, os)
                .ok_or_else(|| SnapshotError::incomplete(db, os))?;
            let items: Vec<Value> = records.iter().map(raw_to_dump).collect();
            let db_entry = self
                .special
                .entry(db.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            let db_map = db_entry.as_object_mut().ok_or_else(|| {
                SnapshotError::schema(ENTITY, format!("special.{db} must be an object"))
            })?;
            db_map.insert(os.to_string(), Value::Array(items));
        }
        Ok(())
    }
}

fn raw_from_dump(item: &Value, binary_key: Option<&str>) -> Result<RawRecord> {
    let obj = item.as_object().ok_or_else(|| {
        SnapshotError::schema(ENTITY, format!("special record must be an object, got {}", kind_of(item)))
    })?;
    let mut out = RawRecord::new();
    for (field, v) in obj {
        let raw = match v {
            Value::String(s) if Some(field.as_str()) == binary_key => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(s.trim())
                    .map_err(|e| {
                        SnapshotError::validation(format!("field '{field}': base64 decode: {e}"))
                    })?;
                RawValue::Bytes(bytes)
            }
            other => RawValue::Json(other.clone()),
        };
        out.insert(field.clone(), raw);
    }
    Ok(out)
}

fn raw_to_dump(raw: &RawRecord) -> Value {
    let obj: Map<String, Value> = raw
        .iter()
        .map(|(field, v)| {
            let v = match v {
                RawValue::Json(j) => j.clone(),
                RawValue::Bytes(b) => {
                    Value::String(base64::engine::general_purpose::STANDARD.encode(b))
                }
            };
            (field.clone(), v)
        })
        .collect();
    Value::Object(obj)
}
