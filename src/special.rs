//! Special treatment: object stores, чьи данные идут мимо общего get/set алгоритма.
//!
//! Layout — декларативная карта `db -> [object store]` плюс `keyMap: os -> поле`,
//! в котором лежат бинарные данные. Общий capture оставляет такие stores со схемой,
//! но с `data = []`; данные приносит внешний hook (`SpecialTreatmentHook`).
//!
//! Граница hook'а — единственное место, где живут сырые байты:
//! - capture: `RawValue::Bytes` -> массив целых 0..=255 (JSON-safe);
//! - restore: массив целых -> `RawValue::Bytes`.
//! Сам снапшот про байты ничего не знает.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{Result, SnapshotError};
use crate::object_store::Record;
use crate::transport::kind_of;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialTreatmentLayout {
    #[serde(default)]
    pub layout: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub key_map: BTreeMap<String, String>,
}

impl SpecialTreatmentLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layout для WhatsApp Web: полнотекстовый индекс живёт вне общего алгоритма.
    pub fn whatsapp_default() -> Self {
        Self::new().with_store("fts-storage", "fts-v3-index")
    }

    /// Загрузить layout из JSON-файла `{ "layout": {...}, "keyMap": {...} }`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SnapshotError::not_found("layout file", path.display().to_string())
            } else {
                SnapshotError::Io(e)
            }
        })?;
        let layout: Self = serde_json::from_slice(&bytes)?;
        Ok(layout)
    }

    pub fn with_store(mut self, database: &str, object_store: &str) -> Self {
        let stores = self.layout.entry(database.to_string()).or_default();
        if !stores.iter().any(|s| s == object_store) {
            stores.push(object_store.to_string());
        }
        self
    }

    pub fn with_binary_key(mut self, object_store: &str, field: &str) -> Self {
        self.key_map
            .insert(object_store.to_string(), field.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.layout.values().all(|v| v.is_empty())
    }

    pub fn contains(&self, database: &str, object_store: &str) -> bool {
        self.layout
            .get(database)
            .map(|stores| stores.iter().any(|s| s == object_store))
            .unwrap_or(false)
    }

    /// Все пары (db, os) в порядке layout.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.layout
            .iter()
            .flat_map(|(db, stores)| stores.iter().map(move |os| (db.as_str(), os.as_str())))
    }

    pub fn binary_key(&self, object_store: &str) -> Option<&str> {
        self.key_map.get(object_store).map(|s| s.as_str())
    }
}

/// Значение поля на стороне hook'а.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Json(Value),
    Bytes(Vec<u8>),
}

pub type RawRecord = BTreeMap<String, RawValue>;

/// Результат hook'а: db -> os -> записи.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecialData {
    entries: BTreeMap<String, BTreeMap<String, Vec<RawRecord>>>,
}

impl SpecialData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, database: &str, object_store: &str, records: Vec<RawRecord>) {
        self.entries
            .entry(database.to_string())
            .or_default()
            .insert(object_store.to_string(), records);
    }

    pub fn get(&self, database: &str, object_store: &str) -> Option<&[RawRecord]> {
        self.entries
            .get(database)
            .and_then(|m| m.get(object_store))
            .map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Каждая пара из layout обязана присутствовать (пустой список записей — допустим).
    pub fn ensure_covers(&self, layout: &SpecialTreatmentLayout) -> Result<()> {
        for (db, os) in layout.entries() {
            if self.get(db, os).is_none() {
                return Err(SnapshotError::incomplete(db, os));
            }
        }
        Ok(())
    }
}

/// Внешний type-aware capture/restore для stores из layout.
pub trait SpecialTreatmentHook {
    fn capture(&mut self, layout: &SpecialTreatmentLayout) -> Result<SpecialData>;
    fn restore(&mut self, layout: &SpecialTreatmentLayout, data: &SpecialData) -> Result<()>;
}

/// Hook для пустого layout: ничего не приносит и ничего не пишет.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSpecialTreatment;

impl SpecialTreatmentHook for NoSpecialTreatment {
    fn capture(&mut self, _layout: &SpecialTreatmentLayout) -> Result<SpecialData> {
        Ok(SpecialData::new())
    }

    fn restore(&mut self, _layout: &SpecialTreatmentLayout, _data: &SpecialData) -> Result<()> {
        Ok(())
    }
}

// --------- binary transcoding ----------

pub fn bytes_to_value(bytes: &[u8]) -> Value {
    Value::Array(bytes.iter().map(|b| Value::from(*b)).collect())
}

pub fn value_to_bytes(v: &Value) -> Result<Vec<u8>> {
    let items = v.as_array().ok_or_else(|| {
        SnapshotError::validation(format!("binary field must be an array, got {}", kind_of(v)))
    })?;
    items
        .iter()
        .enumerate()
        .map(|(i, it)| {
            it.as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| {
                    SnapshotError::validation(format!(
                        "binary field element #{i} is not a byte (0..=255): {it}"
                    ))
                })
        })
        .collect()
}

/// Запись hook'а -> запись снапшота. Байты допустимы только в binary_key.
pub fn encode_record(raw: &RawRecord, binary_key: Option<&str>) -> Result<Value> {
    let mut out = Record::new();
    for (field, value) in raw {
        let v = match value {
            RawValue::Json(v) => v.clone(),
            RawValue::Bytes(b) if Some(field.as_str()) == binary_key => bytes_to_value(b),
            RawValue::Bytes(_) => {
                return Err(SnapshotError::validation(format!(
                    "field '{field}' carries bytes but is not the declared binary key"
                )))
            }
        };
        out.insert(field.clone(), v);
    }
    Ok(Value::Object(out))
}

/// Запись снапшота -> запись hook'а (binary_key разворачивается в байты).
pub fn decode_record(record: &Record, binary_key: Option<&str>) -> Result<RawRecord> {
    let mut out = RawRecord::new();
    for (field, value) in record {
        let raw = if Some(field.as_str()) == binary_key && value.is_array() {
            RawValue::Bytes(value_to_bytes(value)?)
        } else {
            RawValue::Json(value.clone())
        };
        out.insert(field.clone(), raw);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bytes_transcode_both_ways() {
        let v = bytes_to_value(&[0, 7, 255]);
        assert_eq!(v, json!([0, 7, 255]));
        assert_eq!(value_to_bytes(&v).unwrap(), vec![0, 7, 255]);
    }

    #[test]
    fn out_of_range_byte_is_rejected() {
        assert!(value_to_bytes(&json!([1, 256])).is_err());
        assert!(value_to_bytes(&json!([1, -1])).is_err());
        assert!(value_to_bytes(&json!([1.5])).is_err());
        assert!(value_to_bytes(&json!("AQI=")).is_err());
    }

    #[test]
    fn bytes_outside_binary_key_are_rejected() {
        let mut raw = RawRecord::new();
        raw.insert("blob".into(), RawValue::Bytes(vec![1]));
        assert!(encode_record(&raw, Some("other")).is_err());
        assert_eq!(encode_record(&raw, Some("blob")).unwrap(), json!({"blob": [1]}));
    }

    #[test]
    fn layout_parses_camel_case_key_map() {
        let layout: SpecialTreatmentLayout = serde_json::from_value(json!({
            "layout": {"fts-storage": ["fts-v3-index"]},
            "keyMap": {"fts-v3-index": "data"}
        }))
        .unwrap();
        assert!(layout.contains("fts-storage", "fts-v3-index"));
        assert_eq!(layout.binary_key("fts-v3-index"), Some("data"));
        assert!(!layout.contains("fts-storage", "other"));
    }
}
