//! ObjectStoreSnapshot — одна коллекция записей + её схема (keyPath, autoIncrement, индексы).
//!
//! Инвариант уникальности проверяется при вставке (add_record), не ретроспективно:
//! для каждого unique-индекса ключ новой записи сравнивается со всеми уже вставленными.
//! Скан линейный — O(n) на вставку; объёмы ограничены хранилищем одной сессии браузера.
//!
//! Извлечение ключа индекса:
//! - keyPath индекса (или имя индекса, если keyPath пуст);
//! - компоненты с точкой идут по вложенным объектам ("a.b");
//! - составной keyPath даёт массив-ключ;
//! - отсутствующий или null ключ не индексируется (коллизии быть не может);
//! - multiEntry + массив: индексируется каждый элемент.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{Result, SnapshotError};
use crate::transport::{
    decode, field_array, field_bool, field_object, field_str, key_path_from_value,
    key_path_to_value, kind_of, normalize_key_path, Schema, Transport,
};

/// Одна запись object store: поле -> значение.
pub type Record = Map<String, Value>;

const ENTITY: &str = "ObjectStoreSnapshot";
const INDEX_ENTITY: &str = "IndexRecord";

pub const OBJECT_STORE_SCHEMA: Schema = Schema {
    entity: ENTITY,
    required: &["name", "autoIncrement", "keyPath", "indices", "data"],
};

/// Описание индекса object store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRecord {
    pub unique: bool,
    pub key_path: Vec<String>,
    pub multi_entry: bool,
}

impl IndexRecord {
    pub fn new(unique: bool) -> Self {
        Self {
            unique,
            ..Self::default()
        }
    }

    pub fn with_key_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.key_path = normalize_key_path(path);
        self
    }

    pub fn with_multi_entry(mut self, on: bool) -> Self {
        self.multi_entry = on;
        self
    }

    fn to_value(&self) -> Value {
        let mut m = Map::new();
        m.insert("unique".into(), Value::Bool(self.unique));
        m.insert("keyPath".into(), key_path_to_value(&self.key_path));
        m.insert("multiEntry".into(), Value::Bool(self.multi_entry));
        Value::Object(m)
    }

    /// Полная форма {unique, keyPath, multiEntry} или старая `name: bool`.
    fn from_value(name: &str, v: &Value) -> Result<Self> {
        match v {
            Value::Bool(unique) => Ok(IndexRecord::new(*unique).with_key_path([name])),
            Value::Object(obj) => {
                let unique = match obj.get("unique") {
                    Some(_) => field_bool(obj, "unique", INDEX_ENTITY)?,
                    None => false,
                };
                let multi_entry = match obj.get("multiEntry") {
                    Some(_) => field_bool(obj, "multiEntry", INDEX_ENTITY)?,
                    None => false,
                };
                let key_path = match obj.get("keyPath") {
                    Some(kp) => key_path_from_value(kp, INDEX_ENTITY)?,
                    None => Vec::new(),
                };
                Ok(IndexRecord {
                    unique,
                    key_path,
                    multi_entry,
                })
            }
            other => Err(SnapshotError::schema(
                INDEX_ENTITY,
                format!("index \"{name}\" must be a bool or an object, got {}", kind_of(other)),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectStoreSnapshot {
    name: String,
    auto_increment: bool,
    key_path: Vec<String>,
    indices: BTreeMap<String, IndexRecord>,
    data: Vec<Record>,
}

impl ObjectStoreSnapshot {
    /// Пустой store без keyPath и без autoIncrement.
    pub fn new(name: &str) -> Result<Self> {
        Self::create(name, false, Vec::<String>::new())
    }

    pub fn create<I, S>(name: &str, auto_increment: bool, key_path: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = name.trim();
        if name.is_empty() {
            return Err(SnapshotError::validation("object store name must not be empty"));
        }
        Ok(Self {
            name: name.to_string(),
            auto_increment,
            key_path: normalize_key_path(key_path),
            indices: BTreeMap::new(),
            data: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn auto_increment(&self) -> bool {
        self.auto_increment
    }

    pub fn key_path(&self) -> &[String] {
        &self.key_path
    }

    pub fn indices(&self) -> &BTreeMap<String, IndexRecord> {
        &self.indices
    }

    pub fn index(&self, name: &str) -> Option<&IndexRecord> {
        self.indices.get(name)
    }

    pub fn data(&self) -> &[Record] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn create_index(&mut self, name: &str, index: IndexRecord) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SnapshotError::validation(format!(
                "index name must not be empty (object store '{}')",
                self.name
            )));
        }
        if self.indices.contains_key(name) {
            return Err(SnapshotError::DuplicateIndex(name.to_string()));
        }
        self.indices.insert(name.to_string(), index);
        Ok(())
    }

    /// Добавить запись. Запись попадает в data только если ни один unique-индекс не нарушен.
    pub fn add_record(&mut self, record: Value) -> Result<()> {
        let record = match record {
            Value::Object(m) => m,
            other => {
                return Err(SnapshotError::validation(format!(
                    "record for object store '{}' must be an object, got {}",
                    self.name,
                    kind_of(&other)
                )))
            }
        };

        for (idx_name, idx) in self.indices.iter().filter(|(_, i)| i.unique) {
            let incoming = index_keys(&record, idx_name, idx);
            if incoming.is_empty() {
                continue;
            }
            let collides = self.data.iter().any(|existing| {
                index_keys(existing, idx_name, idx)
                    .iter()
                    .any(|k| incoming.iter().any(|i| keys_equal(i, k)))
            });
            if collides {
                return Err(SnapshotError::UniquenessViolation {
                    store: self.name.clone(),
                    index: idx_name.clone(),
                });
            }
        }

        self.data.push(record);
        Ok(())
    }

    /// Сбросить данные, оставив схему (stores из special-treatment layout).
    pub(crate) fn clear_data(&mut self) {
        self.data.clear();
    }
}

/// Ключи индекса для записи (пусто — запись не индексируется).
fn index_keys(record: &Record, idx_name: &str, idx: &IndexRecord) -> Vec<Value> {
    let key = if idx.key_path.is_empty() {
        lookup(record, idx_name)
    } else {
        extract_key(record, &idx.key_path)
    };
    match key {
        Some(Value::Array(items)) if idx.multi_entry => {
            items.into_iter().filter(|v| !v.is_null()).collect()
        }
        Some(v) => vec![v],
        None => Vec::new(),
    }
}

/// Сравнение ключей как в IndexedDB: числа сравниваются по значению (1 == 1.0),
/// массивы поэлементно.
fn keys_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        // целые между собой сравниваем точно, иначе через f64
        (Value::Number(x), Value::Number(y)) if x.is_f64() || y.is_f64() => {
            match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| keys_equal(x, y))
        }
        _ => a == b,
    }
}

fn extract_key(record: &Record, path: &[String]) -> Option<Value> {
    if path.len() == 1 {
        return lookup(record, &path[0]);
    }
    let mut parts = Vec::with_capacity(path.len());
    for p in path {
        parts.push(lookup(record, p)?);
    }
    Some(Value::Array(parts))
}

/// "a.b.c" по вложенным объектам; null считается отсутствием ключа.
fn lookup(record: &Record, dotted: &str) -> Option<Value> {
    let mut parts = dotted.split('.');
    let mut cur = record.get(parts.next()?)?;
    for p in parts {
        cur = cur.as_object()?.get(p)?;
    }
    if cur.is_null() {
        None
    } else {
        Some(cur.clone())
    }
}

impl Transport for ObjectStoreSnapshot {
    fn to_transport(&self) -> Value {
        let mut indices = Map::new();
        for (name, idx) in &self.indices {
            indices.insert(name.clone(), idx.to_value());
        }
        let mut m = Map::new();
        m.insert("name".into(), Value::String(self.name.clone()));
        m.insert("autoIncrement".into(), Value::Bool(self.auto_increment));
        m.insert("keyPath".into(), key_path_to_value(&self.key_path));
        m.insert("indices".into(), Value::Object(indices));
        m.insert(
            "data".into(),
            Value::Array(self.data.iter().cloned().map(Value::Object).collect()),
        );
        Value::Object(m)
    }

    /// Не чистый десериализатор: индексы и записи проигрываются через
    /// create_index/add_record, так что противоречивые данные дадут UniquenessViolation.
    fn from_transport(value: &Value) -> Result<Self> {
        decode(value, &OBJECT_STORE_SCHEMA, |obj| {
            let name = field_str(obj, "name", ENTITY)?;
            let auto_increment = field_bool(obj, "autoIncrement", ENTITY)?;
            let key_path = key_path_from_value(&obj["keyPath"], ENTITY)?;
            let mut os = ObjectStoreSnapshot::create(name, auto_increment, key_path)?;
            for (idx_name, idx) in field_object(obj, "indices", ENTITY)? {
                os.create_index(idx_name, IndexRecord::from_value(idx_name, idx)?)?;
            }
            for rec in field_array(obj, "data", ENTITY)? {
                os.add_record(rec.clone())?;
            }
            Ok(os)
        })
    }
}
