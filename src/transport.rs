//! Transport form (JSON-совместимая вложенность) и общий разбор с проверкой ключей.
//!
//! Каждая сущность описывает себя через `Schema` (имя + обязательные ключи) и
//! небольшую builder-функцию. `decode()` проверяет, что значение — объект и что все
//! обязательные ключи на месте, и только потом зовёт builder.
//!
//! Формат (стабильный, на него опираются внешние инструменты):
//!   SessionSnapshot     := { name, url, fileExt, cookies, localStorage, indexedDb }
//!   StoreSnapshot       := { url, databases: { dbName: DatabaseSnapshot } }
//!   DatabaseSnapshot    := { name, version, objectStores: { osName: ObjectStoreSnapshot } }
//!   ObjectStoreSnapshot := { name, autoIncrement, keyPath, indices, data }

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{Result, SnapshotError};

/// Описание transport-формы сущности.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub entity: &'static str,
    pub required: &'static [&'static str],
}

/// Сущность, которая умеет выгружаться в transport-форму и собираться обратно.
pub trait Transport: Sized {
    fn to_transport(&self) -> Value;
    fn from_transport(value: &Value) -> Result<Self>;
}

/// Общий разбор: объект + все обязательные ключи, затем builder.
pub fn decode<T, F>(value: &Value, schema: &Schema, build: F) -> Result<T>
where
    F: FnOnce(&Map<String, Value>) -> Result<T>,
{
    let obj = value.as_object().ok_or_else(|| {
        SnapshotError::schema(schema.entity, format!("expected an object, got {}", kind_of(value)))
    })?;
    for key in schema.required {
        if !obj.contains_key(*key) {
            return Err(SnapshotError::schema(
                schema.entity,
                format!("could not find key \"{key}\""),
            ));
        }
    }
    build(obj)
}

pub(crate) fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// --------- typed field accessors ----------

pub(crate) fn field_str<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    entity: &'static str,
) -> Result<&'a str> {
    match obj.get(key) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(SnapshotError::schema(
            entity,
            format!("\"{key}\" must be a string, got {}", kind_of(other)),
        )),
        None => Err(SnapshotError::schema(entity, format!("could not find key \"{key}\""))),
    }
}

pub(crate) fn field_bool(obj: &Map<String, Value>, key: &str, entity: &'static str) -> Result<bool> {
    match obj.get(key) {
        Some(Value::Bool(b)) => Ok(*b),
        // JS отдаёт undefined -> null для некоторых полей схемы
        Some(Value::Null) => Ok(false),
        Some(other) => Err(SnapshotError::schema(
            entity,
            format!("\"{key}\" must be a bool, got {}", kind_of(other)),
        )),
        None => Err(SnapshotError::schema(entity, format!("could not find key \"{key}\""))),
    }
}

pub(crate) fn field_u64(obj: &Map<String, Value>, key: &str, entity: &'static str) -> Result<u64> {
    match obj.get(key) {
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
            SnapshotError::schema(entity, format!("\"{key}\" must be a non-negative integer, got {n}"))
        }),
        Some(other) => Err(SnapshotError::schema(
            entity,
            format!("\"{key}\" must be an integer, got {}", kind_of(other)),
        )),
        None => Err(SnapshotError::schema(entity, format!("could not find key \"{key}\""))),
    }
}

pub(crate) fn field_object<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    entity: &'static str,
) -> Result<&'a Map<String, Value>> {
    match obj.get(key) {
        Some(Value::Object(m)) => Ok(m),
        Some(other) => Err(SnapshotError::schema(
            entity,
            format!("\"{key}\" must be an object, got {}", kind_of(other)),
        )),
        None => Err(SnapshotError::schema(entity, format!("could not find key \"{key}\""))),
    }
}

pub(crate) fn field_array<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    entity: &'static str,
) -> Result<&'a Vec<Value>> {
    match obj.get(key) {
        Some(Value::Array(a)) => Ok(a),
        Some(other) => Err(SnapshotError::schema(
            entity,
            format!("\"{key}\" must be an array, got {}", kind_of(other)),
        )),
        None => Err(SnapshotError::schema(entity, format!("could not find key \"{key}\""))),
    }
}

/// {str: str} (cookies / localStorage).
pub(crate) fn field_string_map(
    obj: &Map<String, Value>,
    key: &str,
    entity: &'static str,
) -> Result<BTreeMap<String, String>> {
    let m = field_object(obj, key, entity)?;
    let mut out = BTreeMap::new();
    for (k, v) in m {
        match v {
            Value::String(s) => {
                out.insert(k.clone(), s.clone());
            }
            other => {
                return Err(SnapshotError::schema(
                    entity,
                    format!("\"{key}.{k}\" must be a string, got {}", kind_of(other)),
                ))
            }
        }
    }
    Ok(out)
}

pub(crate) fn string_map_value(m: &BTreeMap<String, String>) -> Value {
    Value::Object(
        m.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

// --------- key paths ----------

/// Единое правило для частей keyPath: обрезать пробелы, пустые части выбросить.
/// Его применяют и конструкторы, и разбор transport-формы.
pub fn normalize_key_path<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts
        .into_iter()
        .map(|p| p.as_ref().trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Разбор keyPath: null / "" -> [], "a" -> ["a"], ["a","b"] -> как есть (после нормализации).
pub fn key_path_from_value(v: &Value, entity: &'static str) -> Result<Vec<String>> {
    match v {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(normalize_key_path([s])),
        Value::Array(items) => {
            let parts = items
                .iter()
                .map(|it| match it {
                    Value::String(s) => Ok(s.as_str()),
                    other => Err(SnapshotError::schema(
                        entity,
                        format!("keyPath elements must be strings, got {}", kind_of(other)),
                    )),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(normalize_key_path(parts))
        }
        other => Err(SnapshotError::schema(
            entity,
            format!("keyPath must be null, a string or an array, got {}", kind_of(other)),
        )),
    }
}

/// Запись keyPath: ровно один элемент схлопывается в строку.
pub fn key_path_to_value(path: &[String]) -> Value {
    if path.len() == 1 {
        Value::String(path[0].clone())
    } else {
        Value::Array(path.iter().cloned().map(Value::String).collect())
    }
}
