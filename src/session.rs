//! SessionSnapshot — сайт + cookies + simple storage (localStorage) + IndexedDB-снимок.
//!
//! Файл сессии — pretty JSON:
//!   { name, url, fileExt, cookies: {str:str}, localStorage: {str:str}, indexedDb: StoreSnapshot }
//!
//! Запись атомарная (tmp + rename) под эксклюзивным fs2-локом на `<file>.lock`.
//! Если путь не оканчивается на `.<fileExt>`, расширение дописывается.

use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, SnapshotError};
use crate::lock::acquire_exclusive;
use crate::store::StoreSnapshot;
use crate::transport::{
    decode, field_str, field_string_map, string_map_value, Schema, Transport,
};

const ENTITY: &str = "SessionSnapshot";

pub const SESSION_SCHEMA: Schema = Schema {
    entity: ENTITY,
    required: &["name", "url", "fileExt", "cookies", "localStorage", "indexedDb"],
};

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    site_name: String,
    site_url: String,
    file_ext: String,
    pub cookies: BTreeMap<String, String>,
    pub simple_storage: BTreeMap<String, String>,
    pub store: StoreSnapshot,
}

impl SessionSnapshot {
    pub fn new(site_name: &str, site_url: &str, file_ext: &str) -> Self {
        let site_url = site_url.trim();
        Self {
            site_name: site_name.trim().to_string(),
            site_url: site_url.to_string(),
            file_ext: normalize_ext(file_ext),
            cookies: BTreeMap::new(),
            simple_storage: BTreeMap::new(),
            store: StoreSnapshot::new(site_url),
        }
    }

    pub fn site_name(&self) -> &str {
        &self.site_name
    }

    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    pub fn file_ext(&self) -> &str {
        &self.file_ext
    }

    /// Есть ли в localStorage ключ, содержащий хотя бы один маркер логина.
    pub fn is_logged_in<S: AsRef<str>>(&self, markers: &[S]) -> bool {
        self.simple_storage
            .keys()
            .any(|k| markers.iter().any(|m| k.contains(m.as_ref())))
    }

    /// Путь с гарантированным расширением `.<fileExt>`.
    pub fn path_with_ext(&self, path: &Path) -> PathBuf {
        if self.file_ext.is_empty() {
            return path.to_path_buf();
        }
        let suffix = format!(".{}", self.file_ext);
        let has_ext = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(&suffix))
            .unwrap_or(false);
        if has_ext {
            path.to_path_buf()
        } else {
            let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            name.push(&suffix);
            path.with_file_name(name)
        }
    }

    /// Сохранить в файл (pretty JSON). Возвращает итоговый путь.
    pub fn save(&self, path: &Path) -> Result<PathBuf> {
        let path = self.path_with_ext(path);
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }

        let _guard = acquire_exclusive(&path)?;
        write_json_atomic(&path, &self.to_transport())?;
        info!("session: saved {} -> {}", self.site_name, path.display());
        Ok(path)
    }

    /// Загрузить из файла. Отсутствующий файл — NotFound, отсутствующий ключ — Schema.
    pub fn load(path: &Path) -> Result<Self> {
        let value = read_json(path)?;
        let session = Self::from_transport(&value)?;
        debug!(
            "session: loaded {} from {} (databases={})",
            session.site_name,
            path.display(),
            session.store.database_count()
        );
        Ok(session)
    }
}

fn normalize_ext(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_string()
}

/// tmp + rename; вызывающий держит лок, если нужен.
pub(crate) fn write_json_atomic(path: &Path, value: &Value) -> Result<()> {
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let json = serde_json::to_string_pretty(value)?;
    {
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        f.write_all(json.as_bytes())?;
        f.flush()?;
        let _ = f.sync_all();
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

pub(crate) fn read_json(path: &Path) -> Result<Value> {
    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SnapshotError::not_found("file", path.display().to_string())
        } else {
            SnapshotError::Io(e)
        }
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl Transport for SessionSnapshot {
    fn to_transport(&self) -> Value {
        let mut m = Map::new();
        m.insert("name".into(), Value::String(self.site_name.clone()));
        m.insert("url".into(), Value::String(self.site_url.clone()));
        m.insert("fileExt".into(), Value::String(self.file_ext.clone()));
        m.insert("cookies".into(), string_map_value(&self.cookies));
        m.insert("localStorage".into(), string_map_value(&self.simple_storage));
        m.insert("indexedDb".into(), self.store.to_transport());
        Value::Object(m)
    }

    fn from_transport(value: &Value) -> Result<Self> {
        decode(value, &SESSION_SCHEMA, |obj| {
            let mut session = SessionSnapshot::new(
                field_str(obj, "name", ENTITY)?,
                field_str(obj, "url", ENTITY)?,
                field_str(obj, "fileExt", ENTITY)?,
            );
            session.cookies = field_string_map(obj, "cookies", ENTITY)?;
            session.simple_storage = field_string_map(obj, "localStorage", ENTITY)?;
            session.store = StoreSnapshot::from_transport(&obj["indexedDb"])?;
            Ok(session)
        })
    }
}

/// Прочитать файл с несколькими профилями: `{profile: SessionSnapshot}`.
pub fn load_profiles(path: &Path) -> Result<BTreeMap<String, SessionSnapshot>> {
    let value = read_json(path)?;
    let obj = value.as_object().ok_or_else(|| {
        SnapshotError::schema("ProfileSet", "expected an object of profile -> session")
    })?;
    let mut out = BTreeMap::new();
    for (profile, v) in obj {
        out.insert(profile.clone(), SessionSnapshot::from_transport(v)?);
    }
    Ok(out)
}

/// Сохранить каждую залогиненную сессию в `<base>-<profile>`; вернуть число файлов.
pub fn save_all<S: AsRef<str>>(
    sessions: &BTreeMap<String, SessionSnapshot>,
    base: &Path,
    markers: &[S],
) -> Result<usize> {
    if sessions.is_empty() {
        return Err(SnapshotError::validation(
            "could not find any profiles in the list",
        ));
    }
    // Имя профиля становится частью имени файла: разделители пути недопустимы.
    for profile in sessions.keys() {
        if profile.trim().is_empty() || profile.contains(['/', '\\', '\0']) {
            return Err(SnapshotError::validation(format!(
                "profile name {profile:?} cannot be used in a file name"
            )));
        }
    }
    let base_name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut saved = 0usize;
    for (profile, session) in sessions {
        if !session.is_logged_in(markers) {
            debug!("session: profile '{profile}' has no active login, skipped");
            continue;
        }
        let target = base.with_file_name(format!("{base_name}-{profile}"));
        session.save(&target)?;
        saved += 1;
    }
    if saved == 0 {
        warn!("session: could not find any active profiles in the list");
    } else {
        info!("session: saved {saved} profile file(s)");
    }
    Ok(saved)
}
