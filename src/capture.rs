//! Capture / restore orchestration поверх внешнего коллаборатора.
//!
//! Ядро не ходит в браузер само: всё общение со страницей (скрипты, ожидание логина,
//! поиск профилей) — за трейтами `StorageBackend` / `ProfileSource`. Коллаборатор
//! возвращает уже готовый результат; никаких poll/sleep циклов здесь нет.
//!
//! Capture (на каждый object store):
//!   Scanning -> SchemaCaptured -> (в layout: DataDeferred | иначе: DataCaptured) -> StoreReady
//! Restore:
//!   SchemaApplied -> (в layout: ExternalRestorePending | иначе: DataInserted) -> DatabaseReady
//!
//! Любая ошибка обрывает весь вызов — частичный снапшот валидным не считается.

use log::{debug, info, warn};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::config::SiteConfig;
use crate::database::{self, DatabaseSnapshot};
use crate::error::{Result, SnapshotError};
use crate::object_store::{ObjectStoreSnapshot, Record, OBJECT_STORE_SCHEMA};
use crate::session::SessionSnapshot;
use crate::special::{
    decode_record, encode_record, SpecialData, SpecialTreatmentHook, SpecialTreatmentLayout,
};
use crate::store::StoreSnapshot;
use crate::transport::{decode, field_array, kind_of, Transport};

/// Живая страница сайта (внешний коллаборатор).
pub trait StorageBackend {
    /// Дождаться завершения логина (таймауты — забота коллаборатора).
    fn wait_for_login(&mut self) -> Result<bool>;

    fn cookies(&mut self) -> Result<BTreeMap<String, String>>;
    fn set_cookies(&mut self, cookies: &BTreeMap<String, String>) -> Result<()>;

    fn simple_storage(&mut self) -> Result<BTreeMap<String, String>>;
    fn set_simple_storage(&mut self, storage: &BTreeMap<String, String>) -> Result<()>;

    /// `{dbName: DatabaseSnapshot}` в transport-форме. Для stores из layout данные
    /// не выгружаются (`data = []`), схема — полностью.
    fn database_schema(&mut self, layout: &SpecialTreatmentLayout) -> Result<Value>;

    /// clear + bulk insert одного object store.
    fn replace_object_store(
        &mut self,
        database: &str,
        object_store: &str,
        records: &[Record],
    ) -> Result<()>;
}

/// Перечисление профилей браузера (внешний коллаборатор).
pub trait ProfileSource {
    fn profiles(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Scanning,
    SchemaCaptured,
    DataDeferred,
    DataCaptured,
    StoreReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePhase {
    SchemaApplied,
    ExternalRestorePending,
    DataInserted,
    DatabaseReady,
}

type StoreKey = (String, String);

fn key(db: &str, os: &str) -> StoreKey {
    (db.to_string(), os.to_string())
}

// --------- capture ----------

pub struct StoreCapture<'a> {
    layout: &'a SpecialTreatmentLayout,
    phases: BTreeMap<StoreKey, CapturePhase>,
}

impl<'a> StoreCapture<'a> {
    pub fn new(layout: &'a SpecialTreatmentLayout) -> Self {
        Self {
            layout,
            phases: BTreeMap::new(),
        }
    }

    pub fn phase(&self, database: &str, object_store: &str) -> Option<CapturePhase> {
        self.phases.get(&key(database, object_store)).copied()
    }

    fn set_phase(&mut self, db: &str, os: &str, phase: CapturePhase) {
        debug!("capture: {db}/{os} -> {phase:?}");
        self.phases.insert(key(db, os), phase);
    }

    pub fn run<B, H>(&mut self, site_url: &str, backend: &mut B, hook: &mut H) -> Result<StoreSnapshot>
    where
        B: StorageBackend + ?Sized,
        H: SpecialTreatmentHook + ?Sized,
    {
        let schema = backend.database_schema(self.layout)?;
        let dbs = schema.as_object().ok_or_else(|| {
            SnapshotError::schema(
                "StoreSnapshot",
                format!("database listing must be an object, got {}", kind_of(&schema)),
            )
        })?;

        let mut store = StoreSnapshot::new(site_url);
        for db_val in dbs.values() {
            let db = self.capture_database(db_val)?;
            info!(
                "capture: database '{}' v{} ({} object stores)",
                db.name(),
                db.version(),
                db.object_store_count()
            );
            store.add_database(db)?;
        }

        // Stores из layout обязаны существовать в схеме.
        for (db, os) in self.layout.entries() {
            store.get_database(db)?.object_store(os)?;
        }

        if !self.layout.is_empty() {
            let data = hook.capture(self.layout)?;
            data.ensure_covers(self.layout)?;
            for (db, os) in self.layout.entries() {
                let records = data.get(db, os).unwrap_or_default();
                let binary_key = self.layout.binary_key(os);
                let target = store.get_database_mut(db)?.object_store_mut(os)?;
                for raw in records {
                    target.add_record(encode_record(raw, binary_key)?)?;
                }
                debug!("capture: {db}/{os} special records={}", records.len());
            }
        }

        let keys: Vec<StoreKey> = self.phases.keys().cloned().collect();
        for (db, os) in keys {
            self.set_phase(&db, &os, CapturePhase::StoreReady);
        }
        Ok(store)
    }

    fn capture_database(&mut self, db_val: &Value) -> Result<DatabaseSnapshot> {
        database::decode_with(db_val, |db, os_val| self.capture_object_store(db, os_val))
    }

    fn capture_object_store(&mut self, db: &str, os_val: &Value) -> Result<ObjectStoreSnapshot> {
        let (schema_only, records) = decode(os_val, &OBJECT_STORE_SCHEMA, |obj| {
            let records = field_array(obj, "data", OBJECT_STORE_SCHEMA.entity)?.clone();
            let mut schema_only = obj.clone();
            schema_only.insert("data".into(), Value::Array(Vec::new()));
            Ok((Value::Object(schema_only), records))
        })?;

        let name = schema_only
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        self.set_phase(db, &name, CapturePhase::Scanning);

        let mut os = ObjectStoreSnapshot::from_transport(&schema_only)?;
        self.set_phase(db, os.name(), CapturePhase::SchemaCaptured);

        if self.layout.contains(db, os.name()) {
            if !records.is_empty() {
                warn!(
                    "capture: {db}/{} is special-treated, dropping {} generic records",
                    os.name(),
                    records.len()
                );
            }
            os.clear_data();
            self.set_phase(db, os.name(), CapturePhase::DataDeferred);
        } else {
            for rec in records {
                os.add_record(rec)?;
            }
            self.set_phase(db, os.name(), CapturePhase::DataCaptured);
        }
        Ok(os)
    }
}

// --------- restore ----------

pub struct StoreRestore<'a> {
    layout: &'a SpecialTreatmentLayout,
    phases: BTreeMap<StoreKey, RestorePhase>,
}

impl<'a> StoreRestore<'a> {
    pub fn new(layout: &'a SpecialTreatmentLayout) -> Self {
        Self {
            layout,
            phases: BTreeMap::new(),
        }
    }

    pub fn phase(&self, database: &str, object_store: &str) -> Option<RestorePhase> {
        self.phases.get(&key(database, object_store)).copied()
    }

    fn set_phase(&mut self, db: &str, os: &str, phase: RestorePhase) {
        debug!("restore: {db}/{os} -> {phase:?}");
        self.phases.insert(key(db, os), phase);
    }

    /// Данные для hook'а из снимка. Ничего не пишет: вызывается до любых записей
    /// в страницу, чтобы неполный снимок отсекался без побочных эффектов.
    pub fn special_data(&self, snapshot: &StoreSnapshot) -> Result<SpecialData> {
        // Снимок обязан нести каждый store из layout, иначе hook'у нечего восстанавливать.
        let mut special = SpecialData::new();
        for (db, os) in self.layout.entries() {
            let store = snapshot
                .get_database(db)
                .and_then(|d| d.object_store(os))
                .map_err(|_| SnapshotError::incomplete(db, os))?;
            let binary_key = self.layout.binary_key(os);
            let records = store
                .data()
                .iter()
                .map(|r| decode_record(r, binary_key))
                .collect::<Result<Vec<_>>>()?;
            special.insert(db, os, records);
        }
        Ok(special)
    }

    pub fn run<B, H>(&mut self, snapshot: &StoreSnapshot, backend: &mut B, hook: &mut H) -> Result<()>
    where
        B: StorageBackend + ?Sized,
        H: SpecialTreatmentHook + ?Sized,
    {
        let special = self.special_data(snapshot)?;
        self.apply(snapshot, &special, backend, hook)
    }

    /// Запись в страницу по заранее подготовленным `special_data`.
    pub fn apply<B, H>(
        &mut self,
        snapshot: &StoreSnapshot,
        special: &SpecialData,
        backend: &mut B,
        hook: &mut H,
    ) -> Result<()>
    where
        B: StorageBackend + ?Sized,
        H: SpecialTreatmentHook + ?Sized,
    {
        for db in snapshot.databases() {
            for os in db.object_stores() {
                self.set_phase(db.name(), os.name(), RestorePhase::SchemaApplied);
                if self.layout.contains(db.name(), os.name()) {
                    self.set_phase(db.name(), os.name(), RestorePhase::ExternalRestorePending);
                } else {
                    backend.replace_object_store(db.name(), os.name(), os.data())?;
                    self.set_phase(db.name(), os.name(), RestorePhase::DataInserted);
                }
            }
        }

        if !self.layout.is_empty() {
            info!("restore: handing {} special stores to hook", special.len());
            hook.restore(self.layout, special)?;
        }

        for db in snapshot.databases() {
            for os in db.object_stores() {
                self.set_phase(db.name(), os.name(), RestorePhase::DatabaseReady);
            }
            info!("restore: database '{}' ready", db.name());
        }
        Ok(())
    }
}

// --------- session level ----------

/// Снять сессию с живой страницы: cookies, simple storage, IndexedDB.
pub fn capture_session<B, H>(config: &SiteConfig, backend: &mut B, hook: &mut H) -> Result<SessionSnapshot>
where
    B: StorageBackend + ?Sized,
    H: SpecialTreatmentHook + ?Sized,
{
    if !backend.wait_for_login()? {
        return Err(SnapshotError::LoginIncomplete(format!(
            "{} did not finish loading",
            config.site_name
        )));
    }
    let cookies = backend.cookies()?;
    let simple_storage = backend.simple_storage()?;
    let store = StoreCapture::new(&config.layout).run(&config.site_url, backend, hook)?;
    info!(
        "capture: {} cookies={}, localStorage={}, databases={}",
        config.site_name,
        cookies.len(),
        simple_storage.len(),
        store.database_count()
    );
    let mut session = SessionSnapshot::new(&config.site_name, &config.site_url, &config.file_ext);
    session.cookies = cookies;
    session.simple_storage = simple_storage;
    session.store = store;
    Ok(session)
}

/// Проиграть сессию обратно: cookies, simple storage, затем IndexedDB.
pub fn restore_session<B, H>(
    session: &SessionSnapshot,
    layout: &SpecialTreatmentLayout,
    backend: &mut B,
    hook: &mut H,
) -> Result<()>
where
    B: StorageBackend + ?Sized,
    H: SpecialTreatmentHook + ?Sized,
{
    let mut restore = StoreRestore::new(layout);
    let special = restore.special_data(&session.store)?;
    backend.set_cookies(&session.cookies)?;
    backend.set_simple_storage(&session.simple_storage)?;
    restore.apply(&session.store, &special, backend, hook)?;
    info!("restore: {} written", session.site_name());
    Ok(())
}

/// Снять сессии со всех профилей. `open` поднимает коллаборатор для конкретного профиля.
pub fn capture_profiles<P, F, B, H>(
    config: &SiteConfig,
    source: &P,
    mut open: F,
) -> Result<BTreeMap<String, SessionSnapshot>>
where
    P: ProfileSource + ?Sized,
    F: FnMut(&str) -> Result<(B, H)>,
    B: StorageBackend,
    H: SpecialTreatmentHook,
{
    let mut out = BTreeMap::new();
    for profile in source.profiles()? {
        info!("capture: profile '{profile}'");
        let (mut backend, mut hook) = open(&profile)?;
        let session = capture_session(config, &mut backend, &mut hook)?;
        out.insert(profile, session);
    }
    Ok(out)
}
