use anyhow::Result;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use SessionVault::{
    capture_profiles, capture_session, restore_session, CapturePhase, ErrorKind, ProfileSource,
    RawRecord, RawValue, Record, RestorePhase, SiteConfig, SpecialData, SpecialTreatmentHook,
    SpecialTreatmentLayout, StorageBackend, StoreCapture, StoreRestore,
};

/// Страница в памяти: отдаёт фиксированную схему, пишет restore в журнал.
struct MemPage {
    logged_in: bool,
    cookies: BTreeMap<String, String>,
    storage: BTreeMap<String, String>,
    databases: Value,
    replaced: Vec<(String, String, usize)>,
}

impl MemPage {
    fn new() -> Self {
        let mut storage = BTreeMap::new();
        storage.insert("WASecretBundle".to_string(), "{}".to_string());
        let mut cookies = BTreeMap::new();
        cookies.insert("wa_lang_pref".to_string(), "en".to_string());
        Self {
            logged_in: true,
            cookies,
            storage,
            databases: json!({
                "wawc": {
                    "name": "wawc",
                    "version": 1,
                    "objectStores": {
                        "user": {
                            "name": "user",
                            "autoIncrement": false,
                            "keyPath": [],
                            "indices": {"id": {"unique": true, "keyPath": [], "multiEntry": false}},
                            "data": [{"id": "a", "v": "1"}, {"id": "b", "v": "2"}]
                        }
                    }
                },
                "fts-storage": {
                    "name": "fts-storage",
                    "version": 3,
                    "objectStores": {
                        "fts-v3-index": {
                            "name": "fts-v3-index",
                            "autoIncrement": false,
                            "keyPath": "key",
                            "indices": {},
                            "data": [{"key": "stale", "data": "ignored"}]
                        }
                    }
                }
            }),
            replaced: Vec::new(),
        }
    }
}

impl StorageBackend for MemPage {
    fn wait_for_login(&mut self) -> SessionVault::Result<bool> {
        Ok(self.logged_in)
    }

    fn cookies(&mut self) -> SessionVault::Result<BTreeMap<String, String>> {
        Ok(self.cookies.clone())
    }

    fn set_cookies(&mut self, cookies: &BTreeMap<String, String>) -> SessionVault::Result<()> {
        self.cookies.extend(cookies.clone());
        Ok(())
    }

    fn simple_storage(&mut self) -> SessionVault::Result<BTreeMap<String, String>> {
        Ok(self.storage.clone())
    }

    fn set_simple_storage(&mut self, storage: &BTreeMap<String, String>) -> SessionVault::Result<()> {
        self.storage.extend(storage.clone());
        Ok(())
    }

    fn database_schema(&mut self, _layout: &SpecialTreatmentLayout) -> SessionVault::Result<Value> {
        Ok(self.databases.clone())
    }

    fn replace_object_store(
        &mut self,
        database: &str,
        object_store: &str,
        records: &[Record],
    ) -> SessionVault::Result<()> {
        self.replaced
            .push((database.to_string(), object_store.to_string(), records.len()));
        Ok(())
    }
}

/// Hook, который отдаёт заранее заданные записи и запоминает restore.
#[derive(Default)]
struct MemHook {
    captured: SpecialData,
    restored: Option<SpecialData>,
}

impl SpecialTreatmentHook for MemHook {
    fn capture(&mut self, _layout: &SpecialTreatmentLayout) -> SessionVault::Result<SpecialData> {
        Ok(self.captured.clone())
    }

    fn restore(
        &mut self,
        _layout: &SpecialTreatmentLayout,
        data: &SpecialData,
    ) -> SessionVault::Result<()> {
        self.restored = Some(data.clone());
        Ok(())
    }
}

fn fts_layout() -> SpecialTreatmentLayout {
    SpecialTreatmentLayout::whatsapp_default().with_binary_key("fts-v3-index", "data")
}

fn fts_record(key: &str, bytes: &[u8]) -> RawRecord {
    let mut r = RawRecord::new();
    r.insert("key".into(), RawValue::Json(json!(key)));
    r.insert("data".into(), RawValue::Bytes(bytes.to_vec()));
    r
}

fn full_hook() -> MemHook {
    let mut captured = SpecialData::new();
    captured.insert(
        "fts-storage",
        "fts-v3-index",
        vec![fts_record("k1", &[0, 1, 255]), fts_record("k2", &[])],
    );
    MemHook {
        captured,
        restored: None,
    }
}

fn config() -> SiteConfig {
    SiteConfig::default().with_layout(fts_layout())
}

#[test]
fn capture_with_full_coverage() -> Result<()> {
    let layout = fts_layout();
    let mut page = MemPage::new();
    let mut hook = full_hook();

    let mut cap = StoreCapture::new(&layout);
    let store = cap.run("https://web.whatsapp.com/", &mut page, &mut hook)?;

    assert_eq!(store.database_count(), 2);
    assert_eq!(store.get_database("wawc")?.object_store("user")?.len(), 2);

    // Данные special store пришли из hook'а, общие отброшены
    let fts = store.get_database("fts-storage")?.object_store("fts-v3-index")?;
    assert_eq!(fts.key_path(), ["key".to_string()]);
    let data: Vec<Value> = fts.data().iter().cloned().map(Value::Object).collect();
    assert_eq!(
        data,
        vec![
            json!({"key": "k1", "data": [0, 1, 255]}),
            json!({"key": "k2", "data": []}),
        ]
    );

    assert_eq!(cap.phase("wawc", "user"), Some(CapturePhase::StoreReady));
    assert_eq!(
        cap.phase("fts-storage", "fts-v3-index"),
        Some(CapturePhase::StoreReady)
    );
    assert_eq!(cap.phase("wawc", "nope"), None);
    Ok(())
}

#[test]
fn capture_without_layout_entry_is_incomplete() -> Result<()> {
    let layout = fts_layout();
    let mut page = MemPage::new();
    let mut hook = MemHook::default();

    let mut cap = StoreCapture::new(&layout);
    let err = cap
        .run("https://web.whatsapp.com/", &mut page, &mut hook)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncompleteSpecialTreatment);
    assert!(err.to_string().contains("fts-v3-index"), "{err}");

    // Пустой список записей — это покрытие
    let mut hook = MemHook::default();
    hook.captured.insert("fts-storage", "fts-v3-index", Vec::new());
    let store = StoreCapture::new(&layout).run("u", &mut page, &mut hook)?;
    assert!(store
        .get_database("fts-storage")?
        .object_store("fts-v3-index")?
        .is_empty());
    Ok(())
}

#[test]
fn layout_store_missing_from_schema_is_not_found() {
    let layout = fts_layout().with_store("wawc", "ghost");
    let mut page = MemPage::new();
    let mut hook = full_hook();
    let err = StoreCapture::new(&layout)
        .run("u", &mut page, &mut hook)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn bytes_outside_binary_key_fail_capture() {
    let layout = SpecialTreatmentLayout::whatsapp_default();
    let mut page = MemPage::new();
    let mut hook = full_hook();
    let err = StoreCapture::new(&layout)
        .run("u", &mut page, &mut hook)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn empty_layout_is_plain_generic_capture() -> Result<()> {
    let layout = SpecialTreatmentLayout::new();
    let mut page = MemPage::new();
    let mut hook = SessionVault::NoSpecialTreatment;
    let mut cap = StoreCapture::new(&layout);
    let store = cap.run("u", &mut page, &mut hook)?;
    let fts = store.get_database("fts-storage")?.object_store("fts-v3-index")?;
    assert_eq!(fts.len(), 1);
    Ok(())
}

#[test]
fn restore_routes_generic_and_special_stores() -> Result<()> {
    let cfg = config();
    let mut page = MemPage::new();
    let mut hook = full_hook();
    let session = capture_session(&cfg, &mut page, &mut hook)?;

    let mut target = MemPage::new();
    target.cookies.clear();
    target.storage.clear();
    let mut sink = MemHook::default();

    let mut restore = StoreRestore::new(&cfg.layout);
    restore.run(&session.store, &mut target, &mut sink)?;

    assert_eq!(target.replaced, vec![("wawc".to_string(), "user".to_string(), 2)]);
    let restored = sink.restored.expect("hook restore called");
    assert_eq!(
        restored.get("fts-storage", "fts-v3-index"),
        Some(&[fts_record("k1", &[0, 1, 255]), fts_record("k2", &[])][..])
    );
    assert_eq!(restore.phase("wawc", "user"), Some(RestorePhase::DatabaseReady));
    assert_eq!(
        restore.phase("fts-storage", "fts-v3-index"),
        Some(RestorePhase::DatabaseReady)
    );
    Ok(())
}

#[test]
fn restore_session_writes_cookies_and_storage() -> Result<()> {
    let cfg = config();
    let mut page = MemPage::new();
    let mut hook = full_hook();
    let session = capture_session(&cfg, &mut page, &mut hook)?;
    assert_eq!(session.site_name(), "WhatsApp Web");
    assert_eq!(session.cookies.get("wa_lang_pref").map(String::as_str), Some("en"));

    let mut target = MemPage::new();
    target.cookies.clear();
    target.storage.clear();
    let mut sink = MemHook::default();
    restore_session(&session, &cfg.layout, &mut target, &mut sink)?;
    assert_eq!(target.cookies, session.cookies);
    assert_eq!(target.storage, session.simple_storage);
    assert!(sink.restored.is_some());
    Ok(())
}

#[test]
fn restore_without_layout_store_is_incomplete() -> Result<()> {
    let cfg = config();
    let mut page = MemPage::new();
    let mut hook = full_hook();
    let session = capture_session(&cfg, &mut page, &mut hook)?;

    // Layout шире, чем снимок
    let wider = cfg.layout.clone().with_store("model-storage", "message");
    let mut target = MemPage::new();
    target.cookies.clear();
    target.storage.clear();
    target.storage.insert("keep".into(), "1".into());
    let mut sink = MemHook::default();
    let err = restore_session(&session, &wider, &mut target, &mut sink).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncompleteSpecialTreatment);
    assert!(sink.restored.is_none());

    // Страница не тронута: ни cookies, ни localStorage, ни object stores
    assert!(target.cookies.is_empty());
    assert_eq!(target.storage.len(), 1);
    assert_eq!(target.storage.get("keep").map(String::as_str), Some("1"));
    assert!(target.replaced.is_empty());
    Ok(())
}

#[test]
fn capture_requires_finished_login() {
    let cfg = config();
    let mut page = MemPage::new();
    page.logged_in = false;
    let mut hook = full_hook();
    let err = capture_session(&cfg, &mut page, &mut hook).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LoginIncomplete);
}

struct Profiles(Vec<&'static str>);

impl ProfileSource for Profiles {
    fn profiles(&self) -> SessionVault::Result<Vec<String>> {
        Ok(self.0.iter().map(|s| s.to_string()).collect())
    }
}

#[test]
fn capture_profiles_opens_each_profile() -> Result<()> {
    let cfg = config();
    let source = Profiles(vec!["Default", "Profile 1"]);
    let mut opened = Vec::new();
    let sessions = capture_profiles(&cfg, &source, |profile| {
        opened.push(profile.to_string());
        let mut page = MemPage::new();
        if profile != "Default" {
            page.storage.clear();
        }
        Ok((page, full_hook()))
    })?;
    assert_eq!(opened, vec!["Default".to_string(), "Profile 1".to_string()]);
    assert_eq!(sessions.len(), 2);
    assert!(sessions["Default"].is_logged_in(&cfg.login_markers));
    assert!(!sessions["Profile 1"].is_logged_in(&cfg.login_markers));
    Ok(())
}

#[test]
fn capture_rejects_database_with_zero_version() {
    let layout = SpecialTreatmentLayout::new();
    let mut page = MemPage::new();
    page.databases["wawc"]["version"] = json!(0);
    let err = StoreCapture::new(&layout)
        .run("u", &mut page, &mut SessionVault::NoSpecialTreatment)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    page.databases["wawc"]["version"] = json!(-1);
    let err = StoreCapture::new(&layout)
        .run("u", &mut page, &mut SessionVault::NoSpecialTreatment)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
}
