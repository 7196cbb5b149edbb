use anyhow::{anyhow, Context, Result};
use log::warn;
use serde_json::json;
use std::path::{Path, PathBuf};

use crate::capture::{capture_session, restore_session};
use crate::config::SiteConfig;
use crate::dump::DumpFile;
use crate::session::{load_profiles, save_all, SessionSnapshot};
use crate::special::SpecialTreatmentLayout;
use crate::variant::detect_variant;

/// Снять сессию из дампа страницы и сохранить файл сессии. Возвращает итоговый путь.
pub fn cmd_capture(cfg: &SiteConfig, dump_path: &Path, out: &Path) -> Result<PathBuf> {
    let mut dump = DumpFile::open(dump_path)
        .with_context(|| format!("open page dump {}", dump_path.display()))?;
    if dump.url().trim() != cfg.site_url.trim() {
        warn!(
            "page dump was taken from {}, session is recorded for {}",
            dump.url(),
            cfg.site_url
        );
    }
    let (mut page, mut hook) = dump.split();
    let session = capture_session(cfg, &mut page, &mut hook)
        .with_context(|| format!("capture {} from {}", cfg.site_name, dump_path.display()))?;
    let path = session
        .save(out)
        .with_context(|| format!("save session {}", out.display()))?;
    println!(
        "captured: {} -> {} (cookies={}, localStorage={}, databases={}, records={})",
        session.site_name(),
        path.display(),
        session.cookies.len(),
        session.simple_storage.len(),
        session.store.database_count(),
        session.store.record_count()
    );
    Ok(path)
}

/// Проиграть файл сессии в дамп страницы и переписать дамп.
pub fn cmd_restore(
    layout: &SpecialTreatmentLayout,
    session_path: &Path,
    dump_path: &Path,
) -> Result<()> {
    let session = SessionSnapshot::load(session_path)
        .with_context(|| format!("load session {}", session_path.display()))?;
    let mut dump = DumpFile::open(dump_path)
        .with_context(|| format!("open page dump {}", dump_path.display()))?;
    {
        let (mut page, mut hook) = dump.split();
        restore_session(&session, layout, &mut page, &mut hook)
            .with_context(|| format!("restore {} into {}", session.site_name(), dump_path.display()))?;
    }
    dump.save()
        .with_context(|| format!("write page dump {}", dump_path.display()))?;
    println!(
        "restored: {} -> {}",
        session_path.display(),
        dump_path.display()
    );
    Ok(())
}

pub fn cmd_inspect(session_path: &Path, json: bool) -> Result<()> {
    let s = SessionSnapshot::load(session_path)
        .with_context(|| format!("load session {}", session_path.display()))?;

    if json {
        let dbs: Vec<_> = s
            .store
            .databases()
            .map(|db| {
                let stores: Vec<_> = db
                    .object_stores()
                    .map(|os| {
                        json!({
                            "name": os.name(),
                            "records": os.len(),
                            "indices": os.indices().len(),
                            "autoIncrement": os.auto_increment(),
                        })
                    })
                    .collect();
                json!({"name": db.name(), "version": db.version(), "objectStores": stores})
            })
            .collect();
        let out = json!({
            "name": s.site_name(),
            "url": s.site_url(),
            "fileExt": s.file_ext(),
            "cookies": s.cookies.len(),
            "localStorage": s.simple_storage.len(),
            "databases": dbs,
        });
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string()));
        return Ok(());
    }

    println!("Session {}", session_path.display());
    println!("  name         = {}", s.site_name());
    println!("  url          = {}", s.site_url());
    println!("  file_ext     = {}", s.file_ext());
    println!("  cookies      = {}", s.cookies.len());
    println!("  localStorage = {}", s.simple_storage.len());
    println!("  databases    = {}", s.store.database_count());
    for db in s.store.databases() {
        println!("  - {} (v{})", db.name(), db.version());
        for os in db.object_stores() {
            println!(
                "      {:24} records={} indices={} keyPath=[{}]",
                os.name(),
                os.len(),
                os.indices().len(),
                os.key_path().join(", ")
            );
        }
    }
    Ok(())
}

/// Проверить, что файл несёт активный логин; вывести определённую версию клиента.
pub fn cmd_check(cfg: &SiteConfig, session_path: &Path) -> Result<()> {
    let s = SessionSnapshot::load(session_path)
        .with_context(|| format!("load session {}", session_path.display()))?;
    if !s.is_logged_in(&cfg.login_markers) {
        return Err(anyhow!(
            "{}: no active login found (markers: {})",
            session_path.display(),
            cfg.login_markers.join(", ")
        ));
    }
    let variant = detect_variant(&s, &cfg.variants)
        .map(|v| v.name.as_str())
        .unwrap_or("(unknown)");
    println!("ok: {} logged in, variant={}", s.site_name(), variant);
    Ok(())
}

/// `{profile: session}` -> отдельные файлы `<out>-<profile>.<ext>`.
pub fn cmd_split(cfg: &SiteConfig, input: &Path, out: &Path) -> Result<usize> {
    let sessions =
        load_profiles(input).with_context(|| format!("read profiles {}", input.display()))?;
    let saved = save_all(&sessions, out, &cfg.login_markers)
        .with_context(|| format!("split into {}", out.display()))?;
    if saved == 0 {
        return Err(anyhow!("could not find any active profiles in {}", input.display()));
    }
    println!("split: {} profile file(s) written", saved);
    Ok(saved)
}

pub fn cmd_layout(cfg: &SiteConfig, json: bool) -> Result<()> {
    if json {
        let s = serde_json::to_string_pretty(&cfg.layout).context("serialize layout")?;
        println!("{s}");
        return Ok(());
    }
    if cfg.layout.is_empty() {
        println!("(no special-treatment stores)");
        return Ok(());
    }
    for (db, os) in cfg.layout.entries() {
        match cfg.layout.binary_key(os) {
            Some(field) => println!("{db}/{os} (binary field: {field})"),
            None => println!("{db}/{os}"),
        }
    }
    Ok(())
}
