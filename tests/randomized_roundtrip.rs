//! Рандомизированные проверки: случайные снимки переживают JSON round-trip
//! без изменений, а unique-индекс принимает ровно множество различных ключей.

use anyhow::Result;
use oorandom::Rand64;
use serde_json::{json, Value};
use std::collections::BTreeSet;

use SessionVault::{
    DatabaseSnapshot, ErrorKind, IndexRecord, ObjectStoreSnapshot, SessionSnapshot, StoreSnapshot,
    Transport,
};

fn random_word(rng: &mut Rand64, max_len: u64) -> String {
    let len = 1 + rng.rand_range(0..max_len) as usize;
    (0..len)
        .map(|_| (b'a' + rng.rand_range(0..26) as u8) as char)
        .collect()
}

fn random_scalar(rng: &mut Rand64) -> Value {
    match rng.rand_range(0..6) {
        0 => Value::Null,
        1 => json!(rng.rand_range(0..2) == 1),
        2 => json!(rng.rand_range(0..1_000_000)),
        3 => json!(rng.rand_range(0..10_000) as f64 / 4.0),
        4 => json!(random_word(rng, 12)),
        _ => json!((0..rng.rand_range(0..8)).map(|_| rng.rand_range(0..256)).collect::<Vec<_>>()),
    }
}

fn random_record(rng: &mut Rand64, seq: u64) -> Value {
    let mut m = serde_json::Map::new();
    m.insert("id".into(), json!(seq));
    for _ in 0..rng.rand_range(0..5) {
        m.insert(format!("f_{}", random_word(rng, 6)), random_scalar(rng));
    }
    if rng.rand_range(0..3) == 0 {
        m.insert("nested".into(), json!({"inner": random_scalar(rng)}));
    }
    Value::Object(m)
}

fn random_object_store(rng: &mut Rand64, name: &str) -> Result<ObjectStoreSnapshot> {
    let key_path: Vec<String> = match rng.rand_range(0..3) {
        0 => Vec::new(),
        1 => vec!["id".to_string()],
        _ => vec!["id".to_string(), "nested.inner".to_string()],
    };
    let mut os = ObjectStoreSnapshot::create(name, rng.rand_range(0..2) == 1, key_path)?;
    os.create_index("id", IndexRecord::new(true))?;
    if rng.rand_range(0..2) == 1 {
        os.create_index(
            "by_inner",
            IndexRecord::new(false)
                .with_key_path(["nested.inner"])
                .with_multi_entry(rng.rand_range(0..2) == 1),
        )?;
    }
    for seq in 0..rng.rand_range(0..20) {
        os.add_record(random_record(rng, seq))?;
    }
    Ok(os)
}

fn random_store(rng: &mut Rand64) -> Result<StoreSnapshot> {
    let mut store = StoreSnapshot::new("https://web.whatsapp.com/");
    let mut db_names = BTreeSet::new();
    for _ in 0..rng.rand_range(1..4) {
        db_names.insert(random_word(rng, 10));
    }
    for db_name in db_names {
        let version = 1 + rng.rand_range(0..100) as i64;
        let mut db = DatabaseSnapshot::create(&db_name, version)?;
        let mut os_names = BTreeSet::new();
        for _ in 0..rng.rand_range(0..5) {
            os_names.insert(random_word(rng, 10));
        }
        for os_name in os_names {
            db.add_object_store(random_object_store(rng, &os_name)?)?;
        }
        store.add_database(db)?;
    }
    Ok(store)
}

#[test]
fn random_stores_round_trip_through_text() -> Result<()> {
    for i in 0..64u128 {
        let mut rng = Rand64::new(i * 0xC0FFEE + 1);
        let store = random_store(&mut rng)?;

        let text = serde_json::to_string(&store.to_transport())?;
        let back = StoreSnapshot::from_transport(&serde_json::from_str(&text)?)?;
        assert_eq!(back, store, "seed #{i}");
        assert_eq!(back.record_count(), store.record_count());
    }
    Ok(())
}

#[test]
fn random_sessions_round_trip() -> Result<()> {
    let mut rng = Rand64::new(0xA11CE);
    for _ in 0..16 {
        let mut s = SessionSnapshot::new("WhatsApp Web", "https://web.whatsapp.com/", "json");
        for _ in 0..rng.rand_range(0..6) {
            s.cookies.insert(random_word(&mut rng, 8), random_word(&mut rng, 20));
        }
        for _ in 0..rng.rand_range(0..6) {
            s.simple_storage
                .insert(random_word(&mut rng, 8), random_word(&mut rng, 20));
        }
        s.store = random_store(&mut rng)?;
        let back = SessionSnapshot::from_transport(&s.to_transport())?;
        assert_eq!(back, s);
    }
    Ok(())
}

#[test]
fn unique_index_accepts_exactly_distinct_keys() -> Result<()> {
    let mut rng = Rand64::new(0xDEADBEEF);
    let mut os = ObjectStoreSnapshot::new("user")?;
    os.create_index("id", IndexRecord::new(true))?;

    let mut seen = BTreeSet::new();
    for _ in 0..500 {
        let id = rng.rand_range(0..120);
        match os.add_record(json!({"id": id})) {
            Ok(()) => assert!(seen.insert(id), "duplicate {id} accepted"),
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::UniquenessViolation);
                assert!(seen.contains(&id), "fresh {id} rejected");
            }
        }
    }
    assert_eq!(os.len(), seen.len());
    Ok(())
}
