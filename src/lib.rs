#![allow(non_snake_case)]

// Модель снапшота (листья -> агрегат)
pub mod error;
pub mod transport;
pub mod object_store;
pub mod database;
pub mod store;
pub mod session;

// Special treatment + capture/restore поверх внешнего коллаборатора
pub mod special;
pub mod capture;
pub mod variant;

pub mod config;
pub mod lock;

// Файловый коллаборатор (JSON-дамп страницы)
pub mod dump;

pub mod cli;

// Удобные реэкспорты
pub use capture::{
    capture_profiles, capture_session, restore_session, CapturePhase, ProfileSource,
    RestorePhase, StorageBackend, StoreCapture, StoreRestore,
};
pub use config::{SiteConfig, SiteConfigBuilder};
pub use database::DatabaseSnapshot;
pub use error::{ErrorKind, Result, SnapshotError};
pub use object_store::{IndexRecord, ObjectStoreSnapshot, Record};
pub use session::{load_profiles, save_all, SessionSnapshot};
pub use special::{
    NoSpecialTreatment, RawRecord, RawValue, SpecialData, SpecialTreatmentHook,
    SpecialTreatmentLayout,
};
pub use store::StoreSnapshot;
pub use transport::Transport;
pub use variant::{detect_variant, VariantRule};
