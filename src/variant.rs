//! Определение версии веб-клиента по ключам localStorage.
//!
//! Правило совпадает, если в simple storage есть все его ключи. Порядок правил значим:
//! побеждает первое совпавшее.

use serde::{Deserialize, Serialize};

use crate::session::SessionSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantRule {
    pub name: String,
    pub required_keys: Vec<String>,
}

impl VariantRule {
    pub fn new<I, S>(name: &str, required_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            required_keys: required_keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Классический клиент (токены) и multi-device.
    pub fn whatsapp_defaults() -> Vec<Self> {
        vec![
            VariantRule::new("default", ["WAToken1", "WAToken2"]),
            VariantRule::new("multi-device", ["WANoiseInfo"]),
        ]
    }

    pub fn matches(&self, session: &SessionSnapshot) -> bool {
        !self.required_keys.is_empty()
            && self
                .required_keys
                .iter()
                .all(|k| session.simple_storage.contains_key(k))
    }
}

pub fn detect_variant<'a>(
    session: &SessionSnapshot,
    rules: &'a [VariantRule],
) -> Option<&'a VariantRule> {
    rules.iter().find(|r| r.matches(session))
}
