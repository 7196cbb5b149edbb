//! Centralized configuration for a captured site.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - SiteConfig::from_env() reads SV_* variables on top of the defaults.
//! - SiteConfigBuilder for callers (CLI, tests) that want explicit overrides.
//!
//! Env:
//! - SV_SITE_NAME      — display name (default "WhatsApp Web")
//! - SV_SITE_URL       — page to capture (default "https://web.whatsapp.com/")
//! - SV_FILE_EXT       — session file extension (default "json")
//! - SV_LAYOUT_FILE    — JSON special-treatment layout ({"layout":{..},"keyMap":{..}})
//! - SV_LOGIN_MARKERS  — comma list of localStorage key markers of a logged-in session

use std::fmt;
use std::path::Path;

use crate::error::Result;
use crate::special::SpecialTreatmentLayout;
use crate::variant::VariantRule;

pub const DEFAULT_SITE_NAME: &str = "WhatsApp Web";
pub const DEFAULT_SITE_URL: &str = "https://web.whatsapp.com/";
pub const DEFAULT_FILE_EXT: &str = "json";
pub const DEFAULT_LOGIN_MARKERS: &[&str] = &["WASecretBundle", "logout-token"];

#[derive(Clone, Debug)]
pub struct SiteConfig {
    pub site_name: String,
    pub site_url: String,
    /// Без ведущей точки.
    pub file_ext: String,
    pub layout: SpecialTreatmentLayout,
    pub login_markers: Vec<String>,
    /// Правила определения версии клиента (первое совпавшее побеждает).
    pub variants: Vec<VariantRule>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site_name: DEFAULT_SITE_NAME.to_string(),
            site_url: DEFAULT_SITE_URL.to_string(),
            file_ext: DEFAULT_FILE_EXT.to_string(),
            layout: SpecialTreatmentLayout::whatsapp_default(),
            login_markers: DEFAULT_LOGIN_MARKERS.iter().map(|s| s.to_string()).collect(),
            variants: VariantRule::whatsapp_defaults(),
        }
    }
}

impl SiteConfig {
    /// Defaults + SV_* overrides. Ошибка только если SV_LAYOUT_FILE задан и не читается.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("SV_SITE_NAME") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.site_name = s.to_string();
            }
        }

        if let Ok(v) = std::env::var("SV_SITE_URL") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.site_url = s.to_string();
            }
        }

        if let Ok(v) = std::env::var("SV_FILE_EXT") {
            let s = v.trim().trim_start_matches('.');
            if !s.is_empty() {
                cfg.file_ext = s.to_string();
            }
        }

        if let Ok(v) = std::env::var("SV_LAYOUT_FILE") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.layout = SpecialTreatmentLayout::load(Path::new(s))?;
            }
        }

        if let Ok(v) = std::env::var("SV_LOGIN_MARKERS") {
            let markers = parse_list(&v);
            if !markers.is_empty() {
                cfg.login_markers = markers;
            }
        }

        Ok(cfg)
    }

    pub fn with_site_name<S: Into<String>>(mut self, name: S) -> Self {
        self.site_name = name.into();
        self
    }

    pub fn with_site_url<S: Into<String>>(mut self, url: S) -> Self {
        self.site_url = url.into();
        self
    }

    pub fn with_file_ext(mut self, ext: &str) -> Self {
        self.file_ext = ext.trim().trim_start_matches('.').to_string();
        self
    }

    pub fn with_layout(mut self, layout: SpecialTreatmentLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_login_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.login_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_variants(mut self, variants: Vec<VariantRule>) -> Self {
        self.variants = variants;
        self
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> Self {
        self
    }
}

fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect()
}

impl fmt::Display for SiteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout: Vec<String> = self
            .layout
            .entries()
            .map(|(db, os)| format!("{db}/{os}"))
            .collect();
        write!(
            f,
            "SiteConfig {{ \
             site_name: {}, \
             site_url: {}, \
             file_ext: {}, \
             layout: [{}], \
             login_markers: [{}], \
             variants: {} \
             }}",
            self.site_name,
            self.site_url,
            self.file_ext,
            layout.join(", "),
            self.login_markers.join(", "),
            self.variants.len(),
        )
    }
}

/// Lightweight builder that produces a SiteConfig.
#[derive(Clone, Debug, Default)]
pub struct SiteConfigBuilder {
    cfg: SiteConfig,
}

impl SiteConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from env (SV_*) instead of plain defaults.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            cfg: SiteConfig::from_env()?,
        })
    }

    pub fn site_name<S: Into<String>>(mut self, name: S) -> Self {
        self.cfg.site_name = name.into();
        self
    }

    pub fn site_url<S: Into<String>>(mut self, url: S) -> Self {
        self.cfg.site_url = url.into();
        self
    }

    pub fn file_ext(mut self, ext: &str) -> Self {
        self.cfg = self.cfg.with_file_ext(ext);
        self
    }

    pub fn layout(mut self, layout: SpecialTreatmentLayout) -> Self {
        self.cfg.layout = layout;
        self
    }

    pub fn login_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cfg = self.cfg.with_login_markers(markers);
        self
    }

    pub fn variants(mut self, variants: Vec<VariantRule>) -> Self {
        self.cfg.variants = variants;
        self
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> SiteConfig {
        self.cfg
    }
}
