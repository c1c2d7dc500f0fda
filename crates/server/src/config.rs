use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use shared::domain::ShotId;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "gcp_annotation.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub bind_addr: String,
    pub project_path: PathBuf,
    pub analysis_program: String,
    pub analysis_script: Option<PathBuf>,
    pub sequences: BTreeMap<String, Vec<ShotId>>,
    pub overhead_views: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".into(),
            project_path: PathBuf::from("."),
            analysis_program: "python3".into(),
            analysis_script: Some(PathBuf::from("run_ba.py")),
            sequences: BTreeMap::new(),
            overhead_views: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    project_path: Option<PathBuf>,
    analysis_program: Option<String>,
    analysis_script: Option<PathBuf>,
    #[serde(default)]
    sequences: BTreeMap<String, Vec<ShotId>>,
    #[serde(default)]
    overhead_views: Vec<String>,
}

pub fn load_settings(config_path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(config_path) {
        apply_file_settings(&mut settings, &raw, config_path);
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());

    settings
}

fn apply_file_settings(settings: &mut Settings, raw: &str, config_path: &Path) {
    let file_cfg = match toml::from_str::<FileSettings>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(error) => {
            warn!(path = %config_path.display(), %error, "ignoring malformed settings file");
            return;
        }
    };

    if let Some(v) = file_cfg.bind_addr {
        settings.bind_addr = v;
    }
    if let Some(v) = file_cfg.project_path {
        settings.project_path = v;
    }
    if let Some(v) = file_cfg.analysis_program {
        settings.analysis_program = v;
    }
    if let Some(v) = file_cfg.analysis_script {
        settings.analysis_script = Some(v);
    }
    if !file_cfg.sequences.is_empty() {
        settings.sequences = file_cfg.sequences;
    }
    if !file_cfg.overhead_views.is_empty() {
        settings.overhead_views = file_cfg.overhead_views;
    }
}

fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("GCP__BIND_ADDR") {
        settings.bind_addr = v;
    }
    if let Some(v) = lookup("GCP__PROJECT_PATH") {
        settings.project_path = PathBuf::from(v);
    }
    if let Some(v) = lookup("GCP__ANALYSIS_PROGRAM") {
        settings.analysis_program = v;
    }
    if let Some(v) = lookup("GCP__ANALYSIS_SCRIPT") {
        settings.analysis_script = (!v.trim().is_empty()).then(|| PathBuf::from(v));
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
