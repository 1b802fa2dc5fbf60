use anyhow::{Context, Result};
use finsight_pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub classifier: ClassifierSection,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSection {
    /// Optional HTTP classifier endpoint. Without one, categorization runs
    /// on merchant rules alone.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("finsight.toml")
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", path.display()))
}

pub fn init_config(path: Option<&Path>) -> Result<()> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if path.exists() {
        println!("Config already exists: {}", path.display());
        return Ok(());
    }
    let s = toml::to_string_pretty(&Config::default()).context("serialize config")?;
    fs::write(&path, s).with_context(|| format!("write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let cfg = load_config(Some(Path::new("/nonexistent/finsight.toml"))).unwrap();
        assert!(cfg.classifier.endpoint.is_none());
        assert_eq!(cfg.pipeline.max_stage_attempts, 3);
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("finsight.toml");
        init_config(Some(&path)).unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.pipeline.max_concurrent_jobs, 4);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("finsight.toml");
        std::fs::write(&path, "[classifier]\nendpoint = \"http://localhost:9300/classify\"\n")
            .unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(
            cfg.classifier.endpoint.as_deref(),
            Some("http://localhost:9300/classify")
        );
        assert_eq!(cfg.pipeline.max_stage_attempts, 3);
    }
}
