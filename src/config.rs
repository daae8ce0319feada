use std::fs;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{DEFAULT_SAMPLES, SampleName};
use crate::error::KiraError;
use crate::fs_util::parse_delimiter;

pub const DEFAULT_CONFIG_FILE: &str = "kira-ea.json";
pub const DEFAULT_MAX_GENE_IDS: usize = 100;
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub annotation: Option<String>,
    #[serde(default)]
    pub store_dir: Option<String>,
    #[serde(default)]
    pub source_dir: Option<String>,
    #[serde(default)]
    pub samples: Vec<SampleEntry>,
    #[serde(default)]
    pub max_gene_ids: Option<usize>,
    #[serde(default)]
    pub source_delimiter: Option<String>,
    #[serde(default)]
    pub annotation_delimiter: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SampleEntry {
    Shorthand(String),
    Detailed(SampleEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SampleEntryObject {
    pub name: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SampleRequest {
    pub name: SampleName,
    pub source: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub annotation: Utf8PathBuf,
    pub annotation_delimiter: u8,
    pub store_dir: Utf8PathBuf,
    pub samples: Vec<SampleRequest>,
    pub source_delimiter: u8,
    pub max_gene_ids: usize,
}

impl ResolvedConfig {
    pub fn sample(&self, name: &SampleName) -> Result<&SampleRequest, KiraError> {
        self.samples
            .iter()
            .find(|sample| &sample.name == name)
            .ok_or_else(|| KiraError::UnknownSample(name.to_string()))
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Without an explicit path, a missing `kira-ea.json` falls back to the
    /// built-in layout; an explicit path must be readable.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, KiraError> {
        let schema_version = config.schema_version.unwrap_or(CONFIG_SCHEMA_VERSION);
        if schema_version != CONFIG_SCHEMA_VERSION {
            return Err(KiraError::ConfigParse(format!(
                "unsupported schema_version {schema_version}, expected {CONFIG_SCHEMA_VERSION}"
            )));
        }
        let source_dir = Utf8PathBuf::from(config.source_dir.as_deref().unwrap_or("data"));

        let entries = if config.samples.is_empty() {
            DEFAULT_SAMPLES
                .iter()
                .map(|name| SampleEntry::Shorthand((*name).to_string()))
                .collect()
        } else {
            config.samples
        };

        let samples = entries
            .into_iter()
            .map(|entry| {
                let (name, source) = match entry {
                    SampleEntry::Shorthand(name) => (name, None),
                    SampleEntry::Detailed(obj) => (obj.name, obj.source),
                };
                let name: SampleName = name.parse()?;
                let source = source
                    .map(Utf8PathBuf::from)
                    .unwrap_or_else(|| source_dir.join(default_source_file(&name)));
                Ok(SampleRequest { name, source })
            })
            .collect::<Result<Vec<_>, KiraError>>()?;

        let mut seen = std::collections::HashSet::new();
        if let Some(duplicate) = samples.iter().find(|s| !seen.insert(s.name.clone())) {
            return Err(KiraError::ConfigParse(format!(
                "sample {} listed more than once",
                duplicate.name
            )));
        }

        let max_gene_ids = config.max_gene_ids.unwrap_or(DEFAULT_MAX_GENE_IDS);
        if max_gene_ids == 0 {
            return Err(KiraError::ConfigParse(
                "max_gene_ids must be at least 1".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            annotation: Utf8PathBuf::from(
                config
                    .annotation
                    .as_deref()
                    .unwrap_or("data/gene_annotation.csv"),
            ),
            annotation_delimiter: resolve_delimiter(config.annotation_delimiter.as_deref(), b',')?,
            store_dir: Utf8PathBuf::from(config.store_dir.as_deref().unwrap_or("stores")),
            samples,
            source_delimiter: resolve_delimiter(config.source_delimiter.as_deref(), b'\t')?,
            max_gene_ids,
        })
    }
}

pub fn default_source_file(sample: &SampleName) -> String {
    format!("{sample}.d4d5.fpkm.csv")
}

fn resolve_delimiter(value: Option<&str>, default: u8) -> Result<u8, KiraError> {
    match value {
        None => Ok(default),
        Some(value) => parse_delimiter(value)
            .ok_or_else(|| KiraError::ConfigParse(format!("invalid delimiter: {value:?}"))),
    }
}
