use std::collections::HashMap;

use camino::Utf8Path;
use tracing::info;

use crate::error::KiraError;
use crate::fs_util::open_delimited;

/// Gene id to display name, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct AnnotationTable {
    names: HashMap<String, String>,
}

impl AnnotationTable {
    /// Loads a two-column delimited file; the header row is skipped and any
    /// further columns are ignored.
    pub fn load(path: &Utf8Path, delimiter: u8) -> Result<Self, KiraError> {
        if !path.as_std_path().is_file() {
            return Err(KiraError::MissingAnnotation(path.to_path_buf()));
        }
        let mut reader = open_delimited(path, delimiter)?;
        let mut names = HashMap::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|err| KiraError::AnnotationParse {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
            let (Some(gene_id), Some(gene_name)) = (record.get(0), record.get(1)) else {
                return Err(KiraError::AnnotationParse {
                    path: path.to_path_buf(),
                    message: format!("row {} has fewer than two columns", line + 2),
                });
            };
            if gene_id.is_empty() {
                continue;
            }
            names.insert(gene_id.to_string(), gene_name.to_string());
        }
        info!(path = %path, genes = names.len(), "loaded gene annotation");
        Ok(Self { names })
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            names: pairs
                .into_iter()
                .map(|(id, name)| (id.into(), name.into()))
                .collect(),
        }
    }

    pub fn gene_name(&self, gene_id: &str) -> Option<&str> {
        self.names.get(gene_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
