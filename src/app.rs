use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::annotation::AnnotationTable;
use crate::config::ResolvedConfig;
use crate::domain::{SampleName, TimePoint};
use crate::error::KiraError;
use crate::ingest::{IngestReport, ingest_sample};
use crate::query::{ExpressionResult, QueryEngine, split_gene_id_list};
use crate::registry::SampleRegistry;
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub items: Vec<IngestReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub stores: Vec<ListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub sample: String,
    pub built: bool,
    pub gene_count: Option<usize>,
    pub time_points: Option<Vec<TimePoint>>,
    pub built_at: Option<String>,
    pub store_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub sample: String,
    pub source: String,
    pub store_path: String,
    pub gene_count: usize,
    pub time_points: Vec<TimePoint>,
    pub built_at: String,
    pub tool: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub results: Vec<ExpressionResult>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct App {
    store: Store,
    config: ResolvedConfig,
}

impl App {
    pub fn new(config: ResolvedConfig) -> Self {
        Self {
            store: Store::new(config.store_dir.clone()),
            config,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Ingests the selected samples, or every configured sample when none are
    /// given. Stops at the first sample that fails.
    pub fn ingest(
        &self,
        samples: &[SampleName],
        sink: &dyn ProgressSink,
    ) -> Result<IngestResult, KiraError> {
        let requests = if samples.is_empty() {
            self.config.samples.iter().collect::<Vec<_>>()
        } else {
            samples
                .iter()
                .map(|name| self.config.sample(name))
                .collect::<Result<Vec<_>, KiraError>>()?
        };

        let mut items = Vec::with_capacity(requests.len());
        for request in requests {
            items.push(ingest_sample(
                &self.store,
                &request.name,
                &request.source,
                self.config.source_delimiter,
                sink,
            )?);
        }
        Ok(IngestResult { items })
    }

    /// Loads the annotation and opens every configured store for serving.
    pub fn open_atlas(&self) -> Result<Atlas, KiraError> {
        let annotation =
            AnnotationTable::load(&self.config.annotation, self.config.annotation_delimiter)?;
        let samples = self
            .config
            .samples
            .iter()
            .map(|sample| sample.name.clone())
            .collect::<Vec<_>>();
        let registry = SampleRegistry::open(&self.store, &samples)?;
        Ok(Atlas::new(registry, annotation, self.config.max_gene_ids))
    }

    pub fn list(&self, sink: &dyn ProgressSink) -> Result<ListResult, KiraError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; scanning {}", self.store.root()),
            elapsed: None,
        });

        let mut manifests = self.store.list_manifests()?;
        let mut stores = Vec::new();
        for request in &self.config.samples {
            let position = manifests.iter().position(|m| m.sample == request.name);
            let manifest = position
                .map(|index| manifests.remove(index))
                .filter(|_| self.store.store_exists(&request.name));
            stores.push(ListEntry {
                sample: request.name.to_string(),
                built: manifest.is_some(),
                gene_count: manifest.as_ref().map(|m| m.gene_count),
                time_points: manifest.as_ref().map(|m| m.time_points.clone()),
                built_at: manifest.as_ref().map(|m| m.built_at.clone()),
                store_path: self.store.sample_store_path(&request.name).to_string(),
            });
        }
        Ok(ListResult { stores })
    }

    pub fn info(
        &self,
        sample: &SampleName,
        sink: &dyn ProgressSink,
    ) -> Result<InfoResult, KiraError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; looking up {sample}"),
            elapsed: None,
        });
        if !self.store.store_exists(sample) {
            return Err(KiraError::StoreNotFound(sample.to_string()));
        }
        let manifest = self.store.read_manifest(sample)?;
        Ok(InfoResult {
            sample: manifest.sample.to_string(),
            source: manifest.source,
            store_path: manifest.store_path,
            gene_count: manifest.gene_count,
            time_points: manifest.time_points,
            built_at: manifest.built_at,
            tool: manifest.tool,
        })
    }
}

/// Everything a serving process needs to answer expression queries.
///
/// Immutable after construction, so one instance can serve concurrent
/// requests from several threads.
pub struct Atlas {
    registry: SampleRegistry,
    annotation: AnnotationTable,
    max_gene_ids: usize,
}

impl Atlas {
    pub fn new(registry: SampleRegistry, annotation: AnnotationTable, max_gene_ids: usize) -> Self {
        info!(
            samples = registry.stores().len(),
            genes = annotation.len(),
            "expression atlas ready"
        );
        Self {
            registry,
            annotation,
            max_gene_ids,
        }
    }

    pub fn registry(&self) -> &SampleRegistry {
        &self.registry
    }

    pub fn query<S: AsRef<str>>(&self, gene_ids: &[S]) -> Result<QueryResult, KiraError> {
        let results = QueryEngine::new(&self.registry, &self.annotation)
            .with_max_gene_ids(self.max_gene_ids)
            .query(gene_ids)?;
        Ok(QueryResult { results })
    }

    /// Same as [`query`](Self::query) for a raw comma-separated request value.
    pub fn query_list(&self, raw: &str) -> Result<QueryResult, KiraError> {
        self.query(&split_gene_id_list(raw))
    }
}
