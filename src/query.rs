use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::annotation::AnnotationTable;
use crate::config::DEFAULT_MAX_GENE_IDS;
use crate::domain::{GeneTimeSeries, TimePoint};
use crate::error::KiraError;
use crate::registry::SampleRegistry;

/// One sample's series as parallel arrays, ascending by time point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleSeries {
    pub time_points: Vec<TimePoint>,
    pub rep1: Vec<f64>,
    pub rep2: Vec<f64>,
    pub mean: Vec<Option<f64>>,
}

impl From<&GeneTimeSeries> for SampleSeries {
    fn from(series: &GeneTimeSeries) -> Self {
        let mut points = series.points.iter().collect::<Vec<_>>();
        points.sort_unstable_by_key(|(time_point, _)| **time_point);

        let mut out = Self {
            time_points: Vec::with_capacity(points.len()),
            rep1: Vec::with_capacity(points.len()),
            rep2: Vec::with_capacity(points.len()),
            mean: Vec::with_capacity(points.len()),
        };
        for (time_point, measurement) in points {
            out.time_points.push(*time_point);
            out.rep1.push(measurement.r1);
            out.rep2.push(measurement.r2);
            out.mean.push(measurement.mean);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpressionResult {
    pub gene_id: String,
    pub gene_name: String,
    /// Only samples whose store holds the gene.
    pub expression: BTreeMap<String, SampleSeries>,
}

/// Splits a raw comma-separated request value, collapsing whitespace first.
pub fn split_gene_id_list(raw: &str) -> Vec<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.split(',').map(str::to_string).collect()
}

/// Removes all whitespace (interior included) from each id and drops the
/// ones left empty. Order and duplicates are kept.
pub fn normalize_gene_ids<S: AsRef<str>>(gene_ids: &[S]) -> Vec<String> {
    gene_ids
        .iter()
        .map(|id| {
            id.as_ref()
                .chars()
                .filter(|ch| !ch.is_whitespace())
                .collect::<String>()
        })
        .filter(|id| !id.is_empty())
        .collect()
}

pub struct QueryEngine<'a> {
    registry: &'a SampleRegistry,
    annotation: &'a AnnotationTable,
    max_gene_ids: usize,
}

impl<'a> QueryEngine<'a> {
    pub fn new(registry: &'a SampleRegistry, annotation: &'a AnnotationTable) -> Self {
        Self {
            registry,
            annotation,
            max_gene_ids: DEFAULT_MAX_GENE_IDS,
        }
    }

    pub fn with_max_gene_ids(mut self, max_gene_ids: usize) -> Self {
        self.max_gene_ids = max_gene_ids;
        self
    }

    /// Looks each gene up in every sample store.
    ///
    /// Genes missing from the annotation, or absent from every store, are
    /// left out without error. A store failure fails the whole query.
    pub fn query<S: AsRef<str>>(&self, gene_ids: &[S]) -> Result<Vec<ExpressionResult>, KiraError> {
        let gene_ids = normalize_gene_ids(gene_ids);
        if gene_ids.is_empty() {
            return Err(KiraError::EmptyGeneList);
        }
        if gene_ids.len() > self.max_gene_ids {
            return Err(KiraError::TooManyGeneIds {
                count: gene_ids.len(),
                max: self.max_gene_ids,
            });
        }

        let mut results = Vec::new();
        for gene_id in gene_ids {
            let Some(gene_name) = self.annotation.gene_name(&gene_id) else {
                debug!(gene_id = %gene_id, "not in annotation, skipped");
                continue;
            };
            let expression = self.fan_out(&gene_id)?;
            if expression.is_empty() {
                debug!(gene_id = %gene_id, "no sample holds this gene");
                continue;
            }
            results.push(ExpressionResult {
                gene_name: gene_name.to_string(),
                gene_id,
                expression,
            });
        }
        Ok(results)
    }

    fn fan_out(&self, gene_id: &str) -> Result<BTreeMap<String, SampleSeries>, KiraError> {
        let hits = self
            .registry
            .stores()
            .par_iter()
            .map(|store| {
                let hit = store.get(gene_id)?;
                Ok(hit.map(|series| (store.sample().to_string(), SampleSeries::from(&series))))
            })
            .collect::<Result<Vec<_>, KiraError>>()?;
        debug!(
            gene_id,
            samples = self.registry.stores().len(),
            hits = hits.iter().flatten().count(),
            "fan-out done"
        );
        Ok(hits.into_iter().flatten().collect())
    }
}
