use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;
use std::time::Instant;

use camino::Utf8Path;
use csv::StringRecord;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{GeneTimeSeries, Measurement, SampleName, TimePoint};
use crate::error::KiraError;
use crate::fs_util::open_delimited;
use crate::store::{SampleStoreWriter, Store, StoreManifest};

static TIME_POINT_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(r1|r2)$").expect("time-point column pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replicate {
    R1,
    R2,
}

/// Column positions of every `{tp}.r1` / `{tp}.r2` column in a table header.
#[derive(Debug, Clone, Default)]
pub struct TimePointColumns {
    universe: BTreeSet<TimePoint>,
    r1: HashMap<TimePoint, usize>,
    r2: HashMap<TimePoint, usize>,
}

impl TimePointColumns {
    /// Columns without a `.` are ignored; a dotted column that is not a
    /// valid `{tp}.r1` / `{tp}.r2` name makes the whole table malformed.
    pub fn from_header(path: &Utf8Path, header: &StringRecord) -> Result<Self, KiraError> {
        let first = header.get(0).unwrap_or_default();
        if header.is_empty() || TIME_POINT_COLUMN.is_match(first) {
            return Err(KiraError::MalformedTable {
                path: path.to_path_buf(),
                reason: "missing gene-id column".to_string(),
            });
        }

        let mut columns = Self::default();
        for (index, name) in header.iter().enumerate().skip(1) {
            if !name.contains('.') {
                continue;
            }
            let (time_point, replicate) =
                parse_time_point_column(name).ok_or_else(|| KiraError::InvalidTimePointColumn {
                    path: path.to_path_buf(),
                    column: name.to_string(),
                })?;
            columns.universe.insert(time_point);
            let previous = match replicate {
                Replicate::R1 => columns.r1.insert(time_point, index),
                Replicate::R2 => columns.r2.insert(time_point, index),
            };
            if previous.is_some() {
                return Err(KiraError::InvalidTimePointColumn {
                    path: path.to_path_buf(),
                    column: name.to_string(),
                });
            }
        }

        if columns.universe.is_empty() {
            return Err(KiraError::MalformedTable {
                path: path.to_path_buf(),
                reason: "no `{tp}.r1` / `{tp}.r2` columns".to_string(),
            });
        }
        Ok(columns)
    }

    pub fn time_points(&self) -> Vec<TimePoint> {
        self.universe.iter().copied().collect()
    }

    pub fn series_for_row(&self, gene_id: &str, record: &StringRecord) -> GeneTimeSeries {
        let mut series = GeneTimeSeries::new(gene_id);
        for &time_point in &self.universe {
            let r1 = self.r1.get(&time_point).and_then(|&i| parse_cell(record.get(i)));
            let r2 = self.r2.get(&time_point).and_then(|&i| parse_cell(record.get(i)));
            series
                .points
                .insert(time_point, Measurement::from_raw(r1, r2));
        }
        series
    }
}

fn parse_time_point_column(name: &str) -> Option<(TimePoint, Replicate)> {
    let captures = TIME_POINT_COLUMN.captures(name)?;
    let time_point = captures.get(1)?.as_str().parse().ok()?;
    let replicate = match captures.get(2)?.as_str() {
        "r1" => Replicate::R1,
        _ => Replicate::R2,
    };
    Some((time_point, replicate))
}

/// Missing, blank, non-numeric and non-finite cells all read as absent.
fn parse_cell(cell: Option<&str>) -> Option<f64> {
    cell.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

/// Reads a whole source table into per-gene series.
///
/// The file is parsed completely before anything is written, so a malformed
/// row fails the sample without touching its store. When a gene id repeats,
/// the last row wins.
pub fn read_expression_table(
    path: &Utf8Path,
    delimiter: u8,
) -> Result<(TimePointColumns, Vec<GeneTimeSeries>), KiraError> {
    let malformed = |reason: String| KiraError::MalformedTable {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = open_delimited(path, delimiter)?;
    let header = reader
        .headers()
        .map_err(|err| malformed(err.to_string()))?
        .clone();
    let columns = TimePointColumns::from_header(path, &header)?;

    let mut genes: Vec<GeneTimeSeries> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|err| malformed(err.to_string()))?;
        let gene_id = record.get(0).unwrap_or_default();
        if gene_id.is_empty() {
            return Err(malformed(format!("row {} has no gene id", row + 2)));
        }
        let series = columns.series_for_row(gene_id, &record);
        match positions.get(gene_id) {
            Some(&existing) => {
                warn!(gene_id, path = %path, "duplicate gene row, keeping the last one");
                genes[existing] = series;
            }
            None => {
                positions.insert(gene_id.to_string(), genes.len());
                genes.push(series);
            }
        }
    }

    Ok((columns, genes))
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub sample: String,
    pub source: String,
    pub store_path: String,
    pub gene_count: usize,
    pub time_points: Vec<TimePoint>,
}

/// Rebuilds one sample's store from its source table and swaps it into place.
pub fn ingest_sample(
    store: &Store,
    sample: &SampleName,
    source: &Utf8Path,
    delimiter: u8,
    sink: &dyn ProgressSink,
) -> Result<IngestReport, KiraError> {
    let start = Instant::now();
    sink.event(ProgressEvent {
        message: format!("phase=Read; sample {sample} from {source}"),
        elapsed: None,
    });
    if !source.as_std_path().is_file() {
        return Err(KiraError::MalformedTable {
            path: source.to_path_buf(),
            reason: "source file not found".to_string(),
        });
    }
    let (columns, genes) = read_expression_table(source, delimiter)?;
    let time_points = columns.time_points();

    sink.event(ProgressEvent {
        message: format!(
            "phase=Store; writing {} genes x {} time points",
            genes.len(),
            time_points.len()
        ),
        elapsed: Some(start.elapsed()),
    });
    let mut writer = SampleStoreWriter::create(store, sample)?;
    for series in &genes {
        writer.put(series)?;
    }
    let gene_count = writer.written();
    let store_path = writer.commit()?;

    let manifest = StoreManifest {
        sample: sample.clone(),
        source: source.to_string(),
        store_path: store_path.to_string(),
        gene_count,
        time_points: time_points.clone(),
        built_at: chrono::Utc::now().to_rfc3339(),
        tool: format!("kira-ea/{}", env!("CARGO_PKG_VERSION")),
    };
    if let Err(err) = store.write_manifest(&manifest) {
        // the new store is live, so the old manifest no longer describes it
        warn!(sample = %sample, error = %err, "manifest write failed, dropping stale manifest");
        store.remove_manifest(sample)?;
        return Err(err);
    }

    info!(
        sample = %sample,
        genes = gene_count,
        time_points = time_points.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "sample store built"
    );
    sink.event(ProgressEvent {
        message: format!("phase=Done; sample {sample}"),
        elapsed: Some(start.elapsed()),
    });

    Ok(IngestReport {
        sample: sample.to_string(),
        source: source.to_string(),
        store_path: store_path.to_string(),
        gene_count,
        time_points,
    })
}
