use std::fs;
use std::io;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use rocksdb::{DB, Options};
use serde::{Deserialize, Serialize};
use tempfile::{Builder, TempDir};

use crate::codec::{decode_series, encode_series};
use crate::domain::{GeneTimeSeries, SampleName, TimePoint};
use crate::error::KiraError;

/// On-disk layout of the per-sample stores and their manifests.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn sample_store_path(&self, sample: &SampleName) -> Utf8PathBuf {
        self.root.join(format!("{sample}.rocksdb"))
    }

    pub fn manifest_path(&self, sample: &SampleName) -> Utf8PathBuf {
        self.root.join("manifests").join(format!("{sample}.json"))
    }

    pub fn ensure_root(&self) -> Result<(), KiraError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    pub fn store_exists(&self, sample: &SampleName) -> bool {
        self.sample_store_path(sample).as_std_path().is_dir()
    }

    pub fn write_manifest(&self, manifest: &StoreManifest) -> Result<(), KiraError> {
        let path = self.manifest_path(&manifest.sample);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(manifest)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        fs::write(tmp_path.as_std_path(), &content)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }

    /// Removes a sample's manifest if present.
    pub fn remove_manifest(&self, sample: &SampleName) -> Result<(), KiraError> {
        match fs::remove_file(self.manifest_path(sample).as_std_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(KiraError::Filesystem(err.to_string())),
        }
    }

    pub fn read_manifest(&self, sample: &SampleName) -> Result<StoreManifest, KiraError> {
        let path = self.manifest_path(sample);
        if !path.as_std_path().exists() {
            return Err(KiraError::StoreNotFound(sample.to_string()));
        }
        read_manifest_file(&path)
    }

    pub fn list_manifests(&self) -> Result<Vec<StoreManifest>, KiraError> {
        let manifest_root = self.root.join("manifests");
        if !manifest_root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(manifest_root.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let mut manifests = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| KiraError::Filesystem(err.to_string()))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            if path.is_file() && path.extension() == Some("json") {
                manifests.push(read_manifest_file(&path)?);
            }
        }
        manifests.sort_by(|a, b| a.sample.cmp(&b.sample));
        Ok(manifests)
    }
}

/// Summary written next to a store after a successful ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreManifest {
    pub sample: SampleName,
    pub source: String,
    pub store_path: String,
    pub gene_count: usize,
    pub time_points: Vec<TimePoint>,
    pub built_at: String,
    pub tool: String,
}

fn read_manifest_file(path: &Utf8Path) -> Result<StoreManifest, KiraError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    serde_json::from_str(&content)
        .map_err(|err| KiraError::Filesystem(format!("manifest {path}: {err}")))
}

/// Read access to one sample's gene time series.
pub trait SeriesStore: Send + Sync {
    fn sample(&self) -> &SampleName;
    fn get(&self, gene_id: &str) -> Result<Option<GeneTimeSeries>, KiraError>;
}

/// A sample store opened read-only for serving.
#[derive(Debug)]
pub struct SampleStore {
    sample: SampleName,
    db: DB,
}

impl SampleStore {
    pub fn open(store: &Store, sample: &SampleName) -> Result<Self, KiraError> {
        let path = store.sample_store_path(sample);
        if !path.as_std_path().is_dir() {
            return Err(KiraError::StoreNotFound(sample.to_string()));
        }
        let opts = Options::default();
        let db = DB::open_for_read_only(&opts, path.as_std_path(), false).map_err(|err| {
            KiraError::StoreOpen {
                sample: sample.to_string(),
                message: err.to_string(),
            }
        })?;
        Ok(Self {
            sample: sample.clone(),
            db,
        })
    }
}

impl SeriesStore for SampleStore {
    fn sample(&self) -> &SampleName {
        &self.sample
    }

    fn get(&self, gene_id: &str) -> Result<Option<GeneTimeSeries>, KiraError> {
        let bytes = self
            .db
            .get(gene_id.as_bytes())
            .map_err(|err| KiraError::StoreRead {
                sample: self.sample.to_string(),
                message: err.to_string(),
            })?;
        bytes
            .map(|bytes| decode_series(gene_id, &bytes))
            .transpose()
    }
}

/// Builds a sample store in a staging directory next to its final path.
///
/// Nothing becomes visible at the store path until [`commit`](Self::commit);
/// dropping the writer discards the staged data.
pub struct SampleStoreWriter {
    sample: SampleName,
    db: DB,
    staging: TempDir,
    target: Utf8PathBuf,
    written: usize,
}

impl SampleStoreWriter {
    pub fn create(store: &Store, sample: &SampleName) -> Result<Self, KiraError> {
        store.ensure_root()?;
        let staging = Builder::new()
            .prefix(&format!(".{sample}-build"))
            .tempdir_in(store.root().as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_error_if_exists(true);
        let db = DB::open(&opts, staging.path().join("db")).map_err(|err| {
            KiraError::StoreOpen {
                sample: sample.to_string(),
                message: err.to_string(),
            }
        })?;

        Ok(Self {
            sample: sample.clone(),
            db,
            staging,
            target: store.sample_store_path(sample),
            written: 0,
        })
    }

    /// Writes a record, replacing any earlier value for the same gene id.
    /// A series without time points is refused.
    pub fn put(&mut self, series: &GeneTimeSeries) -> Result<(), KiraError> {
        if series.points.is_empty() {
            return Err(KiraError::StoreWrite {
                sample: self.sample.to_string(),
                message: format!("gene {} has no time points", series.gene_id),
            });
        }
        self.db
            .put(series.gene_id.as_bytes(), encode_series(series))
            .map_err(|err| KiraError::StoreWrite {
                sample: self.sample.to_string(),
                message: err.to_string(),
            })?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Flushes and closes the staged store, then swaps it into place.
    pub fn commit(self) -> Result<Utf8PathBuf, KiraError> {
        let Self {
            sample,
            db,
            staging,
            target,
            ..
        } = self;
        db.flush().map_err(|err| KiraError::StoreWrite {
            sample: sample.to_string(),
            message: err.to_string(),
        })?;
        drop(db);

        swap_into_place(
            &staging.path().join("db"),
            target.as_std_path(),
            &staging.path().join("previous"),
        )
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(target)
    }
}

/// Moves `from` onto `to`, parking any existing `to` at `backup` first.
///
/// If the second rename fails the parked directory is moved back, so `to`
/// never goes missing. `backup` must be on the same filesystem and is left
/// for the caller to clean up.
pub fn swap_into_place(from: &Path, to: &Path, backup: &Path) -> io::Result<()> {
    let parked = if to.exists() {
        fs::rename(to, backup)?;
        true
    } else {
        false
    };
    if let Err(err) = fs::rename(from, to) {
        if parked {
            fs::rename(backup, to)?;
        }
        return Err(err);
    }
    Ok(())
}
