use tracing::info;

use crate::domain::SampleName;
use crate::error::KiraError;
use crate::store::{SampleStore, SeriesStore, Store};

/// The per-sample stores a serving process queries, opened once at startup.
///
/// Nothing is reopened or mutated afterwards; share it by reference.
pub struct SampleRegistry {
    stores: Vec<Box<dyn SeriesStore>>,
}

impl SampleRegistry {
    /// Opens every listed sample read-only; a store that cannot be opened
    /// fails startup.
    pub fn open(store: &Store, samples: &[SampleName]) -> Result<Self, KiraError> {
        let stores = samples
            .iter()
            .map(|sample| {
                SampleStore::open(store, sample).map(|s| Box::new(s) as Box<dyn SeriesStore>)
            })
            .collect::<Result<Vec<_>, KiraError>>()?;
        info!(samples = stores.len(), root = %store.root(), "opened sample stores");
        Ok(Self { stores })
    }

    pub fn from_stores(stores: Vec<Box<dyn SeriesStore>>) -> Self {
        Self { stores }
    }

    pub fn stores(&self) -> &[Box<dyn SeriesStore>] {
        &self.stores
    }
}
