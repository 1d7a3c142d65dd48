//! Backend registry and the accessor contract every backend implements.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Era5Error;
use crate::types::dataset::Era5Dataset;
use crate::types::request::DataRequest;

/// A data source capable of serving one or more ERA5 datasets.
///
/// Implementations are registered with an [`AccessorRegistry`] by
/// composition; the registry is read-only once built, so capability
/// queries never race with retrievals.
#[async_trait]
pub trait DataAccessor: Send + Sync {
    /// Stable backend identifier, e.g. `"era5-aws"`.
    fn name(&self) -> &'static str;

    /// Dataset names this backend can serve. Never empty.
    fn supported_datasets(&self) -> &'static [&'static str];

    /// Variables available for one of this backend's datasets.
    fn dataset_variables(&self, dataset: &str) -> Option<&'static [&'static str]>;

    /// Whether a variable can be requested from `dataset`. Backends that
    /// accept alternate spellings override this.
    fn supports_variable(&self, dataset: &str, variable: &str) -> bool {
        self.dataset_variables(dataset)
            .is_some_and(|variables| variables.contains(&variable))
    }

    /// Retrieves and normalizes data for a validated request.
    async fn get_data(&self, request: &DataRequest) -> Result<Era5Dataset, Era5Error>;
}

/// Read-only mapping from backend and dataset names to implementations.
pub struct AccessorRegistry {
    accessors: Vec<Arc<dyn DataAccessor>>,
}

impl AccessorRegistry {
    /// Builds a registry. Registration order decides which backend wins a
    /// dataset-only lookup when several serve the same dataset.
    pub fn new(accessors: Vec<Arc<dyn DataAccessor>>) -> Self {
        AccessorRegistry { accessors }
    }

    pub fn by_name(&self, name: &str) -> Result<&Arc<dyn DataAccessor>, Era5Error> {
        self.accessors
            .iter()
            .find(|accessor| accessor.name() == name)
            .ok_or_else(|| Era5Error::UnknownBackend(name.to_string()))
    }

    pub fn for_dataset(&self, dataset: &str) -> Result<&Arc<dyn DataAccessor>, Era5Error> {
        self.accessors
            .iter()
            .find(|accessor| accessor.supported_datasets().contains(&dataset))
            .ok_or_else(|| Era5Error::UnknownDataset(dataset.to_string()))
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.accessors.iter().map(|accessor| accessor.name()).collect()
    }

    /// All dataset names served by any backend, deduplicated in
    /// registration order.
    pub fn supported_datasets(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Vec::new();
        for accessor in &self.accessors {
            for dataset in accessor.supported_datasets() {
                if !names.contains(dataset) {
                    names.push(dataset);
                }
            }
        }
        names
    }
}
