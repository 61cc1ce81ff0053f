//! Feature Builder: raw records to a model-ready feature table
//!
//! ## Pipeline
//!
//! ```text
//! RawLoader ──► schema check ──► sort ──► clean (drop / dedup / MAD)
//!                                              │
//!                                              ▼
//!          aggregate ◄── calendar columns ◄── pivot (param_*)
//! ```
//!
//! The builder is stateless apart from its loader and interval: every call
//! rereads the raw source, so inference always sees the latest snapshots.

pub mod aggregation;
pub mod calendar;
pub mod cleaning;
pub mod pivot;
pub mod stats;

pub use aggregation::{aggregate, AggregationInterval, InvalidInterval};
pub use cleaning::{clean, validate_schema, MAD_SCALE, OUTLIER_Z_THRESHOLD};
pub use pivot::{pivot_parameters, PARAM_PREFIX};

use std::sync::Arc;

use tracing::{info, info_span, warn, Span};

use crate::acquisition::{LoadError, RawLoader};
use crate::types::{FeatureMetadata, FeatureTable, RawDataset};

#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("raw data is missing required columns: {missing:?}")]
    Schema { missing: Vec<String> },
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("feature table shape error: {0}")]
    Shape(String),
}

/// Builds the feature table from whatever the loader currently provides.
#[derive(Clone)]
pub struct FeatureBuilder {
    loader: Arc<dyn RawLoader>,
    interval: AggregationInterval,
    span: Span,
}

impl FeatureBuilder {
    pub fn new(loader: Arc<dyn RawLoader>, interval: AggregationInterval) -> Self {
        let span = info_span!("features", source = loader.source_name(), interval = %interval);
        Self {
            loader,
            interval,
            span,
        }
    }

    /// Attach the builder to a caller-provided span (e.g. the service root).
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn interval(&self) -> &AggregationInterval {
        &self.interval
    }

    /// Load every raw snapshot and build the aggregated feature table.
    ///
    /// Returns `(empty table, None)` when there is nothing to load.
    pub fn build_feature_table(&self) -> Result<(FeatureTable, Option<FeatureMetadata>), FeatureError> {
        let dataset = self.span.in_scope(|| self.loader.load_all_raw())?;
        self.build_from_dataset(dataset)
    }

    /// Run the cleaning and aggregation stages over an already-loaded dataset.
    pub fn build_from_dataset(
        &self,
        dataset: RawDataset,
    ) -> Result<(FeatureTable, Option<FeatureMetadata>), FeatureError> {
        let _guard = self.span.enter();

        if dataset.is_empty() {
            info!("No raw records available; skipping feature build");
            return Ok((FeatureTable::empty(), None));
        }
        validate_schema(&dataset)?;

        let raw_rows = dataset.len();
        let mut records = dataset.records;
        cleaning::sort_by_timestamp(&mut records);
        let cleaned = clean(records);
        if cleaned.is_empty() {
            warn!(raw_rows, "Every raw record was dropped during cleaning");
            return Ok((FeatureTable::empty(), None));
        }

        let wide = pivot_parameters(&cleaned);
        let with_calendar = calendar::add_time_features(&wide).map_err(FeatureError::Shape)?;
        let table = aggregate(&with_calendar, &self.interval).map_err(FeatureError::Shape)?;

        let metadata = FeatureMetadata::describe(&table, self.interval.label());
        info!(
            raw_rows,
            clean_rows = cleaned.len(),
            rows = metadata.rows,
            columns = metadata.columns,
            "Feature table built"
        );
        Ok((table, Some(metadata)))
    }
}
