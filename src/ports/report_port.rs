//! Report generation port trait.

use crate::domain::error::CloseHighError;
use crate::domain::results::{CompositeResult, StrategyResult};
use std::path::Path;

/// Port for writing sweep results.
pub trait ReportPort {
    fn write(
        &self,
        results: &[StrategyResult],
        composite: &CompositeResult,
        output_path: &Path,
    ) -> Result<(), CloseHighError>;
}
