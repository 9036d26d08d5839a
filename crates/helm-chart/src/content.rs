//! Typed views over the files of a packaged chart

use crate::archive::{ChartArchive, ChartFile, ExtractLimits};
use crate::metadata::{ChartNode, Dependency};
use crate::values::ValuesDocument;
use crate::{Error, Result};

impl ChartArchive {
    /// Parse `values.yaml`, keeping its text and key comments.
    pub fn values(&self, limits: ExtractLimits) -> Result<ValuesDocument> {
        ValuesDocument::parse(self.read_file(ChartFile::Values, limits)?)
    }

    /// Raw `values.schema.json`, if the chart ships one.
    pub fn schema(&self, limits: ExtractLimits) -> Result<Option<String>> {
        match self.read_file(ChartFile::Schema, limits) {
            Ok(text) => Ok(Some(text)),
            Err(Error::FileNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Raw notes template.
    pub fn notes(&self, limits: ExtractLimits) -> Result<String> {
        self.read_file(ChartFile::Notes, limits)
    }

    /// Declared dependencies, followed through bundled sub-charts.
    pub fn dependencies(&self, limits: ExtractLimits) -> Result<Vec<Dependency>> {
        Ok(ChartNode::load(self, limits)?.flatten_dependencies())
    }
}
