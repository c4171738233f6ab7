use std::path::PathBuf;
use thiserror::Error;

/// Faults raised while turning an upload into a filtered table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to parse CSV upload: {0}")]
    Parse(#[from] csv::Error),
    #[error("column '{0}' not found in CSV")]
    MissingColumn(String),
}

impl TableError {
    pub fn kind(&self) -> &'static str {
        match self {
            TableError::Parse(_) => "parse_failure",
            TableError::MissingColumn(_) => "missing_column",
        }
    }
}

/// Faults on the map path. None of these abort a render pass.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("Missing GEOJSON file: {}", path.display())]
    ResourceMissing { path: PathBuf },
    #[error("failed to join rows to geometry: {0}")]
    JoinFailure(String),
    #[error("error creating map: {0:#}")]
    RenderFailure(#[from] anyhow::Error),
}

impl MapError {
    pub fn kind(&self) -> &'static str {
        match self {
            MapError::ResourceMissing { .. } => "resource_missing",
            MapError::JoinFailure(_) => "join_failure",
            MapError::RenderFailure(_) => "render_failure",
        }
    }
}
