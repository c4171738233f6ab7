use crate::config::AppConfig;
use crate::data::{GeometryStore, parse_csv};
use crate::error::{MapError, TableError};
use crate::filter::{FilterSelection, SelectionInput};
use crate::render::{RenderedMap, build_map};
use crate::types::RecordTable;
use std::io::Read;
use tracing::{info, warn};

/// Result of one pass from upload to map.
#[derive(Debug)]
pub struct RenderPass {
    pub total_rows: usize,
    pub selection: FilterSelection,
    pub filtered: RecordTable,
    pub map: Result<RenderedMap, MapError>,
}

pub struct Dashboard {
    config: AppConfig,
    geometry: GeometryStore,
}

impl Dashboard {
    pub fn new(config: AppConfig) -> Self {
        let geometry = GeometryStore::new(&config.input);
        Self { config, geometry }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Parse the upload, narrow it by the user's selection and build the map.
    /// Table faults abort the pass; map faults are carried in [`RenderPass::map`].
    pub fn render_pass<R: Read>(&self, upload: R, input: &SelectionInput) -> Result<RenderPass, TableError> {
        let table = parse_csv(upload, self.config.input.delimiter_byte())?;
        let selection = FilterSelection::from_table(&table, &self.config.filters.columns)?
            .with_input(input);
        let filtered = selection.apply(&table)?;

        info!("Render pass: {} of {} rows selected", filtered.len(), table.len());

        let map = self.geometry.get()
            .and_then(|geometry| build_map(&filtered, &geometry, &self.config.map));
        if let Err(e) = &map {
            warn!("Map unavailable ({}): {}", e.kind(), e);
        }

        Ok(RenderPass {
            total_rows: table.len(),
            selection,
            filtered,
            map,
        })
    }
}
