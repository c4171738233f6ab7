use crate::config::InputConfig;
use crate::error::{MapError, TableError};
use crate::types::RecordTable;
use anyhow::{Context, anyhow};
use csv::ReaderBuilder;
use geojson::{Feature, GeoJson, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Parse a delimited upload into a table. Columns come verbatim from the header row.
pub fn parse_csv<R: Read>(reader: R, delimiter: u8) -> Result<RecordTable, TableError> {
    let mut rdr = ReaderBuilder::new().delimiter(delimiter).from_reader(reader);
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    debug!("Parsed CSV with {} columns and {} rows", headers.len(), rows.len());
    Ok(RecordTable::new(headers, rows))
}

/// Polygon features keyed by their identifier property.
#[derive(Debug, Clone)]
pub struct GeometryCollection {
    id_property: String,
    features: HashMap<String, Feature>,
}

impl GeometryCollection {
    pub fn id_property(&self) -> &str {
        &self.id_property
    }

    pub fn get(&self, id: &str) -> Option<&Feature> {
        self.features.get(id)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

pub fn load_geometry(path: &Path, id_property: &str) -> Result<GeometryCollection, MapError> {
    if !path.exists() {
        return Err(MapError::ResourceMissing { path: path.to_path_buf() });
    }

    info!("Loading GeoJSON from {:?}...", path);
    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let geojson = GeoJson::from_reader(BufReader::new(file)).context("Failed to parse GeoJSON")?;

    let collection = geometry_from_geojson(geojson, id_property)?;
    info!("Indexed {} field polygons", collection.len());
    Ok(collection)
}

pub fn geometry_from_geojson(geojson: GeoJson, id_property: &str) -> Result<GeometryCollection, MapError> {
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection").into()),
    };

    let mut features = HashMap::new();

    for feature in collection.features {
        let id = match feature_id(&feature, id_property) {
            Some(id) => id,
            None => {
                debug!("Skipping feature without '{}' property", id_property);
                continue;
            }
        };

        if !is_polygonal(&feature) {
            warn!("Skipping non-polygon feature {}", id);
            continue;
        }

        if features.contains_key(&id) {
            warn!("Duplicate feature id {}, keeping the first", id);
            continue;
        }
        features.insert(id, feature);
    }

    Ok(GeometryCollection {
        id_property: id_property.to_string(),
        features,
    })
}

/// String and numeric identifiers are both accepted; numbers are rendered as
/// text, whole numbers without a fractional part (`42.0` becomes `42`).
pub fn feature_id(feature: &Feature, id_property: &str) -> Option<String> {
    let id_val = feature.properties.as_ref()
        .and_then(|props| props.get(id_property));

    match id_val {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(number_id(n)),
        _ => None,
    }
}

// Largest integer an f64 holds exactly
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

fn number_id(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT_INT => (f as i64).to_string(),
        _ => n.to_string(),
    }
}

fn is_polygonal(feature: &Feature) -> bool {
    matches!(
        feature.geometry.as_ref().map(|g| &g.value),
        Some(Value::Polygon(_)) | Some(Value::MultiPolygon(_))
    )
}

/// Hands out the geometry collection once per render pass, reusing the last
/// successful parse when caching is on. A missing file is never cached.
pub struct GeometryStore {
    path: PathBuf,
    id_property: String,
    cache_enabled: bool,
    cached: RwLock<Option<Arc<GeometryCollection>>>,
}

impl GeometryStore {
    pub fn new(config: &InputConfig) -> Self {
        Self {
            path: config.geometry.clone(),
            id_property: config.id_column.clone(),
            cache_enabled: config.cache_geometry,
            cached: RwLock::new(None),
        }
    }

    pub fn get(&self) -> Result<Arc<GeometryCollection>, MapError> {
        if self.cache_enabled {
            if let Ok(guard) = self.cached.read() {
                if let Some(collection) = guard.as_ref() {
                    return Ok(Arc::clone(collection));
                }
            }
        }

        let collection = Arc::new(load_geometry(&self.path, &self.id_property)?);

        if self.cache_enabled {
            if let Ok(mut guard) = self.cached.write() {
                *guard = Some(Arc::clone(&collection));
            }
        }

        Ok(collection)
    }
}
