use crate::config::{Center, MapConfig, Margin};
use crate::data::GeometryCollection;
use crate::error::MapError;
use crate::types::RecordTable;
use anyhow::anyhow;
use geojson::{Feature, FeatureCollection};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

const TRACE_TYPE: &str = "choroplethmapbox";

// Plotly figure, handed as-is to plotly.js on the client
#[derive(Debug, Clone, Serialize)]
pub struct MapFigure {
    pub data: Vec<ChoroplethTrace>,
    pub layout: Layout,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChoroplethTrace {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub geojson: FeatureCollection,
    pub locations: Vec<String>,
    pub featureidkey: String,
    pub z: Vec<Option<f64>>,
    pub colorscale: ColorScale,
    pub showscale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colorbar: Option<ColorBar>,
    pub marker: Marker,
    pub hovertemplate: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ColorScale {
    Named(String),
    Stops(Vec<(f64, String)>),
}

#[derive(Debug, Clone, Serialize)]
pub struct ColorBar {
    pub title: Title,
}

#[derive(Debug, Clone, Serialize)]
pub struct Marker {
    pub opacity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Layout {
    pub mapbox: Mapbox,
    pub margin: Margin,
    pub height: u32,
    pub title: Title,
}

#[derive(Debug, Clone, Serialize)]
pub struct Mapbox {
    pub style: String,
    pub zoom: f64,
    pub center: Center,
}

#[derive(Debug, Clone, Serialize)]
pub struct Title {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
}

/// How the filtered rows lined up against the geometry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JoinSummary {
    pub matched_rows: usize,
    pub unmatched_rows: usize,
    // Logged only; unbounded, so kept out of responses
    #[serde(skip)]
    pub unmatched_ids: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedMap {
    pub figure: MapFigure,
    pub summary: JoinSummary,
}

/// Join rows to features by identifier and build the map. Rows without a
/// matching feature are left out of the figure.
pub fn build_map(
    table: &RecordTable,
    geometry: &GeometryCollection,
    config: &MapConfig,
) -> Result<RenderedMap, MapError> {
    let id_column = geometry.id_property();
    let id_idx = table.column_index(id_column)
        .map_err(|_| MapError::JoinFailure(format!("identifier column '{}' not found in table", id_column)))?;

    let value_idx = match &config.value_column {
        Some(column) => Some(table.column_index(column)
            .map_err(|_| MapError::JoinFailure(format!("value column '{}' not found in table", column)))?),
        None => None,
    };

    let mut summary = JoinSummary::default();
    let mut locations = Vec::new();
    let mut z = Vec::new();
    let mut matched: BTreeMap<String, Feature> = BTreeMap::new();

    for (row_number, row) in table.rows().iter().enumerate() {
        let id = row.get(id_idx).map(String::as_str).unwrap_or("");

        let feature = match geometry.get(id) {
            Some(feature) => feature,
            None => {
                summary.unmatched_rows += 1;
                summary.unmatched_ids.insert(id.to_string());
                continue;
            }
        };

        let value = match value_idx {
            Some(idx) => parse_value(row.get(idx).map(String::as_str).unwrap_or(""), row_number)?,
            None => Some(1.0),
        };

        summary.matched_rows += 1;
        locations.push(id.to_string());
        z.push(value);
        matched.entry(id.to_string())
            .or_insert_with(|| with_string_id(feature, id_column, id));
    }

    if !summary.unmatched_ids.is_empty() {
        debug!("No geometry for ids: {:?}", summary.unmatched_ids);
    }
    info!(
        "Joined {} rows to {} features ({} rows without geometry)",
        summary.matched_rows, matched.len(), summary.unmatched_rows
    );

    let trace = ChoroplethTrace {
        kind: TRACE_TYPE,
        geojson: FeatureCollection {
            bbox: None,
            features: matched.into_values().collect(),
            foreign_members: None,
        },
        locations,
        featureidkey: format!("properties.{}", id_column),
        z,
        colorscale: color_scale(config),
        showscale: config.value_column.is_some(),
        colorbar: config.value_column.as_ref().map(|column| ColorBar {
            title: Title { text: column.clone(), x: None },
        }),
        marker: Marker { opacity: config.opacity },
        hovertemplate: hover_template(id_column, config.value_column.as_deref()),
    };

    let layout = Layout {
        mapbox: Mapbox {
            style: config.style.clone(),
            zoom: config.zoom,
            center: config.center,
        },
        margin: config.margin,
        height: config.height,
        title: Title { text: config.title.clone(), x: Some(0.5) },
    };

    Ok(RenderedMap {
        figure: MapFigure { data: vec![trace], layout },
        summary,
    })
}

fn parse_value(raw: &str, row_number: usize) -> Result<Option<f64>, MapError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| anyhow!("row {}: value {:?} is not a number", row_number + 1, raw).into())
}

fn color_scale(config: &MapConfig) -> ColorScale {
    match config.value_column {
        Some(_) => ColorScale::Named(config.color_scale.clone()),
        None => ColorScale::Stops(vec![
            (0.0, config.uniform_color.clone()),
            (1.0, config.uniform_color.clone()),
        ]),
    }
}

fn hover_template(id_column: &str, value_column: Option<&str>) -> String {
    match value_column {
        Some(value) => format!("{}=%{{location}}<br>{}=%{{z}}<extra></extra>", id_column, value),
        None => format!("{}=%{{location}}<extra></extra>", id_column),
    }
}

// Numeric ids were matched as text, so the embedded copy carries the text form
fn with_string_id(feature: &Feature, id_column: &str, id: &str) -> Feature {
    let mut feature = feature.clone();
    feature.set_property(id_column, id);
    feature
}

impl MapFigure {
    pub fn to_json(&self) -> Result<String, MapError> {
        serde_json::to_string(self)
            .map_err(|e| anyhow!("Failed to serialize map figure: {}", e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{geometry_from_geojson, parse_csv};
    use geojson::GeoJson;

    fn geometry() -> GeometryCollection {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"Field_ID": "F1"},
                 "geometry": {"type": "Polygon", "coordinates": [[[71.0, 51.0], [71.1, 51.0], [71.1, 51.1], [71.0, 51.0]]]}},
                {"type": "Feature", "properties": {"Field_ID": 7},
                 "geometry": {"type": "Polygon", "coordinates": [[[71.2, 51.2], [71.3, 51.2], [71.3, 51.3], [71.2, 51.2]]]}}
            ]
        }"#;
        geometry_from_geojson(body.parse::<GeoJson>().unwrap(), "Field_ID").unwrap()
    }

    fn table(csv: &str) -> RecordTable {
        parse_csv(csv.as_bytes(), b',').unwrap()
    }

    #[test]
    fn layout_follows_configuration() {
        let rendered = build_map(&table("Field_ID\nF1\n"), &geometry(), &MapConfig::default()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&rendered.figure.to_json().unwrap()).unwrap();

        let layout = &json["layout"];
        assert_eq!(layout["mapbox"]["style"], "carto-positron");
        assert_eq!(layout["mapbox"]["zoom"], 8.0);
        assert_eq!(layout["mapbox"]["center"]["lat"], 51.1801);
        assert_eq!(layout["mapbox"]["center"]["lon"], 71.4383);
        assert_eq!(layout["height"], 600);
        assert_eq!(layout["margin"]["t"], 30);
        assert_eq!(layout["title"]["text"], "Field Locations");
        assert_eq!(layout["title"]["x"], 0.5);

        let trace = &json["data"][0];
        assert_eq!(trace["type"], "choroplethmapbox");
        assert_eq!(trace["featureidkey"], "properties.Field_ID");
        assert_eq!(trace["marker"]["opacity"], 0.7);
        assert_eq!(trace["showscale"], false);
        assert_eq!(trace["hovertemplate"], "Field_ID=%{location}<extra></extra>");
    }

    #[test]
    fn empty_table_renders_an_empty_map() {
        let rendered = build_map(&table("Field_ID,Org\n"), &geometry(), &MapConfig::default()).unwrap();
        let trace = &rendered.figure.data[0];

        assert!(trace.locations.is_empty());
        assert!(trace.geojson.features.is_empty());
        assert_eq!(rendered.summary, JoinSummary::default());
    }

    #[test]
    fn unmatched_rows_are_dropped_silently() {
        let rendered = build_map(
            &table("Field_ID\nF1\nMISSING\n7\nF1\n"),
            &geometry(),
            &MapConfig::default(),
        )
        .unwrap();
        let trace = &rendered.figure.data[0];

        assert_eq!(trace.locations, vec!["F1", "7", "F1"]);
        assert_eq!(trace.geojson.features.len(), 2);
        assert_eq!(rendered.summary.matched_rows, 3);
        assert_eq!(rendered.summary.unmatched_rows, 1);
        assert!(rendered.summary.unmatched_ids.contains("MISSING"));
    }

    #[test]
    fn serialized_summary_carries_counts_only() {
        let rendered = build_map(&table("Field_ID\nA\nB\nF1\n"), &geometry(), &MapConfig::default()).unwrap();
        let json = serde_json::to_value(&rendered.summary).unwrap();

        assert_eq!(json["matched_rows"], 1);
        assert_eq!(json["unmatched_rows"], 2);
        assert!(json.get("unmatched_ids").is_none());
    }

    #[test]
    fn numeric_feature_ids_are_embedded_as_text() {
        let rendered = build_map(&table("Field_ID\n7\n"), &geometry(), &MapConfig::default()).unwrap();
        let feature = &rendered.figure.data[0].geojson.features[0];
        let id = feature.property("Field_ID").unwrap();
        assert_eq!(id, &serde_json::Value::String("7".to_string()));
    }

    #[test]
    fn missing_identifier_column_is_a_join_failure() {
        let err = build_map(&table("Org\nA\n"), &geometry(), &MapConfig::default()).unwrap_err();
        assert_eq!(err.kind(), "join_failure");
    }

    #[test]
    fn value_column_drives_continuous_coloring() {
        let config = MapConfig {
            value_column: Some("Predicted".to_string()),
            ..MapConfig::default()
        };
        let rendered = build_map(&table("Field_ID,Predicted\nF1,3.5\n7,\n"), &geometry(), &config).unwrap();
        let trace = &rendered.figure.data[0];

        assert_eq!(trace.z, vec![Some(3.5), None]);
        assert!(trace.showscale);
        assert_eq!(trace.colorscale, ColorScale::Named("Viridis".to_string()));
        assert_eq!(trace.colorbar.as_ref().unwrap().title.text, "Predicted");
        assert!(trace.hovertemplate.contains("Predicted=%{z}"));
    }

    #[test]
    fn missing_value_column_is_a_join_failure() {
        let config = MapConfig {
            value_column: Some("Predicted".to_string()),
            ..MapConfig::default()
        };
        let err = build_map(&table("Field_ID\nF1\n"), &geometry(), &config).unwrap_err();
        assert_eq!(err.kind(), "join_failure");
    }

    #[test]
    fn non_numeric_value_is_a_render_failure() {
        let config = MapConfig {
            value_column: Some("Predicted".to_string()),
            ..MapConfig::default()
        };
        let err = build_map(&table("Field_ID,Predicted\nF1,high\n"), &geometry(), &config).unwrap_err();
        assert_eq!(err.kind(), "render_failure");
        assert!(err.to_string().contains("row 1"));
    }
}
