use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result, anyhow};

pub const DEFAULT_GEOMETRY_FILE: &str = "All Fields Polygons.geojson";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub filters: FilterConfig,
    pub page: PageConfig,
    pub map: MapConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    pub geometry: PathBuf,
    pub id_column: String,
    pub delimiter: char,
    pub cache_geometry: bool, // Memoize the parsed geometry between passes
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            geometry: PathBuf::from(DEFAULT_GEOMETRY_FILE),
            id_column: "Field_ID".to_string(),
            delimiter: ',',
            cache_geometry: true,
        }
    }
}

impl InputConfig {
    pub fn delimiter_byte(&self) -> u8 {
        // Checked ASCII at load time
        self.delimiter as u8
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FilterConfig {
    pub columns: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            columns: vec!["Организация".to_string(), "Подразделение".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PageConfig {
    pub title: String,
    pub subheader: String,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            title: "Field Mapping".to_string(),
            subheader: "Predicted Value Map".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct Center {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct Margin {
    pub r: u32,
    pub t: u32,
    pub l: u32,
    pub b: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    pub style: String,
    pub zoom: f64,
    pub center: Center,
    pub opacity: f64,
    pub height: u32,
    pub margin: Margin,
    pub title: String,
    pub value_column: Option<String>, // Continuous coloring when set
    pub color_scale: String,
    pub uniform_color: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            style: "carto-positron".to_string(),
            zoom: 8.0,
            center: Center { lat: 51.1801, lon: 71.4383 },
            opacity: 0.7,
            height: 600,
            margin: Margin { r: 0, t: 30, l: 0, b: 0 },
            title: "Field Locations".to_string(),
            value_column: None,
            color_scale: "Viridis".to_string(),
            uniform_color: "#636efa".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
            max_upload_bytes: 200 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let mut config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.input.geometry = resolve_relative(base, &config.input.geometry);
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise uses the built-in defaults with the
    /// geometry file expected next to the running executable.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => {
                let mut config = AppConfig::default();
                let exe = std::env::current_exe().context("Failed to locate executable")?;
                let base = exe.parent().unwrap_or_else(|| Path::new("."));
                config.input.geometry = resolve_relative(base, &config.input.geometry);
                Ok(config)
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.input.delimiter.is_ascii() {
            return Err(anyhow!("CSV delimiter must be an ASCII character, got {:?}", self.input.delimiter));
        }
        if self.input.id_column.is_empty() {
            return Err(anyhow!("input.id_column must not be empty"));
        }
        Ok(())
    }
}

fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}
