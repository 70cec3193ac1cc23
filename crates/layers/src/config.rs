use serde::{Deserialize, Serialize};

/// Tunables for a plate grid layer.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLayerConfig {
    /// Gap between cells, in full-resolution pixels.
    #[serde(default = "default_spacer")]
    pub spacer: f64,
    /// Emit one text label per cell.
    #[serde(default)]
    pub text: bool,
    /// Upper bound on concurrent raster fetches across all selections.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GridLayerConfig {
    fn default() -> Self {
        Self {
            spacer: default_spacer(),
            text: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_spacer() -> f64 {
    5.0
}

fn default_concurrency() -> usize {
    10
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelLayerConfig {
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    /// Cache capacity; only tiles outside the visible set are evicted.
    #[serde(default = "default_max_cached_tiles")]
    pub max_cached_tiles: usize,
}

impl Default for LabelLayerConfig {
    fn default() -> Self {
        Self {
            opacity: default_opacity(),
            max_cached_tiles: default_max_cached_tiles(),
        }
    }
}

fn default_opacity() -> f32 {
    0.5
}

fn default_max_cached_tiles() -> usize {
    256
}

/// Limits reported by the graphics device.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLimits {
    #[serde(default = "default_max_texture_dimension_2d")]
    pub max_texture_dimension_2d: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_texture_dimension_2d: default_max_texture_dimension_2d(),
        }
    }
}

fn default_max_texture_dimension_2d() -> u32 {
    8192
}

#[cfg(test)]
mod tests {
    use super::{DeviceLimits, GridLayerConfig, LabelLayerConfig};
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_documents_use_defaults() {
        let grid: GridLayerConfig = serde_json::from_str("{}").expect("grid");
        assert_eq!(grid, GridLayerConfig::default());
        assert_eq!(grid.spacer, 5.0);
        assert_eq!(grid.concurrency, 10);

        let label: LabelLayerConfig = serde_json::from_str("{}").expect("label");
        assert_eq!(label.opacity, 0.5);

        let limits: DeviceLimits = serde_json::from_str("{}").expect("limits");
        assert_eq!(limits.max_texture_dimension_2d, 8192);
    }

    #[test]
    fn partial_override() {
        let grid: GridLayerConfig =
            serde_json::from_str(r#"{"text": true, "concurrency": 4}"#).expect("grid");
        assert_eq!(
            grid,
            GridLayerConfig {
                spacer: 5.0,
                text: true,
                concurrency: 4,
            }
        );
    }
}
