//! Engine-neutral draw commands emitted by layers.
//!
//! A host translates these into whatever its renderer understands; the
//! layers never touch a GPU context directly.

use std::sync::Arc;

use foundation::{Bounds, Mat4};
use serde::{Deserialize, Serialize};
use streaming::{DataType, PixelBuffer, Raster};

use crate::label::{ColorLookupTexture, TileIndex};

/// Per-channel display settings, indexed like the layer's selections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    #[serde(default)]
    pub colors: Vec<[u8; 3]>,
    #[serde(default)]
    pub contrast_limits: Vec<[f64; 2]>,
    #[serde(default)]
    pub visible: Vec<bool>,
}

/// Multichannel image drawn into `bounds`.
#[derive(Debug, Clone, PartialEq)]
pub struct BitmapCommand {
    pub id: String,
    pub bounds: Bounds,
    /// One buffer per selection.
    pub channels: Vec<PixelBuffer>,
    pub width: u32,
    pub height: u32,
    pub dtype: DataType,
    pub settings: ChannelSettings,
    pub model_matrix: Option<Mat4>,
    pub opacity: f32,
    pub pickable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolygonCommand {
    pub id: String,
    /// Closed ring; the first point is not repeated.
    pub polygon: Vec<[f64; 2]>,
    pub fill_color: [u8; 4],
    pub line_color: [u8; 4],
    pub model_matrix: Option<Mat4>,
    pub pickable: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TextAnchor {
    Start,
    Middle,
    End,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TextBaseline {
    Top,
    Center,
    Bottom,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLabel {
    pub position: [f64; 2],
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextCommand {
    pub id: String,
    pub labels: Vec<TextLabel>,
    pub color: [u8; 4],
    pub size: f32,
    pub angle: f32,
    pub anchor: TextAnchor,
    pub baseline: TextBaseline,
    pub model_matrix: Option<Mat4>,
}

/// Integer label tile colored through a lookup texture.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelBitmapCommand {
    pub id: String,
    pub tile: TileIndex,
    pub bounds: Bounds,
    pub raster: Raster,
    pub color_texture: Arc<ColorLookupTexture>,
    /// Bumped whenever the lookup texture is rebuilt.
    pub texture_generation: u64,
    pub opacity: f32,
    pub model_matrix: Option<Mat4>,
    pub pickable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    Bitmap(BitmapCommand),
    Polygon(PolygonCommand),
    Text(TextCommand),
    LabelBitmap(LabelBitmapCommand),
}

impl RenderCommand {
    pub fn id(&self) -> &str {
        match self {
            RenderCommand::Bitmap(c) => &c.id,
            RenderCommand::Polygon(c) => &c.id,
            RenderCommand::Text(c) => &c.id,
            RenderCommand::LabelBitmap(c) => &c.id,
        }
    }
}
