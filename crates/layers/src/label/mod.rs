//! Segmentation labels: integer tiles colored through a per-layer lookup
//! texture.

pub mod colors;
pub mod layer;
pub mod picking;
pub mod tileset;

pub use colors::{ColorLookupTexture, ColorTable, LabelColorEntry, LabelValue, ValueMap};
pub use layer::{LabelLayer, LabelLayerProps, LabelTile, TileOutcome};
pub use picking::{LabelPickOutcome, pick_label};
pub use tileset::{TileHeader, TileIndex, Tileset2D};
