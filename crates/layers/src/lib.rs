pub mod config;
pub mod error;
pub mod grid;
pub mod label;
pub mod layer;
pub mod navigation;
pub mod picking;
pub mod render;
pub mod viewport;

#[cfg(test)]
mod testing;

pub use config::{DeviceLimits, GridLayerConfig, LabelLayerConfig};
pub use error::LayerError;
pub use grid::{
    GridCell, GridLayer, GridLayerProps, GridPhase, RefreshOutcome, RefreshTicket, RenderTile,
};
pub use label::{
    ColorLookupTexture, ColorTable, LabelColorEntry, LabelLayer, LabelLayerProps, LabelValue,
    TileIndex, TileOutcome,
};
pub use layer::{ChangeFlags, Layer, RenderContext};
pub use picking::{GridPick, LabelPick, PickingInfo, tooltip};
pub use render::RenderCommand;
pub use viewport::{CullRect, OrthographicViewport, Viewport};
