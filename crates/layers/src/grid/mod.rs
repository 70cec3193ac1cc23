//! Multi-well plate view: one multiscale image per cell, laid out on a
//! row/column grid with a fixed spacer.

pub mod cell;
pub mod fetch;
pub mod geometry;
pub mod layer;
pub mod resolution;

pub use cell::{GridCell, RenderTile};
pub use layer::{GridLayer, GridLayerProps, GridPhase, RefreshOutcome, RefreshTicket};
