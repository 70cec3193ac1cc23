//! Quad-tree tile addressing for a label pyramid.
//!
//! Zoom 0 is the finest level; each negative zoom step halves the
//! resolution, so level `i` is addressed at zoom `-i`.

use foundation::{Bounds, Mat4};
use serde::{Deserialize, Serialize};
use streaming::{Dimensions, PyramidLevel, SourceError, dimensions};

use crate::error::LayerError;
use crate::viewport::{Viewport, visible_bounds};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileIndex {
    pub x: u32,
    pub y: u32,
    pub z: i32,
}

impl TileIndex {
    pub fn new(x: u32, y: u32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// A tile as the visibility filter sees it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TileHeader {
    pub index: TileIndex,
    /// Untransformed, unclamped footprint in level-0 pixels.
    pub bbox: Bounds,
    /// Selected for the current viewport.
    pub is_visible: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tileset2D {
    tile_size: u32,
    extent: Dimensions,
    min_zoom: i32,
    max_zoom: i32,
    zoom_offset: i32,
}

/// The tile size every level shares.
pub fn uniform_tile_size(levels: &[PyramidLevel]) -> Result<u32, LayerError> {
    let first = levels.first().ok_or(LayerError::EmptyPyramid)?;
    let expected = first.tile_size();
    match levels.iter().find(|l| l.tile_size() != expected) {
        Some(l) => Err(LayerError::TileSizeMismatch {
            expected,
            found: l.tile_size(),
        }),
        None => Ok(expected),
    }
}

impl Tileset2D {
    pub fn new(levels: &[PyramidLevel], model_matrix: Option<&Mat4>) -> Result<Self, LayerError> {
        let tile_size = uniform_tile_size(levels)?;
        let extent = dimensions(levels[0].as_ref())?;
        if extent.is_empty() || tile_size == 0 {
            return Err(SourceError::precondition(format!(
                "label image must have a non-empty extent and tile size, got {}x{} / {tile_size}",
                extent.width, extent.height
            ))
            .into());
        }
        let scale = model_matrix.map_or(1.0, |m| m.scale()[0]);
        let zoom_offset = if scale.is_finite() && scale > 0.0 {
            scale.log2().round() as i32
        } else {
            0
        };
        Ok(Self {
            tile_size,
            extent,
            min_zoom: -(levels.len() as i32 - 1),
            max_zoom: 0,
            zoom_offset,
        })
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn extent(&self) -> Dimensions {
        self.extent
    }

    pub fn min_zoom(&self) -> i32 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> i32 {
        self.max_zoom
    }

    pub fn zoom_offset(&self) -> i32 {
        self.zoom_offset
    }

    pub fn extent_bounds(&self) -> Bounds {
        Bounds::new(0.0, 0.0, self.extent.width as f64, self.extent.height as f64)
    }

    /// Pyramid level backing tiles at zoom `z`.
    pub fn resolution_index(&self, z: i32) -> usize {
        (-z).max(0) as usize
    }

    /// Edge length of a tile at zoom `z`, in level-0 pixels.
    pub fn tile_span(&self, z: i32) -> f64 {
        f64::from(self.tile_size) * (-f64::from(z)).exp2()
    }

    pub fn tile_bbox(&self, index: TileIndex) -> Bounds {
        let s = self.tile_span(index.z);
        Bounds::new(
            f64::from(index.x) * s,
            f64::from(index.y) * s,
            f64::from(index.x + 1) * s,
            f64::from(index.y + 1) * s,
        )
    }

    /// Where a tile's pixels are drawn: its bbox clamped to the image.
    pub fn render_bounds(&self, index: TileIndex) -> Bounds {
        self.tile_bbox(index).clamp_to(&self.extent_bounds())
    }

    /// Tile zoom for the viewport, adjusted by the model scale and clamped
    /// to the pyramid.
    pub fn zoom_for(&self, viewport: &dyn Viewport) -> i32 {
        let z = viewport.zoom().ceil() as i32 + self.zoom_offset;
        z.clamp(self.min_zoom, self.max_zoom)
    }

    /// Tiles covering the visible part of the image, row-major.
    pub fn visible_tiles(
        &self,
        viewport: &dyn Viewport,
        model_matrix: Option<&Mat4>,
    ) -> Vec<TileIndex> {
        let z = self.zoom_for(viewport);
        let view = visible_bounds(viewport, model_matrix);
        let Some(area) = view.intersect(&self.extent_bounds()) else {
            return Vec::new();
        };
        let span = self.tile_span(z);
        let x0 = (area.left / span).floor() as u32;
        let x1 = (area.right / span).ceil() as u32;
        let y0 = (area.top / span).floor() as u32;
        let y1 = (area.bottom / span).ceil() as u32;
        (y0..y1)
            .flat_map(|y| (x0..x1).map(move |x| TileIndex::new(x, y, z)))
            .collect()
    }

    /// Tile must be selected and, when a cull rectangle (world space) is
    /// given, its transformed bbox must strictly overlap it. Y extents are
    /// compared min/max so Y-flipping transforms still match.
    pub fn is_tile_visible(
        &self,
        tile: &TileHeader,
        cull: Option<&Bounds>,
        model_matrix: Option<&Mat4>,
    ) -> bool {
        if !tile.is_visible {
            return false;
        }
        let Some(cull) = cull else {
            return true;
        };
        let mut bbox = tile.bbox;
        if let Some(m) = model_matrix
            && !m.is_identity()
        {
            bbox = bbox.transform(m);
        }
        let y0 = bbox.top.min(bbox.bottom);
        let y1 = bbox.top.max(bbox.bottom);
        bbox.left < cull.right && bbox.right > cull.left && y0 < cull.bottom && y1 > cull.top
    }
}
