use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use foundation::{Bounds, Mat4};
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use parking_lot::Mutex;
use streaming::{
    AbortSignal, BoxFuture, PyramidLevel, Raster, Selection, SourceError, SourceErrorKind,
    TileRequest,
};
use tracing::{debug, warn};

use crate::config::{DeviceLimits, LabelLayerConfig};
use crate::error::LayerError;
use crate::label::colors::{ColorLookupTexture, ColorTable, ValueMap, value_map};
use crate::label::picking::{LabelPickOutcome, pick_label};
use crate::label::tileset::{TileHeader, TileIndex, Tileset2D};
use crate::layer::{Layer, RenderContext};
use crate::picking::PickingInfo;
use crate::render::{LabelBitmapCommand, RenderCommand};
use crate::viewport::{CullRect, Viewport};

#[derive(Debug, Clone)]
pub struct LabelLayerProps {
    pub id: String,
    /// Pyramid levels, finest first. Replace the `Arc` to signal new data.
    pub levels: Arc<[PyramidLevel]>,
    pub selection: Selection,
    pub opacity: f32,
    pub model_matrix: Option<Mat4>,
    /// Replace the `Arc` to rebuild the lookup texture.
    pub colors: Option<ColorTable>,
    pub pickable: bool,
    pub config: LabelLayerConfig,
}

impl LabelLayerProps {
    pub fn new(id: impl Into<String>, levels: Vec<PyramidLevel>, selection: Selection) -> Self {
        let config = LabelLayerConfig::default();
        Self {
            id: id.into(),
            levels: levels.into(),
            selection,
            opacity: config.opacity,
            model_matrix: None,
            colors: None,
            pickable: false,
            config,
        }
    }
}

/// A loaded label tile.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTile {
    pub index: TileIndex,
    /// Clamped to the image extent.
    pub bounds: Bounds,
    pub raster: Raster,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileOutcome {
    Loaded(TileIndex),
    /// Transient failure; the tile stays empty until the data changes.
    Failed(TileIndex),
    /// Evicted, aborted or issued for data that has since changed.
    Discarded(TileIndex),
}

#[derive(Debug)]
enum TileSlot {
    Loading { generation: u64, signal: AbortSignal },
    Loaded(LabelTile),
    Failed,
}

#[derive(Debug)]
struct CachedTile {
    slot: TileSlot,
    last_used: u64,
}

type TileResult = (TileIndex, u64, Result<Raster, LayerError>);

/// Tiled view of an integer label image, colored through a lookup texture.
pub struct LabelLayer {
    props: LabelLayerProps,
    tileset: Tileset2D,
    limits: DeviceLimits,
    color_texture: Arc<ColorLookupTexture>,
    texture_generation: u64,
    value_map: Option<Arc<ValueMap>>,
    // Bumped when pyramid or selection change; older fetches are ignored.
    data_generation: u64,
    clock: u64,
    tiles: BTreeMap<TileIndex, CachedTile>,
    visible: BTreeSet<TileIndex>,
    in_flight: FuturesUnordered<BoxFuture<'static, TileResult>>,
    degenerate_logged: Mutex<HashSet<TileIndex>>,
}

impl std::fmt::Debug for LabelLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelLayer")
            .field("id", &self.props.id)
            .field("tiles", &self.tiles.len())
            .field("visible", &self.visible.len())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl LabelLayer {
    pub fn new(props: LabelLayerProps, limits: DeviceLimits) -> Result<Self, LayerError> {
        let tileset = Tileset2D::new(&props.levels, props.model_matrix.as_ref())?;
        let mut layer = Self {
            props,
            tileset,
            limits,
            color_texture: Arc::new(ColorLookupTexture::fallback()),
            texture_generation: 0,
            value_map: None,
            data_generation: 0,
            clock: 0,
            tiles: BTreeMap::new(),
            visible: BTreeSet::new(),
            in_flight: FuturesUnordered::new(),
            degenerate_logged: Mutex::new(HashSet::new()),
        };
        layer.rebuild_color_texture();
        Ok(layer)
    }

    /// Id of the tiled layer; sub-layers are `tile-{x}.{y}.{z}-{id}`.
    pub fn layer_id(&self) -> String {
        format!("labels-{}", self.props.id)
    }

    pub fn props(&self) -> &LabelLayerProps {
        &self.props
    }

    pub fn tileset(&self) -> &Tileset2D {
        &self.tileset
    }

    pub fn color_texture(&self) -> &Arc<ColorLookupTexture> {
        &self.color_texture
    }

    /// Bumped on every lookup texture rebuild.
    pub fn texture_generation(&self) -> u64 {
        self.texture_generation
    }

    pub fn value_map(&self) -> Option<&ValueMap> {
        self.value_map.as_deref()
    }

    pub fn visible_tiles(&self) -> impl Iterator<Item = TileIndex> + '_ {
        self.visible.iter().copied()
    }

    pub fn loaded_tile(&self, index: TileIndex) -> Option<&LabelTile> {
        match &self.tiles.get(&index)?.slot {
            TileSlot::Loaded(tile) => Some(tile),
            _ => None,
        }
    }

    pub fn cached_tiles(&self) -> usize {
        self.tiles.len()
    }

    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    /// Applies new props. Returns the tiles newly requested for `viewport`.
    pub fn update(
        &mut self,
        props: LabelLayerProps,
        viewport: Option<&dyn Viewport>,
    ) -> Result<Vec<TileIndex>, LayerError> {
        let colors_changed = match (&props.colors, &self.props.colors) {
            (Some(new), Some(old)) => !Arc::ptr_eq(new, old),
            (None, None) => false,
            _ => true,
        };
        let data_changed = !Arc::ptr_eq(&props.levels, &self.props.levels)
            || props.selection != self.props.selection;
        let transform_changed = props.model_matrix != self.props.model_matrix;
        self.props = props;

        if data_changed || transform_changed {
            self.tileset = Tileset2D::new(&self.props.levels, self.props.model_matrix.as_ref())?;
        }
        if data_changed {
            self.invalidate_tiles();
        }
        if colors_changed {
            self.rebuild_color_texture();
        }
        match viewport {
            Some(viewport) => self.load_visible(viewport),
            None => Ok(Vec::new()),
        }
    }

    fn rebuild_color_texture(&mut self) {
        let texture =
            ColorLookupTexture::pack(self.props.colors.as_ref(), self.limits.max_texture_dimension_2d);
        self.color_texture = Arc::new(texture);
        self.texture_generation += 1;
        self.value_map = self.props.colors.as_deref().map(|t| Arc::new(value_map(t)));
        debug!(
            layer = %self.props.id,
            generation = self.texture_generation,
            fallback = self.color_texture.fallback,
            "rebuilt label color texture"
        );
    }

    fn invalidate_tiles(&mut self) {
        self.data_generation += 1;
        for cached in self.tiles.values() {
            if let TileSlot::Loading { signal, .. } = &cached.slot {
                signal.abort();
            }
        }
        self.tiles.clear();
        self.visible.clear();
        self.degenerate_logged.lock().clear();
    }

    /// Selects the tiles covering `viewport`, requesting any not cached,
    /// then trims the cache.
    pub fn load_visible(&mut self, viewport: &dyn Viewport) -> Result<Vec<TileIndex>, LayerError> {
        let wanted = self
            .tileset
            .visible_tiles(viewport, self.props.model_matrix.as_ref());
        self.visible = wanted.iter().copied().collect();
        self.clock += 1;

        let mut requested = Vec::new();
        for index in wanted {
            if let Some(cached) = self.tiles.get_mut(&index) {
                cached.last_used = self.clock;
                continue;
            }
            self.request_tile(index)?;
            requested.push(index);
        }
        self.evict();
        Ok(requested)
    }

    fn request_tile(&mut self, index: TileIndex) -> Result<(), LayerError> {
        let level = self.tileset.resolution_index(index.z);
        let source = self.props.levels.get(level).cloned().ok_or_else(|| {
            SourceError::precondition(format!("no pyramid level {level} for tile {index:?}"))
        })?;
        let signal = AbortSignal::new();
        let request = TileRequest {
            x: index.x,
            y: index.y,
            selection: self.props.selection.clone(),
            signal: Some(signal.clone()),
        };
        let generation = self.data_generation;
        self.in_flight.push(Box::pin(async move {
            (index, generation, fetch_label_tile(source, request).await)
        }));
        self.tiles.insert(
            index,
            CachedTile {
                slot: TileSlot::Loading { generation, signal },
                last_used: self.clock,
            },
        );
        Ok(())
    }

    /// Drops least recently used tiles outside the visible set until the
    /// cache fits. Evicted in-flight tiles are aborted.
    fn evict(&mut self) {
        let cap = self.props.config.max_cached_tiles;
        if self.tiles.len() <= cap {
            return;
        }
        let mut candidates: Vec<(u64, TileIndex)> = self
            .tiles
            .iter()
            .filter(|(index, _)| !self.visible.contains(*index))
            .map(|(index, cached)| (cached.last_used, *index))
            .collect();
        candidates.sort_unstable();
        let excess = self.tiles.len() - cap;
        for (_, index) in candidates.into_iter().take(excess) {
            if let Some(CachedTile {
                slot: TileSlot::Loading { signal, .. },
                ..
            }) = self.tiles.remove(&index)
            {
                signal.abort();
            }
        }
    }

    /// Stores a finished tile fetch if it still belongs to the current data.
    ///
    /// Precondition failures (e.g. float label data) are returned; transient
    /// ones mark the tile failed.
    pub fn apply_tile(
        &mut self,
        index: TileIndex,
        generation: u64,
        result: Result<Raster, LayerError>,
    ) -> Result<TileOutcome, LayerError> {
        if generation != self.data_generation {
            return Ok(TileOutcome::Discarded(index));
        }
        let bounds = self.tileset.render_bounds(index);
        let Some(cached) = self.tiles.get_mut(&index) else {
            return Ok(TileOutcome::Discarded(index));
        };
        if !matches!(&cached.slot, TileSlot::Loading { generation: g, .. } if *g == generation) {
            return Ok(TileOutcome::Discarded(index));
        }

        match result {
            Ok(raster) => {
                cached.slot = TileSlot::Loaded(LabelTile {
                    index,
                    bounds,
                    raster,
                });
                Ok(TileOutcome::Loaded(index))
            }
            Err(LayerError::Source(err)) if err.kind == SourceErrorKind::Aborted => {
                self.tiles.remove(&index);
                Ok(TileOutcome::Discarded(index))
            }
            Err(err) if err.is_precondition() => {
                cached.slot = TileSlot::Failed;
                Err(err)
            }
            Err(err) => {
                warn!(layer = %self.props.id, tile = ?index, error = %err, "label tile fetch failed");
                cached.slot = TileSlot::Failed;
                Ok(TileOutcome::Failed(index))
            }
        }
    }

    pub async fn settle_next(&mut self) -> Option<Result<TileOutcome, LayerError>> {
        let (index, generation, result) = self.in_flight.next().await?;
        Some(self.apply_tile(index, generation, result))
    }

    /// Drains every queued tile; the first precondition error is returned
    /// once the queue is empty.
    pub async fn settle_all(&mut self) -> Result<Vec<TileOutcome>, LayerError> {
        let mut outcomes = Vec::new();
        let mut first_err = None;
        while let Some(outcome) = self.settle_next().await {
            match outcome {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(outcomes),
        }
    }

    /// One bitmap per loaded visible tile that survives culling against
    /// `cull_rect`, all sharing the layer's lookup texture.
    pub fn render(
        &self,
        viewport: Option<&dyn Viewport>,
        cull_rect: Option<CullRect>,
    ) -> Vec<RenderCommand> {
        let cull = viewport.zip(cull_rect).map(|(vp, rect)| rect.world_bounds(vp));
        let model = self.props.model_matrix.as_ref();
        let layer_id = self.layer_id();
        self.tiles
            .iter()
            .filter_map(|(index, cached)| match &cached.slot {
                TileSlot::Loaded(tile) => Some((*index, tile)),
                _ => None,
            })
            .filter(|(index, _)| {
                let header = TileHeader {
                    index: *index,
                    bbox: self.tileset.tile_bbox(*index),
                    is_visible: self.visible.contains(index),
                };
                self.tileset.is_tile_visible(&header, cull.as_ref(), model)
            })
            .map(|(index, tile)| {
                RenderCommand::LabelBitmap(LabelBitmapCommand {
                    id: sublayer_id(index, &layer_id),
                    tile: index,
                    bounds: tile.bounds,
                    raster: tile.raster.clone(),
                    color_texture: Arc::clone(&self.color_texture),
                    texture_generation: self.texture_generation,
                    opacity: self.props.opacity,
                    model_matrix: self.props.model_matrix,
                    pickable: self.props.pickable,
                })
            })
            .collect()
    }

    /// Adds the label (and its table value) under `info.coordinate`.
    ///
    /// Uses `info.tile` when set, else the finest loaded visible tile
    /// containing the point.
    pub fn get_picking_info(&self, mut info: PickingInfo) -> PickingInfo {
        if !self.props.pickable {
            return info;
        }
        let Some(coordinate) = info.coordinate else {
            return info;
        };
        let inverse = self.props.model_matrix.as_ref().and_then(Mat4::invert);
        let Some(tile) = self.tile_for_pick(info.tile, coordinate, inverse.as_ref()) else {
            return info;
        };

        match pick_label(
            coordinate,
            &tile.bounds,
            &tile.raster,
            inverse.as_ref(),
            self.value_map.as_deref(),
        ) {
            LabelPickOutcome::Hit { pick, pixel } => {
                info.layer_id = Some(sublayer_id(tile.index, &self.layer_id()));
                info.tile = Some(tile.index);
                info.index = Some(pixel);
                info.label = Some(pick);
                info
            }
            LabelPickOutcome::DegenerateBounds => {
                if self.degenerate_logged.lock().insert(tile.index) {
                    warn!(layer = %self.props.id, tile = ?tile.index, "label tile has zero-sized bounds");
                }
                info
            }
            LabelPickOutcome::Miss => info,
        }
    }

    fn tile_for_pick(
        &self,
        hint: Option<TileIndex>,
        coordinate: [f64; 2],
        inverse: Option<&Mat4>,
    ) -> Option<&LabelTile> {
        if let Some(index) = hint {
            return self.loaded_tile(index);
        }
        let [x, y] = match inverse {
            Some(m) => m.transform_point_2d(coordinate[0], coordinate[1]),
            None => coordinate,
        };
        self.visible
            .iter()
            .rev()
            .filter_map(|index| self.loaded_tile(*index))
            .filter(|tile| tile.bounds.contains(x, y))
            .max_by_key(|tile| tile.index.z)
    }
}

fn sublayer_id(index: TileIndex, layer_id: &str) -> String {
    format!("tile-{}.{}.{}-{layer_id}", index.x, index.y, index.z)
}

async fn fetch_label_tile(source: PyramidLevel, request: TileRequest) -> Result<Raster, LayerError> {
    let raster = source.get_tile(request).await?;
    let dtype = raster.data.dtype();
    if dtype.is_float() {
        return Err(LayerError::NonIntegerLabels(dtype));
    }
    Ok(raster)
}

impl Layer for LabelLayer {
    fn id(&self) -> &str {
        &self.props.id
    }

    fn render(&self, ctx: &RenderContext<'_>) -> Vec<RenderCommand> {
        LabelLayer::render(self, ctx.viewport, ctx.cull_rect)
    }

    fn get_picking_info(&self, info: PickingInfo) -> PickingInfo {
        LabelLayer::get_picking_info(self, info)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{LabelLayer, LabelLayerProps, TileOutcome};
    use crate::config::DeviceLimits;
    use crate::error::LayerError;
    use crate::label::colors::{ColorTable, LabelColorEntry, LabelValue};
    use crate::label::tileset::TileIndex;
    use crate::picking::{PickingInfo, tooltip};
    use crate::render::RenderCommand;
    use crate::testing::{FailingSource, GatedSource, label_source};
    use crate::viewport::{CullRect, OrthographicViewport};
    use pretty_assertions::assert_eq;
    use streaming::{InMemorySource, PyramidLevel, Selection};

    fn props(levels: Vec<PyramidLevel>) -> LabelLayerProps {
        let mut p = LabelLayerProps::new("cells", levels, Selection::default());
        p.pickable = true;
        p
    }

    fn pyramid() -> Vec<PyramidLevel> {
        label_source(64, 32, 16).into_pyramid(2)
    }

    fn whole_image() -> OrthographicViewport {
        OrthographicViewport::new([32.0, 16.0], 0.0, 64.0, 32.0)
    }

    fn colors(entries: &[(u32, Option<LabelValue>)]) -> ColorTable {
        entries
            .iter()
            .map(|(label_value, value)| LabelColorEntry {
                label_value: *label_value,
                rgba: [255, 0, 0, 255],
                value: value.clone(),
            })
            .collect::<Vec<_>>()
            .into()
    }

    #[tokio::test]
    async fn loads_and_renders_visible_tiles() {
        let mut layer = LabelLayer::new(props(pyramid()), DeviceLimits::default()).expect("layer");
        let vp = whole_image();
        let p = layer.props().clone();
        let requested = layer.update(p, Some(&vp)).expect("update");
        assert_eq!(requested.len(), 8);
        assert!(requested.iter().all(|i| i.z == 0));

        let outcomes = layer.settle_all().await.expect("settle");
        assert!(outcomes.iter().all(|o| matches!(o, TileOutcome::Loaded(_))));

        let commands = layer.render(Some(&vp), None);
        assert_eq!(commands.len(), 8);
        let RenderCommand::LabelBitmap(first) = &commands[0] else {
            panic!("expected label bitmap");
        };
        assert_eq!(first.id, "tile-0.0.0-labels-cells");
        assert_eq!(first.opacity, 0.5);
        assert!(commands.iter().all(|c| match c {
            RenderCommand::LabelBitmap(b) => Arc::ptr_eq(&b.color_texture, layer.color_texture()),
            _ => false,
        }));
    }

    #[tokio::test]
    async fn cull_rect_filters_tiles() {
        let mut layer = LabelLayer::new(props(pyramid()), DeviceLimits::default()).expect("layer");
        let vp = whole_image();
        let p = layer.props().clone();
        layer.update(p, Some(&vp)).expect("update");
        layer.settle_all().await.expect("settle");

        // screen 0..20 x 0..10 is world 0..20 x 0..10: tiles (0,0) and (1,0)
        let commands = layer.render(Some(&vp), Some(CullRect::new(0.0, 0.0, 20.0, 10.0)));
        let ids: Vec<&str> = commands.iter().map(RenderCommand::id).collect();
        assert_eq!(ids, vec!["tile-0.0.0-labels-cells", "tile-1.0.0-labels-cells"]);
    }

    #[tokio::test]
    async fn coarse_zoom_reads_coarse_level() {
        let mut layer = LabelLayer::new(props(pyramid()), DeviceLimits::default()).expect("layer");
        let vp = OrthographicViewport::new([32.0, 16.0], -1.0, 64.0, 32.0);
        let p = layer.props().clone();
        let requested = layer.update(p, Some(&vp)).expect("update");
        assert_eq!(
            requested,
            vec![TileIndex::new(0, 0, -1), TileIndex::new(1, 0, -1)]
        );
        layer.settle_all().await.expect("settle");
        let tile = layer.loaded_tile(TileIndex::new(1, 0, -1)).expect("tile");
        assert_eq!((tile.raster.width, tile.raster.height), (16, 16));
        assert_eq!(tile.bounds.left, 32.0);
        assert_eq!(tile.bounds.right, 64.0);
    }

    #[tokio::test]
    async fn float_labels_fail_fast() {
        let floats = InMemorySource::builder(["y", "x"], 16, 8)
            .tile_size(8)
            .plane(Selection::default(), vec![1.0f32; 128])
            .build();
        let mut layer =
            LabelLayer::new(props(vec![Arc::new(floats)]), DeviceLimits::default()).expect("layer");
        let vp = OrthographicViewport::new([8.0, 4.0], 0.0, 16.0, 8.0);
        let p = layer.props().clone();
        assert_eq!(layer.update(p, Some(&vp)).expect("update").len(), 2);
        let err = layer.settle_all().await.unwrap_err();
        assert!(matches!(err, LayerError::NonIntegerLabels(_)));
        assert!(err.is_precondition());
        // both tiles were settled despite the error
        assert_eq!(layer.pending(), 0);
    }

    #[tokio::test]
    async fn transient_failure_marks_tile_failed() {
        let source: PyramidLevel = Arc::new(FailingSource::new(16));
        let mut layer = LabelLayer::new(props(vec![source]), DeviceLimits::default()).expect("layer");
        let vp = OrthographicViewport::new([8.0, 8.0], 0.0, 16.0, 16.0);
        let p = layer.props().clone();
        layer.update(p.clone(), Some(&vp)).expect("update");
        assert_eq!(
            layer.settle_all().await.expect("settle"),
            vec![TileOutcome::Failed(TileIndex::new(0, 0, 0))]
        );
        assert!(layer.render(Some(&vp), None).is_empty());
        // no automatic retry
        assert!(layer.update(p, Some(&vp)).expect("update").is_empty());
    }

    #[tokio::test]
    async fn selection_change_discards_in_flight_tiles() {
        let (gated, gate) = GatedSource::new(label_source(16, 16, 16));
        let mut layer =
            LabelLayer::new(props(vec![Arc::new(gated)]), DeviceLimits::default()).expect("layer");
        let vp = OrthographicViewport::new([8.0, 8.0], 0.0, 16.0, 16.0);
        let p = layer.props().clone();
        layer.update(p.clone(), Some(&vp)).expect("update");

        let mut changed = p;
        changed.selection = Selection::new([0]);
        layer.update(changed, None).expect("update");
        assert_eq!(layer.cached_tiles(), 0);

        gate.add_permits(4);
        assert_eq!(
            layer.settle_all().await.expect("settle"),
            vec![TileOutcome::Discarded(TileIndex::new(0, 0, 0))]
        );
        assert_eq!(layer.cached_tiles(), 0);
    }

    #[tokio::test]
    async fn cache_evicts_least_recently_used_hidden_tiles() {
        let mut p = props(pyramid());
        p.config.max_cached_tiles = 4;
        let mut layer = LabelLayer::new(p, DeviceLimits::default()).expect("layer");

        let left = OrthographicViewport::new([8.0, 8.0], 0.0, 16.0, 16.0);
        let right = OrthographicViewport::new([56.0, 24.0], 0.0, 16.0, 16.0);
        let p = layer.props().clone();
        layer.update(p.clone(), Some(&left)).expect("left");
        layer.settle_all().await.expect("settle");
        assert!(layer.loaded_tile(TileIndex::new(0, 0, 0)).is_some());

        // whole image: 8 visible tiles, nothing evictable
        layer.update(p.clone(), Some(&whole_image())).expect("whole");
        layer.settle_all().await.expect("settle");
        assert_eq!(layer.cached_tiles(), 8);

        layer.update(p, Some(&right)).expect("right");
        assert_eq!(layer.cached_tiles(), 4);
        assert_eq!(
            layer.visible_tiles().collect::<Vec<_>>(),
            vec![TileIndex::new(3, 1, 0)]
        );
        assert!(layer.loaded_tile(TileIndex::new(3, 1, 0)).is_some());
    }

    #[tokio::test]
    async fn texture_rebuilds_only_on_new_table() {
        let mut layer = LabelLayer::new(props(pyramid()), DeviceLimits::default()).expect("layer");
        assert_eq!(layer.texture_generation(), 1);
        assert!(layer.color_texture().fallback);

        let mut p = layer.props().clone();
        p.colors = Some(colors(&[(1, None), (2, None)]));
        layer.update(p.clone(), None).expect("colors");
        assert_eq!(layer.texture_generation(), 2);
        assert!(!layer.color_texture().fallback);

        layer.update(p.clone(), None).expect("same table");
        assert_eq!(layer.texture_generation(), 2);

        p.colors = None;
        layer.update(p, None).expect("cleared");
        assert_eq!(layer.texture_generation(), 3);
        assert!(layer.value_map().is_none());
    }

    #[tokio::test]
    async fn small_device_falls_back_to_palette() {
        let mut p = props(pyramid());
        p.colors = Some(colors(&[(150, None)]));
        let layer = LabelLayer::new(
            p,
            DeviceLimits {
                max_texture_dimension_2d: 10,
            },
        )
        .expect("layer");
        assert!(layer.color_texture().fallback);
        assert_eq!(layer.color_texture().width, 15);
    }

    #[tokio::test]
    async fn picking_reports_label_and_value() {
        let mut p = props(pyramid());
        p.colors = Some(colors(&[(37, Some(LabelValue::Text("nucleus".into())))]));
        let mut layer = LabelLayer::new(p, DeviceLimits::default()).expect("layer");
        let vp = whole_image();
        let p = layer.props().clone();
        layer.update(p, Some(&vp)).expect("update");
        layer.settle_all().await.expect("settle");

        // pixel (5, 0) of a 64-wide ramp holds 5; (37, 0) holds 37
        let info = layer.get_picking_info(PickingInfo::at([37.5, 0.5]));
        assert_eq!(info.tile, Some(TileIndex::new(2, 0, 0)));
        assert_eq!(info.label.as_ref().map(|l| l.label), Some(37));
        assert_eq!(tooltip(&info).as_deref(), Some("37: nucleus"));

        let plain = layer.get_picking_info(PickingInfo::at([5.5, 0.5]));
        assert_eq!(tooltip(&plain).as_deref(), Some("5"));

        let background = layer.get_picking_info(PickingInfo::at([0.5, 0.5]));
        assert_eq!(background.label.as_ref().map(|l| l.label), Some(0));
        assert_eq!(tooltip(&background), None);
    }
}
