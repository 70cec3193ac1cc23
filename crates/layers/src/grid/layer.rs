use std::sync::Arc;

use foundation::Mat4;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use streaming::{BoxFuture, DataType, Dimensions, Selection};
use tracing::{debug, warn};

use crate::config::GridLayerConfig;
use crate::error::LayerError;
use crate::grid::cell::{GridCell, RenderTile};
use crate::grid::fetch::{FetchPlan, GridFetchRequest};
use crate::grid::geometry::{cell_at, cell_bounds, grid_extent};
use crate::grid::resolution::{
    cell_screen_size, full_resolution_size, level_dimensions, max_valid_level, select_level,
};
use crate::layer::{ChangeFlags, Layer, RenderContext};
use crate::picking::{GridPick, PickingInfo};
use crate::render::{
    BitmapCommand, ChannelSettings, PolygonCommand, RenderCommand, TextAnchor, TextBaseline,
    TextCommand, TextLabel,
};
use crate::viewport::{Viewport, visible_bounds};

#[derive(Debug, Clone)]
pub struct GridLayerProps {
    pub id: String,
    /// Replace the `Arc` to signal a new image; contents are never diffed.
    pub cells: Arc<[GridCell]>,
    pub rows: u32,
    pub columns: u32,
    pub row_labels: Option<Vec<String>>,
    pub column_labels: Option<Vec<String>>,
    pub selections: Arc<[Selection]>,
    pub channels: ChannelSettings,
    pub model_matrix: Option<Mat4>,
    pub opacity: f32,
    pub pickable: bool,
    pub config: GridLayerConfig,
}

impl GridLayerProps {
    pub fn new(id: impl Into<String>, cells: Vec<GridCell>, rows: u32, columns: u32) -> Self {
        Self {
            id: id.into(),
            cells: cells.into(),
            rows,
            columns,
            row_labels: None,
            column_labels: None,
            selections: Arc::from(vec![Selection::default()]),
            channels: ChannelSettings::default(),
            model_matrix: None,
            opacity: 1.0,
            pickable: false,
            config: GridLayerConfig::default(),
        }
    }
}

/// Identifies one refresh: the level it was issued for plus a per-layer
/// sequence number.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefreshTicket {
    pub level: usize,
    pub generation: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GridPhase {
    /// Nothing applied yet.
    Initializing,
    Idle(usize),
    Fetching(usize),
    /// Showing `from` while `to` loads.
    LevelTransition { from: usize, to: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied { tiles: usize },
    /// The fetch failed; tiles were reset to empty.
    Cleared,
    /// Superseded by a newer refresh or a level change.
    Discarded,
}

/// Current level, cell size and the tiles on display.
#[derive(Debug, Clone, Default)]
pub struct ResolutionState {
    pub level: usize,
    pub full: Dimensions,
    pub tiles: Vec<RenderTile>,
}

pub type RefreshResult = (RefreshTicket, Result<Vec<RenderTile>, LayerError>);

/// A refresh whose result has not been applied yet.
pub type PendingRefresh = BoxFuture<'static, RefreshResult>;

/// Plate layer: picks a pyramid level from the zoom, fetches visible cells
/// and emits one bitmap per cell.
///
/// Fetches are queued internally. Drive them with `settle_next`/`settle_all`,
/// or hand them to another executor with `take_pending` and report back
/// through `apply_refresh`.
pub struct GridLayer {
    props: GridLayerProps,
    state: ResolutionState,
    next_generation: u64,
    applied_generation: u64,
    applied_level: Option<usize>,
    in_flight: FuturesUnordered<PendingRefresh>,
}

impl std::fmt::Debug for GridLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridLayer")
            .field("id", &self.props.id)
            .field("level", &self.state.level)
            .field("tiles", &self.state.tiles.len())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl GridLayer {
    /// Starts at the coarsest level shared by every cell and queues a
    /// whole-grid refresh.
    pub fn new(props: GridLayerProps) -> Result<Self, LayerError> {
        let full = full_resolution_size(&props.cells)?;
        let level = max_valid_level(&props.cells);
        let mut layer = Self {
            props,
            state: ResolutionState {
                level,
                full,
                tiles: Vec::new(),
            },
            next_generation: 0,
            applied_generation: 0,
            applied_level: None,
            in_flight: FuturesUnordered::new(),
        };
        layer.refresh(level, None)?;
        Ok(layer)
    }

    pub fn props(&self) -> &GridLayerProps {
        &self.props
    }

    pub fn state(&self) -> &ResolutionState {
        &self.state
    }

    pub fn level(&self) -> usize {
        self.state.level
    }

    pub fn tiles(&self) -> &[RenderTile] {
        &self.state.tiles
    }

    /// Refreshes issued but not yet settled.
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    pub fn phase(&self) -> GridPhase {
        let level = self.state.level;
        match self.applied_level {
            None => GridPhase::Initializing,
            Some(_) if self.in_flight.is_empty() => GridPhase::Idle(level),
            Some(from) if from != level => GridPhase::LevelTransition { from, to: level },
            Some(_) => GridPhase::Fetching(level),
        }
    }

    /// Applies new props and queues whatever refresh they call for.
    ///
    /// New cells or selections always refetch at the current level. A
    /// viewport change re-selects the level and refetches, since panning
    /// changes which cells are visible even at a fixed level.
    pub fn update(
        &mut self,
        props: GridLayerProps,
        viewport: Option<&dyn Viewport>,
        flags: ChangeFlags,
    ) -> Result<Option<RefreshTicket>, LayerError> {
        let cells_changed = !Arc::ptr_eq(&props.cells, &self.props.cells);
        let selections_changed = props.selections != self.props.selections;
        self.props = props;

        if cells_changed {
            self.state.full = full_resolution_size(&self.props.cells)?;
            self.state.level = self.state.level.min(max_valid_level(&self.props.cells));
        }
        if cells_changed || selections_changed {
            return self.refresh(self.state.level, viewport).map(Some);
        }
        if !flags.viewport_changed {
            return Ok(None);
        }

        let level = self.select_level(viewport)?;
        if level != self.state.level {
            debug!(
                layer = %self.props.id,
                from = self.state.level,
                to = level,
                "grid resolution level changed"
            );
            self.state.level = level;
        }
        self.refresh(level, viewport).map(Some)
    }

    /// Switches to `level` (clamped to the shared range) and refetches.
    pub fn request_refresh(
        &mut self,
        level: usize,
        viewport: Option<&dyn Viewport>,
    ) -> Result<RefreshTicket, LayerError> {
        let level = level.min(max_valid_level(&self.props.cells));
        self.state.level = level;
        self.refresh(level, viewport)
    }

    fn select_level(&self, viewport: Option<&dyn Viewport>) -> Result<usize, LayerError> {
        if max_valid_level(&self.props.cells) == 0 {
            return Ok(0);
        }
        let levels = level_dimensions(&self.props.cells)?;
        let screen = cell_screen_size(viewport, self.state.full, self.props.model_matrix.as_ref());
        Ok(select_level(&levels, screen, self.state.level))
    }

    fn refresh(
        &mut self,
        level: usize,
        viewport: Option<&dyn Viewport>,
    ) -> Result<RefreshTicket, LayerError> {
        self.next_generation += 1;
        let ticket = RefreshTicket {
            level,
            generation: self.next_generation,
        };
        let visible = viewport.map(|vp| visible_bounds(vp, self.props.model_matrix.as_ref()));
        let plan = FetchPlan::plan(&GridFetchRequest {
            cells: &self.props.cells,
            selections: &self.props.selections,
            level,
            full: self.state.full,
            spacer: self.props.config.spacer,
            concurrency: self.props.config.concurrency,
            visible,
        })?;
        debug!(
            layer = %self.props.id,
            level,
            generation = ticket.generation,
            cells = plan.len(),
            "refreshing grid data"
        );
        let fetch = plan.execute();
        self.in_flight
            .push(Box::pin(async move { (ticket, fetch.await) }));
        Ok(ticket)
    }

    /// Hands queued refreshes to the caller, who must report each result
    /// through `apply_refresh`.
    pub fn take_pending(&mut self) -> Vec<PendingRefresh> {
        std::mem::take(&mut self.in_flight).into_iter().collect()
    }

    /// Applies a finished refresh if it is still current: issued for the
    /// current level and newer than anything applied so far.
    ///
    /// Transient failures clear the tiles and return `Cleared`; precondition
    /// failures clear them and return the error.
    pub fn apply_refresh(
        &mut self,
        ticket: RefreshTicket,
        result: Result<Vec<RenderTile>, LayerError>,
    ) -> Result<RefreshOutcome, LayerError> {
        if ticket.level != self.state.level || ticket.generation <= self.applied_generation {
            debug!(
                layer = %self.props.id,
                level = ticket.level,
                generation = ticket.generation,
                current_level = self.state.level,
                "discarding stale grid refresh"
            );
            return Ok(RefreshOutcome::Discarded);
        }
        self.applied_generation = ticket.generation;
        self.applied_level = Some(ticket.level);

        match result {
            Ok(tiles) => {
                let count = tiles.len();
                self.state.tiles = tiles;
                Ok(RefreshOutcome::Applied { tiles: count })
            }
            Err(err) if err.is_precondition() => {
                self.state.tiles.clear();
                Err(err)
            }
            Err(err) => {
                warn!(layer = %self.props.id, error = %err, "grid refresh failed; clearing tiles");
                self.state.tiles.clear();
                Ok(RefreshOutcome::Cleared)
            }
        }
    }

    /// Waits for the next queued refresh to finish and applies it.
    /// `None` once nothing is queued.
    pub async fn settle_next(&mut self) -> Option<Result<RefreshOutcome, LayerError>> {
        let (ticket, result) = self.in_flight.next().await?;
        Some(self.apply_refresh(ticket, result))
    }

    /// Settles every queued refresh, in completion order.
    ///
    /// The queue is always drained; the first precondition error is
    /// returned once it is empty.
    pub async fn settle_all(&mut self) -> Result<Vec<RefreshOutcome>, LayerError> {
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

    pub fn render(&self) -> Vec<RenderCommand> {
        let full = self.state.full;
        if full.is_empty() {
            return Vec::new();
        }
        let p = &self.props;
        let mut commands: Vec<RenderCommand> = self
            .state
            .tiles
            .iter()
            .map(|tile| {
                RenderCommand::Bitmap(BitmapCommand {
                    id: format!("{}-GridLayer-{}-{}", p.id, tile.row, tile.col),
                    bounds: tile.bounds,
                    channels: tile.channels.clone(),
                    width: tile.width,
                    height: tile.height,
                    dtype: tile.dtype.unwrap_or(DataType::FALLBACK),
                    settings: p.channels.clone(),
                    model_matrix: p.model_matrix,
                    opacity: p.opacity,
                    pickable: false,
                })
            })
            .collect();

        if p.pickable {
            let extent = grid_extent(p.rows, p.columns, full, p.config.spacer);
            commands.push(RenderCommand::Polygon(PolygonCommand {
                id: format!("{}-GridLayer-picking", p.id),
                polygon: vec![
                    [extent.left, extent.top],
                    [extent.right, extent.top],
                    [extent.right, extent.bottom],
                    [extent.left, extent.bottom],
                ],
                fill_color: [0, 0, 0, 0],
                line_color: [0, 0, 0, 0],
                model_matrix: p.model_matrix,
                pickable: true,
            }));
        }

        // Labels follow the fetched tiles, so a cleared grid shows none.
        if p.config.text && !self.state.tiles.is_empty() {
            let labels = self
                .state
                .tiles
                .iter()
                .map(|tile| {
                    let b = cell_bounds(tile.row, tile.col, full, p.config.spacer);
                    TextLabel {
                        position: [b.left, b.top],
                        text: tile.name.clone(),
                    }
                })
                .collect();
            commands.push(RenderCommand::Text(TextCommand {
                id: format!("{}-GridLayer-text", p.id),
                labels,
                color: [255, 255, 255, 255],
                size: 16.0,
                angle: 0.0,
                anchor: TextAnchor::Start,
                baseline: TextBaseline::Top,
                model_matrix: p.model_matrix,
            }));
        }
        commands
    }

    /// Adds the grid row/column under `info.coordinate`. Points outside the
    /// grid leave `info` unchanged.
    pub fn get_picking_info(&self, info: PickingInfo) -> PickingInfo {
        let Some([x, y]) = info.coordinate else {
            return info;
        };
        let full = self.state.full;
        if full.is_empty() {
            return info;
        }
        let (row, column) = cell_at(x, y, full, self.props.config.spacer);
        let in_range = (0..i64::from(self.props.rows)).contains(&row)
            && (0..i64::from(self.props.columns)).contains(&column);
        if !in_range {
            return info;
        }
        let (row, column) = (row as u32, column as u32);
        let label = |labels: &Option<Vec<String>>, i: u32| {
            labels.as_ref().and_then(|l| l.get(i as usize)).cloned()
        };
        PickingInfo {
            grid: Some(GridPick {
                row,
                column,
                row_label: label(&self.props.row_labels, row),
                column_label: label(&self.props.column_labels, column),
            }),
            ..info
        }
    }
}

impl Layer for GridLayer {
    fn id(&self) -> &str {
        &self.props.id
    }

    fn render(&self, _ctx: &RenderContext<'_>) -> Vec<RenderCommand> {
        GridLayer::render(self)
    }

    fn get_picking_info(&self, info: PickingInfo) -> PickingInfo {
        GridLayer::get_picking_info(self, info)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{GridLayer, GridLayerProps, GridPhase, RefreshOutcome};
    use crate::error::LayerError;
    use crate::grid::cell::GridCell;
    use crate::layer::ChangeFlags;
    use crate::picking::{PickingInfo, tooltip};
    use crate::render::RenderCommand;
    use crate::testing::{FailingSource, GatedSource, cell_source, plate, tracked_plate};
    use crate::viewport::OrthographicViewport;
    use foundation::Bounds;
    use pretty_assertions::assert_eq;
    use streaming::{PyramidLevel, Selection};

    fn props(cells: Vec<GridCell>, rows: u32, columns: u32) -> GridLayerProps {
        let mut p = GridLayerProps::new("plate", cells, rows, columns);
        p.selections = Arc::from(vec![Selection::new([0])]);
        p
    }

    const VIEWPORT_CHANGED: ChangeFlags = ChangeFlags {
        viewport_changed: true,
    };

    /// Single cell whose four levels each wait on their own gate and hold
    /// the level index as pixel value.
    fn gated_cell() -> (Vec<GridCell>, Vec<Arc<tokio::sync::Semaphore>>) {
        let mut levels: Vec<PyramidLevel> = Vec::new();
        let mut gates = Vec::new();
        for level in 0..4u32 {
            let (source, gate) = GatedSource::new(cell_source(64 >> level, level as u16));
            levels.push(Arc::new(source));
            gates.push(gate);
        }
        (vec![GridCell::new(0, 0, "A1", levels)], gates)
    }

    fn shown_level_value(layer: &GridLayer) -> Option<f64> {
        layer.tiles().first().and_then(|t| t.channels[0].get(0))
    }

    #[tokio::test]
    async fn initial_refresh_uses_coarsest_shared_level() {
        let mut layer = GridLayer::new(props(plate(2, 2, 64, 3), 2, 2)).expect("layer");
        assert_eq!(layer.level(), 2);
        assert_eq!(layer.phase(), GridPhase::Initializing);

        let outcomes = layer.settle_all().await.expect("settle");
        assert_eq!(outcomes, vec![RefreshOutcome::Applied { tiles: 4 }]);
        assert_eq!(layer.phase(), GridPhase::Idle(2));
        assert!(layer.tiles().iter().all(|t| t.level == 2 && t.full_cell));
        assert!(layer.tiles().iter().all(|t| (t.width, t.height) == (16, 16)));
    }

    #[tokio::test]
    async fn pan_to_quadrant_fetches_only_that_cell() {
        let (cells, sources) = tracked_plate(2, 2, 100);
        let mut layer = GridLayer::new(props(cells, 2, 2)).expect("layer");
        layer.settle_all().await.expect("initial");
        let before: Vec<usize> = sources.iter().map(|s| s.requests().len()).collect();

        let vp = OrthographicViewport::new([40.0, 40.0], 0.0, 60.0, 60.0);
        let p = layer.props().clone();
        layer
            .update(p, Some(&vp), VIEWPORT_CHANGED)
            .expect("update");
        layer.settle_all().await.expect("settle");

        let after: Vec<usize> = sources.iter().map(|s| s.requests().len()).collect();
        assert_eq!(after[0], before[0] + 1);
        assert_eq!(&after[1..], &before[1..]);

        let tiles = layer.tiles();
        assert_eq!(tiles.len(), 1);
        assert!(!tiles[0].full_cell);
        assert!(tiles[0].width <= 100 && tiles[0].height <= 100);
        let cell = Bounds::new(0.0, 0.0, 100.0, 100.0);
        assert_eq!(tiles[0].bounds.intersect(&cell), Some(tiles[0].bounds));
        assert_eq!(tiles[0].bounds, Bounds::new(10.0, 10.0, 70.0, 70.0));
    }

    #[tokio::test]
    async fn zooming_in_selects_finer_level() {
        let mut layer = GridLayer::new(props(plate(1, 1, 256, 3), 1, 1)).expect("layer");
        layer.settle_all().await.expect("initial");
        assert_eq!(layer.level(), 2);

        // one full cell spans 256 screen pixels: level 0 is sharp enough
        let vp = OrthographicViewport::new([128.0, 128.0], 0.0, 512.0, 512.0);
        let p = layer.props().clone();
        let ticket = layer
            .update(p, Some(&vp), VIEWPORT_CHANGED)
            .expect("update")
            .expect("ticket");
        assert_eq!(ticket.level, 0);
        assert_eq!(layer.phase(), GridPhase::LevelTransition { from: 2, to: 0 });
        layer.settle_all().await.expect("settle");
        assert_eq!(layer.tiles()[0].level, 0);
    }

    #[tokio::test]
    async fn stale_level_result_is_discarded_when_it_finishes_last() {
        let (cells, gates) = gated_cell();
        let mut layer = GridLayer::new(props(cells, 1, 1)).expect("layer");
        gates[3].add_permits(16);
        layer.settle_all().await.expect("initial");

        let two = layer.request_refresh(2, None).expect("level 2");
        let three = layer.request_refresh(3, None).expect("level 3");
        assert!(three.generation > two.generation);

        assert_eq!(
            layer.settle_next().await.expect("pending").expect("apply"),
            RefreshOutcome::Applied { tiles: 1 }
        );
        gates[2].add_permits(16);
        assert_eq!(
            layer.settle_next().await.expect("pending").expect("apply"),
            RefreshOutcome::Discarded
        );
        assert_eq!(layer.level(), 3);
        assert_eq!(shown_level_value(&layer), Some(3.0));
    }

    #[tokio::test]
    async fn stale_level_result_is_discarded_when_it_finishes_first() {
        let (cells, gates) = gated_cell();
        let mut layer = GridLayer::new(props(cells, 1, 1)).expect("layer");
        layer.request_refresh(2, None).expect("level 2");
        layer.request_refresh(3, None).expect("level 3");

        gates[2].add_permits(16);
        assert_eq!(
            layer.settle_next().await.expect("pending").expect("apply"),
            RefreshOutcome::Discarded
        );
        assert!(layer.tiles().is_empty());

        gates[3].add_permits(16);
        layer.settle_all().await.expect("settle");
        assert_eq!(shown_level_value(&layer), Some(3.0));
        assert_eq!(layer.phase(), GridPhase::Idle(3));
    }

    #[tokio::test]
    async fn older_refresh_at_same_level_loses() {
        let (cells, _) = tracked_plate(1, 2, 32);
        let mut layer = GridLayer::new(props(cells, 1, 2)).expect("layer");
        layer.settle_all().await.expect("initial");

        let wide = OrthographicViewport::new([32.0, 16.0], 0.0, 80.0, 40.0);
        let narrow = OrthographicViewport::new([16.0, 16.0], 0.0, 32.0, 32.0);
        let p = layer.props().clone();
        let first = layer
            .update(p.clone(), Some(&wide), VIEWPORT_CHANGED)
            .expect("wide")
            .expect("ticket");
        let second = layer
            .update(p, Some(&narrow), VIEWPORT_CHANGED)
            .expect("narrow")
            .expect("ticket");
        assert_eq!(first.level, second.level);

        let mut results = Vec::new();
        for pending in layer.take_pending() {
            results.push(pending.await);
        }
        results.sort_by_key(|(ticket, _)| std::cmp::Reverse(ticket.generation));
        let outcomes: Vec<_> = results
            .into_iter()
            .map(|(ticket, result)| layer.apply_refresh(ticket, result).expect("apply"))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                RefreshOutcome::Applied { tiles: 1 },
                RefreshOutcome::Discarded
            ]
        );
        assert_eq!(layer.tiles().len(), 1);
    }

    #[tokio::test]
    async fn failed_fetch_clears_tiles() {
        let mut layer = GridLayer::new(props(plate(1, 2, 16, 1), 1, 2)).expect("layer");
        layer.settle_all().await.expect("initial");
        assert_eq!(layer.tiles().len(), 2);

        let failing: Vec<GridCell> = (0..2)
            .map(|col| {
                let level: PyramidLevel = Arc::new(FailingSource::new(16));
                GridCell::new(0, col, format!("A{}", col + 1), vec![level])
            })
            .collect();
        let p = props(failing, 1, 2);
        layer.update(p, None, ChangeFlags::default()).expect("update");
        let outcomes = layer.settle_all().await.expect("no error surfaces");
        assert_eq!(outcomes, vec![RefreshOutcome::Cleared]);
        assert!(layer.tiles().is_empty());
        assert!(layer.render().is_empty());
    }

    #[tokio::test]
    async fn text_labels_follow_fetched_tiles() {
        let mut p = props(plate(1, 2, 16, 1), 1, 2);
        p.config.text = true;
        let mut layer = GridLayer::new(p).expect("layer");
        layer.settle_all().await.expect("initial");

        // only the first well is on screen
        let vp = OrthographicViewport::new([8.0, 8.0], 0.0, 16.0, 16.0);
        let p = layer.props().clone();
        layer.update(p, Some(&vp), VIEWPORT_CHANGED).expect("pan");
        layer.settle_all().await.expect("settle");
        let texts: Vec<Vec<String>> = layer
            .render()
            .into_iter()
            .filter_map(|c| match c {
                RenderCommand::Text(t) => Some(t.labels.into_iter().map(|l| l.text).collect()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec![vec!["A1".to_string()]]);

        let failing: Vec<GridCell> = (0..2)
            .map(|col| {
                let level: PyramidLevel = Arc::new(FailingSource::new(16));
                GridCell::new(0, col, format!("A{}", col + 1), vec![level])
            })
            .collect();
        let mut p = props(failing, 1, 2);
        p.config.text = true;
        layer.update(p, None, ChangeFlags::default()).expect("update");
        layer.settle_all().await.expect("cleared");
        assert!(
            !layer
                .render()
                .iter()
                .any(|c| matches!(c, RenderCommand::Text(_)))
        );
    }

    #[tokio::test]
    async fn shape_mismatch_degrades_to_empty() {
        let mut cells = plate(1, 1, 32, 1);
        cells.extend(plate(1, 1, 30, 1).into_iter().map(|mut c| {
            c.col = 1;
            c
        }));
        let mut layer = GridLayer::new(props(cells, 1, 2)).expect("layer");
        assert_eq!(
            layer.settle_all().await.expect("settle"),
            vec![RefreshOutcome::Cleared]
        );
    }

    #[tokio::test]
    async fn missing_plane_surfaces_as_precondition() {
        let mut layer = GridLayer::new(props(plate(1, 1, 16, 1), 1, 1)).expect("layer");
        layer.settle_all().await.expect("initial");
        let mut p = layer.props().clone();
        p.selections = Arc::from(vec![Selection::new([7])]);
        layer.update(p, None, ChangeFlags::default()).expect("update");
        let err = layer.settle_all().await.unwrap_err();
        assert!(err.is_precondition());
    }

    #[tokio::test]
    async fn precondition_error_still_drains_queue() {
        let mut layer = GridLayer::new(props(plate(1, 1, 16, 1), 1, 1)).expect("layer");
        layer.settle_all().await.expect("initial");
        for missing in [7, 8] {
            let mut p = layer.props().clone();
            p.selections = Arc::from(vec![Selection::new([missing])]);
            layer.update(p, None, ChangeFlags::default()).expect("update");
        }
        assert_eq!(layer.pending(), 2);

        assert!(layer.settle_all().await.is_err());
        assert_eq!(layer.pending(), 0);
        assert!(layer.settle_next().await.is_none());
    }

    #[tokio::test]
    async fn visible_cell_without_levels_fails_fast() {
        let mut cells = plate(1, 2, 16, 1);
        cells[1].levels.clear();
        let mut layer = GridLayer::new(props(cells, 1, 2)).expect("layer");
        layer.settle_all().await.expect("initial");
        let vp = OrthographicViewport::new([20.0, 8.0], 0.0, 64.0, 32.0);
        let p = layer.props().clone();
        let err = layer
            .update(p, Some(&vp), VIEWPORT_CHANGED)
            .unwrap_err();
        assert!(matches!(err, LayerError::MissingSources { row: 0, col: 1 }));
    }

    #[tokio::test]
    async fn render_emits_bitmaps_picking_polygon_and_text() {
        let mut p = props(plate(2, 2, 10, 1), 2, 2);
        p.pickable = true;
        p.config.text = true;
        let mut layer = GridLayer::new(p).expect("layer");
        layer.settle_all().await.expect("settle");

        let commands = layer.render();
        let ids: Vec<&str> = commands.iter().map(RenderCommand::id).collect();
        assert_eq!(
            ids,
            vec![
                "plate-GridLayer-0-0",
                "plate-GridLayer-0-1",
                "plate-GridLayer-1-0",
                "plate-GridLayer-1-1",
                "plate-GridLayer-picking",
                "plate-GridLayer-text",
            ]
        );
        let RenderCommand::Bitmap(bitmap) = &commands[3] else {
            panic!("expected bitmap");
        };
        assert_eq!(bitmap.bounds, Bounds::new(15.0, 15.0, 25.0, 25.0));
        assert!(!bitmap.pickable);
        let RenderCommand::Polygon(polygon) = &commands[4] else {
            panic!("expected polygon");
        };
        assert_eq!(polygon.polygon[2], [30.0, 30.0]);
        assert_eq!(polygon.fill_color[3], 0);
        let RenderCommand::Text(text) = &commands[5] else {
            panic!("expected text");
        };
        assert_eq!(text.labels[3].position, [15.0, 15.0]);
        assert_eq!(text.labels[3].text, "B2");
    }

    #[tokio::test]
    async fn picking_maps_coordinates_to_cells() {
        let mut p = props(plate(2, 3, 100, 1), 2, 3);
        p.row_labels = Some(vec!["A".into(), "B".into()]);
        let layer = GridLayer::new(p).expect("layer");

        let info = layer.get_picking_info(PickingInfo::at([215.0, 110.0]));
        let grid = info.grid.clone().expect("grid hit");
        assert_eq!((grid.row, grid.column), (1, 2));
        assert_eq!(grid.row_label.as_deref(), Some("B"));
        assert_eq!(grid.column_label, None);
        assert_eq!(tooltip(&info).as_deref(), Some("B3"));

        for outside in [[-1.0, 10.0], [10.0, 211.0], [316.0, 10.0]] {
            let miss = PickingInfo::at(outside);
            assert_eq!(layer.get_picking_info(miss.clone()), miss);
        }
    }
}
