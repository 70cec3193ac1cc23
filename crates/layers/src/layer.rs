use crate::picking::PickingInfo;
use crate::render::RenderCommand;
use crate::viewport::{CullRect, Viewport};

/// What changed since the previous `update`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ChangeFlags {
    pub viewport_changed: bool,
}

/// Per-frame inputs for `Layer::render`.
#[derive(Copy, Clone, Default)]
pub struct RenderContext<'a> {
    pub viewport: Option<&'a dyn Viewport>,
    pub cull_rect: Option<CullRect>,
}

/// Common surface a host drives for every layer kind.
pub trait Layer {
    fn id(&self) -> &str;

    fn render(&self, ctx: &RenderContext<'_>) -> Vec<RenderCommand>;

    /// Enriches a pick the host has already resolved to this layer.
    fn get_picking_info(&self, info: PickingInfo) -> PickingInfo;
}
