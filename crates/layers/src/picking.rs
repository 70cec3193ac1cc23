use crate::label::{LabelValue, TileIndex};

/// Result of a hover/click query, enriched by the layer that owns the hit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PickingInfo {
    /// Id of the (sub-)layer that was hit.
    pub layer_id: Option<String>,
    /// Index of the picked object within that layer.
    pub index: Option<usize>,
    /// World coordinate under the cursor.
    pub coordinate: Option<[f64; 2]>,
    pub tile: Option<TileIndex>,
    pub grid: Option<GridPick>,
    pub label: Option<LabelPick>,
}

impl PickingInfo {
    pub fn at(coordinate: [f64; 2]) -> Self {
        Self {
            coordinate: Some(coordinate),
            ..Self::default()
        }
    }
}

/// Grid cell under the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridPick {
    pub row: u32,
    pub column: u32,
    pub row_label: Option<String>,
    pub column_label: Option<String>,
}

/// Label id under the cursor, with its table value when one is known.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelPick {
    pub label: i64,
    pub value: Option<LabelValue>,
}

/// Hover text for a pick.
///
/// Grid hits read as row then column (`"B3"`, or 1-based numbers when no
/// labels are set). Label hits read `"label: value"`; background (0) shows
/// nothing.
pub fn tooltip(info: &PickingInfo) -> Option<String> {
    if let Some(grid) = &info.grid {
        let row = grid
            .row_label
            .as_ref()
            .filter(|l| !l.is_empty())
            .cloned()
            .unwrap_or_else(|| (grid.row + 1).to_string());
        let column = grid
            .column_label
            .as_ref()
            .filter(|l| !l.is_empty())
            .cloned()
            .unwrap_or_else(|| (grid.column + 1).to_string());
        return Some(format!("{row}{column}"));
    }

    info.layer_id.as_ref()?;
    info.index?;
    let pick = info.label.as_ref().filter(|p| p.label != 0)?;
    Some(match &pick.value {
        Some(value) => format!("{}: {value}", pick.label),
        None => pick.label.to_string(),
    })
}
