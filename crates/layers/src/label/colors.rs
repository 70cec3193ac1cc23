//! Label id -> RGBA lookup table, packed into a 2D texture.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Colors used when no table is given or the table cannot be packed.
pub const DEFAULT_PALETTE: [[u8; 3]; 15] = [
    [0, 73, 73],
    [0, 146, 146],
    [255, 109, 182],
    [255, 182, 219],
    [73, 0, 146],
    [0, 109, 219],
    [182, 109, 255],
    [109, 182, 255],
    [182, 219, 255],
    [146, 0, 0],
    [146, 72, 0],
    [219, 109, 0],
    [36, 255, 36],
    [255, 255, 109],
    [255, 255, 255],
];

/// Display value attached to a label id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelValue {
    Number(f64),
    Text(String),
}

impl std::fmt::Display for LabelValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelValue::Number(n) => write!(f, "{n}"),
            LabelValue::Text(s) => f.write_str(s),
        }
    }
}

/// One entry of an OME-NGFF `image-label.colors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelColorEntry {
    #[serde(rename = "label-value")]
    pub label_value: u32,
    pub rgba: [u8; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<LabelValue>,
}

/// Shared color table. A new `Arc` means a new table.
pub type ColorTable = Arc<[LabelColorEntry]>;

pub type ValueMap = HashMap<u32, Option<LabelValue>>;

pub fn value_map(table: &[LabelColorEntry]) -> ValueMap {
    table
        .iter()
        .map(|e| (e.label_value, e.value.clone()))
        .collect()
}

/// RGBA8 texture where label `i` sits at `(i % width, i / width)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorLookupTexture {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// Built from `DEFAULT_PALETTE` rather than a table.
    pub fallback: bool,
}

impl ColorLookupTexture {
    pub fn fallback() -> Self {
        let data = DEFAULT_PALETTE
            .iter()
            .flat_map(|&[r, g, b]| [r, g, b, 255])
            .collect();
        Self {
            width: DEFAULT_PALETTE.len() as u32,
            height: 1,
            data,
            fallback: true,
        }
    }

    /// Packs `table` row by row, `max_dimension` texels wide at most. Tables
    /// that would need a taller texture fall back to the default palette.
    pub fn pack(table: Option<&ColorTable>, max_dimension: u32) -> Self {
        let Some(table) = table else {
            return Self::fallback();
        };
        let Some(max_label) = table.iter().map(|e| u64::from(e.label_value)).max() else {
            return Self::fallback();
        };
        if max_dimension == 0 {
            return Self::fallback();
        }
        let size = max_label + 1;
        let width = size.min(u64::from(max_dimension));
        let height = size.div_ceil(width);
        if width > u64::from(max_dimension) || height > u64::from(max_dimension) {
            if first_overflow(table) {
                warn!(
                    entries = table.len(),
                    max_label,
                    max_dimension,
                    "label color table exceeds the texture size limit; using default palette"
                );
            }
            return Self::fallback();
        }

        let (width, height) = (width as u32, height as u32);
        let mut data = vec![0u8; width as usize * height as usize * 4];
        for entry in table.iter() {
            let offset = entry.label_value as usize * 4;
            data[offset..offset + 4].copy_from_slice(&entry.rgba);
        }
        Self {
            width,
            height,
            data,
            fallback: false,
        }
    }

    /// Texel at column `x`, row `y`, if in range.
    pub fn texel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.data.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Texel-centre coordinates sampled for `index`.
    pub fn uv(&self, index: u32) -> [f32; 2] {
        let w = self.width.max(1) as f32;
        let h = self.height.max(1) as f32;
        let i = index as f32;
        [((i % w) + 0.5) / w, ((i / w).floor() + 0.5) / h]
    }

    /// Color the fragment stage produces for a label: the lookup color with
    /// alpha `opacity`, or fully transparent for background (`index <= 0`).
    ///
    /// Sampling clamps to the edge, so ids past the last row reuse it.
    pub fn shade(&self, index: i64, opacity: f32) -> [f32; 4] {
        let w = self.width.max(1);
        let id = u32::try_from(index.max(0)).unwrap_or(u32::MAX);
        let x = id % w;
        let y = (id / w).min(self.height.saturating_sub(1));
        let [r, g, b, _] = self.texel(x, y).unwrap_or([0, 0, 0, 0]);
        let alpha = if index > 0 { opacity } else { 0.0 };
        [
            f32::from(r) / 255.0,
            f32::from(g) / 255.0,
            f32::from(b) / 255.0,
            alpha,
        ]
    }
}

// Tables already warned about; weak so the registry never keeps them alive.
static SEEN_OVERFLOWS: Mutex<Vec<Weak<[LabelColorEntry]>>> = parking_lot::const_mutex(Vec::new());

/// True the first time a given table overflows.
fn first_overflow(table: &ColorTable) -> bool {
    let mut seen = SEEN_OVERFLOWS.lock();
    seen.retain(|w| w.strong_count() > 0);
    if seen
        .iter()
        .any(|w| std::ptr::addr_eq(w.as_ptr(), Arc::as_ptr(table)))
    {
        return false;
    }
    seen.push(Arc::downgrade(table));
    true
}
