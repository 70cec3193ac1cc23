use std::sync::Arc;

use crate::dtype::DataType;
use crate::source::PixelWindow;

/// Decoded, row-major pixel data for one 2D plane.
///
/// Buffers are reference counted so render tiles, render commands and picking
/// queries can share one decode without copying.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    Uint8(Arc<[u8]>),
    Int8(Arc<[i8]>),
    Uint16(Arc<[u16]>),
    Int16(Arc<[i16]>),
    Uint32(Arc<[u32]>),
    Int32(Arc<[i32]>),
    Float32(Arc<[f32]>),
    Float64(Arc<[f64]>),
}

macro_rules! map_buffer {
    ($buf:expr, $v:ident => $body:expr) => {
        match $buf {
            PixelBuffer::Uint8($v) => PixelBuffer::Uint8($body),
            PixelBuffer::Int8($v) => PixelBuffer::Int8($body),
            PixelBuffer::Uint16($v) => PixelBuffer::Uint16($body),
            PixelBuffer::Int16($v) => PixelBuffer::Int16($body),
            PixelBuffer::Uint32($v) => PixelBuffer::Uint32($body),
            PixelBuffer::Int32($v) => PixelBuffer::Int32($body),
            PixelBuffer::Float32($v) => PixelBuffer::Float32($body),
            PixelBuffer::Float64($v) => PixelBuffer::Float64($body),
        }
    };
}

macro_rules! with_buffer {
    ($buf:expr, $v:ident => $body:expr) => {
        match $buf {
            PixelBuffer::Uint8($v) => $body,
            PixelBuffer::Int8($v) => $body,
            PixelBuffer::Uint16($v) => $body,
            PixelBuffer::Int16($v) => $body,
            PixelBuffer::Uint32($v) => $body,
            PixelBuffer::Int32($v) => $body,
            PixelBuffer::Float32($v) => $body,
            PixelBuffer::Float64($v) => $body,
        }
    };
}

impl PixelBuffer {
    pub fn dtype(&self) -> DataType {
        match self {
            PixelBuffer::Uint8(_) => DataType::Uint8,
            PixelBuffer::Int8(_) => DataType::Int8,
            PixelBuffer::Uint16(_) => DataType::Uint16,
            PixelBuffer::Int16(_) => DataType::Int16,
            PixelBuffer::Uint32(_) => DataType::Uint32,
            PixelBuffer::Int32(_) => DataType::Int32,
            PixelBuffer::Float32(_) => DataType::Float32,
            PixelBuffer::Float64(_) => DataType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        with_buffer!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at a flat index, widened to `f64`.
    pub fn get(&self, index: usize) -> Option<f64> {
        with_buffer!(self, v => v.get(index).map(|x| f64::from(*x)))
    }

    /// Integer label at a flat index. Float buffers never hold labels.
    pub fn label_at(&self, index: usize) -> Option<i64> {
        match self {
            PixelBuffer::Uint8(v) => v.get(index).map(|x| i64::from(*x)),
            PixelBuffer::Int8(v) => v.get(index).map(|x| i64::from(*x)),
            PixelBuffer::Uint16(v) => v.get(index).map(|x| i64::from(*x)),
            PixelBuffer::Int16(v) => v.get(index).map(|x| i64::from(*x)),
            PixelBuffer::Uint32(v) => v.get(index).map(|x| i64::from(*x)),
            PixelBuffer::Int32(v) => v.get(index).map(|x| i64::from(*x)),
            PixelBuffer::Float32(_) | PixelBuffer::Float64(_) => None,
        }
    }

    /// Copies the `window` out of a plane that is `width` pixels wide.
    pub fn crop(&self, width: u32, window: &PixelWindow) -> PixelBuffer {
        map_buffer!(self, v => crop_slice(v, width as usize, window))
    }

    /// Nearest-neighbour 2x reduction; keeps label values intact.
    pub fn downsample2(&self, width: u32, height: u32) -> (PixelBuffer, u32, u32) {
        let out_w = width.div_ceil(2).max(1);
        let out_h = height.div_ceil(2).max(1);
        let buf = map_buffer!(self, v => downsample_slice(v, width as usize, out_w as usize, out_h as usize));
        (buf, out_w, out_h)
    }
}

fn crop_slice<T: Copy>(data: &[T], width: usize, window: &PixelWindow) -> Arc<[T]> {
    let [x0, x1] = window.x.map(|v| v as usize);
    let [y0, y1] = window.y.map(|v| v as usize);
    let mut out = Vec::with_capacity(x1.saturating_sub(x0) * y1.saturating_sub(y0));
    for row in y0..y1 {
        let start = row * width;
        if let Some(slice) = data.get(start + x0..start + x1) {
            out.extend_from_slice(slice);
        }
    }
    out.into()
}

fn downsample_slice<T: Copy>(data: &[T], width: usize, out_w: usize, out_h: usize) -> Arc<[T]> {
    let mut out = Vec::with_capacity(out_w * out_h);
    for y in 0..out_h {
        for x in 0..out_w {
            if let Some(v) = data.get(y * 2 * width + x * 2) {
                out.push(*v);
            }
        }
    }
    out.into()
}

macro_rules! impl_from_vec {
    ($t:ty, $variant:ident) => {
        impl From<Vec<$t>> for PixelBuffer {
            fn from(v: Vec<$t>) -> Self {
                PixelBuffer::$variant(v.into())
            }
        }
    };
}

impl_from_vec!(u8, Uint8);
impl_from_vec!(i8, Int8);
impl_from_vec!(u16, Uint16);
impl_from_vec!(i16, Int16);
impl_from_vec!(u32, Uint32);
impl_from_vec!(i32, Int32);
impl_from_vec!(f32, Float32);
impl_from_vec!(f64, Float64);

/// A decoded pixel plane together with its dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub data: PixelBuffer,
    pub width: u32,
    pub height: u32,
}

impl Raster {
    pub fn new(data: impl Into<PixelBuffer>, width: u32, height: u32) -> Self {
        Self {
            data: data.into(),
            width,
            height,
        }
    }
}
