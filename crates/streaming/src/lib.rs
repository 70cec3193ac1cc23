pub mod buffer;
pub mod dtype;
pub mod memory;
pub mod schedule;
pub mod source;

pub use buffer::*;
pub use dtype::*;
pub use memory::*;
pub use schedule::*;
pub use source::*;
