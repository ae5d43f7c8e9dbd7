pub mod chunk;
pub mod ranged;
pub mod row_parser;

pub use chunk::{ColumnData, ColumnarChunk};
pub use ranged::read_range;
