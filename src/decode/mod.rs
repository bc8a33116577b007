pub mod lines;
pub mod stream;

pub use lines::LineReader;
pub use stream::{ArchiveStream, ChunkDecoder, CountingReader};
