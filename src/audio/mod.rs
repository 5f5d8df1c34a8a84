pub mod constants;
pub mod demux;
pub mod reader;

pub use demux::{Demuxer, FeedStatus};
pub use reader::{ChunkedReader, ReadStatus, Reader};
