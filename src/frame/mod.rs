//! Frame codec (C1) and frame extractor (C2).

pub mod codec;
pub mod extractor;

pub use codec::{build, crc16_modbus, escape, parse, unescape, Frame, FrameError};
pub use extractor::{Event, FrameExtractor};
