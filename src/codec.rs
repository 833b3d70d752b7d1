//! Chunk codecs.
//!
//! Chunked datasets may request the [`DeflateCodec`], which stores each chunk as a zlib stream.

mod deflate;

pub use deflate::{CompressionLevel, DeflateCodec, DeflateError, InvalidCompressionLevelError};
