use std::io::{Cursor, Read};

use derive_more::Display;
use flate2::bufread::{ZlibDecoder, ZlibEncoder};
use thiserror::Error;

/// A deflate compression level.
///
/// An integer from 0 to 9 which controls the speed and level of compression.
/// A level of 1 is the fastest compression method and produces the least compressions, while 9 is slowest and produces the most compression.
/// Compression is turned off completely when level is 0.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
pub struct CompressionLevel(u32);

/// An invalid compression level.
#[derive(Debug, Error)]
#[error("invalid compression level {0}, must be 0-9")]
pub struct InvalidCompressionLevelError(u32);

impl TryFrom<u32> for CompressionLevel {
    type Error = InvalidCompressionLevelError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value < 10 {
            Ok(Self(value))
        } else {
            Err(InvalidCompressionLevelError(value))
        }
    }
}

impl CompressionLevel {
    /// The default compression level (6).
    pub const DEFAULT: Self = Self(6);

    /// Returns the compression level as a [`u32`].
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl serde::Serialize for CompressionLevel {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u32(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for CompressionLevel {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let level = u32::deserialize(d)?;
        Self::try_from(level).map_err(serde::de::Error::custom)
    }
}

/// A deflate (zlib) codec error.
#[derive(Debug, Error)]
#[error("deflate codec failure: {0}")]
pub struct DeflateError(#[from] std::io::Error);

/// A deflate codec.
#[derive(Copy, Clone, Debug)]
pub struct DeflateCodec {
    compression_level: CompressionLevel,
}

impl DeflateCodec {
    /// Create a new deflate codec.
    #[must_use]
    pub const fn new(compression_level: CompressionLevel) -> Self {
        Self { compression_level }
    }

    /// Encode a chunk.
    ///
    /// # Errors
    /// Returns [`DeflateError`] if the encoder fails.
    pub fn encode(&self, decoded_value: &[u8]) -> Result<Vec<u8>, DeflateError> {
        let mut encoder = ZlibEncoder::new(
            Cursor::new(decoded_value),
            flate2::Compression::new(self.compression_level.as_u32()),
        );
        let mut out: Vec<u8> = Vec::new();
        encoder.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Decode a chunk.
    ///
    /// # Errors
    /// Returns [`DeflateError`] if `encoded_value` is not a valid zlib stream.
    pub fn decode(&self, encoded_value: &[u8]) -> Result<Vec<u8>, DeflateError> {
        let mut decoder = ZlibDecoder::new(Cursor::new(encoded_value));
        let mut out: Vec<u8> = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }
}
