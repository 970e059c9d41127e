//! Compression Operations

use crate::Compression;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use flate2::{Compression as ZlibLevel, read::ZlibDecoder, write::ZlibEncoder};
use std::io::{Read, Write};
use tracing::instrument;

// Files are authored once and sampled many times; favour size over speed.
const ZLIB_LEVEL: ZlibLevel = ZlibLevel::best();

impl Compression {
    /// Compress a byte slice in memory.
    ///
    /// # Examples
    ///
    /// ```
    /// use ptex_compress::Compression;
    ///
    /// let data = [7u8; 256];
    /// let compressed = Compression::Zlib.compress(&data).unwrap();
    /// assert!(compressed.len() < data.len());
    /// ```
    pub fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.compress_into(input, &mut output)?;
        Ok(output)
    }

    /// Decompress a byte slice in memory.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ptex_compress::Compression;
    ///
    /// let original = b"Hello, world!";
    /// let compressed = Compression::Zlib.compress(original).unwrap();
    /// assert_ne!(compressed, original);
    /// let decompressed = Compression::Zlib.decompress(&compressed).unwrap();
    /// assert_eq!(decompressed, original);
    /// ```
    pub fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.decompress_into(input, &mut output)?;
        Ok(output)
    }

    /// Decompress a block whose decoded size is known up front.
    ///
    /// Fails with [`SizeMismatch`](ErrorKind::SizeMismatch) if the block
    /// decodes to fewer or more bytes than `expected`. At most
    /// `expected + 1` bytes are ever inflated, so a corrupt block can't
    /// balloon memory.
    ///
    /// # Examples
    ///
    /// ```
    /// use ptex_compress::Compression;
    ///
    /// let pixels = [1u8, 2, 3, 4, 5, 6, 7, 8];
    /// let block = Compression::Zlib.compress(&pixels).unwrap();
    /// assert_eq!(Compression::Zlib.decompress_exact(&block, 8).unwrap(), pixels);
    /// assert!(Compression::Zlib.decompress_exact(&block, 4).is_err());
    /// ```
    #[instrument(level = "trace", skip(input), fields(format = %self, input_size = input.len()))]
    pub fn decompress_exact(&self, input: &[u8], expected: usize) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(expected);
        match self {
            Compression::None => output.extend_from_slice(&input[..input.len().min(expected + 1)]),
            Compression::Zlib => {
                let mut decoder = ZlibDecoder::new(input).take(expected as u64 + 1);
                decoder.read_to_end(&mut output).or_raise(|| ErrorKind::InvalidData)?;
            },
        }
        if output.len() != expected {
            exn::bail!(ErrorKind::SizeMismatch { expected, actual: output.len() });
        }
        Ok(output)
    }

    #[instrument(skip(input, output), fields(
        format = %self,
        input_size = input.len(),
        output_size
    ))]
    pub fn compress_into(&self, input: &[u8], output: &mut Vec<u8>) -> Result<usize> {
        let size = match self {
            Compression::None => {
                output.extend_from_slice(input);
                input.len()
            },
            Compression::Zlib => {
                let start = output.len();
                let mut encoder = ZlibEncoder::new(&mut *output, ZLIB_LEVEL);
                encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
                output.len() - start
            },
        };
        tracing::Span::current().record("output_size", size);
        Ok(size)
    }

    #[instrument(skip(input, output), fields(
        format = %self,
        input_size = input.len(),
        output_size
    ))]
    pub fn decompress_into(&self, input: &[u8], output: &mut Vec<u8>) -> Result<usize> {
        let size = match self {
            Compression::None => {
                output.extend_from_slice(input);
                input.len()
            },
            Compression::Zlib => {
                let mut decoder = ZlibDecoder::new(input);
                decoder.read_to_end(output).or_raise(|| ErrorKind::InvalidData)?
            },
        };
        tracing::Span::current().record("output_size", size);
        Ok(size)
    }
}
