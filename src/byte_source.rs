//! Generic byte sources for decoding from arbitrary transports.
//!
//! A [`ByteSource`] supplies encoded bytes to the decoder without the
//! decoder knowing where they come from: a memory buffer, a live network
//! connection, anything. The codec layer drives reads at arbitrary
//! granularity; [`SourceReader`] adapts a boxed source to the `io` traits
//! the codec stack expects, passing each read straight through so no extra
//! copies or buffering are introduced.
//!
//! Seek support is optional. A forward-only source simply keeps the default
//! `seek` (always `false`); decoders then operate in forward-only mode and
//! [`Decoder::seek`](crate::Decoder::seek) fails recoverably.

use std::io;

use symphonia::core::io::MediaSource;

/// Where a seek offset is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    /// From the beginning of the stream.
    Start,
    /// Relative to the current position.
    Current,
}

/// A stream of encoded audio bytes.
///
/// `read` returns at most `max_bytes` bytes; returning fewer than requested
/// is permitted only at end-of-stream, and an empty return signals
/// end-of-stream. Returning *more* than requested is a contract violation
/// and fails the decode.
pub trait ByteSource: Send + Sync {
    /// Reads up to `max_bytes` bytes from the stream.
    ///
    /// # Errors
    ///
    /// I/O errors are surfaced by the decoder call that triggered the read
    /// as [`DecodeError::SourceRead`](crate::DecodeError::SourceRead).
    fn read(&mut self, max_bytes: usize) -> io::Result<Vec<u8>>;

    /// Repositions the stream. Returns `false` if seeking is unsupported or
    /// the target is out of range.
    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> bool {
        let _ = (offset, origin);
        false
    }

    /// Whether this source supports repositioning at all.
    fn seekable(&self) -> bool {
        false
    }

    /// Total length in bytes, if known.
    fn byte_len(&self) -> Option<u64> {
        None
    }
}

/// A seekable byte source over an in-memory buffer.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Vec<u8>,
    pos: usize,
}

impl MemorySource {
    /// Wraps the given encoded bytes.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl ByteSource for MemorySource {
    fn read(&mut self, max_bytes: usize) -> io::Result<Vec<u8>> {
        let end = (self.pos + max_bytes).min(self.data.len());
        let chunk = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(chunk)
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> bool {
        let base = match origin {
            SeekOrigin::Start => 0i64,
            SeekOrigin::Current => self.pos as i64,
        };
        let target = base + offset;
        if target < 0 || target as usize > self.data.len() {
            return false;
        }
        self.pos = target as usize;
        true
    }

    fn seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

/// Adapts a boxed [`ByteSource`] to the codec stack's media-source traits.
///
/// Each `io::Read` call is forwarded as a single `read(buf.len())` on the
/// source and copied into the caller's buffer. A relative seek of zero is
/// answered from the tracked position without touching the source (some
/// codecs use it as a position query).
pub struct SourceReader {
    source: Box<dyn ByteSource>,
    pos: u64,
}

impl SourceReader {
    /// Wraps the given source.
    #[must_use]
    pub fn new(source: Box<dyn ByteSource>) -> Self {
        Self { source, pos: 0 }
    }
}

impl io::Read for SourceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let chunk = self.source.read(buf.len())?;
        if chunk.len() > buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "byte source returned {} bytes, requested {}",
                    chunk.len(),
                    buf.len()
                ),
            ));
        }
        buf[..chunk.len()].copy_from_slice(&chunk);
        self.pos += chunk.len() as u64;
        Ok(chunk.len())
    }
}

impl io::Seek for SourceReader {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let (offset, origin, target) = match pos {
            io::SeekFrom::Start(n) => (n as i64, SeekOrigin::Start, n),
            io::SeekFrom::Current(0) => return Ok(self.pos),
            io::SeekFrom::Current(d) => {
                let target = self
                    .pos
                    .checked_add_signed(d)
                    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek underflow"))?;
                (d, SeekOrigin::Current, target)
            }
            io::SeekFrom::End(d) => {
                let len = self.source.byte_len().ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::Unsupported,
                        "seek from end on a source of unknown length",
                    )
                })?;
                let target = len
                    .checked_add_signed(d)
                    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek underflow"))?;
                (target as i64, SeekOrigin::Start, target)
            }
        };
        if self.source.seek(offset, origin) {
            self.pos = target;
            Ok(self.pos)
        } else {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "byte source refused seek",
            ))
        }
    }
}

impl MediaSource for SourceReader {
    fn is_seekable(&self) -> bool {
        self.source.seekable()
    }

    fn byte_len(&self) -> Option<u64> {
        self.source.byte_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom};

    #[test]
    fn test_memory_source_read_to_end() {
        let mut src = MemorySource::new(vec![1, 2, 3, 4, 5]);
        assert_eq!(src.read(3).unwrap(), vec![1, 2, 3]);
        assert_eq!(src.read(10).unwrap(), vec![4, 5]);
        // Empty return signals end-of-stream, repeatedly
        assert!(src.read(10).unwrap().is_empty());
        assert!(src.read(10).unwrap().is_empty());
    }

    #[test]
    fn test_memory_source_seek() {
        let mut src = MemorySource::new(vec![1, 2, 3, 4, 5]);
        assert!(src.seek(3, SeekOrigin::Start));
        assert_eq!(src.read(10).unwrap(), vec![4, 5]);
        assert!(src.seek(-5, SeekOrigin::Current));
        assert_eq!(src.read(1).unwrap(), vec![1]);
        // Out of range
        assert!(!src.seek(6, SeekOrigin::Start));
        assert!(!src.seek(-10, SeekOrigin::Current));
    }

    #[test]
    fn test_default_seek_is_unsupported() {
        struct Forward(Vec<u8>);
        impl ByteSource for Forward {
            fn read(&mut self, max: usize) -> io::Result<Vec<u8>> {
                let n = max.min(self.0.len());
                Ok(self.0.drain(..n).collect())
            }
        }
        let mut fwd = Forward(vec![1, 2]);
        assert!(!fwd.seekable());
        assert!(!fwd.seek(0, SeekOrigin::Start));
        assert_eq!(fwd.byte_len(), None);
    }

    #[test]
    fn test_source_reader_read_and_position() {
        let mut reader = SourceReader::new(Box::new(MemorySource::new(vec![9, 8, 7, 6])));
        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [9, 8, 7]);
        // Zero-offset current seek reports position without source traffic
        assert_eq!(reader.seek(SeekFrom::Current(0)).unwrap(), 3);
    }

    #[test]
    fn test_source_reader_seek_from_end() {
        let mut reader = SourceReader::new(Box::new(MemorySource::new(vec![0, 1, 2, 3])));
        assert_eq!(reader.seek(SeekFrom::End(-2)).unwrap(), 2);
        let mut buf = [0u8; 4];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[2, 3]);
    }

    #[test]
    fn test_source_reader_forward_only_refuses_seek() {
        struct Forward;
        impl ByteSource for Forward {
            fn read(&mut self, _max: usize) -> io::Result<Vec<u8>> {
                Ok(Vec::new())
            }
        }
        let mut reader = SourceReader::new(Box::new(Forward));
        assert!(!MediaSource::is_seekable(&reader));
        assert!(reader.seek(SeekFrom::Start(10)).is_err());
        assert!(reader.seek(SeekFrom::End(0)).is_err());
    }
}
