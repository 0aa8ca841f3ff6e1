//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Crymap.
//
// Crymap is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Crymap is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Crymap. If not, see <http://www.gnu.org/licenses/>.

//! Support for "buffers", which are write-once-read-once values that spill to
//! disk if they exceed a maximum size.
//!
//! A `BufferWriter` accumulates a rendered section. Once complete, it is
//! "flipped" into a `Literal`, which is what gets handed back to the protocol
//! layer.

use std::fs;
use std::io::{self, Read, Seek, Write};
use std::path::PathBuf;

use super::system_config::BufferConfig;

#[derive(Debug)]
pub struct BufferWriter {
    tmp: Option<PathBuf>,
    spill_threshold: usize,
    buf: Vec<u8>,
    len: u64,
    contains_nul: bool,
    on_disk: Option<fs::File>,
}

/// A fully rendered body section.
///
/// This is a plain byte stream whose exact length is known up front.
#[derive(Debug)]
pub struct Literal {
    buf: Vec<u8>,
    off: usize,
    len: u64,
    remaining: u64,
    contains_nul: bool,
    on_disk: Option<fs::File>,
}

impl BufferWriter {
    /// Create a new, empty buffer.
    pub fn new(config: &BufferConfig) -> Self {
        BufferWriter {
            tmp: config.tmp.clone(),
            spill_threshold: config.spill_threshold,
            buf: Vec::new(),
            len: 0,
            contains_nul: false,
            on_disk: None,
        }
    }

    /// Returns the length, in bytes, of the buffer.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        0 == self.len
    }

    /// Whether the buffer has been moved to a temporary file.
    pub fn is_spilled(&self) -> bool {
        self.on_disk.is_some()
    }

    /// Discard everything written so far.
    ///
    /// A buffer that has already spilled stays on disk.
    pub fn reset(&mut self) -> io::Result<()> {
        self.buf.clear();
        self.len = 0;
        self.contains_nul = false;

        if let Some(file) = self.on_disk.as_mut() {
            file.set_len(0)?;
            file.seek(io::SeekFrom::Start(0))?;
        }

        Ok(())
    }

    /// "Flips" the buffer, making it usable for reading.
    pub fn flip(mut self) -> io::Result<Literal> {
        if let Some(file) = self.on_disk.as_mut() {
            file.seek(io::SeekFrom::Start(0))?;
        }

        Ok(Literal {
            buf: self.buf,
            off: 0,
            len: self.len,
            remaining: self.len,
            contains_nul: self.contains_nul,
            on_disk: self.on_disk,
        })
    }

    fn spill(&mut self) -> io::Result<()> {
        let mut file = match self.tmp {
            Some(ref tmp) => tempfile::tempfile_in(tmp)?,
            None => tempfile::tempfile()?,
        };
        file.write_all(&self.buf)?;
        self.buf = Vec::new();
        self.on_disk = Some(file);
        Ok(())
    }
}

impl Write for BufferWriter {
    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        if self.on_disk.is_none()
            && src.len() + self.buf.len() > self.spill_threshold
        {
            self.spill()?;
        }

        if let Some(file) = self.on_disk.as_mut() {
            file.write_all(src)?;
        } else {
            self.buf.extend_from_slice(src);
        }

        self.contains_nul |= memchr::memchr(0, src).is_some();
        self.len += src.len() as u64;

        Ok(src.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Literal {
    /// Directly create a `Literal` from the given data.
    pub fn new(data: Vec<u8>) -> Self {
        Literal {
            len: data.len() as u64,
            remaining: data.len() as u64,
            contains_nul: memchr::memchr(0, &data).is_some(),
            buf: data,
            off: 0,
            on_disk: None,
        }
    }

    /// Returns the length, in bytes, of the literal.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        0 == self.len
    }

    /// Whether the literal contains a NUL byte.
    ///
    /// RFC 3516 recommends only using the literal8 syntax when there is at
    /// least one NUL byte.
    pub fn contains_nul(&self) -> bool {
        self.contains_nul
    }

    /// Restrict the literal to `length` bytes starting at `offset`.
    ///
    /// Both ends are clamped to the actual content; an `offset` past the end
    /// produces an empty literal. Must be called before any data is read.
    pub fn restrict(mut self, offset: u64, length: u64) -> io::Result<Self> {
        let start = offset.min(self.len);
        let len = length.min(self.len - start);

        if let Some(file) = self.on_disk.as_mut() {
            // Only rescan if there was a NUL somewhere in the whole file
            if self.contains_nul {
                file.seek(io::SeekFrom::Start(start))?;
                self.contains_nul = range_contains_nul(file, len)?;
            }
            file.seek(io::SeekFrom::Start(start))?;
        } else {
            // Both fit in usize since they are bounded by buf.len()
            let start = start as usize;
            let end = start + len as usize;
            self.contains_nul =
                memchr::memchr(0, &self.buf[start..end]).is_some();
            self.off = start;
        }

        self.len = len;
        self.remaining = len;
        Ok(self)
    }

    /// Read the whole literal into memory.
    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        if self.on_disk.is_none()
            && 0 == self.off
            && self.len == self.buf.len() as u64
        {
            return Ok(self.buf);
        }

        let mut ret = Vec::with_capacity(self.remaining as usize);
        self.read_to_end(&mut ret)?;
        Ok(ret)
    }
}

fn range_contains_nul(file: &mut fs::File, len: u64) -> io::Result<bool> {
    let mut chunk = [0u8; 4096];
    let mut remaining = len;
    while remaining > 0 {
        let max = (chunk.len() as u64).min(remaining) as usize;
        let nread = file.read(&mut chunk[..max])?;
        if 0 == nread {
            break;
        }

        if memchr::memchr(0, &chunk[..nread]).is_some() {
            return Ok(true);
        }
        remaining -= nread as u64;
    }

    Ok(false)
}

impl Read for Literal {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let max = (dst.len() as u64).min(self.remaining) as usize;
        if 0 == max {
            return Ok(0);
        }

        let nread = if let Some(file) = self.on_disk.as_mut() {
            file.read(&mut dst[..max])?
        } else {
            dst[..max].copy_from_slice(&self.buf[self.off..self.off + max]);
            self.off += max;
            max
        };

        self.remaining -= nread as u64;
        Ok(nread)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config(spill_threshold: usize) -> BufferConfig {
        BufferConfig {
            spill_threshold,
            tmp: None,
        }
    }

    fn test_read_and_write(
        spill_threshold: usize,
        copy_buf: &mut [u8],
        expected: &[u8],
    ) {
        let mut writer = BufferWriter::new(&config(spill_threshold));

        let mut in_reader = expected;
        loop {
            let nread = in_reader.read(copy_buf).unwrap();
            if 0 == nread {
                break;
            }

            writer.write_all(&copy_buf[..nread]).unwrap();
        }

        assert_eq!(expected.len() as u64, writer.len());
        assert_eq!(expected.len() > spill_threshold, writer.is_spilled());
        let mut reader = writer.flip().unwrap();
        assert_eq!(expected.len() as u64, reader.len());

        let mut actual = Vec::new();
        loop {
            let nread = reader.read(copy_buf).unwrap();
            if 0 == nread {
                break;
            }

            actual.extend_from_slice(&copy_buf[..nread]);
        }

        assert_eq!(expected.len(), actual.len());
        for i in 0..expected.len() {
            assert_eq!(expected[i], actual[i], "Difference at index {}", i);
        }
    }

    #[test]
    fn small() {
        test_read_and_write(65536, &mut [0; 4], b"hello world");
    }

    #[test]
    fn large_with_small_ops() {
        test_read_and_write(
            65536,
            &mut [0; 17],
            "hello world".repeat(10000).as_bytes(),
        );
    }

    #[test]
    fn large_with_large_ops() {
        test_read_and_write(
            65536,
            &mut [0; 70000],
            "hello world".repeat(10000).as_bytes(),
        );
    }

    #[test]
    fn reset_in_memory() {
        let mut writer = BufferWriter::new(&config(64));
        writer.write_all(b"Foo: bar\r\n\r\n").unwrap();
        writer.reset().unwrap();
        writer.write_all(b"content").unwrap();
        let literal = writer.flip().unwrap();
        assert_eq!(b"content", &literal.into_bytes().unwrap()[..]);
    }

    #[test]
    fn reset_on_disk() {
        let mut writer = BufferWriter::new(&config(4));
        writer.write_all(b"Foo: bar\r\n\r\n").unwrap();
        assert!(writer.is_spilled());
        writer.reset().unwrap();
        assert!(writer.is_empty());
        writer.write_all(b"content").unwrap();
        let literal = writer.flip().unwrap();
        assert_eq!(b"content", &literal.into_bytes().unwrap()[..]);
    }

    #[test]
    fn nul_tracking() {
        let mut writer = BufferWriter::new(&config(64));
        writer.write_all(b"abc\0def").unwrap();
        let literal = writer.flip().unwrap();
        assert!(literal.contains_nul());

        let literal = literal.restrict(4, 3).unwrap();
        assert!(!literal.contains_nul());
        assert_eq!(b"def", &literal.into_bytes().unwrap()[..]);
    }

    #[test]
    fn restrict_on_disk() {
        let mut writer = BufferWriter::new(&config(4));
        writer.write_all(b"0123456789").unwrap();
        let literal = writer.flip().unwrap().restrict(3, 4).unwrap();
        assert_eq!(4, literal.len());
        assert_eq!(b"3456", &literal.into_bytes().unwrap()[..]);
    }

    #[test]
    fn nul_tracking_on_disk() {
        let mut writer = BufferWriter::new(&config(4));
        writer.write_all(b"abc\0def").unwrap();
        let literal = writer.flip().unwrap();
        assert!(literal.contains_nul());

        let literal = literal.restrict(4, 3).unwrap();
        assert!(!literal.contains_nul());
        assert_eq!(b"def", &literal.into_bytes().unwrap()[..]);

        let mut writer = BufferWriter::new(&config(4));
        writer.write_all(b"abc\0def").unwrap();
        let literal = writer.flip().unwrap().restrict(2, 3).unwrap();
        assert!(literal.contains_nul());
        assert_eq!(b"c\0d", &literal.into_bytes().unwrap()[..]);
    }

    #[test]
    fn restrict_clamps() {
        let literal = Literal::new(b"abc".to_vec()).restrict(5, 10).unwrap();
        assert!(literal.is_empty());
        assert_eq!(0, literal.into_bytes().unwrap().len());

        let literal = Literal::new(b"abc".to_vec()).restrict(1, 1000).unwrap();
        assert_eq!(b"bc", &literal.into_bytes().unwrap()[..]);
    }
}
