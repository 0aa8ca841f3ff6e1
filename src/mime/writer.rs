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

//! Canonical serialisation of parts.

use std::io::{self, Write};

use super::header::Header;
use crate::support::buffer::BufferWriter;

/// A destination that can throw away what has been written to it so far.
pub trait Discard {
    fn discard(&mut self) -> io::Result<()>;
}

impl Discard for BufferWriter {
    fn discard(&mut self) -> io::Result<()> {
        self.reset()
    }
}

impl Discard for Vec<u8> {
    fn discard(&mut self) -> io::Result<()> {
        self.clear();
        Ok(())
    }
}

impl<T: Discard + ?Sized> Discard for &mut T {
    fn discard(&mut self) -> io::Result<()> {
        (**self).discard()
    }
}

/// Writes a single part: the header in canonical form, followed by whatever
/// content is written through the `Write` implementation.
///
/// Output is buffered. `close()` flushes and reports any error; if the writer
/// is instead dropped (e.g., because an error is being propagated), it is
/// flushed on a best-effort basis.
pub struct PartWriter<W: Write> {
    inner: Option<io::BufWriter<W>>,
}

impl<W: Write> PartWriter<W> {
    /// Create a writer for a part with the given header, writing the header
    /// immediately.
    pub fn create(dest: W, header: &Header<'_>) -> io::Result<Self> {
        let mut inner = io::BufWriter::new(dest);
        write_header(&mut inner, header)?;
        Ok(PartWriter { inner: Some(inner) })
    }

    /// Discard everything written so far, including the header.
    pub fn discard(&mut self) -> io::Result<()>
    where
        W: Discard,
    {
        let inner = self.inner_mut()?;
        inner.flush()?;
        inner.get_mut().discard()
    }

    /// Flush everything and release the destination.
    pub fn close(mut self) -> io::Result<W> {
        match self.inner.take() {
            Some(inner) => inner.into_inner().map_err(io::Error::from),
            None => Err(closed()),
        }
    }

    fn inner_mut(&mut self) -> io::Result<&mut io::BufWriter<W>> {
        self.inner.as_mut().ok_or_else(closed)
    }
}

impl<W: Write> Write for PartWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.inner_mut()?.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner_mut()?.flush()
    }
}

impl<W: Write> Drop for PartWriter<W> {
    fn drop(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            // Errors can only be reported through close()
            let _ = inner.flush();
        }
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "PartWriter already closed")
}

/// Write `header` in canonical form, including the terminating blank line.
///
/// Each field becomes `name:value` followed by CRLF. Folding within the value
/// is preserved, but bare line feeds are converted to CRLF.
pub fn write_header(
    mut w: impl Write,
    header: &Header<'_>,
) -> io::Result<()> {
    for field in header.fields() {
        w.write_all(field.name.as_bytes())?;
        w.write_all(b":")?;
        // A value may keep a stray CR if the source was truncated mid-line
        let value = field.value.strip_suffix(b"\r").unwrap_or(field.value);
        write_crlf(&mut w, value)?;
        w.write_all(b"\r\n")?;
    }

    w.write_all(b"\r\n")
}

fn write_crlf(mut w: impl Write, data: &[u8]) -> io::Result<()> {
    let mut start = 0;
    while let Some(lf) = memchr::memchr(b'\n', &data[start..]) {
        let lf = start + lf;
        if lf > 0 && b'\r' == data[lf - 1] {
            w.write_all(&data[start..=lf])?;
        } else {
            w.write_all(&data[start..lf])?;
            w.write_all(b"\r\n")?;
        }
        start = lf + 1;
    }

    w.write_all(&data[start..])
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mime::header::Field;

    fn header() -> Header<'static> {
        Header::new(vec![
            Field {
                name: "Subject",
                value: b" foo\n bar",
            },
            Field {
                name: "From",
                value: b" a@b.c\r",
            },
            Field {
                name: "X-Folded",
                value: b"\r\n\tx",
            },
        ])
    }

    #[test]
    fn canonical_header() {
        let mut out = Vec::new();
        write_header(&mut out, &header()).unwrap();
        assert_eq!(
            "Subject: foo\r\n bar\r\nFrom: a@b.c\r\nX-Folded:\r\n\tx\r\n\r\n",
            String::from_utf8(out).unwrap()
        );
    }

    #[test]
    fn empty_header() {
        let mut out = Vec::new();
        write_header(&mut out, &Header::default()).unwrap();
        assert_eq!(b"\r\n", &out[..]);
    }

    #[test]
    fn header_then_content() {
        let mut out = Vec::new();
        let mut w = PartWriter::create(&mut out, &header()).unwrap();
        w.write_all(b"content").unwrap();
        w.close().unwrap();
        assert!(out.starts_with(b"Subject: foo\r\n"));
        assert!(out.ends_with(b"\r\n\r\ncontent"));
    }

    #[test]
    fn discard_header() {
        let mut out = Vec::new();
        let mut w = PartWriter::create(&mut out, &header()).unwrap();
        w.discard().unwrap();
        w.write_all(b"content").unwrap();
        w.close().unwrap();
        assert_eq!(b"content", &out[..]);
    }

    #[test]
    fn drop_releases_destination() {
        let mut out = Vec::new();
        {
            let mut w = PartWriter::create(&mut out, &Header::default())
                .unwrap();
            w.write_all(b"partial").unwrap();
        }
        assert_eq!(b"\r\npartial", &out[..]);
    }

    #[derive(Debug)]
    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn errors_reported_on_close() {
        let w = PartWriter::create(FailingWriter, &header()).unwrap();
        assert_eq!(io::ErrorKind::BrokenPipe, w.close().unwrap_err().kind());
    }
}
