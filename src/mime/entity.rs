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

//! A forward-only reader over the MIME structure of a message.
//!
//! Reading is lazy: parsing an `Entity` only splits its header from its body.
//! The children of a multipart are discovered one at a time through `Parts`,
//! which scans forward through the body and never backtracks, so a message
//! is never materialised as a full tree.
//!
//! The reader is designed to be robust moreso than strictly correct, in the
//! same spirit as most real-world MIME agents: malformed header lines are
//! skipped, a missing close delimiter simply ends the multipart, and
//! anything it does not understand is treated as an opaque leaf. The only
//! hard failures are the configured resource limits and I/O errors.

use std::io::Read;
use std::str;

use log::warn;

use super::header::{self, ContentType, Field, Header};
use crate::support::error::Error;
use crate::support::system_config::LimitsConfig;

/// One node of a MIME message.
#[derive(Clone, Debug)]
pub struct Entity<'a> {
    raw: &'a [u8],
    header: Header<'a>,
    body: &'a [u8],
    content_type: ContentType,
    /// If this is a multipart with a usable boundary, the delimiter,
    /// including leading `--`.
    delimiter: Option<Vec<u8>>,
    depth: u32,
    limits: LimitsConfig,
}

/// The body of an entity.
pub enum Body<'a> {
    /// Opaque content.
    Leaf(&'a [u8]),
    /// A sequence of child entities.
    Multipart(Parts<'a>),
}

/// Iterates the children of a multipart entity, in order.
///
/// `None` indicates there are no more children. A read error is reported
/// once, after which iteration ends.
#[derive(Debug)]
pub struct Parts<'a> {
    data: &'a [u8],
    delimiter: Vec<u8>,
    started: bool,
    done: bool,
    count: u32,
    depth: u32,
    limits: LimitsConfig,
    digest: bool,
}

/// A whole message, owned.
#[derive(Clone, Debug)]
pub struct Message {
    data: Vec<u8>,
    limits: LimitsConfig,
}

impl Message {
    pub fn new(data: Vec<u8>, limits: LimitsConfig) -> Self {
        Message { data, limits }
    }

    /// Read the full message from `r`.
    pub fn read_from(
        mut r: impl Read,
        limits: LimitsConfig,
    ) -> Result<Self, Error> {
        let mut data = Vec::new();
        r.read_to_end(&mut data)?;
        Ok(Message::new(data, limits))
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The top-level entity of the message.
    pub fn root(&self) -> Result<Entity<'_>, Error> {
        Entity::parse_with_limits(&self.data, self.limits)
    }
}

impl<'a> Entity<'a> {
    /// Parse `data` as a top-level entity with the default limits.
    pub fn parse(data: &'a [u8]) -> Result<Self, Error> {
        Entity::parse_with_limits(data, LimitsConfig::default())
    }

    pub fn parse_with_limits(
        data: &'a [u8],
        limits: LimitsConfig,
    ) -> Result<Self, Error> {
        Entity::parse_part(data, 0, limits, false)
    }

    fn parse_part(
        data: &'a [u8],
        depth: u32,
        limits: LimitsConfig,
        in_digest: bool,
    ) -> Result<Self, Error> {
        let (header, body) = split_header(data, limits.max_header_size)?;

        let content_type = header
            .get("Content-Type")
            .and_then(header::parse_content_type)
            .unwrap_or_else(|| default_content_type(in_digest));

        let delimiter = content_type.boundary().map(|boundary| {
            let mut delimiter = Vec::with_capacity(boundary.len() + 2);
            delimiter.extend_from_slice(b"--");
            delimiter.extend_from_slice(boundary);
            delimiter
        });

        Ok(Entity {
            raw: data,
            header,
            body,
            content_type,
            delimiter,
            depth,
            limits,
        })
    }

    /// The full raw bytes of this entity, header and all.
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    pub fn header(&self) -> &Header<'a> {
        &self.header
    }

    /// The raw bytes of the body.
    ///
    /// For a multipart, this is the whole multipart body including the
    /// preamble, delimiters and epilogue.
    pub fn raw_body(&self) -> &'a [u8] {
        self.body
    }

    /// The effective content type, with defaults applied if the header did
    /// not give a usable one.
    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    /// How many multipart levels this entity is below the top of the
    /// message.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_multipart(&self) -> bool {
        self.delimiter.is_some()
    }

    /// Begin reading the body.
    ///
    /// Each call starts a new pass over the children.
    pub fn body(&self) -> Body<'a> {
        match self.delimiter {
            None => Body::Leaf(self.body),
            Some(ref delimiter) => Body::Multipart(Parts {
                data: self.body,
                delimiter: delimiter.clone(),
                started: false,
                done: false,
                count: 0,
                depth: self.depth + 1,
                limits: self.limits,
                digest: self.content_type.is_subtype("digest"),
            }),
        }
    }
}

impl<'a> Iterator for Parts<'a> {
    type Item = Result<Entity<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if !self.started {
            self.started = true;
            // Skip the preamble
            match find_delimiter(self.data, &self.delimiter) {
                Some(delim) if !delim.is_close => {
                    self.data = &self.data[delim.next_start..];
                }
                _ => {
                    self.done = true;
                    return None;
                }
            }
        }

        if self.depth > self.limits.max_depth {
            warn!(
                "Multipart nesting exceeds {} levels",
                self.limits.max_depth
            );
            self.done = true;
            return Some(Err(Error::NestingTooDeep(self.limits.max_depth)));
        }

        // A delimiter at the very end of the body does not open a part
        if self.data.is_empty() {
            self.done = true;
            return None;
        }

        self.count += 1;
        if self.count > self.limits.max_parts {
            warn!("Multipart has more than {} parts", self.limits.max_parts);
            self.done = true;
            return Some(Err(Error::TooManyParts(self.limits.max_parts)));
        }

        let content = match find_delimiter(self.data, &self.delimiter) {
            Some(delim) => {
                let content = &self.data[..delim.content_end];
                self.done = delim.is_close;
                self.data = &self.data[delim.next_start..];
                content
            }
            None => {
                // No close delimiter; the part runs to the end
                let content = self.data;
                self.done = true;
                self.data = &self.data[self.data.len()..];
                content
            }
        };

        let result =
            Entity::parse_part(content, self.depth, self.limits, self.digest);
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

fn default_content_type(in_digest: bool) -> ContentType {
    // RFC 2046 5.1.5
    let (typ, subtype) = if in_digest {
        ("message", "rfc822")
    } else {
        ("text", "plain")
    };

    ContentType {
        typ: typ.to_owned(),
        subtype: subtype.to_owned(),
        parms: vec![],
    }
}

/// Returns the offset just past the next line ending at or after `start`, or
/// the end of `data` if there is none.
fn next_line(data: &[u8], start: usize) -> usize {
    memchr::memchr(b'\n', &data[start..])
        .map(|lf| start + lf + 1)
        .unwrap_or_else(|| data.len())
}

/// Returns the length of `data` without a trailing line ending.
fn without_line_ending(data: &[u8]) -> usize {
    if data.ends_with(b"\r\n") {
        data.len() - 2
    } else if data.ends_with(b"\n") {
        data.len() - 1
    } else {
        data.len()
    }
}

fn split_header(
    data: &[u8],
    max_header_size: usize,
) -> Result<(Header<'_>, &[u8]), Error> {
    let mut fields = Vec::new();
    // The start and end of the field currently being accumulated, without its
    // final line ending
    let mut current: Option<(usize, usize)> = None;
    let mut pos = 0;

    while pos < data.len() {
        let line_end = next_line(data, pos);
        let line = &data[pos..line_end];

        if b"\n" == line || b"\r\n" == line {
            if let Some((start, end)) = current {
                push_field(&mut fields, &data[start..end]);
            }
            return Ok((Header::new(fields), &data[line_end..]));
        }

        if line_end > max_header_size {
            warn!("Header block exceeds {} bytes", max_header_size);
            return Err(Error::HeaderTooLong(max_header_size));
        }

        let content_end = pos + without_line_ending(line);
        if line.starts_with(b" ") || line.starts_with(b"\t") {
            // Continuation lines with nothing to continue are dropped
            if let Some((_, ref mut end)) = current {
                *end = content_end;
            }
        } else {
            if let Some((start, end)) = current {
                push_field(&mut fields, &data[start..end]);
            }
            current = Some((pos, content_end));
        }

        pos = line_end;
    }

    // No blank line; the whole thing is header
    if let Some((start, end)) = current {
        push_field(&mut fields, &data[start..end]);
    }
    Ok((Header::new(fields), &data[data.len()..]))
}

fn push_field<'a>(fields: &mut Vec<Field<'a>>, raw: &'a [u8]) {
    let colon = match memchr::memchr(b':', raw) {
        Some(colon) => colon,
        None => return,
    };

    let name = match str::from_utf8(&raw[..colon]) {
        Ok(name) => name.trim(),
        Err(_) => return,
    };

    if name.is_empty() {
        return;
    }

    fields.push(Field {
        name,
        value: &raw[colon + 1..],
    });
}

struct Delimiter {
    /// The end of the content preceding the delimiter, excluding the line
    /// ending that belongs to the delimiter.
    content_end: usize,
    /// The start of the line after the delimiter.
    next_start: usize,
    is_close: bool,
}

fn find_delimiter(data: &[u8], delimiter: &[u8]) -> Option<Delimiter> {
    let mut line_start = 0;
    loop {
        let line_end = next_line(data, line_start);
        if let Some(is_close) =
            match_delimiter(&data[line_start..line_end], delimiter)
        {
            return Some(Delimiter {
                content_end: without_line_ending(&data[..line_start]),
                next_start: line_end,
                is_close,
            });
        }

        if line_end >= data.len() {
            return None;
        }
        line_start = line_end;
    }
}

/// If `line` is a delimiter line, returns whether it is the close delimiter.
fn match_delimiter(line: &[u8], delimiter: &[u8]) -> Option<bool> {
    if !line.starts_with(delimiter) {
        return None;
    }

    let mut rest = &line[delimiter.len()..];
    let is_close = rest.starts_with(b"--");
    if is_close {
        rest = &rest[2..];
    }

    // RFC 2046 permits trailing linear whitespace ("transport padding")
    if rest.iter().all(|b| b" \t\r\n".contains(b)) {
        Some(is_close)
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::support::error::ErrorKind;

    fn crlf(s: &str) -> Vec<u8> {
        s.replace('\n', "\r\n").into_bytes()
    }

    fn children<'a>(entity: &Entity<'a>) -> Vec<Entity<'a>> {
        match entity.body() {
            Body::Leaf(_) => panic!("Not a multipart"),
            Body::Multipart(parts) => parts.map(Result::unwrap).collect(),
        }
    }

    fn field_names<'a>(entity: &Entity<'a>) -> Vec<&'a str> {
        entity.header().fields().iter().map(|f| f.name).collect()
    }

    #[test]
    fn simple_leaf() {
        let data = crlf("Subject: foo\nFrom: bar\n\nHello\nworld\n");
        let entity = Entity::parse(&data).unwrap();
        assert_eq!(vec!["Subject", "From"], field_names(&entity));
        assert_eq!(Some(&b" foo"[..]), entity.header().get("subject"));
        assert_eq!(b"Hello\r\nworld\r\n", entity.raw_body());
        assert!(entity.content_type().is_type("text"));
        assert!(!entity.is_multipart());
        match entity.body() {
            Body::Leaf(content) => assert_eq!(b"Hello\r\nworld\r\n", content),
            Body::Multipart(_) => panic!("Unexpected multipart"),
        }
    }

    #[test]
    fn folded_header() {
        let data = crlf("Subject: foo\n  bar\n\tbaz\nX: y\n\n");
        let entity = Entity::parse(&data).unwrap();
        assert_eq!(
            Some(&b" foo\r\n  bar\r\n\tbaz"[..]),
            entity.header().get("Subject")
        );
        assert_eq!(Some(&b" y"[..]), entity.header().get("X"));
        assert!(entity.raw_body().is_empty());
    }

    #[test]
    fn unix_line_endings() {
        let data = b"Foo: bar\nBaz: quux\n\ncontent";
        let entity = Entity::parse(data).unwrap();
        assert_eq!(vec!["Foo", "Baz"], field_names(&entity));
        assert_eq!(b"content", entity.raw_body());
    }

    #[test]
    fn junk_header_lines_skipped() {
        let data = crlf(" leading continuation\nno colon here\n: empty\n\
                         fOo : foo\n\nbody");
        let entity = Entity::parse(&data).unwrap();
        assert_eq!(vec!["fOo"], field_names(&entity));
        assert_eq!(b"body", entity.raw_body());
    }

    #[test]
    fn header_without_body() {
        let entity = Entity::parse(b"Foo: bar").unwrap();
        assert_eq!(vec!["Foo"], field_names(&entity));
        assert!(entity.raw_body().is_empty());
    }

    #[test]
    fn no_header() {
        let entity = Entity::parse(b"\r\nJust content").unwrap();
        assert!(entity.header().is_empty());
        assert_eq!(b"Just content", entity.raw_body());
    }

    #[test]
    fn simple_multipart() {
        let data = crlf(
            "Content-Type: multipart/mixed; boundary=bound\n\
             \n\
             preamble\n\
             --bound\n\
             \n\
             Part 1\n\
             --bound  \n\
             Content-Type: text/html\n\
             \n\
             Part 2\n\
             --bound--\n\
             epilogue\n",
        );
        let entity = Entity::parse(&data).unwrap();
        assert!(entity.is_multipart());

        let parts = children(&entity);
        assert_eq!(2, parts.len());
        assert_eq!(b"Part 1", parts[0].raw_body());
        assert!(parts[0].header().is_empty());
        assert_eq!(b"Content-Type: text/html\r\n\r\nPart 2", parts[1].raw());
        assert!(parts[1].content_type().is_subtype("html"));
        assert_eq!(1, parts[1].depth());
    }

    #[test]
    fn boundary_prefix_is_not_delimiter() {
        let data = crlf(
            "Content-Type: multipart/mixed; boundary=ab\n\
             \n\
             --ab\n\
             \n\
             --abc\n\
             --ab--\n",
        );
        let entity = Entity::parse(&data).unwrap();
        let parts = children(&entity);
        assert_eq!(1, parts.len());
        assert_eq!(b"--abc", parts[0].raw_body());
    }

    #[test]
    fn missing_close_delimiter() {
        let data = crlf(
            "Content-Type: multipart/mixed; boundary=b\n\
             \n\
             --b\n\
             \n\
             one\n\
             --b\n\
             \n\
             two\n",
        );
        let entity = Entity::parse(&data).unwrap();
        let parts = children(&entity);
        assert_eq!(2, parts.len());
        assert_eq!(b"one", parts[0].raw_body());
        assert_eq!(b"two\r\n", parts[1].raw_body());
    }

    #[test]
    fn trailing_delimiter_opens_no_part() {
        let data = crlf(
            "Content-Type: multipart/mixed; boundary=b\n\
             \n\
             --b\n\
             \n\
             one\n\
             --b\n",
        );
        let entity = Entity::parse(&data).unwrap();
        let parts = children(&entity);
        assert_eq!(1, parts.len());
        assert_eq!(b"one", parts[0].raw_body());
    }

    #[test]
    fn multipart_without_delimiters_has_no_children() {
        let data = crlf(
            "Content-Type: multipart/mixed; boundary=b\n\
             \n\
             nothing to see here\n",
        );
        let entity = Entity::parse(&data).unwrap();
        assert!(children(&entity).is_empty());
    }

    #[test]
    fn multipart_without_boundary_is_leaf() {
        let data =
            crlf("Content-Type: multipart/mixed\n\n--b\n\nfoo\n--b--\n");
        let entity = Entity::parse(&data).unwrap();
        assert!(!entity.is_multipart());
    }

    #[test]
    fn nested_multipart() {
        let data = crlf(
            "Content-Type: multipart/mixed; boundary=outer\n\
             \n\
             --outer\n\
             Content-Type: multipart/alternative; boundary=inner\n\
             \n\
             --inner\n\
             \n\
             1.1\n\
             --inner\n\
             \n\
             1.2\n\
             --inner--\n\
             --outer--\n",
        );
        let entity = Entity::parse(&data).unwrap();
        let outer = children(&entity);
        assert_eq!(1, outer.len());
        let inner = children(&outer[0]);
        assert_eq!(2, inner.len());
        assert_eq!(b"1.1", inner[0].raw_body());
        assert_eq!(b"1.2", inner[1].raw_body());
        assert_eq!(2, inner[1].depth());
    }

    #[test]
    fn digest_default_content_type() {
        let data = crlf(
            "Content-Type: multipart/digest; boundary=d\n\
             \n\
             --d\n\
             \n\
             Subject: embedded\n\
             --d--\n",
        );
        let entity = Entity::parse(&data).unwrap();
        let parts = children(&entity);
        assert!(parts[0].content_type().is_type("message"));
        assert!(parts[0].content_type().is_subtype("rfc822"));
    }

    #[test]
    fn each_body_call_restarts() {
        let data = crlf(
            "Content-Type: multipart/mixed; boundary=b\n\
             \n\
             --b\n\
             \n\
             one\n\
             --b\n\
             \n\
             two\n\
             --b--\n",
        );
        let entity = Entity::parse(&data).unwrap();
        assert_eq!(2, children(&entity).len());
        assert_eq!(2, children(&entity).len());
    }

    #[test]
    fn header_too_long() {
        let limits = LimitsConfig {
            max_header_size: 16,
            ..LimitsConfig::default()
        };
        let data = crlf("Subject: this is far too long\n\nbody");
        let err = Entity::parse_with_limits(&data, limits).unwrap_err();
        assert_matches!(&Error::HeaderTooLong(16), &err);
        assert_eq!(ErrorKind::Unreadable, err.kind());
    }

    #[test]
    fn too_many_parts() {
        let limits = LimitsConfig {
            max_parts: 2,
            ..LimitsConfig::default()
        };
        let data = crlf(
            "Content-Type: multipart/mixed; boundary=b\n\
             \n\
             --b\n\none\n--b\n\ntwo\n--b\n\nthree\n--b--\n",
        );
        let entity = Entity::parse_with_limits(&data, limits).unwrap();
        let results = match entity.body() {
            Body::Multipart(parts) => parts.collect::<Vec<_>>(),
            Body::Leaf(_) => panic!("Not a multipart"),
        };
        assert_eq!(3, results.len());
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert_matches!(&Err(Error::TooManyParts(2)), &results[2]);
    }

    #[test]
    fn nesting_too_deep() {
        let limits = LimitsConfig {
            max_depth: 1,
            ..LimitsConfig::default()
        };
        let data = crlf(
            "Content-Type: multipart/mixed; boundary=a\n\
             \n\
             --a\n\
             Content-Type: multipart/mixed; boundary=b\n\
             \n\
             --b\n\
             \n\
             deep\n\
             --b--\n\
             --a--\n",
        );
        let entity = Entity::parse_with_limits(&data, limits).unwrap();
        let outer = children(&entity);
        match outer[0].body() {
            Body::Multipart(mut parts) => {
                assert_matches!(
                    Some(Err(Error::NestingTooDeep(1))),
                    parts.next()
                );
                assert!(parts.next().is_none());
            }
            Body::Leaf(_) => panic!("Not a multipart"),
        }
    }

    #[test]
    fn message_read_from() {
        let message = Message::read_from(
            &b"Foo: bar\r\n\r\nbody"[..],
            LimitsConfig::default(),
        )
        .unwrap();
        let root = message.root().unwrap();
        assert_eq!(message.data(), root.raw());
        assert_eq!(b"body", root.raw_body());
    }
}
