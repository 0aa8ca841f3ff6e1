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

//! Extraction of a single `BODY[section]<partial>` from a message.
//!
//! Extraction happens in two phases. First, the subscripts of the section are
//! resolved against the multipart structure of the message, reading forward
//! through the children at each level. Then the part that was found is
//! rendered into a buffer according to the specifier, and the partial range,
//! if any, is applied to the result.

use std::borrow::Cow;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use log::debug;

use crate::mime::entity::{Body, Entity, Parts};
use crate::mime::writer::{Discard, PartWriter};
use crate::support::buffer::{BufferWriter, Literal};
use crate::support::error::Error;
use crate::support::system_config::BufferConfig;

/// Describes which portion of a part to produce.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Specifier {
    /// The entire part, header and content.
    Entire,
    /// The header only.
    Header,
    /// The header, keeping only the named fields.
    HeaderFields(Vec<String>),
    /// The header, dropping the named fields.
    HeaderFieldsNot(Vec<String>),
    /// The MIME header of the part.
    ///
    /// In this model every part has exactly one header, so this is the same
    /// as `Header`; it exists so the distinction the client made survives to
    /// the response.
    Mime,
    /// The content only.
    Text,
}

impl Default for Specifier {
    fn default() -> Self {
        Specifier::Entire
    }
}

impl Specifier {
    /// Build a specifier from its IMAP name.
    ///
    /// `fields` is only used by `HEADER.FIELDS` and `HEADER.FIELDS.NOT`.
    pub fn from_name(name: &str, fields: Vec<String>) -> Option<Self> {
        let name = name.to_ascii_uppercase();
        match &name[..] {
            "" | "ENTIRE" => Some(Specifier::Entire),
            "HEADER" => Some(Specifier::Header),
            "HEADER.FIELDS" => Some(Specifier::HeaderFields(fields)),
            "HEADER.FIELDS.NOT" => Some(Specifier::HeaderFieldsNot(fields)),
            "MIME" => Some(Specifier::Mime),
            "TEXT" => Some(Specifier::Text),
            _ => None,
        }
    }

    fn include_header(&self) -> bool {
        Specifier::Text != *self
    }

    fn include_content(&self) -> bool {
        match *self {
            Specifier::Entire | Specifier::Text => true,
            Specifier::Header
            | Specifier::HeaderFields(..)
            | Specifier::HeaderFieldsNot(..)
            | Specifier::Mime => false,
        }
    }
}

/// A byte range of a rendered section.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Partial {
    pub offset: u64,
    pub length: u64,
}

impl FromStr for Partial {
    type Err = String;

    /// Parse the `offset.length` form used inside `<>` in IMAP.
    fn from_str(s: &str) -> Result<Self, String> {
        let mut split = s.splitn(2, '.');
        match (split.next(), split.next()) {
            (Some(offset), Some(length)) => Ok(Partial {
                offset: offset
                    .parse()
                    .map_err(|e| format!("Bad partial offset: {}", e))?,
                length: length
                    .parse()
                    .map_err(|e| format!("Bad partial length: {}", e))?,
            }),
            _ => Err(format!("Partial must be OFFSET.LENGTH, got '{}'", s)),
        }
    }
}

/// Identifies a particular portion of the body to fetch.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct BodySection {
    /// Which subscripts to traverse to find the part in question, each
    /// starting at 1. Empty means the message itself.
    pub path: Vec<u32>,
    /// Which portion of the part to produce.
    pub specifier: Specifier,
    /// If set, slice the data produced by the above to this range, clamping
    /// each endpoint.
    pub partial: Option<Partial>,
}

impl fmt::Display for BodySection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BODY[")?;
        for (ix, subscript) in self.path.iter().enumerate() {
            if ix > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", subscript)?;
        }

        let (name, fields) = match self.specifier {
            Specifier::Entire => ("", None),
            Specifier::Header => ("HEADER", None),
            Specifier::HeaderFields(ref fields) => {
                ("HEADER.FIELDS", Some(fields))
            }
            Specifier::HeaderFieldsNot(ref fields) => {
                ("HEADER.FIELDS.NOT", Some(fields))
            }
            Specifier::Mime => ("MIME", None),
            Specifier::Text => ("TEXT", None),
        };

        if !name.is_empty() {
            if !self.path.is_empty() {
                write!(f, ".")?;
            }
            write!(f, "{}", name)?;
        }

        if let Some(fields) = fields {
            write!(f, " ({})", fields.join(" "))?;
        }

        write!(f, "]")?;

        if let Some(partial) = self.partial {
            write!(f, "<{}.{}>", partial.offset, partial.length)?;
        }

        Ok(())
    }
}

/// Extracts body sections from messages.
#[derive(Clone, Debug, Default)]
pub struct SectionExtractor {
    buffer: BufferConfig,
}

impl SectionExtractor {
    pub fn new(buffer: BufferConfig) -> Self {
        SectionExtractor { buffer }
    }

    /// Extract `section` from the message whose top-level entity is `root`.
    ///
    /// Fails with `Error::NoSuchPart` if the path does not identify a part.
    /// Any other error means the message could not be read.
    pub fn extract(
        &self,
        root: &Entity<'_>,
        section: &BodySection,
    ) -> Result<Literal, Error> {
        let target = resolve(root, &section.path)?;

        let mut buffer = BufferWriter::new(&self.buffer);
        render(&target, &section.specifier, &mut buffer)?;
        let literal = buffer.flip()?;

        match section.partial {
            None => Ok(literal),
            Some(partial) => {
                Ok(literal.restrict(partial.offset, partial.length)?)
            }
        }
    }
}

/// Extract `section` from `root` with the default buffer configuration.
pub fn fetch_body_section(
    root: &Entity<'_>,
    section: &BodySection,
) -> Result<Literal, Error> {
    SectionExtractor::default().extract(root, section)
}

/// Find the part identified by `path`.
pub fn resolve<'a>(
    root: &Entity<'a>,
    path: &[u32],
) -> Result<Entity<'a>, Error> {
    let mut current = root.clone();

    for (level, &subscript) in path.iter().enumerate() {
        current = match current.body() {
            Body::Multipart(parts) => nth_part(parts, subscript),
            Body::Leaf(_) => Err(Error::NoSuchPart),
        }
        .map_err(|e| {
            if let Error::NoSuchPart = e {
                debug!(
                    "No part {} at level {} of {:?}",
                    subscript, level, path
                );
            }
            e
        })?;
    }

    Ok(current)
}

fn nth_part<'a>(parts: Parts<'a>, subscript: u32) -> Result<Entity<'a>, Error> {
    if 0 == subscript {
        return Err(Error::NoSuchPart);
    }

    let mut n = 0u32;
    for part in parts {
        // Read errors on earlier siblings are not skipped over
        let part = part?;
        n += 1;
        if n == subscript {
            return Ok(part);
        }
    }

    Err(Error::NoSuchPart)
}

/// Write the portion of `entity` selected by `specifier` to `dest`.
pub fn render<W: Write + Discard>(
    entity: &Entity<'_>,
    specifier: &Specifier,
    dest: W,
) -> Result<(), Error> {
    let header = match *specifier {
        Specifier::HeaderFields(ref names) => {
            Cow::Owned(entity.header().filtered(names, true))
        }
        Specifier::HeaderFieldsNot(ref names) => {
            Cow::Owned(entity.header().filtered(names, false))
        }
        _ => Cow::Borrowed(entity.header()),
    };

    let mut writer = PartWriter::create(dest, &header)?;
    if !specifier.include_header() {
        writer.discard()?;
    }

    if specifier.include_content() {
        writer.write_all(entity.raw_body())?;
    }

    writer.close()?;
    Ok(())
}
