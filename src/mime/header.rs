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

//! The header model of a MIME part and the one header the reader needs to
//! understand itself, `Content-Type`.

use nom::{
    branch::alt,
    bytes::complete::{is_not, take, take_while, take_while1},
    character::complete::char,
    combinator::{map, opt},
    multi::{fold_many0, many0},
    sequence::{delimited, preceded, separated_pair, terminated, tuple},
    IResult,
};

/// A single header field.
///
/// `value` is everything after the colon, in raw form, including any folding
/// but excluding the final line ending.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field<'a> {
    pub name: &'a str,
    pub value: &'a [u8],
}

/// The ordered header fields of one part.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header<'a> {
    fields: Vec<Field<'a>>,
}

impl<'a> Header<'a> {
    pub fn new(fields: Vec<Field<'a>>) -> Self {
        Header { fields }
    }

    pub fn fields(&self) -> &[Field<'a>] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the raw value of the first field called `name`, compared
    /// case-insensitively.
    pub fn get(&self, name: &str) -> Option<&'a [u8]> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value)
    }

    /// Produce a copy of this header containing only the fields whose names
    /// are (`keep_matching`) or are not (`!keep_matching`) in `names`.
    pub fn filtered<S: AsRef<str>>(
        &self,
        names: &[S],
        keep_matching: bool,
    ) -> Self {
        Header {
            fields: self
                .fields
                .iter()
                .filter(|f| {
                    keep_matching
                        == names
                            .iter()
                            .any(|n| f.name.eq_ignore_ascii_case(n.as_ref()))
                })
                .copied()
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentType {
    pub typ: String,
    pub subtype: String,
    /// Parameters in the order they were given, with names lower-cased.
    pub parms: Vec<(String, Vec<u8>)>,
}

impl ContentType {
    pub fn is_type(&self, typ: &str) -> bool {
        self.typ.eq_ignore_ascii_case(typ)
    }

    pub fn is_subtype(&self, subtype: &str) -> bool {
        self.subtype.eq_ignore_ascii_case(subtype)
    }

    pub fn parm(&self, name: &str) -> Option<&[u8]> {
        self.parms
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| &v[..])
    }

    /// The multipart boundary, if this is a multipart type that has one.
    pub fn boundary(&self) -> Option<&[u8]> {
        if self.is_type("multipart") {
            self.parm("boundary").filter(|b| !b.is_empty())
        } else {
            None
        }
    }
}

// RFC 2045 "tspecials"
fn is_token_char(b: u8) -> bool {
    b > b' ' && b < 0x7F && !b"()<>@,;:\\\"/[]?=".contains(&b)
}

// Folding has not been undone at this point, so line endings are just
// whitespace.
fn ows(i: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while(|b: u8| b" \t\r\n".contains(&b))(i)
}

fn token(i: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(is_token_char)(i)
}

// RFC 2822 3.2.5 "Quoted string", including quoted pairs
fn quoted_string(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    delimited(
        char('"'),
        fold_many0(
            alt((is_not("\"\\"), preceded(char('\\'), take(1usize)))),
            Vec::new(),
            |mut acc: Vec<u8>, item: &[u8]| {
                acc.extend_from_slice(item);
                acc
            },
        ),
        char('"'),
    )(i)
}

fn parm_value(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    alt((quoted_string, map(token, |t: &[u8]| t.to_vec())))(i)
}

fn parm(i: &[u8]) -> IResult<&[u8], (String, Vec<u8>)> {
    map(
        preceded(
            tuple((ows, char(';'), ows)),
            separated_pair(token, tuple((ows, char('='), ows)), parm_value),
        ),
        |(name, value)| {
            // Tokens are always ASCII
            (String::from_utf8_lossy(name).to_ascii_lowercase(), value)
        },
    )(i)
}

fn content_type(i: &[u8]) -> IResult<&[u8], ContentType> {
    map(
        tuple((
            preceded(ows, token),
            preceded(tuple((ows, char('/'), ows)), token),
            terminated(many0(parm), opt(tuple((ows, char(';'))))),
        )),
        |(typ, subtype, parms)| ContentType {
            typ: String::from_utf8_lossy(typ).into_owned(),
            subtype: String::from_utf8_lossy(subtype).into_owned(),
            parms,
        },
    )(i)
}

/// Parse the raw value of a `Content-Type` header.
///
/// Anything after the last well-formed parameter is ignored. Returns `None`
/// if there is not even a `type/subtype` pair.
pub fn parse_content_type(value: &[u8]) -> Option<ContentType> {
    content_type(value).ok().map(|(_, ct)| ct)
}
