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

//! Extraction of IMAP body sections from MIME messages.
//!
//! A message is read with `mime::entity`, after which
//! `mime::fetch::section` resolves a section path against its multipart
//! structure and renders the requested portion into a `Literal`.

#[cfg(test)]
macro_rules! assert_matches {
    ($expected:pat, $actual:expr) => {
        match $actual {
            $expected => (),
            unexpected => panic!(
                "Expected {} matches {}, got {:?}",
                stringify!($expected),
                stringify!($actual),
                unexpected
            ),
        }
    };
}

pub mod cli;
pub mod mime;
pub mod support;

pub use crate::mime::entity::{Body, Entity, Message};
pub use crate::mime::fetch::section::{
    fetch_body_section, BodySection, Partial, SectionExtractor, Specifier,
};
pub use crate::support::buffer::Literal;
pub use crate::support::error::{Error, ErrorKind};
