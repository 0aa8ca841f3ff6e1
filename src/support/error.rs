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

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No such message body part")]
    NoSuchPart,
    #[error("Header block exceeds {0} bytes")]
    HeaderTooLong(usize),
    #[error("Multipart nesting exceeds {0} levels")]
    NestingTooDeep(u32),
    #[error("Message has more than {0} parts")]
    TooManyParts(u32),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

/// The two classes of failure visible to the protocol layer.
///
/// `NoSuchPart` is an ordinary outcome of a client addressing a section that
/// does not exist, and is typically reported as an empty or `NIL` section.
/// Everything else means the message could not be read or rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NoSuchPart,
    Unreadable,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match *self {
            Error::NoSuchPart => ErrorKind::NoSuchPart,
            Error::HeaderTooLong(..)
            | Error::NestingTooDeep(..)
            | Error::TooManyParts(..)
            | Error::Io(..)
            | Error::Config(..) => ErrorKind::Unreadable,
        }
    }
}
