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

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::Error;

/// The configuration for section extraction.
///
/// This is normally stored in a file named `crymap-section.toml`. Every
/// section and every field is optional.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct SystemConfig {
    /// Limits applied while reading the structure of a message.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Controls where rendered sections are held.
    #[serde(default)]
    pub buffer: BufferConfig,
}

impl SystemConfig {
    pub fn from_toml(data: &[u8]) -> Result<Self, Error> {
        Ok(toml::from_slice(data)?)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// The maximum size, in bytes, of the header block of any one part.
    ///
    /// A message whose header block does not end within this many bytes is
    /// considered unreadable.
    pub max_header_size: usize,

    /// The maximum depth of nested multiparts.
    pub max_depth: u32,

    /// The maximum number of children read from any one multipart.
    pub max_parts: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_header_size: 65536,
            max_depth: 20,
            max_parts: 1000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Rendered sections larger than this many bytes are moved to an
    /// anonymous temporary file.
    pub spill_threshold: usize,

    /// Where temporary files are created.
    ///
    /// If unset, the system temporary directory is used.
    pub tmp: Option<PathBuf>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig {
            spill_threshold: 65536,
            tmp: None,
        }
    }
}
