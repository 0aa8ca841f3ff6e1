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

//! Everything needed to answer an IMAP `BODY[section]<partial>` fetch.
//!
//! ## Regarding message layout
//!
//! IMAP defines a mechanism to access parts of a message based on its
//! multipart hierarchy. Each part of a multipart is assigned a number,
//! starting at 1. Parts can be addressed by multiple subscripts, such that,
//! e.g., `2.3` is the third sub-part of the second part.
//!
//! After zero or more subscripts comes a final specifier, which selects
//! whether the header, the content, or both are returned, and whether the
//! header is filtered. Finally, a partial range can restrict the result to a
//! slice of bytes.
//!
//! Embedded `message/rfc822` parts are opaque here. Subscripting one is the
//! same as subscripting any other non-multipart, i.e., there is no such part.

pub mod section;
