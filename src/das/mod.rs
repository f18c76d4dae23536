//! Low-level DAS scoped container format.
//!
//! A DAS file is a signature followed by a flat sequence of text-delimited
//! scopes. Field values are either quoted strings or little-endian binary.
//!
//! ## File Structure
//!
//! ```text
//! +------------------+
//! | Magic: "DAS"     |  3 bytes
//! +------------------+
//! | Finalized flag   |  1 byte (0x00 or 0xFF)
//! +------------------+
//! | Version          |  2 bytes (u16 LE)
//! +------------------+
//! | Reserved         |  2 bytes (zero)
//! +------------------+
//! | PROPERTIES       |
//! |   KEY: value     |
//! | ENDSCOPE         |
//! +------------------+
//! | BUFFER ...       |  further scopes
//! +------------------+
//! ```

mod format;
pub mod grammar;
mod read_util;
mod reader;
mod search;
mod stream;
pub mod writer;

pub use format::*;
pub use reader::*;
pub use search::{partial_suffix_len, rfind_end, PrefixMatcher};
pub use stream::*;
pub use writer::*;
