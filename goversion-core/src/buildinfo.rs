//! The build metadata record the producer embeds in every executable
//! since release 1.13.
//!
//! A record starts with a 16-byte aligned 32-byte header:
//!
//! ```text
//! 0..14   magic "\xff Go buildinf:"
//! 14      pointer size (4 or 8)
//! 15      flags: bit 0 big-endian pointers, bit 1 inline strings
//! 16..32  layout specific
//! ```

pub(crate) mod decode;
mod locate;
pub mod modinfo;

pub use decode::decode;
pub use locate::locate;
pub use modinfo::{BuildSetting, Module, ModuleInfo, Settings};

use serde::Serialize;

pub const MAGIC: &[u8; 14] = b"\xff Go buildinf:";
pub const HEADER_LEN: usize = 32;
pub const ALIGN: u64 = 16;

const FLAG_BIG_ENDIAN: u8 = 0x1;
const FLAG_INLINE_STRINGS: u8 = 0x2;

/// Record layouts, one per producer era.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LayoutVersion {
    /// Release and module info follow the header as varint-prefixed
    /// strings (1.18 and later).
    Inline,
    /// The header holds two pointers to string headers stored elsewhere
    /// in the image (1.13 through 1.17).
    Pointer,
}

impl LayoutVersion {
    /// Newest first: recent producers are the common case.
    pub const KNOWN: [LayoutVersion; 2] = [LayoutVersion::Inline, LayoutVersion::Pointer];

    /// Whether `header` is a record header of this layout.
    pub fn matches(self, header: &[u8]) -> bool {
        if header.len() < HEADER_LEN || !header.starts_with(MAGIC) {
            return false;
        }
        let inline = header[15] & FLAG_INLINE_STRINGS != 0;
        match self {
            LayoutVersion::Inline => inline,
            LayoutVersion::Pointer => !inline,
        }
    }
}

/// A located record: its address in the image and the bytes from the
/// header to the end of the containing section.
#[derive(Debug, Clone, Copy)]
pub struct BuildInfoRecord<'a> {
    pub offset: u64,
    pub layout_version: LayoutVersion,
    pub raw: &'a [u8],
}

/// Decoded record contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub release: String,
    pub layout_version: LayoutVersion,
    pub modules: ModuleInfo,
}
