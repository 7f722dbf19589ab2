use std::fs::File;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, BE, LE};
use memmap2::Mmap;

use crate::header::{self, ContainerKind, ContainerLayout, Endianness};
use crate::sections::{Section, SectionKind};
use crate::symbols::SymbolTable;
use crate::{Error, Result};

/// Resolves virtual addresses of the loaded image to file bytes.
pub trait AddressSpace {
    /// Returns exactly `len` bytes at `addr`, or `None` if any part of the
    /// range is not backed by file contents.
    fn read_at(&self, addr: u64, len: u64) -> Option<&[u8]>;
}

/// Width and byte order of a pointer-sized word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerFormat {
    pub size: u8,
    pub endianness: Endianness,
}

impl PointerFormat {
    pub fn new(size: u8, endianness: Endianness) -> Option<Self> {
        matches!(size, 4 | 8).then_some(Self { size, endianness })
    }

    pub fn width(&self) -> u64 {
        self.size as u64
    }

    /// Reads one word from the front of `bytes`.
    pub fn read(&self, bytes: &[u8]) -> Option<u64> {
        let word = bytes.get(..self.size as usize)?;
        Some(match (self.size, self.endianness) {
            (4, Endianness::Little) => LE::read_u32(word) as u64,
            (4, Endianness::Big) => BE::read_u32(word) as u64,
            (_, Endianness::Little) => LE::read_u64(word),
            (_, Endianness::Big) => BE::read_u64(word),
        })
    }
}

enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for Backing {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Backing::Mapped(mmap) => &mmap[..],
            Backing::Owned(bytes) => &bytes[..],
        }
    }
}

/// An opened executable: the container's header facts plus the file bytes
/// they describe. Section payloads are only touched when a stage asks for them.
pub struct ExecutableFile {
    path: Option<PathBuf>,
    data: Backing,
    layout: ContainerLayout,
}

impl ExecutableFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        if file.metadata()?.len() == 0 {
            return Err(Error::unsupported("empty file"));
        }
        // SAFETY: the map is read-only and owned by the returned value; the
        // file must not be truncated by another process while it is open.
        let mmap = unsafe { Mmap::map(&file)? };
        Self::from_backing(Backing::Mapped(mmap), Some(path.as_ref().to_path_buf()))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_backing(Backing::Owned(bytes), None)
    }

    fn from_backing(data: Backing, path: Option<PathBuf>) -> Result<Self> {
        let layout = header::parse(&data)?;
        Ok(Self { path, data, layout })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn kind(&self) -> ContainerKind {
        self.layout.kind
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn pointer_format(&self) -> PointerFormat {
        PointerFormat {
            size: self.layout.pointer_size,
            endianness: self.layout.endianness,
        }
    }

    pub fn sections(&self) -> &[Section] {
        &self.layout.sections
    }

    /// `None` when the image carries no symbols (stripped).
    pub fn symbols(&self) -> Option<&SymbolTable> {
        self.layout.symbols.as_ref()
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.layout.sections.iter().find(|s| s.name == name)
    }

    /// File bytes of `section`. Bounds were validated when the container
    /// was parsed; a section from another file yields an empty slice.
    pub fn section_data(&self, section: &Section) -> &[u8] {
        self.data.get(section.file_range()).unwrap_or(&[])
    }

    /// Non-code sections with file contents, the dedicated build metadata
    /// section first, then writable data, then read-only data.
    pub fn data_sections(&self) -> Vec<&Section> {
        let mut sections: Vec<&Section> = self
            .layout
            .sections
            .iter()
            .filter(|s| s.is_scannable())
            .collect();
        sections.sort_by_key(|s| match (s.is_build_info(), s.kind) {
            (true, _) => 0,
            (false, SectionKind::Data) => 1,
            _ => 2,
        });
        sections
    }
}

impl AddressSpace for ExecutableFile {
    fn read_at(&self, addr: u64, len: u64) -> Option<&[u8]> {
        self.layout
            .sections
            .iter()
            .find_map(|s| s.translate(addr, len))
            .and_then(|range| self.data.get(range))
    }
}

impl std::fmt::Debug for ExecutableFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutableFile")
            .field("path", &self.path)
            .field("len", &self.data.len())
            .field("layout", &self.layout)
            .finish()
    }
}
