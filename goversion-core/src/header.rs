//! Container sniffing and header-table parsing.
//!
//! Each container module reads only the header tables it needs and hands
//! back owned section and symbol descriptions; payloads stay in the file.

pub mod elf;
pub mod macho;
pub mod pe;
pub mod plan9;

use std::fmt;

use byteorder::{ByteOrder, BE};
use serde::Serialize;

use crate::sections::Section;
use crate::symbols::SymbolTable;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContainerKind {
    Elf,
    Pe,
    MachO,
    /// Plain a.out image: fixed header, then unwrapped text, data and symbols.
    Raw,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerKind::Elf => "ELF",
            ContainerKind::Pe => "PE",
            ContainerKind::MachO => "Mach-O",
            ContainerKind::Raw => "a.out",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

/// Header facts of one parsed container.
#[derive(Debug)]
pub struct ContainerLayout {
    pub kind: ContainerKind,
    pub endianness: Endianness,
    pub pointer_size: u8,
    pub sections: Vec<Section>,
    pub symbols: Option<SymbolTable>,
}

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";
const MACHO_MAGICS: [u32; 4] = [0xfeed_face, 0xfeed_facf, 0xcefa_edfe, 0xcffa_edfe];

/// Classifies a file by its leading bytes. Multi-architecture Mach-O
/// (`0xcafebabe`, shared with Java class files) is deliberately absent.
pub fn sniff(data: &[u8]) -> Option<ContainerKind> {
    if data.len() < 4 {
        return None;
    }
    let word = BE::read_u32(data);
    if data.starts_with(ELF_MAGIC) {
        Some(ContainerKind::Elf)
    } else if data.starts_with(b"MZ") {
        Some(ContainerKind::Pe)
    } else if MACHO_MAGICS.contains(&word) {
        Some(ContainerKind::MachO)
    } else if plan9::is_magic(word) {
        Some(ContainerKind::Raw)
    } else {
        None
    }
}

pub fn parse(data: &[u8]) -> Result<ContainerLayout> {
    let kind = sniff(data).ok_or_else(|| match data.get(..4) {
        None => Error::unsupported(format!("file too short ({} bytes)", data.len())),
        Some(magic) => Error::unsupported(format!("unrecognized magic {magic:02x?}")),
    })?;
    log::debug!("Detected {kind} container ({} bytes)", data.len());

    let layout = match kind {
        ContainerKind::Elf => elf::parse(data)?,
        ContainerKind::Pe => pe::parse(data)?,
        ContainerKind::MachO => macho::parse(data)?,
        ContainerKind::Raw => plan9::parse(data)?,
    };
    log::info!(
        "{} container: {} sections, {}",
        layout.kind,
        layout.sections.len(),
        match &layout.symbols {
            Some(table) => format!("{} symbols", table.len()),
            None => "no symbol table".to_string(),
        }
    );
    Ok(layout)
}
