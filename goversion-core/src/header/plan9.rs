use std::io::{self, Cursor, Read};

use byteorder::{ReadBytesExt, BE};

use crate::header::{ContainerKind, ContainerLayout, Endianness};
use crate::sections::{Section, SectionKind};
use crate::symbols;
use crate::{Error, Result};

/// Set in the magic when the header carries a trailing 64-bit entry point.
const HDR_MAGIC: u32 = 0x0000_8000;

pub const MAGIC_386: u32 = 0x0000_01eb;
pub const MAGIC_AMD64: u32 = 0x0000_8a97;
pub const MAGIC_ARM: u32 = 0x0000_0647;

const HEADER_LEN: usize = 32;
const WIDE_HEADER_LEN: usize = 40;

pub fn is_magic(word: u32) -> bool {
    matches!(word, MAGIC_386 | MAGIC_AMD64 | MAGIC_ARM)
}

/// The big-endian a.out header.
#[derive(Debug, Clone, Copy)]
pub struct Plan9Header {
    pub magic: u32,
    /// Size of the text segment.
    pub text: u32,
    /// Size of the initialized data segment.
    pub data: u32,
    pub bss: u32,
    /// Size of the symbol table.
    pub syms: u32,
    pub entry: u64,
    pub spsz: u32,
    pub pcsz: u32,
}

impl Plan9Header {
    pub fn from_reader<R: Read>(cur: &mut R) -> io::Result<Self> {
        let magic = cur.read_u32::<BE>()?;
        let mut hdr = Plan9Header {
            magic,
            text: cur.read_u32::<BE>()?,
            data: cur.read_u32::<BE>()?,
            bss: cur.read_u32::<BE>()?,
            syms: cur.read_u32::<BE>()?,
            entry: cur.read_u32::<BE>()? as u64,
            spsz: cur.read_u32::<BE>()?,
            pcsz: cur.read_u32::<BE>()?,
        };
        if hdr.is_wide() {
            hdr.entry = cur.read_u64::<BE>()?;
        }
        Ok(hdr)
    }

    pub fn is_wide(&self) -> bool {
        self.magic & HDR_MAGIC != 0
    }

    pub fn header_len(&self) -> u64 {
        if self.is_wide() {
            WIDE_HEADER_LEN as u64
        } else {
            HEADER_LEN as u64
        }
    }

    /// Load base and segment rounding used by the producer's linker.
    fn load_layout(&self) -> (u64, u64) {
        match self.magic {
            MAGIC_AMD64 => (0x20_0000, 0x20_0000),
            _ => (0x1000, 0x1000),
        }
    }

    pub fn pointer_size(&self) -> u8 {
        if self.magic == MAGIC_AMD64 {
            8
        } else {
            4
        }
    }
}

fn round_up(value: u64, to: u64) -> u64 {
    (value + to - 1) & !(to - 1)
}

pub fn parse(data: &[u8]) -> Result<ContainerLayout> {
    if data.len() < HEADER_LEN {
        return Err(Error::corrupt_container("truncated a.out header"));
    }
    let hdr = Plan9Header::from_reader(&mut Cursor::new(data))
        .map_err(|_| Error::corrupt_container("truncated a.out header"))?;

    let header_len = hdr.header_len();
    let text_offset = header_len;
    let data_offset = text_offset + hdr.text as u64;
    let syms_offset = data_offset + hdr.data as u64;
    let end = syms_offset + hdr.syms as u64;
    if end > data.len() as u64 {
        return Err(Error::corrupt_container(format!(
            "a.out segments end at {end:#x}, past end of file ({:#x})",
            data.len()
        )));
    }

    let (base, rounding) = hdr.load_layout();
    let text_addr = base + header_len;
    let data_addr = round_up(text_addr + hdr.text as u64, rounding);

    let sections = vec![
        Section {
            name: "text".to_string(),
            addr: text_addr,
            size: hdr.text as u64,
            file_offset: text_offset,
            file_size: hdr.text as u64,
            kind: SectionKind::Code,
        },
        Section {
            name: "data".to_string(),
            addr: data_addr,
            size: hdr.data as u64 + hdr.bss as u64,
            file_offset: data_offset,
            file_size: hdr.data as u64,
            kind: SectionKind::Data,
        },
    ];

    let symbols = if hdr.syms == 0 {
        None
    } else {
        symbols::parse_plan9(&data[syms_offset as usize..end as usize], hdr.is_wide())?
    };

    Ok(ContainerLayout {
        kind: ContainerKind::Raw,
        endianness: Endianness::Little,
        pointer_size: hdr.pointer_size(),
        sections,
        symbols,
    })
}
