use byteorder::{ByteOrder, BE, LE};
use goblin::mach::Mach;

use crate::header::{ContainerKind, ContainerLayout, Endianness};
use crate::sections::Section;
use crate::symbols;
use crate::{Error, Result};

const MH_MAGIC_64: u32 = 0xfeed_facf;
const MH_CIGAM_64: u32 = 0xcffa_edfe;
const MH_CIGAM: u32 = 0xcefa_edfe;
const LOAD_COMMAND_MIN_LEN: u64 = 8;

/// Rejects load command counts and sizes the file cannot hold.
fn check_commands(data: &[u8]) -> Result<()> {
    if data.len() < 28 {
        return Err(Error::corrupt_container("truncated Mach-O header"));
    }
    let magic = BE::read_u32(data);
    let little = matches!(magic, MH_CIGAM | MH_CIGAM_64);
    let read = |at: usize| if little { LE::read_u32(&data[at..]) } else { BE::read_u32(&data[at..]) };
    let header_len: u64 = if matches!(magic, MH_MAGIC_64 | MH_CIGAM_64) { 32 } else { 28 };
    let ncmds = read(16) as u64;
    let sizeofcmds = read(20) as u64;

    if header_len + sizeofcmds > data.len() as u64 || ncmds * LOAD_COMMAND_MIN_LEN > sizeofcmds {
        return Err(Error::corrupt_container(format!(
            "{ncmds} load commands in {sizeofcmds:#x} bytes do not fit a {:#x} byte file",
            data.len()
        )));
    }
    Ok(())
}

pub fn parse(data: &[u8]) -> Result<ContainerLayout> {
    check_commands(data)?;
    let macho = match Mach::parse(data)? {
        Mach::Binary(macho) => macho,
        Mach::Fat(_) => return Err(Error::unsupported("multi-architecture Mach-O")),
    };

    let mut sections = Vec::new();
    for segment in macho.segments.iter() {
        for (sec, _) in segment.sections()? {
            sections.push(Section::from_macho_section(&sec).check_bounds(data.len())?);
        }
    }

    Ok(ContainerLayout {
        kind: ContainerKind::MachO,
        endianness: if macho.little_endian {
            Endianness::Little
        } else {
            Endianness::Big
        },
        pointer_size: if macho.is_64 { 8 } else { 4 },
        sections,
        symbols: symbols::from_macho(&macho),
    })
}
