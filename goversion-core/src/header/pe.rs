use byteorder::{ByteOrder, LE};
use goblin::pe::PE;

use crate::header::{ContainerKind, ContainerLayout, Endianness};
use crate::sections::Section;
use crate::symbols;
use crate::{Error, Result};

const DOS_HEADER_LEN: usize = 0x40;
const E_LFANEW: usize = 0x3c;
const PE_SIGNATURE: &[u8; 4] = b"PE\0\0";

/// Follows the DOS header's `e_lfanew` to the PE signature. A bare DOS
/// executable is not a supported container; a dangling offset is corrupt.
fn check_signature(data: &[u8]) -> Result<()> {
    if data.len() < DOS_HEADER_LEN {
        return Err(Error::corrupt_container("truncated DOS header"));
    }
    let pe_offset = LE::read_u32(&data[E_LFANEW..]) as usize;
    match data.get(pe_offset..pe_offset.saturating_add(PE_SIGNATURE.len())) {
        None => Err(Error::corrupt_container(format!(
            "PE header offset {pe_offset:#x} past end of file"
        ))),
        Some(sig) if sig == PE_SIGNATURE => Ok(()),
        Some(_) => Err(Error::unsupported("MZ executable without a PE header")),
    }
}

pub fn parse(data: &[u8]) -> Result<ContainerLayout> {
    check_signature(data)?;
    let pe = PE::parse(data)?;

    let image_base = pe.image_base as u64;
    let sections = pe
        .sections
        .iter()
        .map(|s| Section::from_pe_section(s, image_base)?.check_bounds(data.len()))
        .collect::<Result<Vec<_>>>()?;

    let coff = &pe.header.coff_header;
    let symbols = symbols::parse_coff(
        data,
        coff.pointer_to_symbol_table as usize,
        coff.number_of_symbol_table as usize,
        &sections,
    )?;

    Ok(ContainerLayout {
        kind: ContainerKind::Pe,
        endianness: Endianness::Little,
        pointer_size: if pe.is_64 { 8 } else { 4 },
        sections,
        symbols,
    })
}
