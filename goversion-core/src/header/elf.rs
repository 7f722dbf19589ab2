use goblin::elf::{Elf, Header};

use crate::header::{ContainerKind, ContainerLayout, Endianness};
use crate::sections::Section;
use crate::symbols;
use crate::{Error, Result};

const EI_CLASS: usize = 4;
const ELFCLASS64: u8 = 2;

/// Header tables must lie inside the file before anything is read from them.
fn check_tables(header: &Header, file_len: usize) -> Result<()> {
    let tables = [
        ("section", header.e_shoff, header.e_shnum, header.e_shentsize),
        ("program", header.e_phoff, header.e_phnum, header.e_phentsize),
    ];
    for (what, offset, count, entsize) in tables {
        if offset == 0 || count == 0 {
            continue;
        }
        let end = (count as u64)
            .checked_mul(entsize as u64)
            .and_then(|len| offset.checked_add(len));
        if end.map_or(true, |end| end > file_len as u64) {
            return Err(Error::corrupt_container(format!(
                "{count} {what} headers at {offset:#x} exceed file size {file_len:#x}"
            )));
        }
    }
    Ok(())
}

pub fn parse(data: &[u8]) -> Result<ContainerLayout> {
    let header_len = match data.get(EI_CLASS) {
        Some(&ELFCLASS64) => 64,
        _ => 52,
    };
    if data.len() < header_len {
        return Err(Error::corrupt_container(format!(
            "truncated ELF header: {} of {header_len} bytes",
            data.len()
        )));
    }

    check_tables(&Elf::parse_header(data)?, data.len())?;
    let elf = Elf::parse(data)?;

    let has_sections = !elf.section_headers.is_empty();
    let sections = if has_sections {
        elf.section_headers
            .iter()
            .map(|sh| Section::from_elf_sh(sh, &elf).check_bounds(data.len()))
            .collect::<Result<Vec<_>>>()?
    } else {
        log::warn!("ELF has no section headers; using program segments");
        elf.program_headers
            .iter()
            .enumerate()
            .filter_map(|(i, ph)| Section::from_elf_ph(i, ph))
            .map(|s| s.check_bounds(data.len()))
            .collect::<Result<Vec<_>>>()?
    };
    if sections.is_empty() {
        return Err(Error::corrupt_container(
            "ELF has neither section headers nor loadable segments",
        ));
    }

    Ok(ContainerLayout {
        kind: ContainerKind::Elf,
        endianness: if elf.little_endian {
            Endianness::Little
        } else {
            Endianness::Big
        },
        pointer_size: if elf.is_64 { 8 } else { 4 },
        sections,
        symbols: symbols::from_elf(&elf),
    })
}
