use std::io::{Cursor, Read, Seek, SeekFrom};

use byteorder::{ByteOrder, ReadBytesExt, BE, LE};
use goblin::elf::section_header::SHN_UNDEF;
use goblin::elf::Elf;
use goblin::mach::symbols::{N_TYPE, N_UNDF};
use goblin::mach::MachO;

use crate::sections::Section;
use crate::{Error, Result};

const COFF_SYMBOL_SIZE: usize = 18;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub value: u64,
}

/// The symbol names and values of an unstripped image.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    /// An empty table is reported as absent: the image was stripped.
    pub fn new(symbols: Vec<Symbol>) -> Option<Self> {
        if symbols.is_empty() {
            None
        } else {
            Some(Self { symbols })
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }
}

fn name_at(strtab: &[u8], offset: usize) -> String {
    if offset >= strtab.len() {
        return String::new();
    }
    let bytes = &strtab[offset..];
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Only symbols defined in `.symtab` count. Dynamic entries and undefined
/// imports survive stripping, so they say nothing about it.
pub fn from_elf(elf: &Elf) -> Option<SymbolTable> {
    let mut symbols = Vec::with_capacity(elf.syms.len());
    for sym in elf.syms.iter() {
        if sym.st_shndx == SHN_UNDEF as usize {
            continue;
        }
        if let Some(name) = elf.strtab.get_at(sym.st_name).filter(|n| !n.is_empty()) {
            symbols.push(Symbol {
                name: name.to_string(),
                value: sym.st_value,
            });
        }
    }
    SymbolTable::new(symbols)
}

/// Mach-O symbols carry the C-style leading underscore; it is removed so
/// names compare equal across containers. Undefined entries are dylib
/// imports and are left out.
pub fn from_macho(macho: &MachO) -> Option<SymbolTable> {
    let mut symbols = Vec::new();
    for entry in macho.symbols() {
        match entry {
            Ok((name, nlist)) => {
                if nlist.n_type & N_TYPE == N_UNDF {
                    continue;
                }
                let name = name.strip_prefix('_').unwrap_or(name);
                if !name.is_empty() {
                    symbols.push(Symbol {
                        name: name.to_string(),
                        value: nlist.n_value,
                    });
                }
            }
            Err(err) => {
                log::warn!("Mach-O symbol table truncated: {err}");
                break;
            }
        }
    }
    SymbolTable::new(symbols)
}

/// Reads a PE/COFF symbol table. Values are resolved to virtual addresses
/// through the 1-based section number, so `sections` must be in header order.
pub fn parse_coff(
    data: &[u8],
    offset: usize,
    count: usize,
    sections: &[Section],
) -> Result<Option<SymbolTable>> {
    if offset == 0 || count == 0 {
        return Ok(None);
    }
    let table_end = count
        .checked_mul(COFF_SYMBOL_SIZE)
        .and_then(|len| offset.checked_add(len))
        .filter(|&end| end.checked_add(4).is_some_and(|e| e <= data.len()))
        .ok_or_else(|| Error::corrupt_container("COFF symbol table extends past end of file"))?;

    let strtab_len = LE::read_u32(&data[table_end..table_end + 4]) as usize;
    let strtab = &data[table_end..table_end.saturating_add(strtab_len).min(data.len())];

    let mut reader = Cursor::new(&data[offset..table_end]);
    let mut symbols = Vec::with_capacity(count);
    let mut index = 0;
    while index < count {
        let mut short_name = [0u8; 8];
        reader.read_exact(&mut short_name)?;
        let value = reader.read_u32::<LE>()?;
        let section_number = reader.read_i16::<LE>()?;
        let _sym_type = reader.read_u16::<LE>()?;
        let _storage_class = reader.read_u8()?;
        let aux = reader.read_u8()? as usize;
        index += 1 + aux;
        reader.seek(SeekFrom::Current((aux * COFF_SYMBOL_SIZE) as i64))?;

        let name = if short_name[..4] == [0; 4] {
            name_at(strtab, LE::read_u32(&short_name[4..]) as usize)
        } else {
            name_at(&short_name, 0)
        };
        if name.is_empty() {
            continue;
        }
        let value = match usize::try_from(section_number) {
            Ok(n) if n >= 1 => match sections.get(n - 1) {
                Some(s) => s.addr.checked_add(value as u64).ok_or_else(|| {
                    Error::corrupt_container(format!("symbol {name} address overflows"))
                })?,
                None => value as u64,
            },
            _ => value as u64,
        };
        symbols.push(Symbol { name, value });
    }
    Ok(SymbolTable::new(symbols))
}

/// Reads a plain-image symbol table: big-endian value (8 bytes when
/// `wide`), a type byte with the high bit set, then a NUL-terminated name.
/// File-path symbols (`z`/`Z`) hold a 16-bit index list instead of a
/// name and are skipped.
pub fn parse_plan9(data: &[u8], wide: bool) -> Result<Option<SymbolTable>> {
    let value_len = if wide { 8 } else { 4 };
    let truncated = || Error::corrupt_container("plain image symbol table truncated");
    let mut symbols = Vec::new();
    let mut p = data;

    while p.len() > value_len {
        let value = if wide {
            BE::read_u64(p)
        } else {
            BE::read_u32(p) as u64
        };
        let sym_type = p[value_len] & 0x7f;
        p = &p[value_len + 1..];

        let nul = p.iter().position(|&b| b == 0).ok_or_else(truncated)?;
        match sym_type {
            b'z' | b'Z' => {
                let rest = &p[nul + 1..];
                let end = rest
                    .chunks_exact(2)
                    .position(|pair| *pair == [0, 0])
                    .ok_or_else(truncated)?;
                p = &rest[(end + 1) * 2..];
            }
            _ => {
                let name = String::from_utf8_lossy(&p[..nul]).into_owned();
                p = &p[nul + 1..];
                if !name.is_empty() {
                    symbols.push(Symbol { name, value });
                }
            }
        }
    }
    Ok(SymbolTable::new(symbols))
}
