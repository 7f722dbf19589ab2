use std::ops::Range;

use goblin::elf::program_header::{ProgramHeader, PF_W, PF_X, PT_LOAD};
use goblin::elf::section_header::{SectionHeader, SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE, SHT_NOBITS};
use goblin::elf::Elf;
use goblin::mach::segment::Section as MachSection;
use goblin::pe::section_table::SectionTable;
use serde::Serialize;

use crate::{Error, Result};

const IMAGE_SCN_CNT_CODE: u32 = 0x0000_0020;
const IMAGE_SCN_CNT_INITIALIZED_DATA: u32 = 0x0000_0040;
const IMAGE_SCN_MEM_EXECUTE: u32 = 0x2000_0000;
const IMAGE_SCN_MEM_WRITE: u32 = 0x8000_0000;

const MACH_SECTION_TYPE: u32 = 0x0000_00ff;
const MACH_S_ZEROFILL: u32 = 0x1;
const MACH_S_GB_ZEROFILL: u32 = 0xc;
const MACH_S_THREAD_LOCAL_ZEROFILL: u32 = 0x12;
const MACH_S_ATTR_PURE_INSTRUCTIONS: u32 = 0x8000_0000;
const MACH_S_ATTR_SOME_INSTRUCTIONS: u32 = 0x0000_0400;

/// Section names the producer gives the dedicated build metadata section.
pub const BUILD_INFO_SECTIONS: [&str; 2] = [".go.buildinfo", "__go_buildinfo"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SectionKind {
    /// Executable instructions. Never scanned.
    Code,
    /// Writable initialized data.
    Data,
    /// Loaded, read-only, non-executable data.
    ReadOnlyData,
    /// Not loaded, or no file contents (symbol tables, debug info, bss).
    Other,
}

/// One section (or, for images without a section table, one segment).
///
/// Only the header facts are kept; the payload is borrowed from the
/// mapped file on demand through [`crate::ExecutableFile::section_data`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub addr: u64,
    pub size: u64,
    pub file_offset: u64,
    pub file_size: u64,
    pub kind: SectionKind,
}

impl Section {
    pub fn is_build_info(&self) -> bool {
        BUILD_INFO_SECTIONS.contains(&self.name.as_str())
    }

    /// Loaded and backed by file contents.
    pub fn is_mapped(&self) -> bool {
        self.kind != SectionKind::Other && self.file_size > 0
    }

    /// Data or read-only data; the only kinds any scanner looks at.
    pub fn is_scannable(&self) -> bool {
        matches!(self.kind, SectionKind::Data | SectionKind::ReadOnlyData) && self.file_size > 0
    }

    pub fn file_range(&self) -> Range<usize> {
        let start = self.file_offset as usize;
        start..start + self.file_size as usize
    }

    /// Translates `[addr, addr + len)` to a file range if it lies entirely
    /// within this section's file-backed bytes.
    pub fn translate(&self, addr: u64, len: u64) -> Option<Range<usize>> {
        if !self.is_mapped() || addr < self.addr {
            return None;
        }
        let rel = addr - self.addr;
        if rel > self.file_size || len > self.file_size - rel {
            return None;
        }
        let start = self.file_offset.checked_add(rel)?;
        let end = start.checked_add(len)?;
        Some(start as usize..end as usize)
    }

    /// Rejects sections whose file bytes would extend past the end of the
    /// file, or whose addresses would wrap.
    pub(crate) fn check_bounds(self, file_len: usize) -> Result<Self> {
        if self.file_size == 0 {
            return Ok(self);
        }
        if self.addr.checked_add(self.file_size).is_none() {
            return Err(Error::corrupt_container(format!(
                "section {} at {:#x} wraps the address space",
                self.name, self.addr
            )));
        }
        match self.file_offset.checked_add(self.file_size) {
            Some(end) if end <= file_len as u64 => Ok(self),
            _ => Err(Error::corrupt_container(format!(
                "section {} [{:#x}, +{:#x}) extends past end of file ({:#x})",
                self.name, self.file_offset, self.file_size, file_len
            ))),
        }
    }

    pub fn from_elf_sh(sh: &SectionHeader, elf: &Elf) -> Self {
        let name = elf.shdr_strtab.get_at(sh.sh_name).unwrap_or("").to_string();
        let flags = sh.sh_flags;
        let kind = if flags & SHF_EXECINSTR as u64 != 0 {
            SectionKind::Code
        } else if sh.sh_type == SHT_NOBITS || flags & SHF_ALLOC as u64 == 0 {
            SectionKind::Other
        } else if flags & SHF_WRITE as u64 != 0 {
            SectionKind::Data
        } else {
            SectionKind::ReadOnlyData
        };
        let file_size = if sh.sh_type == SHT_NOBITS { 0 } else { sh.sh_size };

        Section {
            name,
            addr: sh.sh_addr,
            size: sh.sh_size,
            file_offset: sh.sh_offset,
            file_size,
            kind,
        }
    }

    /// Maps a loadable program segment to a section, for ELF images
    /// whose section header table has been removed.
    pub fn from_elf_ph(index: usize, ph: &ProgramHeader) -> Option<Self> {
        if ph.p_type != PT_LOAD || ph.p_filesz == 0 {
            return None;
        }
        let kind = if ph.p_flags & PF_X != 0 {
            SectionKind::Code
        } else if ph.p_flags & PF_W != 0 {
            SectionKind::Data
        } else {
            SectionKind::ReadOnlyData
        };

        Some(Section {
            name: format!(".segment_{index}"),
            addr: ph.p_vaddr,
            size: ph.p_memsz,
            file_offset: ph.p_offset,
            file_size: ph.p_filesz,
            kind,
        })
    }

    pub fn from_pe_section(s: &SectionTable, image_base: u64) -> Result<Self> {
        let name = match &s.real_name {
            Some(name) => name.clone(),
            None => s.name().unwrap_or("").to_string(),
        };
        let flags = s.characteristics;
        let kind = if flags & (IMAGE_SCN_MEM_EXECUTE | IMAGE_SCN_CNT_CODE) != 0 {
            SectionKind::Code
        } else if flags & IMAGE_SCN_CNT_INITIALIZED_DATA == 0 || s.pointer_to_raw_data == 0 {
            SectionKind::Other
        } else if flags & IMAGE_SCN_MEM_WRITE != 0 {
            SectionKind::Data
        } else {
            SectionKind::ReadOnlyData
        };
        // Raw data is padded to the file alignment; the virtual size is exact.
        let file_size = match s.virtual_size {
            0 => s.size_of_raw_data,
            vsize => vsize.min(s.size_of_raw_data),
        };

        let addr = image_base
            .checked_add(s.virtual_address as u64)
            .ok_or_else(|| {
                Error::corrupt_container(format!(
                    "section {name} RVA {:#x} overflows image base {image_base:#x}",
                    s.virtual_address
                ))
            })?;

        Ok(Section {
            name,
            addr,
            size: s.virtual_size as u64,
            file_offset: s.pointer_to_raw_data as u64,
            file_size: file_size as u64,
            kind,
        })
    }

    pub fn from_macho_section(sec: &MachSection) -> Self {
        let name = sec.name().unwrap_or("").to_string();
        let segname = sec.segname().unwrap_or("");
        let section_type = sec.flags & MACH_SECTION_TYPE;
        let zerofill = matches!(
            section_type,
            MACH_S_ZEROFILL | MACH_S_GB_ZEROFILL | MACH_S_THREAD_LOCAL_ZEROFILL
        );
        let kind = if sec.flags & (MACH_S_ATTR_PURE_INSTRUCTIONS | MACH_S_ATTR_SOME_INSTRUCTIONS) != 0 {
            SectionKind::Code
        } else if zerofill || sec.offset == 0 {
            SectionKind::Other
        } else if segname.starts_with("__DATA") && segname != "__DATA_CONST" {
            SectionKind::Data
        } else {
            SectionKind::ReadOnlyData
        };

        Section {
            name,
            addr: sec.addr,
            size: sec.size,
            file_offset: sec.offset as u64,
            file_size: if kind == SectionKind::Other { 0 } else { sec.size },
            kind,
        }
    }
}
