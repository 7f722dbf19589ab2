use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;

use crate::binary::ExecutableFile;
use crate::buildinfo::{BuildInfoRecord, LayoutVersion, ALIGN, HEADER_LEN, MAGIC};
use crate::{Error, Result};

static MAGIC_FINDER: Lazy<AhoCorasick> =
    Lazy::new(|| AhoCorasick::new([MAGIC]).expect("build info magic is a valid pattern"));

/// Finds the build metadata record in the image's data sections.
///
/// Code sections are never scanned. Within a section, only magic hits at
/// a 16-byte aligned address (or section offset, for images whose segment
/// addresses are not themselves aligned) are considered, and each hit is
/// tried against every known layout, newest first.
pub fn locate(file: &ExecutableFile) -> Result<BuildInfoRecord<'_>> {
    for section in file.data_sections() {
        let data = file.section_data(section);
        for pos in MAGIC_FINDER.find_iter(data).map(|m| m.start()) {
            let addr = section.addr + pos as u64;
            if addr % ALIGN != 0 && pos as u64 % ALIGN != 0 {
                log::debug!("Skipping unaligned magic at {addr:#x} in {}", section.name);
                continue;
            }
            let raw = &data[pos..];
            if raw.len() < HEADER_LEN {
                log::debug!("Magic at {addr:#x} is too close to the end of {}", section.name);
                continue;
            }
            if let Some(layout_version) = LayoutVersion::KNOWN
                .into_iter()
                .find(|layout| layout.matches(raw))
            {
                log::info!(
                    "Found {layout_version:?} build info record at {addr:#x} in {}",
                    section.name
                );
                return Ok(BuildInfoRecord {
                    offset: addr,
                    layout_version,
                    raw,
                });
            }
        }
    }
    Err(Error::NoBuildInfoFound)
}
