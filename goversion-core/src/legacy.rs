//! Release recovery for images that predate the build metadata record.

use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::binary::ExecutableFile;
use crate::buildinfo::decode::read_string;
use crate::{Error, Result};

/// Holds the release string header in every producer era.
pub const BUILD_VERSION_SYMBOL: &str = "runtime.buildVersion";

static RELEASE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"go1\.[0-9]+(?:\.[0-9]+)?(?:(?:beta|rc)[0-9]+)?(?:b[0-9]+)?")
        .expect("release pattern compiles")
});

/// Reads the release through the `runtime.buildVersion` symbol.
pub fn symbol_release(file: &ExecutableFile) -> Result<Option<String>> {
    let Some(symbol) = file.symbols().and_then(|t| t.find(BUILD_VERSION_SYMBOL)) else {
        return Ok(None);
    };
    let bytes = read_string(file, file.pointer_format(), symbol.value)?;
    if bytes.is_empty() {
        return Ok(None);
    }
    let release = std::str::from_utf8(bytes)
        .map_err(|_| Error::corrupt_build_info("runtime.buildVersion is not valid UTF-8"))?;
    log::info!("Release {release:?} read via {BUILD_VERSION_SYMBOL}");
    Ok(Some(release.to_string()))
}

/// Scans data sections for a release string. The most specific (longest)
/// match wins; the first one found breaks ties.
pub fn scan_release(file: &ExecutableFile) -> Option<String> {
    let mut best: Option<&[u8]> = None;
    for section in file.data_sections() {
        for m in RELEASE_PATTERN.find_iter(file.section_data(section)) {
            if best.map_or(true, |b| m.len() > b.len()) {
                best = Some(m.as_bytes());
            }
        }
    }
    let release = String::from_utf8_lossy(best?).into_owned();
    log::info!("Release {release:?} recovered by string scan");
    Some(release)
}
