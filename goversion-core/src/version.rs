//! The public entry points: one call turns an executable into a
//! [`VersionInfo`] or an error, never anything in between.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::binary::ExecutableFile;
use crate::buildinfo::{self, LayoutVersion, Module, ModuleInfo, Settings};
use crate::crypto::{self, CryptoVariant, ProbeContext};
use crate::header::ContainerKind;
use crate::legacy;
use crate::{Error, Result};

/// Where the release string was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReleaseSource {
    BuildInfo(LayoutVersion),
    /// The `runtime.buildVersion` symbol of an image without a record.
    Symbol,
    /// A release-shaped string in the data of a stripped image.
    StringScan,
}

impl fmt::Display for ReleaseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseSource::BuildInfo(LayoutVersion::Inline) => write!(f, "buildinfo (inline)"),
            ReleaseSource::BuildInfo(LayoutVersion::Pointer) => write!(f, "buildinfo (pointer)"),
            ReleaseSource::Symbol => write!(f, "symbol"),
            ReleaseSource::StringScan => write!(f, "string scan"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    /// Producer release, e.g. `go1.13.14b4`. Never empty.
    pub release: String,
    /// Main package path; empty when the producer recorded none.
    pub module_path: String,
    pub main_module: Option<Module>,
    pub deps: Vec<Module>,
    pub settings: Settings,
    pub boring_crypto: bool,
    pub fips_only: bool,
    pub source: ReleaseSource,
    pub container: ContainerKind,
}

/// Which legacy fallbacks run when an image carries no build metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub legacy_symbol: bool,
    pub string_scan: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            legacy_symbol: true,
            string_scan: true,
        }
    }
}

impl ExtractOptions {
    /// Record only; no legacy fallbacks.
    pub fn strict() -> Self {
        Self {
            legacy_symbol: false,
            string_scan: false,
        }
    }

    pub fn legacy_symbol(mut self, enabled: bool) -> Self {
        self.legacy_symbol = enabled;
        self
    }

    pub fn string_scan(mut self, enabled: bool) -> Self {
        self.string_scan = enabled;
        self
    }
}

pub fn extract<P: AsRef<Path>>(path: P) -> Result<VersionInfo> {
    extract_with(path, &ExtractOptions::default())
}

pub fn extract_with<P: AsRef<Path>>(path: P, options: &ExtractOptions) -> Result<VersionInfo> {
    let file = ExecutableFile::open(path)?;
    extract_file(&file, options)
}

/// Runs the pipeline over bytes already in memory.
pub fn extract_bytes(bytes: Vec<u8>, options: &ExtractOptions) -> Result<VersionInfo> {
    let file = ExecutableFile::from_bytes(bytes)?;
    extract_file(&file, options)
}

pub fn extract_file(file: &ExecutableFile, options: &ExtractOptions) -> Result<VersionInfo> {
    let (release, source, modules) = match buildinfo::locate(file) {
        Ok(record) => {
            let info = buildinfo::decode(&record, file)?;
            (
                info.release,
                ReleaseSource::BuildInfo(info.layout_version),
                info.modules,
            )
        }
        Err(Error::NoBuildInfoFound) => {
            log::debug!("No build info record in {:?}, trying legacy fallbacks", file.path());
            let (release, source) = legacy_release(file, options)?;
            (release, source, ModuleInfo::default())
        }
        Err(err) => return Err(err),
    };

    let ctx = ProbeContext {
        file,
        release: &release,
        settings: &modules.settings,
    };
    let boring_crypto = crypto::detect(CryptoVariant::BoringCrypto, &ctx);
    let fips_only = crypto::detect(CryptoVariant::FipsOnly, &ctx);

    let ModuleInfo {
        path,
        main,
        deps,
        settings,
    } = modules;
    Ok(VersionInfo {
        release,
        module_path: path,
        main_module: main,
        deps,
        settings,
        boring_crypto,
        fips_only,
        source,
        container: file.kind(),
    })
}

fn legacy_release(file: &ExecutableFile, options: &ExtractOptions) -> Result<(String, ReleaseSource)> {
    if options.legacy_symbol {
        if let Some(release) = legacy::symbol_release(file)? {
            return Ok((release, ReleaseSource::Symbol));
        }
    }
    if options.string_scan {
        if let Some(release) = legacy::scan_release(file) {
            return Ok((release, ReleaseSource::StringScan));
        }
    }
    Err(Error::NoBuildInfoFound)
}
