//! Synthetic executables for the integration tests.
//!
//! [`GoProgram`] lays out what a producer release leaves in an image
//! (release string, record, function name table, symbols) and the
//! container builders wrap that layout in ELF, PE, Mach-O or a.out
//! headers that real parsers accept.
#![allow(dead_code)]


use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub const TEXT_ADDR: u64 = 0x40_1000;
pub const RODATA_ADDR: u64 = 0x41_0000;
pub const BUILDINFO_ADDR: u64 = 0x42_0000;
pub const DATA_ADDR: u64 = 0x43_0000;

pub const BUILDINFO_MAGIC: &[u8; 14] = b"\xff Go buildinf:";

const INFO_START: [u8; 16] = [
    0x30, 0x77, 0xaf, 0x0c, 0x92, 0x74, 0x08, 0x02, 0x41, 0xe1, 0xc1, 0x07, 0xe6, 0xd6, 0x18, 0xe6,
];
const INFO_END: [u8; 16] = [
    0xf9, 0x32, 0x43, 0x31, 0x86, 0x18, 0x20, 0x72, 0x00, 0x82, 0x42, 0x10, 0x41, 0x16, 0xd8, 0xf2,
];

pub const LIBC_IMPORTS: &[&str] = &["pthread_create", "malloc", "free"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Text,
    Rodata,
    BuildInfo,
    Data,
}

impl Region {
    pub const ALL: [Region; 4] = [Region::Text, Region::Rodata, Region::BuildInfo, Region::Data];

    pub fn base(self) -> u64 {
        match self {
            Region::Text => TEXT_ADDR,
            Region::Rodata => RODATA_ADDR,
            Region::BuildInfo => BUILDINFO_ADDR,
            Region::Data => DATA_ADDR,
        }
    }
}

/// Contents of a loaded image, region by region, plus its symbols.
#[derive(Debug, Clone)]
pub struct Image {
    pub text: Vec<u8>,
    pub rodata: Vec<u8>,
    pub buildinfo: Vec<u8>,
    pub data: Vec<u8>,
    /// Defined symbols with their addresses.
    pub symbols: Vec<(String, u64)>,
    /// Undefined symbols resolved from shared libraries at load time.
    pub imports: Vec<String>,
}

impl Default for Image {
    fn default() -> Self {
        Self::new()
    }
}

impl Image {
    pub fn new() -> Self {
        Image {
            // a few `ret`s so the code section is never empty
            text: vec![0xc3; 64],
            rodata: Vec::new(),
            buildinfo: Vec::new(),
            data: Vec::new(),
            symbols: Vec::new(),
            imports: Vec::new(),
        }
    }

    pub fn bytes(&self, region: Region) -> &[u8] {
        match region {
            Region::Text => &self.text,
            Region::Rodata => &self.rodata,
            Region::BuildInfo => &self.buildinfo,
            Region::Data => &self.data,
        }
    }

    fn bytes_mut(&mut self, region: Region) -> &mut Vec<u8> {
        match region {
            Region::Text => &mut self.text,
            Region::Rodata => &mut self.rodata,
            Region::BuildInfo => &mut self.buildinfo,
            Region::Data => &mut self.data,
        }
    }

    /// Non-empty regions with their load addresses.
    pub fn regions(&self) -> Vec<(Region, u64, &[u8])> {
        Region::ALL
            .into_iter()
            .filter(|&r| !self.bytes(r).is_empty())
            .map(|r| (r, r.base(), self.bytes(r)))
            .collect()
    }

    /// Appends `bytes` at the next 16-byte boundary of `region` and returns
    /// their address.
    pub fn push(&mut self, region: Region, bytes: &[u8]) -> u64 {
        let buf = self.bytes_mut(region);
        let aligned = buf.len().div_ceil(16) * 16;
        buf.resize(aligned, 0);
        buf.extend_from_slice(bytes);
        region.base() + aligned as u64
    }

    /// Stores a string in read-only data and its `{data, len}` header in
    /// data; returns the header's address.
    pub fn push_string(&mut self, s: &[u8]) -> u64 {
        let data_addr = self.push(Region::Rodata, s);
        let mut header = data_addr.to_le_bytes().to_vec();
        header.extend((s.len() as u64).to_le_bytes());
        self.push(Region::Data, &header)
    }

    pub fn symbol(&mut self, name: &str, addr: u64) {
        self.symbols.push((name.to_string(), addr));
    }

    /// What a cgo-linked program imports from libc.
    pub fn import_libc(&mut self) {
        for name in LIBC_IMPORTS {
            self.imports.push(name.to_string());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildType {
    Default,
    /// Built with `-ldflags="-s -w"`: no symbol table, no debug info.
    Stripped,
    /// Stripped, but still dynamically linked, so the imported libc
    /// symbols remain.
    StrippedDynamic,
}

impl BuildType {
    pub const ALL: [BuildType; 3] = [
        BuildType::Default,
        BuildType::Stripped,
        BuildType::StrippedDynamic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuildType::Default => "default",
            BuildType::Stripped => "stripped",
            BuildType::StrippedDynamic => "stripped-dynamic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Elf,
    Pe,
    MachO,
}

impl Container {
    pub const ALL: [Container; 3] = [Container::Elf, Container::Pe, Container::MachO];

    pub fn build(self, image: &Image) -> Vec<u8> {
        match self {
            Container::Elf => containers::elf64(image),
            Container::Pe => containers::pe64(image),
            Container::MachO => containers::macho64(image),
        }
    }
}

/// Appends `value` as an unsigned LEB128 varint.
pub fn put_uvarint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push(value as u8 | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

pub fn frame_modinfo(text: &str) -> Vec<u8> {
    let mut out = INFO_START.to_vec();
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(&INFO_END);
    out
}

fn record_header(flags: u8) -> Vec<u8> {
    let mut out = BUILDINFO_MAGIC.to_vec();
    out.push(8);
    out.push(flags);
    out
}

/// 1.18+ record: strings follow the header.
pub fn inline_record(release: &str, modinfo: &[u8]) -> Vec<u8> {
    let mut out = record_header(0x2);
    out.resize(32, 0);
    put_uvarint(&mut out, release.len() as u64);
    out.extend_from_slice(release.as_bytes());
    put_uvarint(&mut out, modinfo.len() as u64);
    out.extend_from_slice(modinfo);
    out
}

/// 1.13-1.17 record: pointers to two string headers.
pub fn pointer_record(release_header: u64, modinfo_header: u64) -> Vec<u8> {
    let mut out = record_header(0);
    out.extend(release_header.to_le_bytes());
    out.extend(modinfo_header.to_le_bytes());
    out
}

const STANDARD_FUNCS: &[&str] = &[
    "runtime.main",
    "main.main",
    "crypto/rand.Read",
    "crypto/internal/boring/sig.StandardCrypto",
];

const BORING_FUNCS: &[&str] = &[
    "runtime.main",
    "main.main",
    "crypto/rand.Read",
    "crypto/internal/boring._Cfunc__goboringcrypto_RAND_bytes",
    "crypto/internal/boring/sig.BoringCrypto",
];

const FIPS_FUNCS: &[&str] = &["crypto/internal/boring/sig.FIPSOnly", "crypto/tls/fipsonly.init.0"];

/// Minor release number of `go1.N...`.
pub fn minor(release: &str) -> u32 {
    release
        .strip_prefix("go1.")
        .map(|rest| rest.chars().take_while(char::is_ascii_digit).collect::<String>())
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

/// Hardened releases carry a `bN` suffix or the `boringcrypto` experiment.
pub fn is_boring_release(release: &str) -> bool {
    if release.contains("X:boringcrypto") {
        return true;
    }
    let version = release.split(' ').next().unwrap_or("");
    match version.rfind('b') {
        Some(i) => {
            let suffix = &version[i + 1..];
            !suffix.is_empty()
                && suffix.chars().all(|c| c.is_ascii_digit())
                && version[..i].ends_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}

/// What one `go build` of a small crypto/rand importer leaves behind.
#[derive(Debug, Clone)]
pub struct GoProgram {
    pub release: String,
    pub build: BuildType,
    pub boring: bool,
    pub fips_only: bool,
    pub settings: Vec<(String, String)>,
}

impl GoProgram {
    pub fn new(release: &str, build: BuildType) -> Self {
        let boring = is_boring_release(release);
        let mut settings = Vec::new();
        if minor(release) >= 18 {
            settings.push(("-compiler".to_string(), "gc".to_string()));
            settings.push(("CGO_ENABLED".to_string(), "1".to_string()));
            if release.contains("X:boringcrypto") {
                settings.push(("GOEXPERIMENT".to_string(), "boringcrypto".to_string()));
            }
            settings.push(("GOOS".to_string(), "linux".to_string()));
        }
        GoProgram {
            release: release.to_string(),
            build,
            boring,
            fips_only: false,
            settings,
        }
    }

    pub fn fips_only(mut self) -> Self {
        self.fips_only = true;
        self
    }

    pub fn setting(mut self, key: &str, value: &str) -> Self {
        self.settings.push((key.to_string(), value.to_string()));
        self
    }

    pub fn modinfo_text(&self) -> String {
        let mut text = String::from(
            "path\texample.com/hello\n\
             mod\texample.com/hello\t(devel)\t\n\
             dep\tgolang.org/x/crypto\tv0.1.0\th1:kaBLHtbePPbUYWw0jDTpgScOBpyBxjsVf4hRYnjN1oc=\n",
        );
        for (key, value) in &self.settings {
            text.push_str(&format!("build\t{key}={value}\n"));
        }
        text
    }

    pub fn image(&self) -> Image {
        let mut image = Image::new();

        let mut funcs: Vec<&str> = if self.boring {
            BORING_FUNCS.to_vec()
        } else {
            STANDARD_FUNCS.to_vec()
        };
        if self.fips_only {
            funcs.extend_from_slice(FIPS_FUNCS);
        }
        // The function name table survives stripping.
        for (i, name) in funcs.iter().enumerate() {
            let mut entry = name.as_bytes().to_vec();
            entry.push(0);
            image.push(Region::Rodata, &entry);
            image.symbol(name, TEXT_ADDR + 16 * i as u64);
        }

        let version_header = image.push_string(self.release.as_bytes());
        image.symbol("runtime.buildVersion", version_header);

        match minor(&self.release) {
            0..=12 => {}
            13..=17 => {
                let modinfo = frame_modinfo(&self.modinfo_text());
                let modinfo_header = image.push_string(&modinfo);
                image.symbol("runtime.modinfo", modinfo_header);
                let record = pointer_record(version_header, modinfo_header);
                image.push(Region::BuildInfo, &record);
            }
            _ => {
                let record = inline_record(&self.release, &frame_modinfo(&self.modinfo_text()));
                image.push(Region::BuildInfo, &record);
            }
        }

        match self.build {
            BuildType::Default => {}
            BuildType::Stripped => image.symbols.clear(),
            BuildType::StrippedDynamic => {
                image.symbols.clear();
                image.import_libc();
            }
        }
        image
    }
}

/// Produces an executable for a release and build type. Stands in for
/// compiling a real program with that toolchain.
pub trait FixtureProvider {
    fn executable(&self, release: &str, build: BuildType) -> io::Result<PathBuf>;
}

/// Writes synthetic images into a private temporary directory.
pub struct SyntheticFixtures {
    dir: TempDir,
    container: Container,
}

impl SyntheticFixtures {
    pub fn new(container: Container) -> io::Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
            container,
        })
    }
}

impl FixtureProvider for SyntheticFixtures {
    fn executable(&self, release: &str, build: BuildType) -> io::Result<PathBuf> {
        let program = GoProgram::new(release, build);
        let path = self
            .dir
            .path()
            .join(format!("{}_{}", release.replace(' ', "_"), build.name()));
        fs::write(&path, self.container.build(&program.image()))?;
        Ok(path)
    }
}

/// Executables built ahead of time, stored as `<release>_<build>`.
pub struct PrecomputedFixtures {
    root: PathBuf,
}

impl PrecomputedFixtures {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn testdata() -> Self {
        Self::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/testdata"))
    }
}

impl FixtureProvider for PrecomputedFixtures {
    fn executable(&self, release: &str, build: BuildType) -> io::Result<PathBuf> {
        let path = self.root.join(format!("{release}_{}", build.name()));
        if path.is_file() {
            Ok(path)
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no precomputed fixture {}", path.display()),
            ))
        }
    }
}

/// Precomputed executables where present, synthetic ones otherwise.
pub struct Fixtures {
    precomputed: PrecomputedFixtures,
    synthetic: SyntheticFixtures,
}

impl Fixtures {
    pub fn new(container: Container) -> io::Result<Self> {
        Ok(Self {
            precomputed: PrecomputedFixtures::testdata(),
            synthetic: SyntheticFixtures::new(container)?,
        })
    }
}

impl FixtureProvider for Fixtures {
    fn executable(&self, release: &str, build: BuildType) -> io::Result<PathBuf> {
        self.precomputed
            .executable(release, build)
            .or_else(|_| self.synthetic.executable(release, build))
    }
}
