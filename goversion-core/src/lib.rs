//! Recovers the producing toolchain release and the cryptography variant
//! from compiled executables without running them.

pub mod binary;
pub mod buildinfo;
pub mod crypto;
mod error;
pub mod header;
mod legacy;
pub mod sections;
pub mod symbols;
pub mod version;

pub use binary::*;
pub use buildinfo::{BuildSetting, LayoutVersion, Module, ModuleInfo, Settings};
pub use crypto::CryptoVariant;
pub use error::{Error, Result};
pub use header::{ContainerKind, Endianness};
pub use legacy::BUILD_VERSION_SYMBOL;
pub use sections::*;
pub use version::*;
