//! Detection of the hardened cryptography variant.
//!
//! Which signals survive depends on the producer's era and on whether the
//! image was stripped, so detection runs an ordered list of independent
//! probes and stops at the first positive one. No probe can fail; when
//! nothing is found the answer is `false`.

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::binary::ExecutableFile;
use crate::buildinfo::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CryptoVariant {
    /// The program links the BoringSSL-backed crypto module.
    BoringCrypto,
    /// The program additionally restricts itself to FIPS-approved settings.
    FipsOnly,
}

struct Markers {
    /// Experiment name recorded in `GOEXPERIMENT` and in the release suffix.
    experiment: Option<&'static str>,
    /// Build tags selecting the variant.
    tags: &'static [&'static str],
    symbol_infixes: &'static [&'static str],
    symbol_prefixes: &'static [&'static str],
    /// Literal fragments left in read-only data (function name tables) by
    /// the variant's runtime.
    fragments: &'static [&'static [u8]],
}

const BORING_MARKERS: Markers = Markers {
    experiment: Some("boringcrypto"),
    tags: &["boringcrypto", "goexperiment.boringcrypto"],
    symbol_infixes: &["_Cfunc__goboringcrypto_"],
    symbol_prefixes: &["crypto/internal/boring/sig.BoringCrypto"],
    fragments: &[
        b"_Cfunc__goboringcrypto_",
        b"crypto/internal/boring/sig.BoringCrypto",
    ],
};

const FIPS_ONLY_MARKERS: Markers = Markers {
    experiment: None,
    tags: &[],
    symbol_infixes: &[],
    symbol_prefixes: &["crypto/internal/boring/sig.FIPSOnly"],
    fragments: &[b"crypto/internal/boring/sig.FIPSOnly"],
};

static BORING_FRAGMENTS: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::new(BORING_MARKERS.fragments).expect("boring fragments are valid patterns")
});

static FIPS_ONLY_FRAGMENTS: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::new(FIPS_ONLY_MARKERS.fragments).expect("FIPS fragments are valid patterns")
});

impl CryptoVariant {
    fn markers(self) -> &'static Markers {
        match self {
            CryptoVariant::BoringCrypto => &BORING_MARKERS,
            CryptoVariant::FipsOnly => &FIPS_ONLY_MARKERS,
        }
    }

    /// One automaton over all of the variant's fragments, so each section
    /// is read once.
    fn fragment_matcher(self) -> &'static AhoCorasick {
        match self {
            CryptoVariant::BoringCrypto => &BORING_FRAGMENTS,
            CryptoVariant::FipsOnly => &FIPS_ONLY_FRAGMENTS,
        }
    }
}

/// What the probes may look at: the opened image and what the decoder
/// already recovered from it.
pub struct ProbeContext<'a> {
    pub file: &'a ExecutableFile,
    pub release: &'a str,
    pub settings: &'a Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Detected,
    NotDetected,
    /// The probe's input does not exist in this image.
    Unavailable,
}

pub trait Probe {
    fn name(&self) -> &'static str;
    fn probe(&self, variant: CryptoVariant, ctx: &ProbeContext<'_>) -> Signal;
}

/// Explicit markers: experiment list in the release string and in the
/// build settings, and build tags.
pub struct SettingsProbe;

/// Symbol names only the variant's linked objects define.
pub struct SymbolProbe;

/// Last resort for images without a static symbol table and without
/// explicit settings.
pub struct DataFragmentProbe;

const PROBES: [&dyn Probe; 3] = [&SettingsProbe, &SymbolProbe, &DataFragmentProbe];

fn release_experiments(release: &str) -> impl Iterator<Item = &str> {
    release
        .split_once(" X:")
        .map(|(_, list)| list)
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
}

impl SettingsProbe {
    /// Whether the record states the variant's selection either way.
    ///
    /// Any recorded experiment list counts. Build tags count only when one
    /// of them selects the variant.
    fn is_explicit(variant: CryptoVariant, ctx: &ProbeContext<'_>) -> bool {
        let markers = variant.markers();
        let experiment_recorded = markers.experiment.is_some()
            && (ctx.settings.get("GOEXPERIMENT").is_some() || ctx.release.contains(" X:"));
        experiment_recorded || Self::tagged(markers, ctx.settings)
    }

    fn tagged(markers: &Markers, settings: &Settings) -> bool {
        settings.get("-tags").is_some_and(|tags| {
            tags.split([',', ' '])
                .any(|tag| markers.tags.contains(&tag.trim()))
        })
    }
}

impl Probe for SettingsProbe {
    fn name(&self) -> &'static str {
        "build settings"
    }

    fn probe(&self, variant: CryptoVariant, ctx: &ProbeContext<'_>) -> Signal {
        if !Self::is_explicit(variant, ctx) {
            return Signal::Unavailable;
        }
        let markers = variant.markers();

        let experiment = markers.experiment.is_some_and(|exp| {
            release_experiments(ctx.release).any(|e| e == exp)
                || ctx
                    .settings
                    .get("GOEXPERIMENT")
                    .is_some_and(|list| list.split(',').any(|e| e.trim() == exp))
        });
        if experiment || Self::tagged(markers, ctx.settings) {
            Signal::Detected
        } else {
            Signal::NotDetected
        }
    }
}

impl Probe for SymbolProbe {
    fn name(&self) -> &'static str {
        "symbol table"
    }

    fn probe(&self, variant: CryptoVariant, ctx: &ProbeContext<'_>) -> Signal {
        let Some(symbols) = ctx.file.symbols() else {
            return Signal::Unavailable;
        };
        let markers = variant.markers();
        let found = symbols.iter().any(|sym| {
            markers.symbol_infixes.iter().any(|m| sym.name.contains(m))
                || markers.symbol_prefixes.iter().any(|m| sym.name.starts_with(m))
        });
        if found {
            Signal::Detected
        } else {
            Signal::NotDetected
        }
    }
}

impl Probe for DataFragmentProbe {
    fn name(&self) -> &'static str {
        "data fragments"
    }

    fn probe(&self, variant: CryptoVariant, ctx: &ProbeContext<'_>) -> Signal {
        if ctx.file.symbols().is_some() || SettingsProbe::is_explicit(variant, ctx) {
            return Signal::Unavailable;
        }
        let matcher = variant.fragment_matcher();
        let found = ctx
            .file
            .data_sections()
            .into_iter()
            .any(|section| matcher.is_match(ctx.file.section_data(section)));
        if found {
            Signal::Detected
        } else {
            Signal::NotDetected
        }
    }
}

/// Runs the probes in priority order; the first positive one wins.
pub fn detect(variant: CryptoVariant, ctx: &ProbeContext<'_>) -> bool {
    for probe in PROBES {
        let signal = probe.probe(variant, ctx);
        log::debug!("{variant:?} probe '{}': {signal:?}", probe.name());
        if signal == Signal::Detected {
            log::info!("{variant:?} detected by {}", probe.name());
            return true;
        }
    }
    false
}
