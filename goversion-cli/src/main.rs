use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use goversion_core::{Error, ExtractOptions, VersionInfo};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use walkdir::WalkDir;

/// Report the toolchain release and crypto variant of compiled Go executables
#[derive(Parser)]
#[command(name = "goversion", version, author)]
struct Cli {
    /// Files to inspect; directories are walked recursively
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Print one JSON object per executable
    #[arg(long)]
    json: bool,

    /// Print module path, main module, dependencies and build settings
    #[arg(short = 'm')]
    modules: bool,

    /// Only list executables linking the BoringCrypto variant
    #[arg(long)]
    crypto: bool,

    /// Do not read the release from runtime.buildVersion
    #[arg(long)]
    no_legacy_symbol: bool,

    /// Do not scan data sections for a release string
    #[arg(long)]
    no_string_scan: bool,

    /// Report skipped files and enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct Report {
    path: PathBuf,
    #[serde(flatten)]
    info: VersionInfo,
}

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Release")]
    release: String,
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Crypto")]
    crypto: String,
}

impl From<&Report> for Row {
    fn from(report: &Report) -> Self {
        let info = &report.info;
        let crypto = match (info.boring_crypto, info.fips_only) {
            (true, true) => "boringcrypto, fips-only".green().bold().to_string(),
            (true, false) => "boringcrypto".green().to_string(),
            (false, _) => "standard".to_string(),
        };
        Row {
            path: report.path.display().to_string(),
            release: info.release.clone(),
            container: info.container.to_string(),
            source: info.source.to_string(),
            crypto,
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

/// Inspects one file. Files named on the command line report every
/// failure; files found by walking a directory only report damage.
fn inspect(path: &Path, options: &ExtractOptions, explicit: bool, verbose: bool) -> Option<Report> {
    match goversion_core::extract_with(path, options) {
        Ok(info) => Some(Report {
            path: path.to_path_buf(),
            info,
        }),
        Err(err) => {
            if explicit || verbose || !err.is_expected() {
                eprintln!("{}: {}", path.display(), describe(&err).red());
            }
            None
        }
    }
}

fn describe(err: &Error) -> String {
    match err {
        Error::UnsupportedFormat(_) => format!("not an executable ({err})"),
        Error::NoBuildInfoFound => "could not read Go build info".to_string(),
        _ => err.to_string(),
    }
}

fn collect(cli: &Cli, options: &ExtractOptions) -> Vec<Report> {
    let mut reports = Vec::new();
    for path in &cli.paths {
        if !path.is_dir() {
            reports.extend(inspect(path, options, true, cli.verbose));
            continue;
        }
        for entry in WalkDir::new(path).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("Skipping unreadable entry: {err}");
                    continue;
                }
            };
            if entry.file_type().is_file() {
                reports.extend(inspect(entry.path(), options, false, cli.verbose));
            }
        }
    }
    reports
}

fn print_modules(report: &Report) {
    let info = &report.info;
    println!("{}: {}", report.path.display(), info.release.bold());
    if !info.module_path.is_empty() {
        println!("\tpath\t{}", info.module_path);
    }
    if let Some(main) = &info.main_module {
        println!("\tmod\t{}\t{}\t{}", main.path, main.version, main.sum);
    }
    for dep in &info.deps {
        println!("\tdep\t{}\t{}\t{}", dep.path, dep.version, dep.sum);
        if let Some(replace) = &dep.replace {
            println!("\t=>\t{}\t{}\t{}", replace.path, replace.version, replace.sum);
        }
    }
    for setting in info.settings.iter() {
        println!("\tbuild\t{}={}", setting.key, setting.value);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = ExtractOptions::default()
        .legacy_symbol(!cli.no_legacy_symbol)
        .string_scan(!cli.no_string_scan);

    let mut reports = collect(&cli, &options);
    if cli.crypto {
        reports.retain(|r| r.info.boring_crypto);
    }

    if cli.json {
        for report in &reports {
            let line = serde_json::to_string(report)
                .with_context(|| format!("serializing report for {}", report.path.display()))?;
            println!("{line}");
        }
    } else if cli.modules {
        reports.iter().for_each(print_modules);
    } else if reports.is_empty() {
        println!("No Go executables found.");
    } else {
        let rows: Vec<Row> = reports.iter().map(Row::from).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    Ok(())
}
