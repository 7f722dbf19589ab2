//! The module information text carried in a build metadata record.
//!
//! One entry per line, tab separated:
//!
//! ```text
//! path    <main package path>
//! mod     <path> <version> <sum>
//! dep     <path> <version> <sum>
//! =>      <path> <version> <sum>     replaces the module on the previous line
//! build   <key>=<value>              key and value may be quoted
//! ```

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::{Error, Result};

/// Length of each sentinel the producer wraps the text in.
const SENTINEL_LEN: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Module {
    pub path: String,
    pub version: String,
    pub sum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replace: Option<Box<Module>>,
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        if !self.version.is_empty() {
            write!(f, "@{}", self.version)?;
        }
        if let Some(replace) = &self.replace {
            write!(f, " => {replace}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSetting {
    pub key: String,
    pub value: String,
}

/// Build settings in record order. Keys are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings(Vec<BuildSetting>);

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a setting. A repeated key means the record is corrupt.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        if self.get(&key).is_some() {
            return Err(Error::corrupt_build_info(format!(
                "duplicate build setting {key:?}"
            )));
        }
        self.0.push(BuildSetting {
            key,
            value: value.into(),
        });
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|s| s.key == key)
            .map(|s| s.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildSetting> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Settings {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for setting in &self.0 {
            map.serialize_entry(&setting.key, &setting.value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModuleInfo {
    /// Import path of the main package.
    pub path: String,
    pub main: Option<Module>,
    pub deps: Vec<Module>,
    pub settings: Settings,
}

/// Strips the sentinels around the module text. Text that is too short or
/// not newline-terminated inside its framing carries no module info.
pub fn unframe(raw: &[u8]) -> Option<&[u8]> {
    if raw.len() > 2 * SENTINEL_LEN && raw[raw.len() - SENTINEL_LEN - 1] == b'\n' {
        Some(&raw[SENTINEL_LEN..raw.len() - SENTINEL_LEN])
    } else {
        None
    }
}

enum Previous {
    None,
    Main,
    Dep(usize),
}

pub fn parse(text: &str) -> Result<ModuleInfo> {
    let mut info = ModuleInfo::default();
    let mut previous = Previous::None;

    for line in text.split('\n') {
        if let Some(rest) = line.strip_prefix("path\t") {
            info.path = rest.to_string();
        } else if let Some(rest) = line.strip_prefix("mod\t") {
            info.main = Some(parse_module(rest));
            previous = Previous::Main;
        } else if let Some(rest) = line.strip_prefix("dep\t") {
            info.deps.push(parse_module(rest));
            previous = Previous::Dep(info.deps.len() - 1);
        } else if let Some(rest) = line.strip_prefix("=>\t") {
            let replacement = Some(Box::new(parse_module(rest)));
            match previous {
                Previous::Main => {
                    if let Some(main) = info.main.as_mut() {
                        main.replace = replacement;
                    }
                }
                Previous::Dep(index) => info.deps[index].replace = replacement,
                Previous::None => {
                    return Err(Error::corrupt_build_info(
                        "module replacement with no module on the previous line",
                    ))
                }
            }
            previous = Previous::None;
        } else if let Some(rest) = line.strip_prefix("build\t") {
            let (key, value) = parse_setting(rest)?;
            info.settings.insert(key, value)?;
        }
    }
    Ok(info)
}

fn parse_module(fields: &str) -> Module {
    let mut fields = fields.split('\t');
    Module {
        path: fields.next().unwrap_or("").to_string(),
        version: fields.next().unwrap_or("").to_string(),
        sum: fields.next().unwrap_or("").to_string(),
        replace: None,
    }
}

fn parse_setting(kv: &str) -> Result<(String, String)> {
    let (key, raw_value) = match kv.as_bytes().first() {
        None => return Err(Error::corrupt_build_info("build line missing '='")),
        Some(b'=') => return Err(Error::corrupt_build_info("build line with missing key")),
        Some(b'"') | Some(b'`') => {
            let (key, consumed) = quoted_prefix(kv)
                .ok_or_else(|| Error::corrupt_build_info(format!("invalid quoted key in {kv:?}")))?;
            let value = kv[consumed..]
                .strip_prefix('=')
                .ok_or_else(|| Error::corrupt_build_info(format!("build line missing '=' after key {key:?}")))?;
            (key, value)
        }
        Some(_) => {
            let (key, value) = kv
                .split_once('=')
                .ok_or_else(|| Error::corrupt_build_info(format!("build line missing '=': {kv:?}")))?;
            (key.to_string(), value)
        }
    };

    let value = match raw_value.as_bytes().first() {
        Some(b'"') | Some(b'`') => match quoted_prefix(raw_value) {
            Some((value, consumed)) if consumed == raw_value.len() => value,
            _ => {
                return Err(Error::corrupt_build_info(format!(
                    "invalid quoted value for {key:?}"
                )))
            }
        },
        _ => raw_value.to_string(),
    };
    Ok((key, value))
}

/// Unquotes the quoted string at the start of `s`, returning the value and
/// the number of bytes the quoted form occupied.
fn quoted_prefix(s: &str) -> Option<(String, usize)> {
    let mut chars = s.char_indices();
    let (_, quote) = chars.next()?;
    if quote == '`' {
        let end = s[1..].find('`')? + 1;
        return Some((s[1..end].replace('\r', ""), end + 1));
    }
    if quote != '"' {
        return None;
    }

    let mut out: Vec<u8> = Vec::new();
    let bytes = s.as_bytes();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some((String::from_utf8_lossy(&out).into_owned(), i + 1)),
            '\n' => return None,
            '\\' => {
                let (j, esc) = chars.next()?;
                match esc {
                    'a' => out.push(0x07),
                    'b' => out.push(0x08),
                    'f' => out.push(0x0c),
                    'n' => out.push(b'\n'),
                    'r' => out.push(b'\r'),
                    't' => out.push(b'\t'),
                    'v' => out.push(0x0b),
                    '\\' | '"' => out.push(esc as u8),
                    'x' => {
                        out.push(escape_digits(s, j + 1, 2, 16)? as u8);
                        chars.nth(1)?;
                    }
                    '0'..='7' => {
                        out.push(u8::try_from(escape_digits(s, j, 3, 8)?).ok()?);
                        chars.nth(1)?;
                    }
                    'u' | 'U' => {
                        let width = if esc == 'u' { 4 } else { 8 };
                        let ch = char::from_u32(escape_digits(s, j + 1, width, 16)?)?;
                        let mut buf = [0u8; 4];
                        out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                        chars.nth(width - 1)?;
                    }
                    _ => return None,
                }
            }
            _ => out.extend_from_slice(&bytes[i..i + c.len_utf8()]),
        }
    }
    None
}

/// Exactly `len` digits of `radix` starting at byte `start`. Signs and
/// short runs are rejected.
fn escape_digits(s: &str, start: usize, len: usize, radix: u32) -> Option<u32> {
    let digits = s.get(start..start + len)?;
    if !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u32::from_str_radix(digits, radix).ok()
}
