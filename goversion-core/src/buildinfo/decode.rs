use crate::binary::{AddressSpace, PointerFormat};
use crate::buildinfo::{
    modinfo, BuildInfo, BuildInfoRecord, LayoutVersion, FLAG_BIG_ENDIAN, HEADER_LEN,
};
use crate::header::Endianness;
use crate::{Error, Result};

/// Upper bound on any string the record points at.
const MAX_STRING_LEN: u64 = 1 << 24;

/// Decodes a located record. `space` resolves the pointers of the
/// [`LayoutVersion::Pointer`] layout; the inline layout never touches it.
pub fn decode(record: &BuildInfoRecord<'_>, space: &dyn AddressSpace) -> Result<BuildInfo> {
    let (release, modinfo) = match record.layout_version {
        LayoutVersion::Inline => decode_inline(record.raw)?,
        LayoutVersion::Pointer => decode_pointer(record.raw, space)?,
    };

    let release = std::str::from_utf8(release)
        .map_err(|_| Error::corrupt_build_info("release string is not valid UTF-8"))?;
    if release.is_empty() {
        return Err(Error::corrupt_build_info("empty release string"));
    }

    let modules = match modinfo::unframe(modinfo) {
        Some(text) => {
            let text = std::str::from_utf8(text)
                .map_err(|_| Error::corrupt_build_info("module info is not valid UTF-8"))?;
            modinfo::parse(text)?
        }
        None => Default::default(),
    };

    Ok(BuildInfo {
        release: release.to_string(),
        layout_version: record.layout_version,
        modules,
    })
}

fn decode_inline(raw: &[u8]) -> Result<(&[u8], &[u8])> {
    let mut rest = raw
        .get(HEADER_LEN..)
        .ok_or_else(|| Error::corrupt_build_info("truncated record header"))?;
    let release = read_prefixed(&mut rest)?;
    let modinfo = read_prefixed(&mut rest)?;
    Ok((release, modinfo))
}

/// Reads one unsigned LEB128 value from the front of `data`.
/// Returns the value and the number of bytes consumed.
pub(crate) fn read_uvarint(data: &[u8]) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    for (index, &byte) in data.iter().enumerate() {
        let low_bits = (byte & 0x7f) as u64;
        if shift >= 64 || (shift == 63 && low_bits > 1) {
            return Err(Error::corrupt_build_info("varint overflows 64 bits"));
        }
        value |= low_bits << shift;
        if byte & 0x80 == 0 {
            return Ok((value, index + 1));
        }
        shift += 7;
    }
    Err(Error::corrupt_build_info("truncated varint"))
}

fn read_prefixed<'a>(data: &mut &'a [u8]) -> Result<&'a [u8]> {
    let (len, consumed) = read_uvarint(data)?;
    let body = &data[consumed..];
    if len > body.len() as u64 {
        return Err(Error::corrupt_build_info(format!(
            "string length {len} exceeds remaining {} bytes",
            body.len()
        )));
    }
    let (value, rest) = body.split_at(len as usize);
    *data = rest;
    Ok(value)
}

fn decode_pointer<'a>(raw: &[u8], space: &'a dyn AddressSpace) -> Result<(&'a [u8], &'a [u8])> {
    let header = raw
        .get(..HEADER_LEN)
        .ok_or_else(|| Error::corrupt_build_info("truncated record header"))?;
    let endianness = if header[15] & FLAG_BIG_ENDIAN != 0 {
        Endianness::Big
    } else {
        Endianness::Little
    };
    let ptr = PointerFormat::new(header[14], endianness).ok_or_else(|| {
        Error::corrupt_build_info(format!("invalid pointer size {}", header[14]))
    })?;

    let fields = &header[16..];
    let bad_field = || Error::corrupt_build_info("pointer fields exceed record header");
    let release_addr = ptr.read(fields).ok_or_else(bad_field)?;
    let modinfo_addr = ptr
        .read(fields.get(ptr.width() as usize..).unwrap_or(&[]))
        .ok_or_else(bad_field)?;

    let release = read_string(space, ptr, release_addr)?;
    let modinfo = read_string(space, ptr, modinfo_addr)?;
    Ok((release, modinfo))
}

/// Follows a pointer to a `{data, len}` string header and returns the bytes.
pub(crate) fn read_string(space: &dyn AddressSpace, ptr: PointerFormat, addr: u64) -> Result<&[u8]> {
    let header = space.read_at(addr, 2 * ptr.width()).ok_or_else(|| {
        Error::corrupt_build_info(format!("string header at {addr:#x} is not mapped"))
    })?;
    let data_addr = ptr.read(header).unwrap_or(0);
    let len = ptr.read(&header[ptr.width() as usize..]).unwrap_or(0);
    if len == 0 {
        return Ok(&[]);
    }
    if len > MAX_STRING_LEN {
        return Err(Error::corrupt_build_info(format!(
            "string at {addr:#x} claims {len} bytes"
        )));
    }
    space.read_at(data_addr, len).ok_or_else(|| {
        Error::corrupt_build_info(format!(
            "string data [{data_addr:#x}, +{len:#x}) is not mapped"
        ))
    })
}
