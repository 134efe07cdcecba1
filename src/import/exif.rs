use std::io::Cursor;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use exif::{In, Reader, Tag, Value};

use super::error::ImportError;

/// Capture time of a photo: `DateTime` (tag 306) from the primary IFD,
/// falling back to `DateTimeOriginal`.
///
/// Returns `Ok(None)` when the file has no EXIF data or no parseable date,
/// and `Err` only on I/O failure.
pub fn capture_date(path: &Path) -> Result<Option<NaiveDateTime>, ImportError> {
    let data = std::fs::read(path).map_err(|source| ImportError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let exif_data = match read_exif(data) {
        Ok(exif_data) => exif_data,
        Err(e) => {
            tracing::debug!("No EXIF data in {}: {}", path.display(), e);
            return Ok(None);
        }
    };

    for tag in [Tag::DateTime, Tag::DateTimeOriginal] {
        let Some(field) = exif_data.get_field(tag, In::PRIMARY) else {
            continue;
        };
        if let Value::Ascii(ref values) = field.value {
            if let Some(date) = values.first().and_then(|raw| parse_exif_datetime(raw)) {
                return Ok(Some(date));
            }
        }
        tracing::debug!("Unparseable {} in {}", tag, path.display());
    }
    Ok(None)
}

/// Olympus raw files are TIFF with a vendor magic number in place of 42.
fn read_exif(mut data: Vec<u8>) -> Result<exif::Exif, exif::Error> {
    let tiff_magic: Option<[u8; 2]> = match data.get(..4) {
        Some(b"IIRO") | Some(b"IIRS") => Some([0x2a, 0x00]),
        Some(b"MMOR") => Some([0x00, 0x2a]),
        _ => None,
    };
    let reader = Reader::new();
    match tiff_magic {
        Some(magic) => {
            data[2..4].copy_from_slice(&magic);
            reader.read_raw(data)
        }
        None => reader.read_from_container(&mut Cursor::new(data)),
    }
}

/// `YYYY:MM:DD HH:MM:SS`
fn parse_exif_datetime(raw: &[u8]) -> Option<NaiveDateTime> {
    let dt = exif::DateTime::from_ascii(raw).ok()?;
    NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())?.and_hms_opt(
        dt.hour.into(),
        dt.minute.into(),
        dt.second.into(),
    )
}
