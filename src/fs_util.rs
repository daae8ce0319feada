use std::fs;
use std::io::{BufReader, Read};

use camino::Utf8Path;
use csv::{Reader, ReaderBuilder, Trim};
use flate2::read::MultiGzDecoder;

use crate::error::KiraError;

/// Opens a delimited text file, decompressing it when the name ends in `.gz`.
///
/// Rows may be shorter than the header; absent trailing cells read as missing.
pub fn open_delimited(
    path: &Utf8Path,
    delimiter: u8,
) -> Result<Reader<Box<dyn Read>>, KiraError> {
    let file = fs::File::open(path.as_std_path())
        .map_err(|err| KiraError::Filesystem(format!("open {path}: {err}")))?;
    let inner: Box<dyn Read> = if is_gzip(path) {
        Box::new(MultiGzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(inner))
}

pub fn is_gzip(path: &Utf8Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// Parses a single delimiter given as text (`"\t"`, `"tab"`, `","`).
pub fn parse_delimiter(value: &str) -> Option<u8> {
    match value {
        "\\t" | "\t" | "tab" => Some(b'\t'),
        "comma" => Some(b','),
        other if other.len() == 1 && other.is_ascii() => other.bytes().next(),
        _ => None,
    }
}
