//! Binary layout of a stored `GeneTimeSeries` value.
//!
//! ```text
//! u8   version (= 1)
//! u32  point count                      (little-endian)
//! repeated, ascending by time point:
//!   u32  time point
//!   f64  r1
//!   f64  r2
//!   u8   has_mean (0 | 1)
//!   f64  mean                           (only when has_mean = 1)
//! ```
//!
//! The gene id is the store key and is not repeated in the value.

use std::collections::BTreeMap;

use crate::domain::{GeneTimeSeries, Measurement, TimePoint};
use crate::error::KiraError;

pub const RECORD_VERSION: u8 = 1;

const POINT_FIXED_LEN: usize = 4 + 8 + 8 + 1;

pub fn encode_series(series: &GeneTimeSeries) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(1 + 4 + series.points.len() * (POINT_FIXED_LEN + 8));
    bytes.push(RECORD_VERSION);
    bytes.extend_from_slice(&(series.points.len() as u32).to_le_bytes());
    for (time_point, measurement) in &series.points {
        bytes.extend_from_slice(&time_point.to_le_bytes());
        bytes.extend_from_slice(&measurement.r1.to_le_bytes());
        bytes.extend_from_slice(&measurement.r2.to_le_bytes());
        match measurement.mean {
            Some(mean) => {
                bytes.push(1);
                bytes.extend_from_slice(&mean.to_le_bytes());
            }
            None => bytes.push(0),
        }
    }
    bytes
}

pub fn decode_series(gene_id: &str, bytes: &[u8]) -> Result<GeneTimeSeries, KiraError> {
    let corrupt = |reason: String| KiraError::CorruptRecord {
        gene_id: gene_id.to_string(),
        reason,
    };

    let mut reader = ByteReader::new(bytes);
    let version = reader
        .u8()
        .ok_or_else(|| corrupt("empty record".to_string()))?;
    if version != RECORD_VERSION {
        return Err(corrupt(format!("unsupported record version {version}")));
    }
    let count = reader
        .u32()
        .ok_or_else(|| corrupt("truncated point count".to_string()))?;

    let mut points = BTreeMap::new();
    let mut previous: Option<TimePoint> = None;
    for index in 0..count {
        let truncated = || corrupt(format!("truncated at point {index}"));
        let time_point = reader.u32().ok_or_else(truncated)?;
        let r1 = reader.f64().ok_or_else(truncated)?;
        let r2 = reader.f64().ok_or_else(truncated)?;
        let mean = match reader.u8().ok_or_else(truncated)? {
            0 => None,
            1 => Some(reader.f64().ok_or_else(truncated)?),
            flag => return Err(corrupt(format!("invalid mean flag {flag}"))),
        };
        if previous.is_some_and(|prev| prev >= time_point) {
            return Err(corrupt(format!(
                "time point {time_point} out of order"
            )));
        }
        previous = Some(time_point);
        points.insert(time_point, Measurement { r1, r2, mean });
    }

    if reader.remaining() != 0 {
        return Err(corrupt(format!(
            "{} trailing bytes",
            reader.remaining()
        )));
    }

    Ok(GeneTimeSeries {
        gene_id: gene_id.to_string(),
        points,
    })
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.pos.checked_add(N)?;
        let chunk = self.bytes.get(self.pos..end)?;
        self.pos = end;
        chunk.try_into().ok()
    }

    fn u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn u32(&mut self) -> Option<u32> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    fn f64(&mut self) -> Option<f64> {
        self.take::<8>().map(f64::from_le_bytes)
    }
}
