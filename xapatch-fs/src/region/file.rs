//! File extents.

use std::io::{Read, Seek};

use xapatch_core::{CdError, Disc};

use super::{Region, RegionArena, RegionId, RegionKind, read_extent};
use crate::date::Timestamp;

/// Read the extent of a file recorded as `byte_len` bytes long.
///
/// Sectors are read until their data fields cover `byte_len`, so a file
/// stored in Form 2 sectors takes fewer sectors than the same length in
/// Form 1. A zero-length file occupies no sectors.
pub(crate) fn read<S: Read + Seek>(
    arena: &mut RegionArena,
    disc: &mut Disc<S>,
    start: u32,
    name: String,
    byte_len: u32,
    last_modified: Option<Timestamp>,
) -> Result<RegionId, CdError> {
    let sectors = read_extent(disc, start, byte_len)?;
    let mut region = Region::new(start, sectors, RegionKind::File);
    region.name = Some(name);
    region.byte_len = Some(byte_len);
    region.last_modified = last_modified;
    Ok(arena.insert(region))
}

/// After raw sectors are written the recorded length no longer applies; the
/// file's size becomes its full data capacity.
pub(crate) fn patched_sectors(region: &mut Region) {
    region.byte_len = None;
}

pub(crate) fn patched_data(region: &mut Region, len: usize) {
    region.byte_len = Some(len as u32);
}
