//! Unallocated sectors available to the allocator.

use std::io::{Read, Seek};

use xapatch_core::{CdError, Disc, Sector};

use super::{Region, RegionArena, RegionId, RegionKind};

impl Region {
    /// A free region made of already-detached sectors.
    pub fn free(start: u32, sectors: Vec<Sector>) -> Self {
        Region::new(start, sectors, RegionKind::Free)
    }
}

/// Read the sectors in `start..end` as free space.
///
/// With `stop_at_invalid`, reading ends quietly at the first sector that
/// doesn't parse (or at the end of the image) and the region is truncated
/// there.
pub(crate) fn read<S: Read + Seek>(
    arena: &mut RegionArena,
    disc: &mut Disc<S>,
    start: u32,
    end: u32,
    stop_at_invalid: bool,
) -> Result<RegionId, CdError> {
    disc.seek(start)?;
    let count = end.saturating_sub(start);
    let sectors = if stop_at_invalid {
        disc.read_valid_sectors(count)?
    } else {
        disc.read_sectors(count)?
    };
    log::debug!("Free space at {start}: {} sectors", sectors.len());
    Ok(arena.insert(Region::free(start, sectors)))
}
