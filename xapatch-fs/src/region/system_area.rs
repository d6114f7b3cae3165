//! The sixteen reserved sectors at the start of every disc.

use std::io::{Read, Seek};

use xapatch_core::{CdError, Disc};

use super::{Region, RegionArena, RegionId, RegionKind, volume};

/// Number of sectors reserved before the first volume descriptor.
pub const SYSTEM_AREA_SECTORS: u32 = 16;

#[derive(Debug, Default)]
pub struct SystemArea {
    /// First volume descriptor of the chain that follows the system area.
    pub(crate) first_volume: Option<RegionId>,
}

impl SystemArea {
    pub fn first_volume(&self) -> Option<RegionId> {
        self.first_volume
    }
}

/// Read the system area and, through it, the whole filesystem.
///
/// The returned list starts with the system area itself.
pub(crate) fn read<S: Read + Seek>(
    arena: &mut RegionArena,
    disc: &mut Disc<S>,
) -> Result<Vec<RegionId>, CdError> {
    disc.seek(0)?;
    let sectors = disc.read_sectors(SYSTEM_AREA_SECTORS)?;
    let volumes = volume::read(arena, disc, SYSTEM_AREA_SECTORS)?;
    let first_volume = volumes[0];

    let mut region = Region::new(
        0,
        sectors,
        RegionKind::SystemArea(SystemArea {
            first_volume: Some(first_volume),
        }),
    );
    region.sub_regions.push(first_volume);
    let id = arena.insert(region);

    let mut regions = Vec::with_capacity(volumes.len() + 1);
    regions.push(id);
    regions.extend(volumes);
    Ok(regions)
}

/// Find the primary volume descriptor by walking the descriptor chain.
pub(crate) fn primary_volume(arena: &RegionArena, system_area: RegionId) -> Option<RegionId> {
    let RegionKind::SystemArea(area) = &arena[system_area].kind else {
        return None;
    };
    let mut current = area.first_volume;
    while let Some(id) = current {
        let RegionKind::Volume(descriptor) = &arena[id].kind else {
            return None;
        };
        if descriptor.kind == volume::VolumeKind::Primary {
            return Some(id);
        }
        current = descriptor.next_volume;
    }
    None
}
