//! Volume descriptors: the chain of fixed-layout sectors starting at sector 16.

use std::io::{Read, Seek};

use xapatch_core::{CdError, Disc};

use super::path_table::{self, Endian};
use super::{Region, RegionArena, RegionId, RegionKind, RegionSnapshot, decode_identifier, directory};
use crate::date;

const STANDARD_IDENTIFIER: &[u8; 5] = b"CD001";

// Byte offsets within a primary/supplementary descriptor.
const SPACE_SIZE: usize = 80;
const PATH_TABLE_SIZE: usize = 132;
const L_PATH_TABLE: usize = 140;
const L_PATH_TABLE_OPTIONAL: usize = 144;
const M_PATH_TABLE: usize = 148;
const M_PATH_TABLE_OPTIONAL: usize = 152;
const ROOT_EXTENT: usize = 158;
const ROOT_LENGTH: usize = 166;
const CREATED_DATE: usize = 813;
const MODIFIED_DATE: usize = 830;
const DATE_LEN: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VolumeKind {
    Boot = 0,
    Primary = 1,
    Supplementary = 2,
    Partition = 3,
    Terminator = 255,
}

impl TryFrom<u8> for VolumeKind {
    type Error = CdError;

    fn try_from(value: u8) -> Result<Self, CdError> {
        match value {
            0 => Ok(VolumeKind::Boot),
            1 => Ok(VolumeKind::Primary),
            2 => Ok(VolumeKind::Supplementary),
            3 => Ok(VolumeKind::Partition),
            255 => Ok(VolumeKind::Terminator),
            other => Err(CdError::invalid_format(format!(
                "Unknown volume descriptor type {other}"
            ))),
        }
    }
}

/// A path table owned by a volume, with the descriptor field that locates it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OwnedTable {
    pub id: RegionId,
    pub location_field: usize,
    pub endian: Endian,
}

#[derive(Debug)]
pub struct VolumeDescriptor {
    pub(crate) kind: VolumeKind,
    /// Number of sectors the volume claims to occupy. Only ever raised.
    pub(crate) space_size: u32,
    pub(crate) path_tables: Vec<OwnedTable>,
    pub(crate) root_dir: Option<RegionId>,
    pub(crate) next_volume: Option<RegionId>,
}

impl VolumeDescriptor {
    pub fn kind(&self) -> VolumeKind {
        self.kind
    }

    pub fn space_size(&self) -> u32 {
        self.space_size
    }

    pub fn root_dir(&self) -> Option<RegionId> {
        self.root_dir
    }

    pub fn next_volume(&self) -> Option<RegionId> {
        self.next_volume
    }

    pub fn path_tables(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.path_tables.iter().map(|table| table.id)
    }

    /// Whether the volume carries a directory hierarchy.
    pub fn is_filesystem(&self) -> bool {
        matches!(self.kind, VolumeKind::Primary | VolumeKind::Supplementary)
    }
}

fn le_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

fn be_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

/// Both-endian encoding used throughout ISO 9660.
pub(crate) fn both_endian(value: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&value.to_le_bytes());
    out[4..].copy_from_slice(&value.to_be_bytes());
    out
}

/// Read the descriptor at `start` and every descriptor after it up to the
/// terminator, including path tables and directory trees.
pub(crate) fn read<S: Read + Seek>(
    arena: &mut RegionArena,
    disc: &mut Disc<S>,
    start: u32,
) -> Result<Vec<RegionId>, CdError> {
    disc.seek(start)?;
    let sector = disc.read_sector()?;
    let data = sector.data();
    if data.len() < 0x800 {
        return Err(CdError::invalid_format(format!(
            "Volume descriptor at sector {start} has no data field"
        )));
    }

    let kind = VolumeKind::try_from(data[0])?;
    if &data[1..6] != STANDARD_IDENTIFIER {
        return Err(CdError::invalid_format(format!(
            "Invalid standard identifier in volume descriptor at sector {start}"
        )));
    }
    if data[6] != 1 {
        return Err(CdError::invalid_format(format!(
            "Unknown volume descriptor version {}",
            data[6]
        )));
    }

    let name = match kind {
        VolumeKind::Boot => Some(decode_identifier(&data[39..71])),
        VolumeKind::Terminator => None,
        _ => Some(decode_identifier(&data[40..72])),
    };
    log::debug!("Volume descriptor at {start}: {kind:?} {name:?}");

    let mut descriptor = VolumeDescriptor {
        kind,
        space_size: 0,
        path_tables: Vec::new(),
        root_dir: None,
        next_volume: None,
    };
    let mut discovered = Vec::new();
    let mut last_modified = None;

    if descriptor.is_filesystem() {
        let volume_name = name.clone().unwrap_or_default();
        descriptor.space_size = le_u32(data, SPACE_SIZE);
        let table_size = le_u32(data, PATH_TABLE_SIZE);

        let locations = [
            (L_PATH_TABLE, le_u32(data, L_PATH_TABLE), Endian::Little, true),
            (L_PATH_TABLE_OPTIONAL, le_u32(data, L_PATH_TABLE_OPTIONAL), Endian::Little, false),
            (M_PATH_TABLE, be_u32(data, M_PATH_TABLE), Endian::Big, true),
            (M_PATH_TABLE_OPTIONAL, be_u32(data, M_PATH_TABLE_OPTIONAL), Endian::Big, false),
        ];
        for (field, location, endian, required) in locations {
            if !required && location == 0 {
                continue;
            }
            let table = path_table::read(arena, disc, location, endian, table_size)?;
            descriptor.path_tables.push(OwnedTable {
                id: table,
                location_field: field,
                endian,
            });
            discovered.push(table);
        }

        let root_extent = le_u32(data, ROOT_EXTENT);
        let root_len = le_u32(data, ROOT_LENGTH);
        last_modified = date::parse_volume_date(&data[MODIFIED_DATE..MODIFIED_DATE + DATE_LEN])
            .or_else(|| date::parse_volume_date(&data[CREATED_DATE..CREATED_DATE + DATE_LEN]));

        let tree = directory::read(
            arena,
            disc,
            root_extent,
            format!("{volume_name}:\\"),
            root_len,
            None,
        )?;
        descriptor.root_dir = Some(tree[0]);
        discovered.extend(tree);
    }

    let mut sub_regions: Vec<RegionId> = descriptor.path_tables.iter().map(|t| t.id).collect();
    sub_regions.extend(descriptor.root_dir);

    let mut rest = Vec::new();
    if kind != VolumeKind::Terminator {
        rest = read(arena, disc, start + 1)?;
        descriptor.next_volume = Some(rest[0]);
    }

    let mut region = Region::new(start, vec![sector], RegionKind::Volume(descriptor));
    region.name = name;
    region.last_modified = last_modified;
    region.sub_regions = sub_regions;
    let id = arena.insert(region);

    let mut regions = Vec::with_capacity(1 + discovered.len() + rest.len());
    regions.push(id);
    regions.extend(discovered);
    regions.extend(rest);
    Ok(regions)
}

/// Refresh the descriptor's own fields for a changed region, then pass the
/// change on to its path tables and directory tree, or along the chain if the
/// region belongs to another volume.
pub(crate) fn update_paths(
    arena: &mut RegionArena,
    id: RegionId,
    changed: &RegionSnapshot,
) -> Result<(), CdError> {
    let region = &arena[id];
    let RegionKind::Volume(descriptor) = &region.kind else {
        return Ok(());
    };

    let in_namespace = descriptor.is_filesystem()
        && match (&region.name, &changed.name) {
            (Some(volume), Some(name)) => name.starts_with(&format!("{volume}:\\")),
            _ => false,
        };
    let is_root = descriptor.root_dir == Some(changed.id);
    let owned_table = descriptor
        .path_tables
        .iter()
        .find(|table| table.id == changed.id)
        .copied();

    if !(in_namespace || is_root || owned_table.is_some()) {
        if let Some(next) = descriptor.next_volume {
            update_paths(arena, next, changed)?;
        }
        return Ok(());
    }

    let space_size = descriptor.space_size;
    let tables: Vec<RegionId> = descriptor.path_tables.iter().map(|t| t.id).collect();
    let root_dir = descriptor.root_dir;

    rewrite_fields(arena, id, changed, is_root, owned_table, space_size)?;

    if changed.is_directory {
        for table in tables {
            path_table::update_paths(arena, table, changed)?;
        }
    }
    if let Some(root) = root_dir {
        directory::update_paths(arena, root, changed)?;
    }
    Ok(())
}

fn rewrite_fields(
    arena: &mut RegionArena,
    id: RegionId,
    changed: &RegionSnapshot,
    is_root: bool,
    owned_table: Option<OwnedTable>,
    space_size: u32,
) -> Result<(), CdError> {
    let region = &mut arena[id];

    if is_root {
        region.write_field(0, ROOT_EXTENT, &both_endian(changed.start))?;
        region.write_field(0, ROOT_LENGTH, &both_endian(changed.data_size))?;
    }

    if let Some(table) = owned_table {
        region.write_field(0, table.location_field, &table.endian.u32_bytes(changed.start))?;
    }

    let needed = changed.next_start();
    if needed > space_size {
        log::debug!("Raising volume space size from {space_size} to {needed}");
        region.write_field(0, SPACE_SIZE, &both_endian(needed))?;
        if let RegionKind::Volume(descriptor) = &mut region.kind {
            descriptor.space_size = needed;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/volume_tests.rs"]
mod tests;
