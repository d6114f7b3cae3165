//! Path tables: flat lists of every directory in a volume and its extent.

use std::collections::HashMap;
use std::io::{Read, Seek};

use xapatch_core::{CdError, Disc};

use super::{Region, RegionArena, RegionId, RegionKind, RegionSnapshot, read_extent};

/// Byte order of the numeric fields in a path table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn u16_from(self, bytes: [u8; 2]) -> u16 {
        match self {
            Endian::Little => u16::from_le_bytes(bytes),
            Endian::Big => u16::from_be_bytes(bytes),
        }
    }

    pub fn u32_from(self, bytes: [u8; 4]) -> u32 {
        match self {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        }
    }

    pub fn u32_bytes(self, value: u32) -> [u8; 4] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }
}

#[derive(Debug)]
pub struct PathTable {
    pub(crate) endian: Endian,
    /// Volume-relative directory path (e.g. `\DATA`) to the sector index and
    /// byte offset of its record.
    pub(crate) name_map: HashMap<String, (usize, usize)>,
}

impl PathTable {
    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn record_location(&self, path: &str) -> Option<(usize, usize)> {
        self.name_map.get(path).copied()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.name_map.keys().map(String::as_str)
    }
}

/// Read a path table of `table_size` bytes starting at sector `start`.
pub(crate) fn read<S: Read + Seek>(
    arena: &mut RegionArena,
    disc: &mut Disc<S>,
    start: u32,
    endian: Endian,
    table_size: u32,
) -> Result<RegionId, CdError> {
    let sectors = read_extent(disc, start, table_size.max(1))?;
    let mut region = Region::new(start, sectors, RegionKind::Free);
    let data = region.data();
    let limit = if table_size > 0 {
        (table_size as usize).min(data.len())
    } else {
        data.len()
    };

    let mut name_map = HashMap::new();
    let mut qualified: Vec<String> = Vec::new();
    let mut pos = 0;
    while pos < limit {
        let name_len = data[pos] as usize;
        if name_len == 0 {
            break;
        }
        let record_len = 8 + name_len + (name_len & 1);
        if pos + 8 + name_len > data.len() {
            return Err(CdError::invalid_format(format!(
                "Path table record at byte {pos} of sector {start} runs past the end of the table"
            )));
        }
        if data[pos + 1] != 0 {
            return Err(CdError::unsupported(format!(
                "Extended attribute records not supported in path table at sector {start}"
            )));
        }

        let parent = endian.u16_from([data[pos + 6], data[pos + 7]]) as usize;
        let name = &data[pos + 8..pos + 8 + name_len];
        let path = if name == [0] {
            String::from("\\")
        } else {
            let parent_path = parent
                .checked_sub(1)
                .and_then(|index| qualified.get(index))
                .ok_or_else(|| {
                    CdError::invalid_format(format!(
                        "Path table at sector {start} refers to unknown parent {parent}"
                    ))
                })?;
            let mut path = parent_path.clone();
            if !path.ends_with('\\') {
                path.push('\\');
            }
            path.push_str(&String::from_utf8_lossy(name));
            path
        };

        name_map.insert(path.clone(), region.locate(pos));
        qualified.push(path);
        pos += record_len;
    }
    log::debug!(
        "Path table at {start} ({endian:?}): {} directories",
        qualified.len()
    );

    region.kind = RegionKind::PathTable(PathTable { endian, name_map });
    Ok(arena.insert(region))
}

/// Rewrite the extent of the changed directory's record, if the table lists it.
pub(crate) fn update_paths(
    arena: &mut RegionArena,
    id: RegionId,
    changed: &RegionSnapshot,
) -> Result<(), CdError> {
    let Some((_, volume_path)) = changed.name.as_deref().and_then(|name| name.split_once(':'))
    else {
        return Ok(());
    };
    let region = &mut arena[id];
    let RegionKind::PathTable(table) = &region.kind else {
        return Ok(());
    };
    let Some((sector_index, offset)) = table.record_location(volume_path) else {
        return Ok(());
    };
    let bytes = table.endian.u32_bytes(changed.start);
    region.write_field(sector_index, offset + 2, &bytes)
}

#[cfg(test)]
#[path = "tests/path_table_tests.rs"]
mod tests;
