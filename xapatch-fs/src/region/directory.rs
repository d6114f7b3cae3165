//! Directory extents and the records they hold.

use std::io::{Read, Seek};

use bitflags::bitflags;
use xapatch_core::{CdError, Disc};

use super::volume::both_endian;
use super::{
    Region, RegionArena, RegionId, RegionKind, RegionSnapshot, RegionType, file, read_extent,
};
use crate::date;

/// Smallest possible directory record: the fixed fields plus a one-byte name.
const MIN_RECORD_LEN: usize = 34;
/// Directory hierarchies deeper than this are treated as corrupt.
const MAX_DEPTH: usize = 64;

bitflags! {
    /// File flags byte of a directory record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileFlags: u8 {
        const HIDDEN = 0x01;
        const DIRECTORY = 0x02;
        const ASSOCIATED = 0x04;
        const RECORD = 0x08;
        const PROTECTION = 0x10;
        const MULTI_EXTENT = 0x80;
    }
}

/// What a directory record points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTarget {
    /// The `.` record.
    SelfDir,
    /// The `..` record.
    Parent,
    Child(RegionId),
}

#[derive(Debug, Clone)]
pub(crate) struct RecordEntry {
    pub name: String,
    pub sector_index: usize,
    pub offset: usize,
    pub target: RecordTarget,
}

#[derive(Debug, Default)]
pub struct Directory {
    pub(crate) entries: Vec<RecordEntry>,
}

impl Directory {
    fn entry(&self, name: &str) -> Option<&RecordEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Child regions in on-disc record order, without `.` and `..`.
    pub fn children(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.entries.iter().filter_map(|entry| match entry.target {
            RecordTarget::Child(id) => Some(id),
            _ => None,
        })
    }

    /// Sector index and byte offset of the record named `name`.
    pub fn record_location(&self, name: &str) -> Option<(usize, usize)> {
        self.entry(name).map(|entry| (entry.sector_index, entry.offset))
    }
}

/// Read the directory at `start` and everything beneath it.
pub(crate) fn read<S: Read + Seek>(
    arena: &mut RegionArena,
    disc: &mut Disc<S>,
    start: u32,
    name: String,
    byte_len: u32,
    last_modified: Option<date::Timestamp>,
) -> Result<Vec<RegionId>, CdError> {
    read_nested(arena, disc, start, name, byte_len, last_modified, 0)
}

fn read_nested<S: Read + Seek>(
    arena: &mut RegionArena,
    disc: &mut Disc<S>,
    start: u32,
    name: String,
    byte_len: u32,
    mut last_modified: Option<date::Timestamp>,
    depth: usize,
) -> Result<Vec<RegionId>, CdError> {
    if depth > MAX_DEPTH {
        return Err(CdError::invalid_format(format!(
            "Directory {name} is nested too deeply"
        )));
    }
    let sectors = read_extent(disc, start, byte_len.max(1))?;

    let mut entries = Vec::new();
    let mut children = Vec::new();
    let mut discovered = Vec::new();

    for (sector_index, sector) in sectors.iter().enumerate() {
        let data = sector.data();
        let mut pos = 0;
        while pos < data.len() {
            let record_len = data[pos] as usize;
            if record_len == 0 {
                break;
            }
            if record_len < MIN_RECORD_LEN || pos + record_len > data.len() {
                return Err(CdError::invalid_format(format!(
                    "Malformed record at byte {pos} of directory {name}"
                )));
            }
            let record = &data[pos..pos + record_len];
            if record[1] != 0 {
                return Err(CdError::unsupported(format!(
                    "Extended attribute records not supported in directory {name}"
                )));
            }
            let name_len = record[32] as usize;
            if 33 + name_len > record_len {
                return Err(CdError::invalid_format(format!(
                    "Record name overflows record at byte {pos} of directory {name}"
                )));
            }
            let record_name = &record[33..33 + name_len];

            let (entry_name, target) = match record_name {
                [0] => {
                    if last_modified.is_none() {
                        last_modified = date::parse_record_date(&record[18..25]);
                    }
                    (String::from("."), RecordTarget::SelfDir)
                }
                [1] => (String::from(".."), RecordTarget::Parent),
                _ => {
                    let extent = u32::from_le_bytes([record[2], record[3], record[4], record[5]]);
                    let data_len =
                        u32::from_le_bytes([record[10], record[11], record[12], record[13]]);
                    let modified = date::parse_record_date(&record[18..25]);
                    let flags = FileFlags::from_bits_retain(record[25]);
                    if record[27] > 0 {
                        return Err(CdError::unsupported(format!(
                            "Interleave not supported in directory {name}"
                        )));
                    }

                    let child_name = String::from_utf8_lossy(record_name).into_owned();
                    let mut full_name = name.clone();
                    if !full_name.ends_with('\\') {
                        full_name.push('\\');
                    }
                    full_name.push_str(&child_name);

                    let found = if flags.contains(FileFlags::DIRECTORY) {
                        read_nested(
                            arena, disc, extent, full_name, data_len, modified, depth + 1,
                        )?
                    } else {
                        vec![file::read(arena, disc, extent, full_name, data_len, modified)?]
                    };
                    children.push(found[0]);
                    discovered.extend(found);
                    (child_name, RecordTarget::Child(children[children.len() - 1]))
                }
            };
            entries.push(RecordEntry {
                name: entry_name,
                sector_index,
                offset: pos,
                target,
            });
            pos += record_len;
        }
    }
    log::debug!("Directory {name} at {start}: {} records", entries.len());

    let mut region = Region::new(start, sectors, RegionKind::Directory(Directory { entries }));
    region.name = Some(name);
    region.byte_len = Some(byte_len);
    region.last_modified = last_modified;
    region.sub_regions = children;
    let id = arena.insert(region);

    let mut regions = Vec::with_capacity(discovered.len() + 1);
    regions.push(id);
    regions.extend(discovered);
    Ok(regions)
}

/// Rewrite the extent and length fields of the record `name` in directory
/// `dir`. Without an explicit `target`, the record's own region is used.
fn update_record(
    arena: &mut RegionArena,
    dir: RegionId,
    name: &str,
    target: Option<&RegionSnapshot>,
) -> Result<(), CdError> {
    let RegionKind::Directory(directory) = &arena[dir].kind else {
        return Ok(());
    };
    let Some(entry) = directory.entry(name).cloned() else {
        return Ok(());
    };
    let snapshot = match (target, entry.target) {
        (Some(target), _) => target.clone(),
        (None, RecordTarget::SelfDir) => RegionSnapshot::of(arena, dir),
        (None, RecordTarget::Child(child)) => RegionSnapshot::of(arena, child),
        (None, RecordTarget::Parent) => return Ok(()),
    };

    let mut fields = [0u8; 16];
    fields[..8].copy_from_slice(&both_endian(snapshot.start));
    fields[8..].copy_from_slice(&both_endian(snapshot.data_size));
    arena[dir].write_field(entry.sector_index, entry.offset + 2, &fields)
}

fn child_directories(arena: &RegionArena, id: RegionId) -> Vec<RegionId> {
    let RegionKind::Directory(directory) = &arena[id].kind else {
        return Vec::new();
    };
    directory
        .children()
        .filter(|&child| arena[child].region_type() == RegionType::Directory)
        .collect()
}

/// Update any records in this directory, or in directories beneath it, that
/// describe the changed region.
pub(crate) fn update_paths(
    arena: &mut RegionArena,
    id: RegionId,
    changed: &RegionSnapshot,
) -> Result<(), CdError> {
    let Some(own_name) = arena[id].name.clone() else {
        return Ok(());
    };
    let Some(changed_name) = changed.name.as_deref() else {
        return Ok(());
    };
    let subdirs = child_directories(arena, id);

    if changed_name == own_name {
        update_own_records(arena, id, &own_name, &subdirs)?;
    } else {
        match changed_name.rsplit_once('\\') {
            Some((parent, leaf)) => {
                let mut parent = parent.to_string();
                if parent.ends_with(':') {
                    parent.push('\\');
                }
                if parent == own_name {
                    update_record(arena, id, leaf, None)?;
                }
            }
            None => {}
        }
    }

    if changed_name.starts_with(own_name.as_str()) {
        for subdir in subdirs {
            update_paths(arena, subdir, changed)?;
        }
    }
    Ok(())
}

/// The directory itself moved: its `.` record, its `..` record if it is a
/// root, and the `..` records of its subdirectories all point at it.
fn update_own_records(
    arena: &mut RegionArena,
    id: RegionId,
    own_name: &str,
    subdirs: &[RegionId],
) -> Result<(), CdError> {
    update_record(arena, id, ".", None)?;
    let own = RegionSnapshot::of(arena, id);
    if own_name.ends_with(":\\") {
        update_record(arena, id, "..", Some(&own))?;
    }
    for &subdir in subdirs {
        update_record(arena, subdir, "..", Some(&own))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/directory_tests.rs"]
mod tests;
