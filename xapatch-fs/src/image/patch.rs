//! Replacing file contents.

use std::collections::HashSet;

use xapatch_core::{CdError, FORM1_DATA_SIZE, SECTOR_SIZE, Sector};

use super::DiscImage;
use crate::region::{self, RegionId, RegionSnapshot, RegionType};

/// A request to replace the content of one file in the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// Path of the file inside the image.
    pub path: String,
    pub data: Vec<u8>,
    /// `data` is a sequence of whole raw sectors rather than file content.
    pub is_raw: bool,
}

impl Patch {
    pub fn data(path: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            data,
            is_raw: false,
        }
    }

    pub fn raw(path: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            data,
            is_raw: true,
        }
    }

    /// Number of sectors the patched file will occupy.
    pub fn num_sectors(&self) -> u32 {
        if self.is_raw {
            (self.data.len() / SECTOR_SIZE) as u32
        } else {
            self.data.len().div_ceil(FORM1_DATA_SIZE) as u32
        }
    }
}

enum Content {
    Sectors(Vec<Sector>),
    Data(Vec<u8>),
}

struct Prepared {
    key: String,
    new_size: u32,
    delta: i64,
    content: Content,
}

impl DiscImage {
    /// Apply a batch of patches, then bring every directory record, path
    /// table and volume descriptor that refers to a moved or resized region
    /// up to date.
    ///
    /// All requests are validated before anything is changed. Patches are
    /// applied smallest growth first, so shrinking files free up space
    /// before growing files need it.
    pub fn patch(&mut self, patches: Vec<Patch>) -> Result<(), CdError> {
        let mut prepared = Vec::with_capacity(patches.len());
        for patch in patches {
            prepared.push(self.prepare(patch)?);
        }
        prepared.sort_by_key(|p| p.delta);

        let mut changed = HashSet::new();
        for p in prepared {
            let index = *self
                .name_map
                .get(&p.key)
                .ok_or_else(|| CdError::not_found(p.key.as_str()))?;
            let id = self.layout[index];
            let before = RegionSnapshot::of(&self.arena, id);

            changed.extend(self.fit_region(index, p.new_size)?);
            match &p.content {
                Content::Sectors(sectors) => self.arena[id].patch_sectors(sectors)?,
                Content::Data(data) => self.arena[id].patch_data(data)?,
            }

            let after = RegionSnapshot::of(&self.arena, id);
            if after.start != before.start
                || after.size != before.size
                || after.data_size != before.data_size
            {
                changed.insert(id);
            }
            log::debug!("Patched {}", self.arena[id]);
        }

        let followers: Vec<_> = changed
            .iter()
            .filter_map(|owner| self.aliases.get(owner).map(|aliases| (*owner, aliases)))
            .flat_map(|(owner, aliases)| aliases.iter().map(move |&alias| (owner, alias)))
            .collect();
        for (owner, (alias, offset)) in followers {
            self.follow_owner(alias, owner, offset);
            changed.insert(alias);
        }

        let mut changed: Vec<_> = changed.into_iter().collect();
        changed.sort();
        for &id in &changed {
            let snapshot = RegionSnapshot::of(&self.arena, id);
            region::update_paths(&mut self.arena, self.system_area, &snapshot)?;
        }
        log::info!("Updated metadata for {} relocated regions", changed.len());
        Ok(())
    }

    /// Re-point an aliased region at its owner's new position. An alias that
    /// shares the owner's first sector also takes on its length.
    fn follow_owner(&mut self, alias: RegionId, owner: RegionId, offset: u32) {
        let (start, data_size) = {
            let owner = &self.arena[owner];
            (owner.start(), owner.data_size() as u32)
        };
        let region = &mut self.arena[alias];
        region.start = start + offset;
        if offset == 0 {
            region.byte_len = Some(data_size);
        }
        log::debug!("Moved alias {region} along with its extent");
    }

    fn prepare(&self, patch: Patch) -> Result<Prepared, CdError> {
        let index = self.index_of(&patch.path)?;
        let region = &self.arena[self.layout[index]];
        if region.region_type() != RegionType::File {
            return Err(CdError::invalid_argument(format!(
                "{} is not a file",
                patch.path
            )));
        }
        let key = region.name().unwrap_or_default().to_lowercase();
        let new_size = patch.num_sectors();
        let delta = i64::from(new_size) - i64::from(region.size());

        let content = if patch.is_raw {
            if patch.data.len() % SECTOR_SIZE != 0 {
                return Err(CdError::invalid_argument(format!(
                    "Raw patch for {} is {} bytes, not a whole number of sectors",
                    patch.path,
                    patch.data.len()
                )));
            }
            let sectors = patch
                .data
                .chunks_exact(SECTOR_SIZE)
                .map(Sector::from_bytes)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| {
                    CdError::invalid_argument(format!("Raw patch for {}: {e}", patch.path))
                })?;
            Content::Sectors(sectors)
        } else {
            Content::Data(patch.data)
        };

        Ok(Prepared {
            key,
            new_size,
            delta,
            content,
        })
    }
}

#[cfg(test)]
#[path = "tests/patch_tests.rs"]
mod tests;
