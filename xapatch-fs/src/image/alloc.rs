//! Resizing regions in place by trading sectors with free space.
//!
//! The layout always tiles the image, so a region can only grow by taking
//! sectors from a free region. When free space isn't adjacent, the regions in
//! between are shifted one batch at a time ("bubbled") until it is.

use std::collections::HashSet;

use xapatch_core::{CdError, Sector};

use super::DiscImage;
use crate::region::{Region, RegionId};

impl DiscImage {
    /// Resize the region at layout `index` to `new_size` sectors.
    ///
    /// Shrinking hands the released tail to the following free region (or a
    /// new one). Growing takes sectors from, in order: the free region right
    /// after, the free region right before, free regions further ahead, and
    /// free regions further back. Returns every other region that moved, so
    /// the caller can refresh the metadata that points at them.
    ///
    /// Fails with [`CdError::CapacityExceeded`] before changing anything if
    /// there isn't enough reachable free space.
    pub fn fit_region(
        &mut self,
        index: usize,
        new_size: u32,
    ) -> Result<HashSet<RegionId>, CdError> {
        let id = *self.layout.get(index).ok_or_else(|| {
            CdError::invalid_argument(format!("No region at layout index {index}"))
        })?;
        let current = self.arena[id].size();
        let mut changed = HashSet::new();

        if new_size < current {
            let released = self.arena[id].shrink_back(current - new_size)?;
            match self.layout.get(index + 1) {
                Some(&next) if self.arena[next].is_free() => {
                    self.arena[next].grow_front(released, false);
                }
                _ => {
                    let start = self.arena[id].next_start();
                    let free = self.arena.insert(Region::free(start, released));
                    self.insert_region(index + 1, free);
                }
            }
            log::debug!("Shrunk {} by {} sectors", self.arena[id], current - new_size);
            return Ok(changed);
        }
        if new_size == current {
            return Ok(changed);
        }

        let mut needed = new_size - current;
        let available = self.reachable_free(index);
        if available < needed {
            return Err(CdError::CapacityExceeded { needed, available });
        }

        let mut index = index;
        if let Some(&next) = self.layout.get(index + 1)
            && self.arena[next].is_free()
        {
            let taken = self.take_front(index + 1, needed)?;
            needed -= taken.len() as u32;
            self.arena[id].grow_back(taken);
        }

        if needed > 0 && index > 0 && self.arena[self.layout[index - 1]].is_free() {
            let (taken, removed) = self.take_back(index - 1, needed)?;
            if removed {
                index -= 1;
            }
            needed -= taken.len() as u32;
            self.arena[id].grow_front(taken, true);
        }

        if needed > 0 {
            needed = self.bubble_forward(index, needed, &mut changed)?;
        }
        if needed > 0 {
            needed = self.bubble_backward(index, needed, &mut changed)?;
        }
        if needed > 0 {
            // Unreachable given the capacity check above.
            return Err(CdError::CapacityExceeded {
                needed,
                available: 0,
            });
        }

        log::debug!(
            "Grew {} to {new_size} sectors, moving {} other regions",
            self.arena[id],
            changed.len()
        );
        Ok(changed)
    }

    /// Free sectors the region at `index` could obtain, scanning outward in
    /// both directions until a region that can't be moved.
    fn reachable_free(&self, index: usize) -> u32 {
        let ahead = self.layout[index + 1..]
            .iter()
            .map(|&id| &self.arena[id])
            .take_while(|region| region.is_movable())
            .filter(|region| region.is_free())
            .map(Region::size);
        let behind = self.layout[..index]
            .iter()
            .rev()
            .map(|&id| &self.arena[id])
            .take_while(|region| region.is_movable())
            .filter(|region| region.is_free())
            .map(Region::size);
        ahead.chain(behind).sum()
    }

    /// Detach up to `count` sectors from the front of the free region at
    /// `free_index`, dropping the region from the layout if it empties.
    fn take_front(&mut self, free_index: usize, count: u32) -> Result<Vec<Sector>, CdError> {
        let free = self.layout[free_index];
        let available = self.arena[free].size();
        if available <= count {
            let taken = self.arena[free].shrink_front(available, false)?;
            self.remove_region(free_index);
            Ok(taken)
        } else {
            self.arena[free].shrink_front(count, false)
        }
    }

    /// Detach up to `count` sectors from the back of the free region at
    /// `free_index`. The flag reports whether the region was removed.
    fn take_back(&mut self, free_index: usize, count: u32) -> Result<(Vec<Sector>, bool), CdError> {
        let free = self.layout[free_index];
        let available = self.arena[free].size();
        if available <= count {
            let taken = self.arena[free].shrink_back(available)?;
            self.remove_region(free_index);
            Ok((taken, true))
        } else {
            Ok((self.arena[free].shrink_back(count)?, false))
        }
    }

    /// Pull free sectors from further ahead, shifting each intervening region
    /// forward by the size of the batch. Returns the sectors still needed.
    fn bubble_forward(
        &mut self,
        index: usize,
        mut needed: u32,
        changed: &mut HashSet<RegionId>,
    ) -> Result<u32, CdError> {
        let id = self.layout[index];
        let mut i = index + 1;
        while i < self.layout.len() && needed > 0 {
            let candidate = self.layout[i];
            if !self.arena[candidate].is_free() {
                if !self.arena[candidate].is_movable() {
                    break;
                }
                i += 1;
                continue;
            }

            let last_between = i - 1;
            let available = self.arena[candidate].size();
            let mut batch = if available <= needed {
                let taken = self.arena[candidate].shrink_front(available, false)?;
                self.remove_region(i);
                taken
            } else {
                let taken = self.arena[candidate].shrink_front(needed, false)?;
                i += 1;
                taken
            };
            let count = batch.len() as u32;

            // Hand the batch backward through each intervening region: it
            // joins the back, the region's content shifts onto it, and the
            // same number of sectors leave from the front.
            for position in (index + 1..=last_between).rev() {
                let between = self.layout[position];
                self.arena[between].grow_back(batch);
                batch = self.arena[between].shrink_front(count, true)?;
                changed.insert(between);
            }
            self.arena[id].grow_back(batch);
            needed -= count;
        }
        Ok(needed)
    }

    /// Pull free sectors from further back, shifting each intervening region
    /// backward by the size of the batch. Returns the sectors still needed.
    fn bubble_backward(
        &mut self,
        mut index: usize,
        mut needed: u32,
        changed: &mut HashSet<RegionId>,
    ) -> Result<u32, CdError> {
        let id = self.layout[index];
        let mut i = index;
        while i > 0 && needed > 0 {
            i -= 1;
            let candidate = self.layout[i];
            if !self.arena[candidate].is_free() {
                if !self.arena[candidate].is_movable() {
                    break;
                }
                continue;
            }

            let available = self.arena[candidate].size();
            let (mut batch, removed) = if available <= needed {
                let taken = self.arena[candidate].shrink_back(available)?;
                self.remove_region(i);
                (taken, true)
            } else {
                (self.arena[candidate].shrink_back(needed)?, false)
            };
            let first_between = if removed {
                index -= 1;
                i
            } else {
                i + 1
            };
            let count = batch.len() as u32;

            for position in first_between..index {
                let between = self.layout[position];
                self.arena[between].grow_front(batch, true);
                batch = self.arena[between].shrink_back(count)?;
                changed.insert(between);
            }
            self.arena[id].grow_front(batch, true);
            needed -= count;
        }
        Ok(needed)
    }
}

#[cfg(test)]
#[path = "tests/alloc_tests.rs"]
mod tests;
