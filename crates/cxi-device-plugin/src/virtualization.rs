//! Virtual to physical device multiplexing.
//!
//! Each physical NIC is advertised as N virtual devices so several pods can
//! share it. Virtual ids are dense decimal strings starting at `"0"`. A
//! configured count of 0 behaves like 1: every NIC is always advertised at
//! least once.

use std::collections::BTreeSet;

use crate::hardware::DeviceRecord;
use crate::hardware::DeviceSet;

/// Virtual devices per NIC actually used for a configured count.
pub const fn effective_count(configured: usize) -> usize {
    if configured == 0 {
        1
    } else {
        configured
    }
}

/// Immutable snapshot of the virtual id to device index assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualDeviceMap {
    /// `slots[n]` is the device index behind virtual id `n`
    slots: Vec<u64>,
}

impl VirtualDeviceMap {
    /// Assigns `effective_count(per_physical)` consecutive virtual ids to
    /// every device, in ascending device index order.
    pub fn expand<'a>(
        devices: impl IntoIterator<Item = &'a DeviceRecord>,
        per_physical: usize,
    ) -> Self {
        let mut indices: Vec<u64> = devices.into_iter().map(|d| d.device_index).collect();
        indices.sort_unstable();

        let count = effective_count(per_physical);
        let slots = indices
            .into_iter()
            .flat_map(|index| std::iter::repeat(index).take(count))
            .collect();
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Device index behind a virtual id, `None` for unknown ids.
    pub fn physical_index(&self, virtual_id: &str) -> Option<u64> {
        let slot = parse_virtual_id(virtual_id)?;
        self.slots.get(slot).copied()
    }

    /// `(virtual id, device index)` pairs in virtual id order.
    pub fn iter(&self) -> impl Iterator<Item = (String, u64)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(|(slot, index)| (slot.to_string(), *index))
    }

    /// Distinct device indices behind the requested virtual ids. Unknown ids
    /// are skipped: they may predate the latest discovery.
    pub fn physical_indices<S: AsRef<str>>(&self, virtual_ids: &[S]) -> BTreeSet<u64> {
        virtual_ids
            .iter()
            .filter_map(|id| self.physical_index(id.as_ref()))
            .collect()
    }

    /// Devices backing the requested virtual ids.
    pub fn filter_devices<S: AsRef<str>>(
        &self,
        devices: &DeviceSet,
        virtual_ids: &[S],
    ) -> DeviceSet {
        let wanted = self.physical_indices(virtual_ids);
        devices
            .iter()
            .filter(|(_, device)| wanted.contains(&device.device_index))
            .map(|(uid, device)| (uid.clone(), device.clone()))
            .collect()
    }

    /// Items whose device index, as extracted by `index_of`, backs one of
    /// the requested virtual ids. Items without an index are dropped.
    pub fn filter_by_index<T, S, F>(&self, items: Vec<T>, virtual_ids: &[S], index_of: F) -> Vec<T>
    where
        S: AsRef<str>,
        F: Fn(&T) -> Option<u64>,
    {
        let wanted = self.physical_indices(virtual_ids);
        items
            .into_iter()
            .filter(|item| index_of(item).is_some_and(|index| wanted.contains(&index)))
            .collect()
    }
}

/// Only canonical decimal ids (`"0"`, `"17"`) are accepted.
fn parse_virtual_id(virtual_id: &str) -> Option<usize> {
    let canonical = !virtual_id.is_empty()
        && virtual_id.bytes().all(|b| b.is_ascii_digit())
        && (virtual_id == "0" || !virtual_id.starts_with('0'));
    if !canonical {
        return None;
    }
    virtual_id.parse().ok()
}
