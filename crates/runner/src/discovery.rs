//! Host GPU discovery.

use std::process::Command;

use slotrun_core::ResourceId;
use tracing::{debug, info};

/// The GPU ids visible to this process, fixed for the whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInventory {
    ids: Vec<ResourceId>,
}

impl DeviceInventory {
    pub fn new(ids: impl IntoIterator<Item = ResourceId>) -> Self {
        let mut ids: Vec<ResourceId> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self { ids }
    }

    /// A host with no GPUs.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read `var` if it is set, otherwise ask the driver how many devices exist.
    pub fn discover(var: &str) -> Self {
        let inventory = match std::env::var(var) {
            Ok(value) => {
                debug!(var, value = %value, "using visible device list from environment");
                Self::new(parse_visible_devices(&value))
            }
            Err(_) => match query_device_count() {
                Some(count) => Self::new(0..count),
                None => Self::empty(),
            },
        };
        info!(gpus = ?inventory.ids, "discovered devices");
        inventory
    }

    pub fn ids(&self) -> &[ResourceId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Extract every non-negative integer from a visibility list such as
/// `"0,1"` or `"2, 3"`. Numbers written with a leading `-` are skipped.
pub fn parse_visible_devices(value: &str) -> Vec<ResourceId> {
    let bytes = value.as_bytes();
    let mut ids = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let negated = start > 0 && bytes[start - 1] == b'-';
        if !negated {
            if let Ok(id) = value[start..i].parse() {
                ids.push(id);
            }
        }
    }
    ids
}

/// Count devices reported by `nvidia-smi --list-gpus`. `None` when the tool
/// is missing or fails.
fn query_device_count() -> Option<usize> {
    let output = Command::new("nvidia-smi").arg("--list-gpus").output().ok()?;
    if !output.status.success() {
        debug!(status = ?output.status.code(), "nvidia-smi query failed");
        return None;
    }
    let count = count_listed_gpus(&String::from_utf8_lossy(&output.stdout));
    Some(count)
}

fn count_listed_gpus(listing: &str) -> usize {
    listing
        .lines()
        .filter(|line| line.trim_start().starts_with("GPU "))
        .count()
}
