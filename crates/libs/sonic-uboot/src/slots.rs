//! Image slots and the environment variables describing them.

use std::fmt;
use std::ops::Index;

use serde::{Serialize, Serializer};

/// Value marking an empty slot in the environment.
pub const NONE: &str = "NONE";

/// Variable pointing at the slot to boot by default.
pub const BOOT_NEXT: &str = "boot_next";

/// Variable pointing at the slot to boot once on the next boot.
pub const BOOT_ONCE: &str = "boot_once";

/// Index of an image slot.
///
/// Slots are numbered starting from `1` as in the environment variable names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SlotIdx(usize);

impl SlotIdx {
    /// The first slot.
    pub const FIRST: SlotIdx = SlotIdx(1);

    /// Create a slot index from its 1-based number.
    pub fn new(number: usize) -> Option<Self> {
        (number > 0).then_some(Self(number))
    }

    /// 1-based number of the slot.
    pub fn number(self) -> usize {
        self.0
    }

    /// Iterator over all slots of a system with `max` slots.
    pub fn all(max: usize) -> impl Iterator<Item = SlotIdx> {
        (1..=max).map(SlotIdx)
    }

    /// Variable holding the image label of the slot.
    pub fn version_key(self) -> String {
        format!("sonic_version_{}", self.0)
    }

    /// Variable holding the image directory of the slot.
    pub fn dir_key(self) -> String {
        format!("sonic_dir_{}", self.0)
    }

    /// Variable holding the boot script of the slot.
    pub fn image_key(self) -> String {
        format!("sonic_image_{}", self.0)
    }

    /// Boot selector value which boots this slot.
    pub fn boot_command(self) -> String {
        format!("run {}", self.image_key())
    }
}

impl fmt::Display for SlotIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolve the slot a boot selector value points at.
///
/// A slot is referenced if its boot script name occurs anywhere in the value. When
/// several slots are referenced, the one with the highest number wins.
pub fn resolve_boot_selector(value: &str, max: usize) -> Option<SlotIdx> {
    SlotIdx::all(max)
        .filter(|idx| value.contains(&idx.image_key()))
        .last()
}

/// Contents of an image slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SlotEntry {
    /// The slot does not hold an image.
    Empty,
    /// The slot holds the image with the given label.
    Image(String),
}

impl SlotEntry {
    /// Label of the image, if any.
    pub fn image(&self) -> Option<&str> {
        match self {
            SlotEntry::Empty => None,
            SlotEntry::Image(label) => Some(label),
        }
    }

    /// Indicates whether the slot is empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, SlotEntry::Empty)
    }

    /// String stored in the environment for this entry.
    pub fn as_str(&self) -> &str {
        self.image().unwrap_or(NONE)
    }
}

impl fmt::Display for SlotEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SlotEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Snapshot of all image slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SlotTable {
    entries: Vec<SlotEntry>,
}

impl SlotTable {
    pub(crate) fn new(entries: Vec<SlotEntry>) -> Self {
        Self { entries }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Indicates whether the table has no slots at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry of the given slot.
    pub fn get(&self, idx: SlotIdx) -> Option<&SlotEntry> {
        self.entries.get(idx.number() - 1)
    }

    /// Iterator over the slots in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotIdx, &SlotEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (SlotIdx(idx + 1), entry))
    }

    /// Iterator over the occupied slots in ascending order.
    pub fn images(&self) -> impl Iterator<Item = (SlotIdx, &str)> {
        self.iter()
            .filter_map(|(idx, entry)| entry.image().map(|label| (idx, label)))
    }

    /// Indicates whether some slot holds exactly the given image.
    pub fn contains(&self, image: &str) -> bool {
        self.find(image).is_some()
    }

    /// First slot holding exactly the given image.
    pub fn find(&self, image: &str) -> Option<SlotIdx> {
        self.images()
            .find(|(_, label)| *label == image)
            .map(|(idx, _)| idx)
    }

    /// First slot whose image label contains any of the given patterns.
    pub fn find_containing(&self, patterns: &[&str]) -> Option<SlotIdx> {
        self.images()
            .find(|(_, label)| patterns.iter().any(|pattern| label.contains(pattern)))
            .map(|(idx, _)| idx)
    }

    /// First occupied slot other than `excluded`.
    pub fn first_other_image(&self, excluded: SlotIdx) -> Option<SlotIdx> {
        self.images()
            .map(|(idx, _)| idx)
            .find(|idx| *idx != excluded)
    }

    /// Image labels as stored in the environment, `NONE` for empty slots.
    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(SlotEntry::as_str).collect()
    }
}

impl Index<SlotIdx> for SlotTable {
    type Output = SlotEntry;

    fn index(&self, index: SlotIdx) -> &Self::Output {
        &self.entries[index.number() - 1]
    }
}
