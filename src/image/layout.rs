//! Partition layout of the SD card image

use crate::error::{UbiqError, UbiqResult};
use std::fmt::Write as _;
use std::path::PathBuf;

pub const SECTOR_SIZE: u64 = 512;
/// First partition starts at 1 MiB
pub const FIRST_SECTOR: u64 = 2048;
const MIB: u64 = 1024 * 1024;

/// Filesystem to create on a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filesystem {
    Vfat,
    Ext4,
}

impl Filesystem {
    /// MBR partition type id
    pub fn mbr_type(&self) -> &'static str {
        match self {
            Filesystem::Vfat => "c",
            Filesystem::Ext4 => "83",
        }
    }

    /// `mkfs` program and arguments, without the device
    pub fn mkfs_command(&self, label: &str) -> (&'static str, Vec<String>) {
        match self {
            Filesystem::Vfat => (
                "mkfs.vfat",
                vec!["-F".into(), "32".into(), "-n".into(), label.into()],
            ),
            Filesystem::Ext4 => ("mkfs.ext4", vec!["-L".into(), label.into()]),
        }
    }
}

/// What to copy onto a partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionContent {
    /// Individual files, copied to the partition root under the given name
    Files(Vec<(PathBuf, String)>),
    /// A directory tree copied with ownership, links and modes preserved
    Tree(PathBuf),
}

impl PartitionContent {
    /// Source paths that must exist before assembly starts
    pub fn sources(&self) -> Vec<&PathBuf> {
        match self {
            PartitionContent::Files(files) => files.iter().map(|(src, _)| src).collect(),
            PartitionContent::Tree(dir) => vec![dir],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    pub name: String,
    pub filesystem: Filesystem,
    /// `None` fills the rest of the image; only valid for the last partition
    pub size_mb: Option<u64>,
    pub label: String,
    pub bootable: bool,
    pub content: PartitionContent,
}

/// A DOS-labelled disk image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub path: PathBuf,
    pub size_mb: u64,
    pub label_id: u32,
    pub partitions: Vec<PartitionSpec>,
}

impl ImageSpec {
    /// Check ordering and sizes before touching the disk
    pub fn validate(&self) -> UbiqResult<()> {
        let invalid = |reason: String| UbiqError::ConfigInvalid {
            path: self.path.clone(),
            reason,
        };

        if self.partitions.is_empty() {
            return Err(invalid("image has no partitions".to_string()));
        }
        let last = self.partitions.len() - 1;
        for (i, part) in self.partitions.iter().enumerate() {
            match part.size_mb {
                None if i != last => {
                    return Err(invalid(format!(
                        "partition '{}' has no size but is not last",
                        part.name
                    )))
                }
                Some(0) => {
                    return Err(invalid(format!("partition '{}' has zero size", part.name)))
                }
                _ => {}
            }
        }

        let fixed_sectors: u64 = self.fixed_sectors();
        let total_sectors = self.total_bytes() / SECTOR_SIZE;
        let remaining = total_sectors.saturating_sub(FIRST_SECTOR + fixed_sectors);
        if self.partitions[last].size_mb.is_none() && remaining == 0 {
            return Err(invalid(format!(
                "{} MiB leaves no room for partition '{}'",
                self.size_mb, self.partitions[last].name
            )));
        }
        Ok(())
    }

    /// Image file size: the declared size, grown to fit fixed partitions
    pub fn total_bytes(&self) -> u64 {
        let needed = (FIRST_SECTOR + self.fixed_sectors()) * SECTOR_SIZE;
        (self.size_mb * MIB).max(needed)
    }

    fn fixed_sectors(&self) -> u64 {
        self.partitions
            .iter()
            .filter_map(|p| p.size_mb)
            .map(|mb| mb * MIB / SECTOR_SIZE)
            .sum()
    }

    /// `sfdisk` input describing the partition table
    pub fn sfdisk_script(&self) -> String {
        let mut script = format!(
            "label: dos\nlabel-id: {:#010x}\nunit: sectors\n\n",
            self.label_id
        );

        let mut start = FIRST_SECTOR;
        for part in &self.partitions {
            let size = part.size_mb.map(|mb| mb * MIB / SECTOR_SIZE);
            let _ = writeln!(
                script,
                "{},{},{}{}",
                start,
                size.map(|s| s.to_string()).unwrap_or_default(),
                part.filesystem.mbr_type(),
                if part.bootable { ",*" } else { "" }
            );
            start += size.unwrap_or(0);
        }
        script
    }
}
