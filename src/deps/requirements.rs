//! Host tools the pipeline invokes, with the packages that provide them

/// A host command required by one or more stages
#[derive(Debug, Clone, Copy)]
pub struct Requirement {
    pub tool: &'static str,
    pub apt: &'static [&'static str],
    pub dnf: &'static [&'static str],
    /// Manual install suggestion shown when the tool stays missing
    pub hint: &'static str,
}

pub const REQUIREMENTS: &[Requirement] = &[
    Requirement {
        tool: "git",
        apt: &["git"],
        dnf: &["git"],
        hint: "sudo apt-get install git",
    },
    Requirement {
        tool: "make",
        apt: &["make"],
        dnf: &["make"],
        hint: "sudo apt-get install build-essential",
    },
    Requirement {
        tool: "flex",
        apt: &["flex"],
        dnf: &["flex"],
        hint: "sudo apt-get install flex",
    },
    Requirement {
        tool: "bison",
        apt: &["bison"],
        dnf: &["bison"],
        hint: "sudo apt-get install bison",
    },
    Requirement {
        tool: "arm-linux-gnueabi-gcc",
        apt: &["gcc-arm-linux-gnueabi"],
        dnf: &["gcc-arm-linux-gnu"],
        hint: "sudo apt-get install gcc-arm-linux-gnueabi",
    },
    Requirement {
        tool: "arm-linux-gnueabi-ld",
        apt: &["binutils-arm-linux-gnueabi"],
        dnf: &["binutils-arm-linux-gnu"],
        hint: "sudo apt-get install binutils-arm-linux-gnueabi",
    },
    Requirement {
        tool: "debootstrap",
        apt: &["debootstrap"],
        dnf: &["debootstrap"],
        hint: "sudo apt-get install debootstrap",
    },
    Requirement {
        tool: "mkimage",
        apt: &["u-boot-tools"],
        dnf: &["uboot-tools"],
        hint: "sudo apt-get install u-boot-tools",
    },
    Requirement {
        tool: "losetup",
        apt: &["util-linux"],
        dnf: &["util-linux"],
        hint: "sudo apt-get install util-linux",
    },
    Requirement {
        tool: "partx",
        apt: &["util-linux"],
        dnf: &["util-linux"],
        hint: "sudo apt-get install util-linux",
    },
    Requirement {
        tool: "sfdisk",
        apt: &["fdisk"],
        dnf: &["util-linux"],
        hint: "sudo apt-get install fdisk",
    },
    Requirement {
        tool: "mkfs.vfat",
        apt: &["dosfstools"],
        dnf: &["dosfstools"],
        hint: "sudo apt-get install dosfstools",
    },
    Requirement {
        tool: "mkfs.ext4",
        apt: &["e2fsprogs"],
        dnf: &["e2fsprogs"],
        hint: "sudo apt-get install e2fsprogs",
    },
    Requirement {
        tool: "mount",
        apt: &["util-linux"],
        dnf: &["util-linux"],
        hint: "sudo apt-get install mount",
    },
    Requirement {
        tool: "umount",
        apt: &["util-linux"],
        dnf: &["util-linux"],
        hint: "sudo apt-get install mount",
    },
    Requirement {
        tool: "cp",
        apt: &["coreutils"],
        dnf: &["coreutils"],
        hint: "sudo apt-get install coreutils",
    },
];

/// Look up a tool by command name
pub fn requirement(tool: &str) -> Option<&'static Requirement> {
    REQUIREMENTS.iter().find(|r| r.tool == tool)
}

/// Every tool any stage can require, in declaration order
pub fn all_tools() -> Vec<&'static str> {
    REQUIREMENTS.iter().map(|r| r.tool).collect()
}
