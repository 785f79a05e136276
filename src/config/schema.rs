//! Configuration schema for ubiq480
//!
//! Every section is optional; a missing key takes the board defaults below.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub toolchain: ToolchainConfig,
    pub sources: SourcesConfig,
    pub bootloader: BootloaderConfig,
    pub kernel: KernelConfig,
    pub bootscript: BootscriptConfig,
    pub rootfs: RootfsConfig,
    pub image: ImageConfig,
    pub scripts: ScriptsConfig,
}

/// General application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding every artifact, the cache and the build log
    pub output_dir: PathBuf,

    /// Install missing host tools with the system package manager
    pub auto_install: bool,

    /// Skip the confirmation question (the summary is still shown)
    pub assume_yes: bool,

    /// Build log file name, relative to `output_dir`
    pub log_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            auto_install: true,
            assume_yes: false,
            log_file: "build.log".to_string(),
        }
    }
}

/// Cross-compilation environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub arch: String,
    pub cross_compile: String,
    /// Parallel make jobs; defaults to the available parallelism
    pub jobs: Option<usize>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            arch: "arm".to_string(),
            cross_compile: "arm-linux-gnueabi-".to_string(),
            jobs: None,
        }
    }
}

impl ToolchainConfig {
    pub fn effective_jobs(&self) -> usize {
        self.jobs.filter(|j| *j > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Git checkout settings shared by the bootloader and kernel trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub shallow_depth: u32,
    /// Refuse to clone or fetch with less free space than this
    pub min_free_bytes: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            shallow_depth: 64,
            min_free_bytes: 1024 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootloaderConfig {
    pub repo: String,
    pub git_ref: String,
    pub defconfig: String,
    pub kcflags: String,
}

impl Default for BootloaderConfig {
    fn default() -> Self {
        Self {
            repo: "https://source.denx.de/u-boot/u-boot.git".to_string(),
            git_ref: "v2016.09".to_string(),
            defconfig: "mx31ads_config".to_string(),
            kcflags: "-march=armv5te".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub repo: String,
    pub git_ref: String,
    pub defconfig: String,
    pub kcflags: String,
    /// Make target of the board's device tree, relative to the kernel tree
    pub dtb_target: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            repo: "https://git.kernel.org/pub/scm/linux/kernel/git/stable/linux.git".to_string(),
            git_ref: "v5.10.217".to_string(),
            defconfig: "imx_v6_v7_defconfig".to_string(),
            kcflags: "-march=armv6 -mtune=arm1136jf-s -mfloat-abi=softfp -mfpu=vfp".to_string(),
            dtb_target: "arch/arm/boot/dts/imx31-ubiq480-g070vw01.dtb".to_string(),
        }
    }
}

impl KernelConfig {
    /// File name of the compiled device tree
    pub fn dtb_name(&self) -> String {
        std::path::Path::new(&self.dtb_target)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.dtb_target.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootscriptConfig {
    /// U-Boot command script compiled into `boot.scr`
    pub source: PathBuf,
    /// Image name embedded by mkimage
    pub name: String,
}

impl Default for BootscriptConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("boot/boot.cmd"),
            name: "UbiQ480 Boot".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootfsConfig {
    pub suite: String,
    pub arch: String,
    pub mirror: String,
    pub variant: String,
    pub hostname: String,
}

impl Default for RootfsConfig {
    fn default() -> Self {
        Self {
            suite: "bookworm".to_string(),
            arch: "armel".to_string(),
            mirror: "http://deb.debian.org/debian".to_string(),
            variant: "minbase".to_string(),
            hostname: "ubiq480".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub file_name: String,
    pub size_mb: u64,
    pub boot_size_mb: u64,
    pub boot_label: String,
    pub root_label: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            file_name: "ubiq480.img".to_string(),
            size_mb: 2048,
            boot_size_mb: 64,
            boot_label: "UBIQBOOT".to_string(),
            root_label: "ubiq480-root".to_string(),
        }
    }
}

/// Python helpers shipped next to the build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptsConfig {
    pub requirements: PathBuf,
    pub venv_dir: PathBuf,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            requirements: PathBuf::from("requirements.txt"),
            venv_dir: PathBuf::from("output/cache/venv"),
        }
    }
}
