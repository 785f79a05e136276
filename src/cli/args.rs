//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// UbiQ-480 SD card image builder
///
/// Builds U-Boot, the kernel, the device tree, the boot script and a Debian
/// root filesystem, then assembles them into a partitioned image. Run
/// without stages to pick them from a menu.
#[derive(Parser, Debug)]
#[command(name = "ubiq480")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Stages to build (bootloader, kernel, dtb, bootscript, rootfs, image, or all)
    #[arg(value_name = "STAGE")]
    pub stages: Vec<String>,

    /// Skip the confirmation prompt (the summary is still shown)
    #[arg(short, long)]
    pub yes: bool,

    /// Never install missing host packages, only report them
    #[arg(long)]
    pub no_bootstrap: bool,

    /// List stages and exit
    #[arg(long, conflicts_with_all = ["stages", "check_deps"])]
    pub list: bool,

    /// Report unmet host requirements and exit
    #[arg(long, conflicts_with = "stages")]
    pub check_deps: bool,

    /// Output directory for artifacts, cache and build log
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "UBIQ480_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// What this invocation does
    pub fn mode(&self) -> Mode {
        if self.list {
            Mode::List
        } else if self.check_deps {
            Mode::CheckDeps
        } else {
            Mode::Build
        }
    }
}

/// Top-level modes; only `Build` writes to the output directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Build,
    List,
    CheckDeps,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn stages_and_flags() {
        let cli = Cli::parse_from(["ubiq480", "kernel", "dtb", "-y", "--no-bootstrap", "-vv"]);
        assert_eq!(cli.stages, ["kernel", "dtb"]);
        assert!(cli.yes);
        assert!(cli.no_bootstrap);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.mode(), Mode::Build);
    }

    #[test]
    fn query_modes() {
        assert_eq!(Cli::parse_from(["ubiq480", "--list"]).mode(), Mode::List);
        assert_eq!(
            Cli::parse_from(["ubiq480", "--check-deps"]).mode(),
            Mode::CheckDeps
        );
        assert!(Cli::try_parse_from(["ubiq480", "--list", "kernel"]).is_err());
    }

    #[test]
    fn output_dir_override() {
        let cli = Cli::parse_from(["ubiq480", "-o", "/tmp/out", "all"]);
        assert_eq!(cli.output_dir, Some(PathBuf::from("/tmp/out")));
    }
}
