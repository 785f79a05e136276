//! Integration tests for ubiq480

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn ubiq480() -> Command {
        let mut cmd = cargo_bin_cmd!("ubiq480");
        cmd.env_remove("UBIQ480_CONFIG");
        cmd
    }

    /// Config that keeps every path inside `dir`
    fn config(dir: &Path) -> PathBuf {
        let path = dir.join("ubiq480.toml");
        let body = format!(
            "[general]\noutput_dir = \"{out}\"\n\n[scripts]\nrequirements = \"{req}\"\nvenv_dir = \"{venv}\"\n",
            out = dir.join("output").display(),
            req = dir.join("requirements.txt").display(),
            venv = dir.join("venv").display(),
        );
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn help_displays() {
        ubiq480()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("UbiQ-480"))
            .stdout(predicate::str::contains("--no-bootstrap"));
    }

    #[test]
    fn version_displays() {
        ubiq480()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("ubiq480"));
    }

    #[test]
    fn list_shows_every_stage_without_writing() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());

        ubiq480()
            .current_dir(dir.path())
            .args(["--list", "-c"])
            .arg(&cfg)
            .assert()
            .success()
            .stdout(predicate::str::contains("bootloader"))
            .stdout(predicate::str::contains("kernel"))
            .stdout(predicate::str::contains("dtb"))
            .stdout(predicate::str::contains("bootscript"))
            .stdout(predicate::str::contains("rootfs"))
            .stdout(predicate::str::contains("image"))
            .stdout(predicate::str::contains("all"));

        assert!(!dir.path().join("output").exists());
    }

    #[test]
    fn unknown_stage_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());

        ubiq480()
            .current_dir(dir.path())
            .arg("-c")
            .arg(&cfg)
            .arg("firmware")
            .write_stdin("")
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Unknown stage: firmware"));
    }

    #[test]
    fn invalid_config_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        let cfg = dir.path().join("broken.toml");
        std::fs::write(&cfg, "[general\noutput_dir = 3").unwrap();

        ubiq480()
            .current_dir(dir.path())
            .arg("-c")
            .arg(&cfg)
            .arg("kernel")
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn declined_confirmation_creates_no_artifacts() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());
        let out = dir.path().join("output");

        ubiq480()
            .current_dir(dir.path())
            .arg("-c")
            .arg(&cfg)
            .args(["bootloader", "kernel", "dtb"])
            .write_stdin("")
            .assert()
            .success()
            .stdout(predicate::str::contains("Planned changes"))
            .stdout(predicate::str::contains("u-boot.bin"))
            .stdout(predicate::str::contains("[y/N]"));

        assert!(!out.join("u-boot.bin").exists());
        assert!(!out.join("zImage").exists());
        assert!(!out.join("cache").join("sources").exists());
        assert!(!out.join("build.log").exists());
    }

    #[test]
    fn explicit_no_declines() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());

        ubiq480()
            .current_dir(dir.path())
            .arg("-c")
            .arg(&cfg)
            .arg("kernel")
            .write_stdin("n\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("cancelled"));

        assert!(!dir.path().join("output").join("zImage").exists());
    }

    #[test]
    fn menu_without_stages_can_be_cancelled() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());

        ubiq480()
            .current_dir(dir.path())
            .arg("-c")
            .arg(&cfg)
            .write_stdin("abc\nq\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("1) bootloader"))
            .stdout(predicate::str::contains("Selections must be numeric."))
            .stdout(predicate::str::contains("Nothing selected"));
    }

    #[test]
    fn check_deps_reports_without_installing() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());

        ubiq480()
            .current_dir(dir.path())
            .args(["--check-deps", "-c"])
            .arg(&cfg)
            .assert()
            .code(predicate::in_iter([0, 3]))
            .stdout(predicate::str::contains("git"));
    }
}
