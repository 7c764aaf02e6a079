//! Integration tests for launch preparation.

use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use cresta::filesystem::{
    BindFlags, MountPolicy, bind_mount, resolve_within_rootfs, validate_mount_destination,
};
use cresta::runtime::{CommandRun, ConfigsMerger, Launcher, RuntimeConfig, SiteConfig};
use cresta_oci::ImageConfig;

#[test]
fn symlinked_destination_is_confined_and_validated() {
    let rootfs = TempDir::new().unwrap();
    std::fs::create_dir_all(rootfs.path().join("state/123")).unwrap();
    // An absolute symlink inside the image must be re-anchored at the rootfs.
    symlink("/state/123", rootfs.path().join("current")).unwrap();

    let resolved = validate_mount_destination(
        Path::new("/current/logs"),
        &MountPolicy::default(),
        rootfs.path(),
    )
    .unwrap();

    assert_eq!(resolved, rootfs.path().join("state/123/logs"));
    assert!(resolved.starts_with(rootfs.path()));
}

#[test]
fn escape_attempts_resolve_inside_the_rootfs() {
    let rootfs = TempDir::new().unwrap();
    symlink("/etc", rootfs.path().join("etc-link")).unwrap();

    for attempt in ["/../../../etc/passwd", "/etc-link/passwd"] {
        let resolved = resolve_within_rootfs(rootfs.path(), Path::new(attempt)).unwrap();
        assert_eq!(resolved, rootfs.path().join("etc/passwd"));
    }
}

#[test]
#[cfg(target_os = "linux")]
fn readonly_bind_blocks_writes_in_the_destination() {
    use rustix::mount::{UnmountFlags, unmount};

    // Mounting needs CAP_SYS_ADMIN.
    if !rustix::process::getuid().is_root() {
        eprintln!("skipping: requires root");
        return;
    }

    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source");
    std::fs::create_dir(&source).unwrap();

    let flags = BindFlags {
        recursive: true,
        private: true,
        ..BindFlags::default()
    };

    let readonly_destination = dir.path().join("readonly");
    bind_mount(
        &source,
        &readonly_destination,
        BindFlags {
            readonly: true,
            ..flags
        },
    )
    .unwrap();
    assert!(std::fs::write(readonly_destination.join("file"), b"data").is_err());
    unmount(&readonly_destination, UnmountFlags::DETACH).unwrap();

    let writable_destination = dir.path().join("writable");
    bind_mount(&source, &writable_destination, flags).unwrap();
    std::fs::write(writable_destination.join("file"), b"data").unwrap();
    unmount(&writable_destination, UnmountFlags::DETACH).unwrap();
}

#[test]
fn image_metadata_flows_into_the_merged_configuration() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.json");
    std::fs::write(
        &config_path,
        r#"{
            "architecture": "amd64",
            "os": "linux",
            "config": {
                "Env": ["NVIDIA_VISIBLE_DEVICES=all", "LANG=C.UTF-8"],
                "Entrypoint": ["/opt/app/entry.sh"],
                "Cmd": ["--serve"],
                "WorkingDir": "/opt/app"
            }
        }"#,
    )
    .unwrap();

    let metadata = ImageConfig::from_file(&config_path)
        .unwrap()
        .to_metadata()
        .unwrap();

    let command_run = CommandRun {
        host_environment: [
            ("CUDA_VISIBLE_DEVICES".to_string(), "3,1,5".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ]
        .into_iter()
        .collect(),
        use_mpi: true,
        ..CommandRun::default()
    };
    let config = RuntimeConfig::new(SiteConfig::default(), command_run);

    let merged = ConfigsMerger::new(&config, &metadata).merged().unwrap();

    assert_eq!(merged.cwd, PathBuf::from("/opt/app"));
    assert_eq!(merged.command, vec!["/opt/app/entry.sh", "--serve"]);
    assert_eq!(merged.environment["LANG"], "C.UTF-8");
    assert_eq!(merged.environment["PATH"], "/usr/bin");
    assert_eq!(merged.environment["CUDA_VISIBLE_DEVICES"], "1,0,2");
    assert_eq!(merged.environment["NVIDIA_VISIBLE_DEVICES"], "3,1,5");
    assert_eq!(merged.environment["NVIDIA_DRIVER_CAPABILITIES"], "all");
    assert_eq!(merged.environment["SARUS_MPI_HOOK"], "1");
}

#[test]
fn launcher_produces_a_bundle_from_the_merged_configuration() {
    let dir = TempDir::new().unwrap();
    let site = SiteConfig {
        local_repository_base_dir: dir.path().to_path_buf(),
        ..SiteConfig::default()
    };
    let command_run = CommandRun {
        exec_args: vec!["hostname".to_string()],
        ..CommandRun::default()
    };

    let launcher = Launcher::new(
        RuntimeConfig::new(site, command_run),
        cresta_common::ImageMetadata::default(),
    );

    let merged = launcher.merged_launch_config().unwrap();
    let config_path = launcher.write_bundle_config(&merged).unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(config_path).unwrap()).unwrap();
    assert_eq!(written["process"]["args"][0], "hostname");
    assert_eq!(written["process"]["cwd"], "/");
    assert_eq!(written["root"]["path"], "rootfs");
}
