//! System-wide constants and default paths.

/// Root directory holding per-container writable layers and scratch dirs.
pub const DEFAULT_ROOT_DIR: &str = "/var/lib/burrow";

/// Directory under which each container's merged rootfs is mounted.
pub const DEFAULT_MOUNT_ROOT: &str = "/var/lib/burrow/mnt";

/// Directory holding one info directory per container.
pub const DEFAULT_INFO_ROOT: &str = "/var/run/burrow";

/// Default read-only base image, provisioned out of band.
pub const DEFAULT_BASE_IMAGE: &str = "/var/lib/burrow/busybox";

/// Subdirectory of the root dir holding writable layers.
pub const WRITE_LAYER_DIR: &str = "writeLayer";

/// Subdirectory of the root dir holding overlay work dirs.
pub const WORK_DIR: &str = "work";

/// File name of a batch container's stdout log inside its info directory.
pub const CONTAINER_LOG_FILE: &str = "container.log";

/// File name of the container info record inside its info directory.
pub const CONTAINER_RECORD_FILE: &str = "config.json";

/// Cgroups v2 unified hierarchy mount point.
pub const CGROUP_V2_PATH: &str = "/sys/fs/cgroup";

/// Kernel filesystem-type registry.
pub const PROC_FILESYSTEMS: &str = "/proc/filesystems";

/// Mount table of the calling process.
pub const PROC_SELF_MOUNTINFO: &str = "/proc/self/mountinfo";

/// Path used by the launcher to re-invoke its own executable.
pub const SELF_EXE: &str = "/proc/self/exe";

/// Marker argument routing a re-invocation to the container initializer.
pub const INIT_MARKER: &str = "init";

/// Hidden directory under the new root where the old root is parked.
pub const PIVOT_PARKING_DIR: &str = ".pivot_root";

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "BURROW_CONFIG";

/// Application name used in CLI output.
pub const APP_NAME: &str = "burrow";
