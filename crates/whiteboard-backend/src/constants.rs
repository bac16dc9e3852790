//! Well-known paths used to locate a storage domain on the host.

/// Parent directory under which every mounted storage domain appears as
/// `<dname>/<sd_uuid>`.
pub const SD_MOUNT_PARENT: &str = "/rhev/data-center/mnt";

/// Subdirectory of `SD_MOUNT_PARENT` holding GlusterFS-backed domains.
pub const GLUSTER_SD_SUBDIR: &str = "glusterSD";

/// Name of the directory (and, for LV-backed domains, the LV name prefix)
/// used for whiteboard services.
pub const SD_METADATA_DIR: &str = "ha_agent";

/// The literal directory name that flags a storage domain as block/LV
/// based rather than a plain filesystem mount.
pub const BLOCK_SD_DIRNAME: &str = "blockSD";
