//! Host-side NFS mounts

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Attaches array exports to the local host
#[async_trait]
pub trait Mounter: Send + Sync {
    /// Mount `export` (`host:/junction`) at `mountpoint`, creating the directory
    async fn mount_nfs(&self, export: &str, mountpoint: &Path, options: &str) -> Result<()>;

    /// Unmount `mountpoint`; an unmounted path is not an error
    async fn unmount(&self, mountpoint: &Path) -> Result<()>;

    async fn is_mounted(&self, mountpoint: &Path) -> Result<bool>;
}

/// [`Mounter`] driving the host's `mount` and `umount` binaries
#[derive(Debug, Default, Clone)]
pub struct NfsMounter;

impl NfsMounter {
    pub fn new() -> Self {
        Self
    }

    async fn run(command: &str, args: &[&str], mountpoint: &Path) -> Result<()> {
        debug!(command, ?args, "Running host command");
        let output = Command::new(command)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Mount {
                mountpoint: mountpoint.display().to_string(),
                reason: format!("failed to run {}: {}", command, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Mount {
                mountpoint: mountpoint.display().to_string(),
                reason: format!("{} exited with {}: {}", command, output.status, stderr.trim()),
            });
        }
        Ok(())
    }
}

/// Whether `/proc/self/mountinfo` content lists `mountpoint`
fn mountinfo_contains(mountinfo: &str, mountpoint: &Path) -> bool {
    let wanted = mountpoint.to_string_lossy();
    mountinfo
        .lines()
        .filter_map(|line| line.split_whitespace().nth(4))
        .any(|target| target == wanted)
}

#[async_trait]
impl Mounter for NfsMounter {
    async fn mount_nfs(&self, export: &str, mountpoint: &Path, options: &str) -> Result<()> {
        if self.is_mounted(mountpoint).await? {
            debug!(mountpoint = %mountpoint.display(), "Already mounted");
            return Ok(());
        }

        fs::create_dir_all(mountpoint).await?;

        let target = mountpoint.to_string_lossy().into_owned();
        let mut args = vec!["-t", "nfs"];
        args.extend(options.split_whitespace());
        args.push(export);
        args.push(target.as_str());
        Self::run("mount", &args, mountpoint).await?;

        info!(export, mountpoint = %mountpoint.display(), "Mounted NFS export");
        Ok(())
    }

    async fn unmount(&self, mountpoint: &Path) -> Result<()> {
        if !self.is_mounted(mountpoint).await? {
            debug!(mountpoint = %mountpoint.display(), "Not mounted");
            return Ok(());
        }

        let target = mountpoint.to_string_lossy().into_owned();
        Self::run("umount", &[target.as_str()], mountpoint).await?;

        if let Err(e) = fs::remove_dir(mountpoint).await {
            warn!(mountpoint = %mountpoint.display(), error = %e, "Could not remove mountpoint directory");
        }
        info!(mountpoint = %mountpoint.display(), "Unmounted");
        Ok(())
    }

    async fn is_mounted(&self, mountpoint: &Path) -> Result<bool> {
        let mountinfo = fs::read_to_string("/proc/self/mountinfo").await?;
        Ok(mountinfo_contains(&mountinfo, mountpoint))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const MOUNTINFO: &str = "\
22 1 8:1 / / rw,relatime shared:1 - ext4 /dev/sda1 rw
97 22 0:45 / /var/lib/ontap-volume-plugin/mnt/trident_vol1 rw,relatime shared:50 - nfs 10.0.0.2:/trident_vol1 rw,vers=3
";

    #[test]
    fn test_mountinfo_contains() {
        assert!(mountinfo_contains(
            MOUNTINFO,
            Path::new("/var/lib/ontap-volume-plugin/mnt/trident_vol1")
        ));
        assert!(mountinfo_contains(MOUNTINFO, Path::new("/")));
        assert!(!mountinfo_contains(
            MOUNTINFO,
            Path::new("/var/lib/ontap-volume-plugin/mnt/trident_vol2")
        ));
    }
}
