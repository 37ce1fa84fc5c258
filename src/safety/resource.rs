/// Precondition checks on backing devices and image files before they are locked
use crate::config::types::ResourceStateError;
use std::fs;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::Path;

/// What a backing resource is expected to be
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    /// A block device (a character device is also accepted off Linux)
    BlockDevice,
    /// A regular file owned by the privileged uid and not writable by others
    TrustedFile { privileged_uid: u32 },
    Directory,
}

/// Stat `path` and check it against `kind`
pub fn check_resource(path: &Path, kind: ResourceKind) -> Result<(), ResourceStateError> {
    let metadata = fs::metadata(path).map_err(|source| ResourceStateError::Stat {
        path: path.to_path_buf(),
        source,
    })?;
    let file_type = metadata.file_type();

    match kind {
        ResourceKind::BlockDevice => {
            let acceptable = file_type.is_block_device()
                || (cfg!(not(target_os = "linux")) && file_type.is_char_device());
            if !acceptable {
                return Err(ResourceStateError::NotBlockDevice {
                    path: path.to_path_buf(),
                });
            }
        }
        ResourceKind::TrustedFile { privileged_uid } => {
            if !file_type.is_file() {
                return Err(ResourceStateError::NotRegularFile {
                    path: path.to_path_buf(),
                });
            }
            if metadata.uid() != privileged_uid {
                return Err(ResourceStateError::WrongOwner {
                    path: path.to_path_buf(),
                    uid: metadata.uid(),
                    expected: privileged_uid,
                });
            }
            if metadata.mode() & 0o002 != 0 {
                return Err(ResourceStateError::WorldWritable {
                    path: path.to_path_buf(),
                });
            }
        }
        ResourceKind::Directory => {
            if !file_type.is_dir() {
                return Err(ResourceStateError::NotDirectory {
                    path: path.to_path_buf(),
                });
            }
        }
    }

    Ok(())
}
