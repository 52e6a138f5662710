use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};

use crate::{
    disk::FileDisk,
    fs::{config::FormatOptions, error::Result, super_block::SuperBlock, FileSystem},
};

/// 打开镜像；文件不存在时按 `options` 新建并格式化
pub fn open_or_format(path: &Path, options: &FormatOptions) -> Result<FileSystem> {
    if path.exists() {
        info!("mounting {}", path.display());
        FileSystem::mount(FileDisk::open(path)?)
    } else {
        // 只有“明确是新磁盘”才格式化
        warn!("{} not found, formatting a new file system", path.display());
        format_image(path, options)
    }
}

/// 重建镜像文件并写入全新的文件系统
pub fn format_image(path: &Path, options: &FormatOptions) -> Result<FileSystem> {
    // 先校验参数，避免参数非法时把旧镜像截断
    let layout = SuperBlock::new(options)?;
    let disk = FileDisk::create(path, layout.image_len())?;
    FileSystem::format(disk, options)
}

/// 替换一个正在使用的镜像：先在同目录的临时文件里格式化，成功后再改名覆盖。
/// 任何一步失败，原镜像都保持不变
pub fn reformat_image(path: &Path, options: &FormatOptions) -> Result<FileSystem> {
    let staging = staging_path(path);
    let result = format_image(&staging, options)
        .and_then(|new_fs| fs::rename(&staging, path).map(|()| new_fs).map_err(Into::into));
    if result.is_err() && staging.is_file() {
        if let Err(e) = fs::remove_file(&staging) {
            debug!("cannot remove {}: {}", staging.display(), e);
        }
    }
    result
}

/// 重新格式化时使用的临时镜像路径
pub fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "image".to_string(), |n| n.to_string_lossy().into_owned());
    path.with_file_name(format!(".{}.formatting", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_then_mounts_existing_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("myFS");
        let options = FormatOptions::default().with_disk_size(20_000);

        let mut fs = open_or_format(&path, &options).unwrap();
        fs.make_directory("kept").unwrap();
        drop(fs);

        let fs = open_or_format(&path, &options).unwrap();
        assert!(fs.list(Some("/kept")).is_ok());
    }

    #[test]
    fn invalid_parameters_leave_old_image_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("myFS");
        let options = FormatOptions::default().with_disk_size(20_000);
        drop(format_image(&path, &options).unwrap());
        let before = std::fs::metadata(&path).unwrap().len();

        assert!(format_image(&path, &options.with_disk_size(0)).is_err());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), before);
        assert!(FileSystem::mount(FileDisk::open(&path).unwrap()).is_ok());
    }

    #[test]
    fn reformat_keeps_old_image_until_the_new_one_is_ready() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("myFS");
        let options = FormatOptions::default().with_disk_size(20_000);
        let mut fs = format_image(&path, &options).unwrap();
        fs.make_directory("kept").unwrap();

        // 临时文件的位置被目录占住，新镜像建不起来
        let staging = staging_path(&path);
        std::fs::create_dir(&staging).unwrap();
        assert!(reformat_image(&path, &options).is_err());
        assert!(fs.list(Some("/kept")).is_ok());
        let mounted = FileSystem::mount(FileDisk::open(&path).unwrap()).unwrap();
        assert!(mounted.list(Some("/kept")).is_ok());

        std::fs::remove_dir(&staging).unwrap();
        let fresh = reformat_image(&path, &options.with_disk_size(30_000)).unwrap();
        assert_eq!(fresh.super_block().cluster_count, 30);
        assert!(!staging.exists());
        let mounted = FileSystem::mount(FileDisk::open(&path).unwrap()).unwrap();
        assert!(mounted.list(Some("/kept")).is_err());
    }
}
