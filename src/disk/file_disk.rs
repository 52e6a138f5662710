use std::{
    fs::{File, OpenOptions},
    io::{Error, ErrorKind, Read, Result, Seek, SeekFrom, Write},
    path::Path,
    sync::{Mutex, MutexGuard},
};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use crate::disk::{block_device::BlockDevice, types::ZERO_FILL_CHUNK};

/// 以宿主机上的一个普通文件作为虚拟磁盘
#[derive(Debug)]
pub struct FileDisk {
    file: Mutex<File>,
}

impl FileDisk {
    /// 打开已经存在的镜像文件
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        debug!("opened backing store {}", path.display());

        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// 创建（或截断重建）一个长度为 `len` 字节、内容全为 0 的镜像文件
    pub fn create(path: impl AsRef<Path>, len: u64) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        info!("allocating {} bytes for {}", len, path.display());

        // 终端之外 indicatif 不会绘制进度条
        let pb = ProgressBar::new(len);
        let template = "[{bar:40.green/black}] {bytes}/{total_bytes} {msg}";
        if let Ok(style) = ProgressStyle::with_template(template) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message("allocating disk space");

        let zeros = vec![0u8; ZERO_FILL_CHUNK];
        let mut written = 0u64;
        while written < len {
            let chunk = (len - written).min(ZERO_FILL_CHUNK as u64) as usize;
            file.write_all(&zeros[..chunk])?;
            written += chunk as u64;
            pb.set_position(written);
        }
        file.flush()?;
        pb.finish_and_clear();

        Ok(Self {
            file: Mutex::new(file),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, File>> {
        self.file
            .lock()
            .map_err(|_| Error::new(ErrorKind::Other, "backing store lock poisoned"))
    }
}

impl BlockDevice for FileDisk {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = self.lock()?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut file = self.lock()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.lock()?.metadata()?.len())
    }

    fn flush(&self) -> Result<()> {
        let mut file = self.lock()?;
        file.flush()?;
        file.sync_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_zero_fills_and_reopen_sees_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");

        let disk = FileDisk::create(&path, 200_000).unwrap();
        assert_eq!(disk.len().unwrap(), 200_000);

        let mut buf = [0xAAu8; 16];
        disk.read_at(150_000, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 16]);

        disk.write_at(10, b"hello").unwrap();
        disk.flush().unwrap();
        drop(disk);

        let disk = FileDisk::open(&path).unwrap();
        let mut buf = [0u8; 5];
        disk.read_at(10, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn read_past_end_fails() {
        let dir = tempfile::tempdir().unwrap();
        let disk = FileDisk::create(dir.path().join("small.img"), 8).unwrap();
        let mut buf = [0u8; 16];
        assert!(disk.read_at(0, &mut buf).is_err());
    }
}
