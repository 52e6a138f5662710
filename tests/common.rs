//! Common utilities for tests
#![allow(dead_code)]

use std::{
    io,
    sync::atomic::{AtomicI64, Ordering},
};

use pseudo_fs::{
    disk::{BlockDevice, RamDisk},
    fs::{config::FormatOptions, super_block::SuperBlock, FileSystem, TypeFilter},
};

pub fn options(disk_size: u64, cluster_size: u32, inode_count: u32) -> FormatOptions {
    FormatOptions {
        disk_size,
        cluster_size,
        inode_count,
        signature: "tester".into(),
        descriptor: "integration test volume".into(),
    }
}

/// 内存中格式化好的文件系统
pub fn ram_fs(disk_size: u64, cluster_size: u32, inode_count: u32) -> FileSystem<RamDisk> {
    let opts = options(disk_size, cluster_size, inode_count);
    let layout = SuperBlock::new(&opts).unwrap();
    FileSystem::format(RamDisk::new(layout.image_len() as usize), &opts).unwrap()
}

/// 不是简单重复的测试数据
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

pub fn read_all<D: BlockDevice>(fs: &FileSystem<D>, path: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    fs.read_file(path, &mut buf).unwrap();
    buf
}

pub fn names<D: BlockDevice>(fs: &FileSystem<D>, dir: &str) -> Vec<String> {
    fs.list(Some(dir))
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect()
}

pub fn resolve_dir<D: BlockDevice>(fs: &FileSystem<D>, path: &str) -> u32 {
    fs.resolve(path, TypeFilter::Directory).unwrap()
}

/// 包一层 RamDisk，可以让数据区的某一次写入失败一次
pub struct FlakyDisk {
    inner: RamDisk,
    data_start: u64,
    countdown: AtomicI64, // 负数表示不注入错误
}

impl FlakyDisk {
    pub fn new(len: usize, data_start: u64) -> Self {
        Self {
            inner: RamDisk::new(len),
            data_start,
            countdown: AtomicI64::new(-1),
        }
    }

    /// 再放行 `writes` 次数据区写入，之后的下一次失败
    pub fn fail_after(&self, writes: i64) {
        self.countdown.store(writes, Ordering::SeqCst);
    }
}

impl BlockDevice for FlakyDisk {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_at(offset, buf)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()> {
        if offset >= self.data_start {
            let left = self.countdown.load(Ordering::SeqCst);
            if left == 0 {
                self.countdown.store(-1, Ordering::SeqCst);
                return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
            }
            if left > 0 {
                self.countdown.store(left - 1, Ordering::SeqCst);
            }
        }
        self.inner.write_at(offset, buf)
    }

    fn len(&self) -> io::Result<u64> {
        self.inner.len()
    }

    fn flush(&self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub fn flaky_fs(disk_size: u64, cluster_size: u32, inode_count: u32) -> FileSystem<FlakyDisk> {
    let opts = options(disk_size, cluster_size, inode_count);
    let layout = SuperBlock::new(&opts).unwrap();
    let disk = FlakyDisk::new(layout.image_len() as usize, u64::from(layout.data_start));
    FileSystem::format(disk, &opts).unwrap()
}
