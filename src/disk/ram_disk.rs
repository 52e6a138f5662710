use std::{
    io::{Error, ErrorKind, Result},
    sync::{Mutex, MutexGuard},
};

use crate::disk::block_device::BlockDevice;

/// 完全放在内存里的定长虚拟磁盘，主要给测试用
#[derive(Debug)]
pub struct RamDisk {
    bytes: Mutex<Vec<u8>>,
}

impl RamDisk {
    pub fn new(len: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0; len]),
        }
    }

    /// 当前磁盘内容的拷贝
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<u8>>> {
        self.bytes
            .lock()
            .map_err(|_| Error::new(ErrorKind::Other, "ram disk lock poisoned"))
    }

    fn range(len: usize, offset: u64, count: usize) -> Result<std::ops::Range<usize>> {
        let start = usize::try_from(offset)
            .map_err(|_| Error::new(ErrorKind::UnexpectedEof, "offset out of range"))?;
        let end = start
            .checked_add(count)
            .filter(|&end| end <= len)
            .ok_or_else(|| Error::new(ErrorKind::UnexpectedEof, "access past end of ram disk"))?;
        Ok(start..end)
    }
}

impl BlockDevice for RamDisk {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let bytes = self.lock()?;
        let range = Self::range(bytes.len(), offset, buf.len())?;
        buf.copy_from_slice(&bytes[range]);
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut bytes = self.lock()?;
        let range = Self::range(bytes.len(), offset, buf.len())?;
        bytes[range].copy_from_slice(buf);
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.lock()?.len() as u64)
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_enforced() {
        let disk = RamDisk::new(32);
        disk.write_at(28, &[1, 2, 3, 4]).unwrap();
        assert!(disk.write_at(29, &[1, 2, 3, 4]).is_err());

        let mut buf = [0u8; 4];
        disk.read_at(28, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        assert!(disk.read_at(u64::MAX, &mut buf).is_err());
    }
}
