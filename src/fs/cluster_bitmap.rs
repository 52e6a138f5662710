use log::{trace, warn};

use crate::{
    disk::{BlockDevice, ClusterId},
    fs::{
        config::BITMAP_HEADER_SIZE,
        error::{FileSystemError, Result},
    },
};

/// 簇位图：每个簇一个布尔值，`true` 表示空闲。
///
/// 磁盘格式为 4 字节簇数头，后跟每簇一个字节（1 = 空闲）。
/// 分配以位图为准，i-node 里记录的链接只是缓存。
#[derive(Debug, Clone)]
pub struct ClusterBitmap {
    cluster_free: Vec<bool>,
    free_clusters: u32,
    offset: u64, // 位图在磁盘上的起始字节偏移
}

impl ClusterBitmap {
    /// 所有簇都空闲
    pub fn new(cluster_count: u32, offset: u64) -> Self {
        Self {
            cluster_free: vec![true; cluster_count as usize],
            free_clusters: cluster_count,
            offset,
        }
    }

    pub fn len(&self) -> u32 {
        self.cluster_free.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.cluster_free.is_empty()
    }

    pub fn free_clusters(&self) -> u32 {
        self.free_clusters
    }

    pub fn is_free(&self, cluster: ClusterId) -> bool {
        self.cluster_free
            .get(cluster as usize)
            .copied()
            .unwrap_or(false)
    }

    /// 只回答是否至少有 `n` 个空闲簇，不做预留
    pub fn find_n_free_clusters(&self, n: u64) -> bool {
        u64::from(self.free_clusters) >= n
    }

    /// 编号最小的空闲簇。不会改位图，调用方需要自己 `mark_used`
    pub fn allocate_one_cluster(&self) -> Option<ClusterId> {
        self.cluster_free
            .iter()
            .position(|&free| free)
            .map(|i| i as ClusterId)
    }

    pub fn mark_used(&mut self, cluster: ClusterId) -> Result<()> {
        match self.cluster_free.get_mut(cluster as usize) {
            Some(free) if *free => {
                *free = false;
                self.free_clusters -= 1;
                Ok(())
            }
            Some(_) => Err(FileSystemError::Corrupted(format!(
                "cluster {} is already in use",
                cluster
            ))),
            None => Err(FileSystemError::Corrupted(format!(
                "cluster {} is out of range",
                cluster
            ))),
        }
    }

    /// 释放一个簇，重复释放无副作用
    pub fn free(&mut self, cluster: ClusterId) {
        match self.cluster_free.get_mut(cluster as usize) {
            Some(free) if !*free => {
                *free = true;
                self.free_clusters += 1;
            }
            Some(_) => {}
            None => warn!("ignoring release of out-of-range cluster {}", cluster),
        }
    }

    /// 依次取 `n` 个最小编号的空闲簇并标记为已用
    pub fn allocate(&mut self, n: u64) -> Result<Vec<ClusterId>> {
        if !self.find_n_free_clusters(n) {
            return Err(FileSystemError::NoFreeClusters {
                needed: u32::try_from(n).unwrap_or(u32::MAX),
                available: self.free_clusters,
            });
        }

        let mut clusters = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let cluster = self
                .allocate_one_cluster()
                .ok_or(FileSystemError::NoFreeClusters {
                    needed: 1,
                    available: 0,
                })?;
            self.mark_used(cluster)?;
            clusters.push(cluster);
        }
        trace!("allocated clusters {:?}", clusters);
        Ok(clusters)
    }

    pub fn used_clusters(&self) -> impl Iterator<Item = ClusterId> + '_ {
        self.cluster_free
            .iter()
            .enumerate()
            .filter(|(_, free)| !**free)
            .map(|(i, _)| i as ClusterId)
    }

    // 从磁盘加载簇位图
    pub fn load<D: BlockDevice>(disk: &D, offset: u64, cluster_count: u32) -> Result<Self> {
        let mut bytes = vec![0u8; (BITMAP_HEADER_SIZE + cluster_count) as usize];
        disk.read_at(offset, &mut bytes)?;

        let (header, body) = bytes.split_at(BITMAP_HEADER_SIZE as usize);
        let recorded = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        if recorded != cluster_count {
            return Err(FileSystemError::Corrupted(format!(
                "bitmap header says {} clusters, superblock says {}",
                recorded, cluster_count
            )));
        }

        let cluster_free = body
            .iter()
            .map(|&b| match b {
                0 => Ok(false),
                1 => Ok(true),
                other => Err(FileSystemError::Corrupted(format!(
                    "bitmap byte {:#04x} is neither free nor used",
                    other
                ))),
            })
            .collect::<Result<Vec<bool>>>()?;
        let free_clusters = cluster_free.iter().filter(|&&free| free).count() as u32;

        Ok(Self {
            cluster_free,
            free_clusters,
            offset,
        })
    }

    // 将簇位图写回磁盘
    pub fn sync<D: BlockDevice>(&self, disk: &D) -> Result<()> {
        let mut bytes = Vec::with_capacity(BITMAP_HEADER_SIZE as usize + self.cluster_free.len());
        bytes.extend_from_slice(&self.len().to_le_bytes());
        bytes.extend(self.cluster_free.iter().map(|&free| u8::from(free)));
        disk.write_at(self.offset, &bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::RamDisk;

    #[test]
    fn lowest_free_cluster_is_reported_but_not_taken() {
        let mut bitmap = ClusterBitmap::new(4, 0);
        assert_eq!(bitmap.allocate_one_cluster(), Some(0));
        assert_eq!(bitmap.allocate_one_cluster(), Some(0));

        bitmap.mark_used(0).unwrap();
        assert_eq!(bitmap.allocate_one_cluster(), Some(1));
        assert_eq!(bitmap.free_clusters(), 3);
        assert!(bitmap.mark_used(0).is_err());
        assert!(bitmap.mark_used(4).is_err());
    }

    #[test]
    fn allocate_is_all_or_nothing() {
        let mut bitmap = ClusterBitmap::new(3, 0);
        assert_eq!(bitmap.allocate(2).unwrap(), vec![0, 1]);
        assert!(matches!(
            bitmap.allocate(2),
            Err(FileSystemError::NoFreeClusters {
                needed: 2,
                available: 1
            })
        ));
        assert_eq!(bitmap.free_clusters(), 1);
    }

    #[test]
    fn free_is_idempotent() {
        let mut bitmap = ClusterBitmap::new(3, 0);
        bitmap.allocate(3).unwrap();
        bitmap.free(1);
        bitmap.free(1);
        bitmap.free(9);
        assert_eq!(bitmap.free_clusters(), 1);
        assert_eq!(bitmap.used_clusters().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(bitmap.allocate_one_cluster(), Some(1));
    }

    #[test]
    fn survives_sync_and_load() {
        let disk = RamDisk::new(64);
        let mut bitmap = ClusterBitmap::new(10, 8);
        bitmap.allocate(3).unwrap();
        bitmap.free(1);
        bitmap.sync(&disk).unwrap();

        let raw = disk.snapshot().unwrap();
        assert_eq!(&raw[8..12], &10u32.to_le_bytes());
        assert_eq!(&raw[12..16], &[0, 1, 0, 1]);

        let loaded = ClusterBitmap::load(&disk, 8, 10).unwrap();
        assert_eq!(loaded.free_clusters(), 8);
        assert!(!loaded.is_free(0));
        assert!(loaded.is_free(1));
        assert!(ClusterBitmap::load(&disk, 8, 11).is_err());
    }
}
