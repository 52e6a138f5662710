use crate::{
    disk::{BlockDevice, ClusterId},
    fs::{
        config::{CLUSTER_LINK_SIZE, DIRECT_LINKS},
        error::{FileSystemError, Result},
        inode_table::{ClusterLinks, ClusterRef, Inode},
        super_block::SuperBlock,
    },
};

/// 数据区：按簇读写，以及间接块（簇编号数组）的编解码
#[derive(Debug, Clone, Copy)]
pub struct DataArea {
    start: u64,
    cluster_size: u32,
    cluster_count: u32,
}

/// 一次分配得到的文件簇布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileExtent {
    pub links: ClusterLinks,
    pub data: Vec<ClusterId>, // 按逻辑顺序排列的数据簇
}

impl FileExtent {
    /// 把按分配顺序得到的簇拆成：直接链接、间接块、溢出数据簇
    pub fn assemble(data_clusters: u64, allocated: &[ClusterId]) -> Result<Self> {
        let data_clusters = data_clusters as usize;
        let direct = data_clusters.min(DIRECT_LINKS);
        let indirect = allocated
            .len()
            .checked_sub(data_clusters)
            .filter(|&n| n <= 2)
            .ok_or_else(|| {
                FileSystemError::Corrupted(format!(
                    "{} clusters cannot hold {} data clusters",
                    allocated.len(),
                    data_clusters
                ))
            })?;

        let mut links = ClusterLinks::default();
        for (slot, &cluster) in links.directs.iter_mut().zip(&allocated[..direct]) {
            *slot = Some(cluster);
        }
        let blocks = &allocated[direct..direct + indirect];
        links.indirect1 = blocks.first().copied();
        links.indirect2 = blocks.get(1).copied();

        let mut data = allocated[..direct].to_vec();
        data.extend_from_slice(&allocated[direct + indirect..]);
        Ok(Self { links, data })
    }

    /// 数据簇加上间接块
    pub fn all_clusters(&self) -> impl Iterator<Item = ClusterId> + '_ {
        self.data.iter().copied().chain(self.links.indirect_blocks())
    }
}

impl DataArea {
    pub fn new(super_block: &SuperBlock) -> Self {
        Self {
            start: u64::from(super_block.data_start),
            cluster_size: super_block.cluster_size,
            cluster_count: super_block.cluster_count,
        }
    }

    pub fn cluster_size(&self) -> u32 {
        self.cluster_size
    }

    pub fn links_per_cluster(&self) -> u32 {
        self.cluster_size / CLUSTER_LINK_SIZE
    }

    fn offset(&self, cluster: ClusterId) -> Result<u64> {
        if cluster >= self.cluster_count {
            return Err(FileSystemError::Corrupted(format!(
                "cluster {} is outside the data area",
                cluster
            )));
        }
        Ok(self.start + u64::from(cluster) * u64::from(self.cluster_size))
    }

    pub fn read_cluster<D: BlockDevice>(&self, disk: &D, cluster: ClusterId) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.cluster_size as usize];
        disk.read_at(self.offset(cluster)?, &mut buf)?;
        Ok(buf)
    }

    /// 写一个簇，不足一簇的部分补 0
    pub fn write_cluster<D: BlockDevice>(
        &self,
        disk: &D,
        cluster: ClusterId,
        data: &[u8],
    ) -> Result<()> {
        if data.len() > self.cluster_size as usize {
            return Err(FileSystemError::Corrupted(format!(
                "{} bytes do not fit in one cluster",
                data.len()
            )));
        }
        let mut buf = vec![0u8; self.cluster_size as usize];
        buf[..data.len()].copy_from_slice(data);
        disk.write_at(self.offset(cluster)?, &buf)?;
        Ok(())
    }

    /// 读间接块中的前 `count` 个簇编号
    pub fn read_links<D: BlockDevice>(
        &self,
        disk: &D,
        block: ClusterId,
        count: usize,
    ) -> Result<Vec<ClusterId>> {
        let raw = self.read_cluster(disk, block)?;
        let links: Vec<ClusterId> = raw
            .chunks_exact(CLUSTER_LINK_SIZE as usize)
            .take(count)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        if links.len() < count {
            return Err(FileSystemError::Corrupted(format!(
                "indirect block {} cannot hold {} links",
                block, count
            )));
        }
        Ok(links)
    }

    pub fn write_links<D: BlockDevice>(
        &self,
        disk: &D,
        block: ClusterId,
        links: &[ClusterId],
    ) -> Result<()> {
        let bytes: Vec<u8> = links.iter().flat_map(|c| c.to_le_bytes()).collect();
        self.write_cluster(disk, block, &bytes)
    }

    /// 按逻辑顺序还原 i-node 的数据簇：直接链接，然后间接块 1，然后间接块 2
    pub fn enumerate_data_clusters<D: BlockDevice>(
        &self,
        disk: &D,
        inode: &Inode,
    ) -> Result<Vec<ClusterId>> {
        let count = u64::from(inode.count_clusters);
        let per = self.links_per_cluster();
        let missing = |what: &str| {
            FileSystemError::Corrupted(format!("inode {} is missing its {}", inode.node_id, what))
        };

        let overflow = count.saturating_sub(DIRECT_LINKS as u64);
        let first = overflow.min(u64::from(per)) as usize;
        let second = overflow.saturating_sub(u64::from(per)) as usize;
        let indirect1 = if first > 0 {
            let block = inode.indirect1.ok_or_else(|| missing("first indirect block"))?;
            self.read_links(disk, block, first)?
        } else {
            Vec::new()
        };
        let indirect2 = if second > 0 {
            let block = inode.indirect2.ok_or_else(|| missing("second indirect block"))?;
            self.read_links(disk, block, second)?
        } else {
            Vec::new()
        };

        (0..count)
            .map(|index| match ClusterRef::locate(index, per) {
                Some(ClusterRef::Direct(slot)) => inode.directs[slot as usize]
                    .ok_or_else(|| missing("direct link")),
                Some(ClusterRef::Indirect1(pos)) => Ok(indirect1[pos as usize]),
                Some(ClusterRef::Indirect2(pos)) => Ok(indirect2[pos as usize]),
                None => Err(FileSystemError::TooLarge {
                    clusters: count,
                    limit: DIRECT_LINKS as u64 + 2 * u64::from(per),
                }),
            })
            .collect()
    }

    /// 写入文件内容和间接块数组
    pub fn write_file<D: BlockDevice>(
        &self,
        disk: &D,
        extent: &FileExtent,
        payload: &[u8],
    ) -> Result<()> {
        let chunks = payload.chunks(self.cluster_size as usize);
        if chunks.len() != extent.data.len() {
            return Err(FileSystemError::Corrupted(format!(
                "{} bytes need {} clusters, extent has {}",
                payload.len(),
                chunks.len(),
                extent.data.len()
            )));
        }
        for (&cluster, chunk) in extent.data.iter().zip(chunks) {
            self.write_cluster(disk, cluster, chunk)?;
        }

        let per = self.links_per_cluster() as usize;
        let overflow = extent.data.get(DIRECT_LINKS..).unwrap_or(&[]);
        let mut parts = overflow.chunks(per.max(1));
        for block in extent.links.indirect_blocks() {
            self.write_links(disk, block, parts.next().unwrap_or(&[]))?;
        }
        Ok(())
    }

    /// 读出全部数据簇并截到文件大小
    pub fn read_file<D: BlockDevice>(&self, disk: &D, inode: &Inode) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(inode.file_size as usize);
        for cluster in self.enumerate_data_clusters(disk, inode)? {
            bytes.extend(self.read_cluster(disk, cluster)?);
        }
        bytes.truncate(inode.file_size as usize);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        disk::RamDisk,
        fs::{
            config::FormatOptions,
            inode_table::{InodeKind, InodeTable},
        },
    };

    fn area(cluster_size: u32, clusters: u32) -> (DataArea, RamDisk) {
        let sb = SuperBlock::new(&FormatOptions {
            disk_size: u64::from(cluster_size) * u64::from(clusters),
            cluster_size,
            inode_count: 4,
            signature: "t".into(),
            descriptor: "t".into(),
        })
        .unwrap();
        (DataArea::new(&sb), RamDisk::new(sb.image_len() as usize))
    }

    #[test]
    fn assemble_puts_indirect_blocks_after_directs() {
        let allocated: Vec<ClusterId> = (10..19).collect();
        // 8 个数据簇 + 1 个间接块
        let extent = FileExtent::assemble(8, &allocated).unwrap();
        assert_eq!(extent.links.directs, [Some(10), Some(11), Some(12), Some(13), Some(14)]);
        assert_eq!(extent.links.indirect1, Some(15));
        assert_eq!(extent.links.indirect2, None);
        assert_eq!(extent.data, vec![10, 11, 12, 13, 14, 16, 17, 18]);
        assert_eq!(extent.all_clusters().count(), 9);

        assert!(FileExtent::assemble(3, &allocated).is_err());
    }

    #[test]
    fn file_spanning_both_indirect_blocks_reads_back() {
        // 40 字节的簇，每个间接块 10 个链接
        let (area, disk) = area(40, 40);
        let payload: Vec<u8> = (0..(21 * 40 + 7)).map(|i| (i % 251) as u8).collect();
        let clusters = 22u64;
        let allocated: Vec<ClusterId> = (0..24).collect();
        let extent = FileExtent::assemble(clusters, &allocated).unwrap();
        area.write_file(&disk, &extent, &payload).unwrap();

        let mut table = InodeTable::new(1, 0);
        table
            .initialize_inode(0, 0, InodeKind::File, payload.len() as u64, 22, extent.links)
            .unwrap();
        let inode = table.get(0).unwrap();

        assert_eq!(area.enumerate_data_clusters(&disk, inode).unwrap(), extent.data);
        assert_eq!(area.read_file(&disk, inode).unwrap(), payload);
    }

    #[test]
    fn out_of_range_cluster_is_rejected() {
        let (area, disk) = area(40, 2);
        assert!(area.write_cluster(&disk, 2, b"x").is_err());
        assert!(area.write_cluster(&disk, 1, &[0u8; 41]).is_err());
    }
}
