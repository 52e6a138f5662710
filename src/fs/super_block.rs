use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    disk::BlockDevice,
    fs::{
        config::{
            FormatOptions, BITMAP_HEADER_SIZE, CLUSTER_LINK_SIZE, DESCRIPTOR_LEN, DIRECT_LINKS,
            INDIRECT_LINKS, INODE_SIZE, INODE_TABLE_HEADER_SIZE, MAGIC, MIN_CLUSTER_SIZE,
            SIGNATURE_LEN, SUPER_BLOCK_SIZE,
        },
        error::{FileSystemError, Result},
        name::FixedStr,
    },
    utils::{new_volume_id, now_timestamp},
};

/// 超级块：格式化时写入一次，之后只读。
///
/// 三个区域偏移在格式化时由簇数和 i-node 数算出，挂载时只做校验，不再重算。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperBlock {
    pub magic: [u8; 4],                          // 魔数，用于识别文件系统
    pub signature: FixedStr<SIGNATURE_LEN>,      // 作者/用户标识
    pub descriptor: FixedStr<DESCRIPTOR_LEN>,    // 卷描述
    pub volume_id: [u8; 16],                     // 卷 UUID
    pub formatted_at: i64,                       // 格式化时间（Unix 秒）
    pub disk_size: u32,                          // 请求的磁盘大小（字节）
    pub cluster_size: u32,                       // 每簇字节数
    pub cluster_count: u32,                      // 数据区簇数
    pub inode_count: u32,                        // i-node 总数
    /** 各区域起始字节偏移 */
    pub bitmap_start: u32,
    pub inode_start: u32,
    pub data_start: u32,
}

impl SuperBlock {
    pub fn new(options: &FormatOptions) -> Result<Self> {
        let invalid = |msg: &str| FileSystemError::InvalidFormat(msg.to_string());

        if options.disk_size == 0 {
            return Err(invalid("disk size must be positive"));
        }
        if options.cluster_size < MIN_CLUSTER_SIZE {
            return Err(invalid("cluster size cannot hold an empty directory"));
        }
        if options.inode_count == 0 {
            return Err(invalid("at least one inode is required"));
        }

        let disk_size = u32::try_from(options.disk_size)
            .map_err(|_| invalid("disk size does not fit in 32 bits"))?;
        let cluster_count = disk_size.div_ceil(options.cluster_size);

        let bitmap_start = u64::from(SUPER_BLOCK_SIZE);
        let inode_start = bitmap_start + u64::from(BITMAP_HEADER_SIZE) + u64::from(cluster_count);
        let data_start = inode_start
            + u64::from(INODE_TABLE_HEADER_SIZE)
            + u64::from(INODE_SIZE) * u64::from(options.inode_count);
        let image_len = data_start + u64::from(cluster_count) * u64::from(options.cluster_size);
        if image_len > u64::from(u32::MAX) {
            return Err(invalid("image is not addressable with 32-bit offsets"));
        }

        let sb = Self {
            magic: MAGIC,
            signature: FixedStr::truncated(&options.signature),
            descriptor: FixedStr::truncated(&options.descriptor),
            volume_id: new_volume_id(),
            formatted_at: now_timestamp(),
            disk_size,
            cluster_size: options.cluster_size,
            cluster_count,
            inode_count: options.inode_count,
            // 上面已确认 image_len 不超过 u32
            bitmap_start: bitmap_start as u32,
            inode_start: inode_start as u32,
            data_start: data_start as u32,
        };
        debug!("computed layout: {:?}", sb);
        Ok(sb)
    }

    /// 从磁盘偏移 0 处读出超级块并校验布局
    pub fn load<D: BlockDevice>(disk: &D) -> Result<Self> {
        let mut buf = [0u8; SUPER_BLOCK_SIZE as usize];
        disk.read_at(0, &mut buf)?;
        let sb: SuperBlock = bincode::deserialize(&buf)?;

        if sb.magic != MAGIC {
            return Err(FileSystemError::Corrupted("bad magic number".into()));
        }
        sb.check_layout()?;
        if disk.len()? < sb.image_len() {
            return Err(FileSystemError::Corrupted(format!(
                "backing store is shorter than the {} bytes the layout needs",
                sb.image_len()
            )));
        }
        Ok(sb)
    }

    pub fn sync<D: BlockDevice>(&self, disk: &D) -> Result<()> {
        let bytes = bincode::serialize(self)?;
        disk.write_at(0, &bytes)?;
        Ok(())
    }

    fn check_layout(&self) -> Result<()> {
        let consistent = self.cluster_size >= MIN_CLUSTER_SIZE
            && self.inode_count > 0
            && self.cluster_count == self.disk_size.div_ceil(self.cluster_size)
            && u64::from(self.bitmap_start) == u64::from(SUPER_BLOCK_SIZE)
            && u64::from(self.inode_start) == u64::from(self.bitmap_start) + self.bitmap_size()
            && u64::from(self.data_start) == u64::from(self.inode_start) + self.inode_table_size();
        if consistent {
            Ok(())
        } else {
            Err(FileSystemError::Corrupted(
                "superblock offsets do not match its counts".into(),
            ))
        }
    }

    /// 位图区字节数（含 4 字节头）
    pub fn bitmap_size(&self) -> u64 {
        u64::from(BITMAP_HEADER_SIZE) + u64::from(self.cluster_count)
    }

    /// i-node 表字节数（含 4 字节头）
    pub fn inode_table_size(&self) -> u64 {
        u64::from(INODE_TABLE_HEADER_SIZE) + u64::from(INODE_SIZE) * u64::from(self.inode_count)
    }

    /// 整个镜像文件的字节数
    pub fn image_len(&self) -> u64 {
        u64::from(self.data_start) + u64::from(self.cluster_count) * u64::from(self.cluster_size)
    }

    /// 一个间接块能放下的簇编号个数
    pub fn links_per_cluster(&self) -> u32 {
        self.cluster_size / CLUSTER_LINK_SIZE
    }

    /// 单个文件最多能寻址的簇数
    pub fn max_file_clusters(&self) -> u64 {
        DIRECT_LINKS as u64 + INDIRECT_LINKS as u64 * u64::from(self.links_per_cluster())
    }

    pub fn volume_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.volume_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::RamDisk;

    fn options(disk_size: u64, cluster_size: u32, inode_count: u32) -> FormatOptions {
        FormatOptions {
            disk_size,
            cluster_size,
            inode_count,
            signature: "tester".into(),
            descriptor: "unit test volume".into(),
        }
    }

    #[test]
    fn record_is_317_bytes() {
        let sb = SuperBlock::new(&FormatOptions::default()).unwrap();
        assert_eq!(bincode::serialize(&sb).unwrap().len(), SUPER_BLOCK_SIZE as usize);
    }

    #[test]
    fn offsets_follow_counts() {
        let sb = SuperBlock::new(&options(2_000_000, 1000, 100)).unwrap();
        assert_eq!(sb.cluster_count, 2000);
        assert_eq!(sb.bitmap_start, 317);
        assert_eq!(sb.inode_start, 317 + 4 + 2000);
        assert_eq!(sb.data_start, sb.inode_start + 4 + 53 * 100);
        assert_eq!(sb.links_per_cluster(), 250);
        assert_eq!(sb.max_file_clusters(), 505);
    }

    #[test]
    fn partial_cluster_rounds_up() {
        let sb = SuperBlock::new(&options(10_001, 1000, 10)).unwrap();
        assert_eq!(sb.cluster_count, 11);
    }

    #[test]
    fn rejects_unusable_parameters() {
        for bad in [
            options(0, 1000, 100),
            options(10_000, 8, 100),
            options(10_000, 1000, 0),
            options(u64::from(u32::MAX) + 1, 1000, 100),
        ] {
            assert!(matches!(
                SuperBlock::new(&bad),
                Err(FileSystemError::InvalidFormat(_))
            ));
        }
    }

    #[test]
    fn load_checks_magic_and_layout() {
        let sb = SuperBlock::new(&options(10_000, 1000, 10)).unwrap();
        let disk = RamDisk::new(sb.image_len() as usize);
        sb.sync(&disk).unwrap();
        assert_eq!(SuperBlock::load(&disk).unwrap(), sb);

        disk.write_at(0, b"XXXX").unwrap();
        assert!(matches!(
            SuperBlock::load(&disk),
            Err(FileSystemError::Corrupted(_))
        ));
    }
}
