use crate::{
    disk::{InodeId, DEFAULT_CLUSTER_SIZE, DEFAULT_DISK_SIZE, DEFAULT_INODE_COUNT},
    utils::default_signature,
};

/// 超级块魔数，挂载时用来识别文件系统
pub const MAGIC: [u8; 4] = *b"PSFS";

/// 根目录永远是 0 号 i-node
pub const ROOT_INODE_ID: InodeId = 0;

/// 每个 i-node 的直接簇指针个数
pub const DIRECT_LINKS: usize = 5;

/// 间接簇指针个数（一级间接 1、一级间接 2）
pub const INDIRECT_LINKS: usize = 2;

/// 目录项名字的定长字节数（不足补 0）
pub const NAME_LEN: usize = 12;

pub const SIGNATURE_LEN: usize = 10;
pub const DESCRIPTOR_LEN: usize = 251;
pub const DEFAULT_DESCRIPTOR: &str = "inodes pseudo file system";

/// 磁盘上表示“无链接”的哨兵值
pub const NO_LINK: i32 = -1;

// 各结构序列化后的固定字节数（bincode 定长整数编码，无填充）
pub const SUPER_BLOCK_SIZE: u32 = 317;
pub const BITMAP_HEADER_SIZE: u32 = 4;
pub const INODE_TABLE_HEADER_SIZE: u32 = 4;
pub const INODE_SIZE: u32 = 53;
pub const DIR_HEADER_SIZE: u32 = 4;
pub const DIR_ENTRY_SIZE: u32 = 16;

/// 间接块里每个簇编号占 4 字节
pub const CLUSTER_LINK_SIZE: u32 = 4;

/// 簇至少要能放下一个只有 `.` 和 `..` 的目录
pub const MIN_CLUSTER_SIZE: u32 = DIR_HEADER_SIZE + 2 * DIR_ENTRY_SIZE;

/// 格式化参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    pub disk_size: u64,
    pub cluster_size: u32,
    pub inode_count: u32,
    pub signature: String,
    pub descriptor: String,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            disk_size: DEFAULT_DISK_SIZE,
            cluster_size: DEFAULT_CLUSTER_SIZE,
            inode_count: DEFAULT_INODE_COUNT,
            signature: default_signature(),
            descriptor: DEFAULT_DESCRIPTOR.to_string(),
        }
    }
}

impl FormatOptions {
    pub fn with_disk_size(&self, disk_size: u64) -> Self {
        Self {
            disk_size,
            ..self.clone()
        }
    }
}
