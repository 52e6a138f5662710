/// 数据区中的簇编号，从 0 开始。
pub type ClusterId = u32;

/// i-node 在 i-node 表中的下标。
pub type InodeId = u32;

/// 虚拟磁盘默认大小（字节）：2,000,000 B
pub const DEFAULT_DISK_SIZE: u64 = 2_000_000;

/// 默认簇大小（字节）
/// 文件系统以“簇”为最小分配单位。
pub const DEFAULT_CLUSTER_SIZE: u32 = 1000;

/// 默认 i-node 数量
pub const DEFAULT_INODE_COUNT: u32 = 100;

/// 命令行未给出镜像路径时使用的文件名
pub const DEFAULT_IMAGE_PATH: &str = "myFS";

/// 创建镜像时每次写入的零块大小（64KB）
pub const ZERO_FILL_CHUNK: usize = 64 * 1024;
