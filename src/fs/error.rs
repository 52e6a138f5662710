use std::fmt;

use crate::fs::path::TypeFilter;

/// 文件系统错误类型
#[derive(Debug)]
pub enum FileSystemError {
    Io(std::io::Error),       // 底层 I/O 错误
    Codec(bincode::Error),    // 结构体编解码失败
    NotFound {
        path: String,
        expected: TypeFilter,
    }, // 路径上某一级不存在
    NotAFile(String),          // 期望文件，实际是目录
    NotADirectory(String),     // 期望目录，实际是文件
    AlreadyExists(String),     // 目标目录里已有同名项
    DirectoryNotEmpty(String), // 目录里除了 . 和 .. 还有别的
    NoFreeInode,               // i-node 表已满
    NoFreeClusters { needed: u32, available: u32 },
    TooLarge { clusters: u64, limit: u64 }, // 超出直接 + 两个间接块的容量
    InvalidName(String),       // 名字为空、过长、含 '/' 或是 . / ..
    InvalidPath(String),       // 不能对该路径执行操作（根目录、当前目录等）
    InvalidFormat(String),     // 格式化参数不合法
    InvalidInode(u32),         // i-node 编号越界
    Corrupted(String),         // 磁盘内容自相矛盾
}

impl FileSystemError {
    pub fn not_found(path: impl Into<String>, expected: TypeFilter) -> Self {
        Self::NotFound {
            path: path.into(),
            expected,
        }
    }

    /// 命令层打印的固定诊断文本，脚本依赖这些字符串
    pub fn diagnostic(&self) -> &'static str {
        match self {
            Self::NotFound {
                expected: TypeFilter::Directory,
                ..
            } => "PATH NOT FOUND",
            Self::NotFound { .. } => "FILE NOT FOUND",
            Self::NotAFile(_) => "FILE NOT FOUND",
            Self::NotADirectory(_) => "PATH NOT FOUND",
            Self::AlreadyExists(_) => "EXISTS",
            Self::DirectoryNotEmpty(_) => "NOT EMPTY",
            Self::NoFreeInode => "NO FREE I-NODES FOUND",
            Self::NoFreeClusters { .. } => "NOT ENOUGH FREE CLUSTERS FOUND",
            Self::TooLarge { .. } => "FILE TOO LARGE",
            Self::InvalidName(_) | Self::InvalidPath(_) => "PATH NOT FOUND",
            Self::InvalidFormat(_) => "CANNOT CREATE FILE",
            Self::Io(_) | Self::Codec(_) | Self::InvalidInode(_) | Self::Corrupted(_) => "IO ERROR",
        }
    }
}

impl From<std::io::Error> for FileSystemError {
    fn from(e: std::io::Error) -> Self {
        FileSystemError::Io(e)
    }
}

impl From<bincode::Error> for FileSystemError {
    fn from(e: bincode::Error) -> Self {
        FileSystemError::Codec(e)
    }
}

// 实现 Display trait，用于日志和详细输出
impl fmt::Display for FileSystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Disk I/O error: {}", e),
            Self::Codec(e) => write!(f, "Cannot encode or decode on-disk structure: {}", e),
            Self::NotFound { path, expected } => {
                write!(f, "{} not found: {}", expected, path)
            }
            Self::NotAFile(path) => write!(f, "Expected a file, found a directory: {}", path),
            Self::NotADirectory(path) => write!(f, "Expected a directory, found a file: {}", path),
            Self::AlreadyExists(name) => write!(f, "File or directory already exists: {}", name),
            Self::DirectoryNotEmpty(path) => write!(f, "Directory is not empty: {}", path),
            Self::NoFreeInode => write!(f, "No free inode available"),
            Self::NoFreeClusters { needed, available } => write!(
                f,
                "Not enough free clusters: need {}, {} available",
                needed, available
            ),
            Self::TooLarge { clusters, limit } => write!(
                f,
                "Too large: needs {} clusters, at most {} are addressable",
                clusters, limit
            ),
            Self::InvalidName(name) => write!(f, "Invalid name: {:?}", name),
            Self::InvalidPath(path) => write!(f, "Operation not allowed on path: {}", path),
            Self::InvalidFormat(desc) => write!(f, "Invalid format parameters: {}", desc),
            Self::InvalidInode(inode) => write!(f, "Invalid inode: {}", inode),
            Self::Corrupted(desc) => write!(f, "File system corrupted: {}", desc),
        }
    }
}

// 支持链式错误，方便追踪底层原因
impl std::error::Error for FileSystemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

/// 文件系统统一结果类型
pub type Result<T> = std::result::Result<T, FileSystemError>;
