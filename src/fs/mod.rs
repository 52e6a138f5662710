use log::{debug, info, warn};

use crate::{
    disk::{BlockDevice, FileDisk, InodeId},
    fs::{
        cluster_bitmap::ClusterBitmap,
        config::{FormatOptions, ROOT_INODE_ID},
        data_area::DataArea,
        directory::Directory,
        error::{FileSystemError, Result},
        inode_table::{ClusterLinks, InodeKind, InodeTable},
        super_block::SuperBlock,
    },
};

pub mod cluster_bitmap;
pub mod config;
pub mod data_area;
pub mod directory;
pub mod dump;
pub mod error;
pub mod file_ops;
pub mod inode_bitmap;
pub mod inode_table;
pub mod name;
pub mod path;
pub mod super_block;

pub use file_ops::{InodeInfo, ListEntry, MoveOutcome};
pub use path::TypeFilter;

/// 一个打开的文件系统会话
#[derive(Debug)]
pub struct FileSystem<D: BlockDevice = FileDisk> {
    disk: D,                     // 底层磁盘抽象层
    super_block: SuperBlock,     // 文件系统总体信息
    bitmap: ClusterBitmap,       // 簇分配信息
    inode_table: InodeTable,     // 所有 inode 管理
    data_area: DataArea,         // 数据区读写
    /** 会话状态 */
    current_inode: InodeId,
    current_dir: Directory,      // 当前目录内容缓存，每次修改后重读
    current_path: String,
    journal: Option<Vec<Directory>>, // 修改操作进行中：被改写目录的原始内容
}

impl<D: BlockDevice> FileSystem<D> {
    /// 在 `disk` 上写入全新的文件系统：超级块、空位图、空 i-node 表和根目录
    pub fn format(disk: D, options: &FormatOptions) -> Result<Self> {
        let super_block = SuperBlock::new(options)?;
        if disk.len()? < super_block.image_len() {
            return Err(FileSystemError::InvalidFormat(format!(
                "backing store holds {} bytes, layout needs {}",
                disk.len()?,
                super_block.image_len()
            )));
        }

        let mut fs = Self {
            bitmap: ClusterBitmap::new(
                super_block.cluster_count,
                u64::from(super_block.bitmap_start),
            ),
            inode_table: InodeTable::new(
                super_block.inode_count,
                u64::from(super_block.inode_start),
            ),
            data_area: DataArea::new(&super_block),
            current_inode: ROOT_INODE_ID,
            current_dir: Directory::new(ROOT_INODE_ID, ROOT_INODE_ID),
            current_path: "/".to_string(),
            journal: None,
            super_block,
            disk,
        };

        // 根目录与 mkdir 走同一条路：先建空 i-node，再写入 `.` 和 `..`
        fs.inode_table.initialize_inode(
            ROOT_INODE_ID,
            ROOT_INODE_ID,
            InodeKind::Directory,
            0,
            0,
            ClusterLinks::default(),
        )?;
        fs.write_directory(&Directory::new(ROOT_INODE_ID, ROOT_INODE_ID))?;
        fs.super_block.sync(&fs.disk)?;
        fs.commit()?;

        info!(
            "formatted volume {}: {} clusters of {} bytes, {} inodes",
            fs.super_block.volume_uuid(),
            fs.super_block.cluster_count,
            fs.super_block.cluster_size,
            fs.super_block.inode_count
        );
        Ok(fs)
    }

    /// 从 `disk` 读出已有的文件系统，工作目录为根目录
    pub fn mount(disk: D) -> Result<Self> {
        let super_block = SuperBlock::load(&disk)?;
        let bitmap = ClusterBitmap::load(
            &disk,
            u64::from(super_block.bitmap_start),
            super_block.cluster_count,
        )?;
        let inode_table = InodeTable::load(
            &disk,
            u64::from(super_block.inode_start),
            super_block.inode_count,
        )?;

        let mut fs = Self {
            data_area: DataArea::new(&super_block),
            current_inode: ROOT_INODE_ID,
            current_dir: Directory::new(ROOT_INODE_ID, ROOT_INODE_ID),
            current_path: "/".to_string(),
            journal: None,
            super_block,
            bitmap,
            inode_table,
            disk,
        };
        fs.enter(ROOT_INODE_ID)?;

        debug!(
            "mounted: {} of {} clusters free, {} inodes free",
            fs.bitmap.free_clusters(),
            fs.bitmap.len(),
            fs.inode_table.free_inodes()
        );
        Ok(fs)
    }

    /// 把位图和 i-node 表写回磁盘
    pub fn sync(&self) -> Result<()> {
        self.bitmap.sync(&self.disk)?;
        self.inode_table.sync(&self.disk)?;
        self.disk.flush()?;
        Ok(())
    }

    /// 每个修改操作的最后一步：落盘并重建当前目录缓存
    fn commit(&mut self) -> Result<()> {
        self.sync()?;
        self.enter(self.current_inode)
    }

    /// 执行一个修改操作。失败时位图和 i-node 表回到操作前的状态，
    /// 被改写过的目录按原内容写回，再落盘一次
    fn atomically<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.journal.is_some() {
            return op(self);
        }

        let bitmap = self.bitmap.clone();
        let inode_table = self.inode_table.clone();
        self.journal = Some(Vec::new());
        let result = op(self);
        let touched = self.journal.take().unwrap_or_default();

        if let Err(e) = &result {
            debug!("operation failed, rolling back: {}", e);
            self.bitmap = bitmap;
            self.inode_table = inode_table;
            self.roll_back(&touched);
        }
        result
    }

    fn roll_back(&mut self, touched: &[Directory]) {
        for dir in touched.iter().rev() {
            // 操作中新建的目录随 i-node 表一起撤销
            let existed = self
                .inode_table
                .get(dir.inode_id())
                .is_ok_and(|inode| inode.is_directory());
            if !existed {
                continue;
            }
            if let Err(e) = self.write_directory(dir) {
                warn!("cannot restore directory {}: {}", dir.inode_id(), e);
            }
        }
        if let Err(e) = self.sync() {
            warn!("cannot write back restored metadata: {}", e);
        }
    }

    /// 切换工作目录；先算好全部状态再替换，失败时保持原状
    fn enter(&mut self, id: InodeId) -> Result<()> {
        let dir = self.read_directory(id)?;
        let path = self.absolute_path_of(id)?;
        self.current_inode = id;
        self.current_dir = dir;
        self.current_path = path;
        Ok(())
    }

    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    pub fn bitmap(&self) -> &ClusterBitmap {
        &self.bitmap
    }

    pub fn inode_table(&self) -> &InodeTable {
        &self.inode_table
    }

    pub fn current_inode(&self) -> InodeId {
        self.current_inode
    }

    pub fn disk(&self) -> &D {
        &self.disk
    }

    /// 交出底层磁盘（例如重新格式化前关闭会话）
    pub fn into_disk(self) -> D {
        self.disk
    }
}
