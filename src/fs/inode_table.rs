use bitflags::bitflags;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::{
    disk::{BlockDevice, ClusterId, InodeId},
    fs::{
        config::{DIRECT_LINKS, INODE_SIZE, INODE_TABLE_HEADER_SIZE},
        error::{FileSystemError, Result},
        inode_bitmap::InodeBitmap,
    },
};

bitflags! {
    /// 磁盘上的 i-node 标志字节
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct InodeFlags: u8 {
        const FREE = 1;
        const DIRECTORY = 1 << 1;
        const SYMLINK = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    File,      // 普通文件
    Directory, // 目录
    Symlink,   // 符号链接，指向同目录下的另一个 i-node
}

/// `Option<u32>` 链接字段与磁盘上 `-1` 哨兵之间的转换
mod sentinel {
    use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};

    use crate::fs::config::{DIRECT_LINKS, NO_LINK};

    fn encode<E: ser::Error>(link: Option<u32>) -> Result<i32, E> {
        match link {
            None => Ok(NO_LINK),
            Some(id) => i32::try_from(id).map_err(|_| E::custom(format!("link {} too large", id))),
        }
    }

    fn decode<E: de::Error>(raw: i32) -> Result<Option<u32>, E> {
        match raw {
            NO_LINK => Ok(None),
            id if id >= 0 => Ok(Some(id as u32)),
            id => Err(E::custom(format!("invalid link {}", id))),
        }
    }

    pub fn serialize<S: Serializer>(link: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error> {
        encode::<S::Error>(*link)?.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u32>, D::Error> {
        decode(i32::deserialize(deserializer)?)
    }

    pub mod array {
        use super::*;

        pub fn serialize<S: Serializer>(
            links: &[Option<u32>; DIRECT_LINKS],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            let mut raw = [NO_LINK; DIRECT_LINKS];
            for (slot, link) in raw.iter_mut().zip(links) {
                *slot = encode::<S::Error>(*link)?;
            }
            raw.serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<[Option<u32>; DIRECT_LINKS], D::Error> {
            let raw = <[i32; DIRECT_LINKS]>::deserialize(deserializer)?;
            let mut links = [None; DIRECT_LINKS];
            for (link, value) in links.iter_mut().zip(raw) {
                *link = decode(value)?;
            }
            Ok(links)
        }
    }
}

/// 一个 i-node 的全部簇链接
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterLinks {
    pub directs: [Option<ClusterId>; DIRECT_LINKS],
    pub indirect1: Option<ClusterId>,
    pub indirect2: Option<ClusterId>,
}

impl ClusterLinks {
    /// 已使用的间接块
    pub fn indirect_blocks(&self) -> impl Iterator<Item = ClusterId> {
        [self.indirect1, self.indirect2].into_iter().flatten()
    }
}

/// 逻辑簇序号在 i-node 中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterRef {
    Direct(u32),    // directs[slot]
    Indirect1(u32), // 一级间接块中的第几个
    Indirect2(u32), // 二级间接块中的第几个
}

impl ClusterRef {
    /// 第 `index` 个逻辑簇的位置，超出寻址范围时返回 `None`
    pub fn locate(index: u64, links_per_cluster: u32) -> Option<Self> {
        let per = u64::from(links_per_cluster);
        if index < DIRECT_LINKS as u64 {
            return Some(Self::Direct(index as u32));
        }
        let rest = index - DIRECT_LINKS as u64;
        if rest < per {
            return Some(Self::Indirect1(rest as u32));
        }
        let rest = rest - per;
        if rest < per {
            return Some(Self::Indirect2(rest as u32));
        }
        None
    }
}

/// 存放 `clusters` 个数据簇需要的间接块个数（可能超过 2，由调用方判断）
pub fn indirect_blocks_needed(clusters: u64, links_per_cluster: u32) -> u64 {
    let direct = DIRECT_LINKS as u64;
    if clusters <= direct {
        0
    } else {
        (clusters - direct).div_ceil(u64::from(links_per_cluster.max(1)))
    }
}

/// 定长 i-node 记录（序列化后 53 字节）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub node_id: InodeId,
    #[serde(with = "sentinel")]
    pub parent_id: Option<InodeId>,
    pub flags: InodeFlags,
    #[serde(with = "sentinel")]
    pub linked_node_id: Option<InodeId>, // 仅符号链接使用
    pub count_clusters: u32,
    pub file_size: u64,

    // 簇索引区
    #[serde(with = "sentinel::array")]
    pub directs: [Option<ClusterId>; DIRECT_LINKS],
    #[serde(with = "sentinel")]
    pub indirect1: Option<ClusterId>,
    #[serde(with = "sentinel")]
    pub indirect2: Option<ClusterId>,
}

impl Inode {
    /// 空闲状态：除编号外全部是哨兵值
    pub fn free(node_id: InodeId) -> Self {
        Self {
            node_id,
            parent_id: None,
            flags: InodeFlags::FREE,
            linked_node_id: None,
            count_clusters: 0,
            file_size: 0,
            directs: [None; DIRECT_LINKS],
            indirect1: None,
            indirect2: None,
        }
    }

    pub fn is_free(&self) -> bool {
        self.flags.contains(InodeFlags::FREE)
    }

    pub fn is_directory(&self) -> bool {
        !self.is_free() && self.flags.contains(InodeFlags::DIRECTORY)
    }

    pub fn is_symlink(&self) -> bool {
        !self.is_free() && self.flags.contains(InodeFlags::SYMLINK)
    }

    pub fn kind(&self) -> InodeKind {
        if self.is_directory() {
            InodeKind::Directory
        } else if self.is_symlink() {
            InodeKind::Symlink
        } else {
            InodeKind::File
        }
    }

    pub fn links(&self) -> ClusterLinks {
        ClusterLinks {
            directs: self.directs,
            indirect1: self.indirect1,
            indirect2: self.indirect2,
        }
    }

    fn set_links(&mut self, links: ClusterLinks) {
        self.directs = links.directs;
        self.indirect1 = links.indirect1;
        self.indirect2 = links.indirect2;
    }
}

/// 定容 i-node 表，下标即 i-node 编号
#[derive(Debug, Clone)]
pub struct InodeTable {
    inodes: Vec<Inode>,
    free_ids: InodeBitmap,
    offset: u64, // 表在磁盘上的起始字节偏移
}

impl InodeTable {
    pub fn new(inode_count: u32, offset: u64) -> Self {
        Self {
            inodes: (0..inode_count).map(Inode::free).collect(),
            free_ids: InodeBitmap::new(inode_count),
            offset,
        }
    }

    pub fn len(&self) -> u32 {
        self.inodes.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.inodes.is_empty()
    }

    pub fn free_inodes(&self) -> u32 {
        self.free_ids.free_inodes()
    }

    pub fn get(&self, id: InodeId) -> Result<&Inode> {
        self.inodes
            .get(id as usize)
            .ok_or(FileSystemError::InvalidInode(id))
    }

    fn get_mut(&mut self, id: InodeId) -> Result<&mut Inode> {
        self.inodes
            .get_mut(id as usize)
            .ok_or(FileSystemError::InvalidInode(id))
    }

    /// 非空闲的 i-node
    pub fn live(&self) -> impl Iterator<Item = &Inode> {
        self.inodes.iter().filter(|inode| !inode.is_free())
    }

    /// 首次适配：编号最小的空闲 i-node
    pub fn find_free_inode(&self) -> Option<InodeId> {
        self.free_ids.first_free()
    }

    /// 创建 i-node 元数据的唯一入口
    pub fn initialize_inode(
        &mut self,
        id: InodeId,
        parent: InodeId,
        kind: InodeKind,
        file_size: u64,
        count_clusters: u32,
        links: ClusterLinks,
    ) -> Result<()> {
        let inode = self.get_mut(id)?;
        if !inode.is_free() {
            return Err(FileSystemError::Corrupted(format!(
                "inode {} is already in use",
                id
            )));
        }

        inode.parent_id = Some(parent);
        inode.flags = match kind {
            InodeKind::File => InodeFlags::empty(),
            InodeKind::Directory => InodeFlags::DIRECTORY,
            InodeKind::Symlink => InodeFlags::SYMLINK,
        };
        inode.linked_node_id = None;
        inode.file_size = file_size;
        inode.count_clusters = count_clusters;
        inode.set_links(links);

        self.free_ids.mark_used(id);
        trace!("initialized inode {} as {:?}", id, kind);
        Ok(())
    }

    /// 符号链接：大小和簇数都为 0，只记录目标 i-node
    pub fn initialize_symlink(
        &mut self,
        id: InodeId,
        parent: InodeId,
        target: InodeId,
    ) -> Result<()> {
        self.initialize_inode(id, parent, InodeKind::Symlink, 0, 0, ClusterLinks::default())?;
        self.get_mut(id)?.linked_node_id = Some(target);
        Ok(())
    }

    pub fn set_parent(&mut self, id: InodeId, parent: InodeId) -> Result<()> {
        self.get_mut(id)?.parent_id = Some(parent);
        Ok(())
    }

    /// 更新大小、簇数和链接（目录重写后使用）
    pub fn set_extent(
        &mut self,
        id: InodeId,
        file_size: u64,
        count_clusters: u32,
        links: ClusterLinks,
    ) -> Result<()> {
        let inode = self.get_mut(id)?;
        inode.file_size = file_size;
        inode.count_clusters = count_clusters;
        inode.set_links(links);
        Ok(())
    }

    /// 重置为空闲状态。簇由调用方在同一操作中释放
    pub fn delete_inode(&mut self, id: InodeId) -> Result<()> {
        *self.get_mut(id)? = Inode::free(id);
        self.free_ids.free(id);
        trace!("released inode {}", id);
        Ok(())
    }

    /// 清空所有指向 `target` 的符号链接，返回个数。
    /// 目标 i-node 之后被复用时，旧链接不会指到新文件上
    pub fn detach_symlinks_to(&mut self, target: InodeId) -> usize {
        let mut count = 0;
        for inode in self.inodes.iter_mut() {
            if inode.is_symlink() && !inode.is_free() && inode.linked_node_id == Some(target) {
                inode.linked_node_id = None;
                count += 1;
            }
        }
        count
    }

    pub fn load<D: BlockDevice>(disk: &D, offset: u64, inode_count: u32) -> Result<Self> {
        let header = INODE_TABLE_HEADER_SIZE as usize;
        let mut bytes = vec![0u8; header + INODE_SIZE as usize * inode_count as usize];
        disk.read_at(offset, &mut bytes)?;

        let recorded = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if recorded != inode_count {
            return Err(FileSystemError::Corrupted(format!(
                "inode table header says {} inodes, superblock says {}",
                recorded, inode_count
            )));
        }

        let mut inodes = Vec::with_capacity(inode_count as usize);
        let mut free_ids = InodeBitmap::new(inode_count);
        for (id, record) in bytes[header..].chunks_exact(INODE_SIZE as usize).enumerate() {
            let inode: Inode = bincode::deserialize(record)?;
            if inode.node_id as usize != id {
                return Err(FileSystemError::Corrupted(format!(
                    "inode slot {} holds record {}",
                    id, inode.node_id
                )));
            }
            if !inode.is_free() {
                free_ids.mark_used(inode.node_id);
            }
            inodes.push(inode);
        }

        Ok(Self {
            inodes,
            free_ids,
            offset,
        })
    }

    pub fn sync<D: BlockDevice>(&self, disk: &D) -> Result<()> {
        let capacity = INODE_TABLE_HEADER_SIZE as usize + INODE_SIZE as usize * self.inodes.len();
        let mut bytes = Vec::with_capacity(capacity);
        bytes.extend_from_slice(&self.len().to_le_bytes());
        for inode in &self.inodes {
            bytes.extend(bincode::serialize(inode)?);
        }
        disk.write_at(self.offset, &bytes)?;
        Ok(())
    }
}
