use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    disk::{BlockDevice, ClusterId, InodeId},
    fs::{
        config::{DIRECT_LINKS, DIR_ENTRY_SIZE, DIR_HEADER_SIZE, NAME_LEN},
        error::{FileSystemError, Result},
        inode_table::ClusterLinks,
        name::FixedStr,
        FileSystem,
    },
};

// 一个目录项（16 字节）
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub node_id: InodeId,
    pub name: FixedStr<NAME_LEN>,
}

/// 目录内容：有序目录项列表，第 0 项是 `.`，第 1 项是 `..`。
///
/// 每次操作都从磁盘重新读出一份，修改后整体写回。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    inode_id: InodeId,
    entries: Vec<DirEntry>,
}

/// 校验并转换目录项名字
pub fn validate_name(name: &str) -> Result<FixedStr<NAME_LEN>> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\0');
    if invalid {
        return Err(FileSystemError::InvalidName(name.to_string()));
    }
    FixedStr::new(name).ok_or_else(|| FileSystemError::InvalidName(name.to_string()))
}

impl Directory {
    /// 只有 `.` 和 `..` 的新目录
    pub fn new(inode_id: InodeId, parent_id: InodeId) -> Self {
        let dot = |name: &str, node_id| DirEntry {
            node_id,
            name: FixedStr::truncated(name),
        };
        Self {
            inode_id,
            entries: vec![dot(".", inode_id), dot("..", parent_id)],
        }
    }

    pub fn inode_id(&self) -> InodeId {
        self.inode_id
    }

    pub fn parent_id(&self) -> InodeId {
        self.entries
            .get(1)
            .map_or(self.inode_id, |entry| entry.node_id)
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    /// 除 `.` 和 `..` 外的目录项
    pub fn children(&self) -> &[DirEntry] {
        self.entries.get(2..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children().is_empty()
    }

    /// 编码后的字节数：头 + 每项 16 字节
    pub fn byte_len(&self) -> u64 {
        Self::byte_len_for(self.entries.len())
    }

    pub fn byte_len_for(entries: usize) -> u64 {
        u64::from(DIR_HEADER_SIZE) + u64::from(DIR_ENTRY_SIZE) * entries as u64
    }

    // 线性查找，同名时第一个匹配生效
    pub fn find(&self, name: &str) -> Option<InodeId> {
        self.entries
            .iter()
            .find(|entry| entry.name.matches(name))
            .map(|entry| entry.node_id)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn name_of(&self, node_id: InodeId) -> Option<String> {
        self.children()
            .iter()
            .find(|entry| entry.node_id == node_id)
            .map(|entry| entry.name.to_string())
    }

    // 添加目录项
    pub fn push(&mut self, node_id: InodeId, name: &str) -> Result<()> {
        let fixed = validate_name(name)?;
        if self.contains(name) {
            return Err(FileSystemError::AlreadyExists(name.to_string()));
        }
        self.entries.push(DirEntry {
            node_id,
            name: fixed,
        });
        Ok(())
    }

    // 删除目录项，返回被删除的项
    pub fn remove_node(&mut self, node_id: InodeId) -> Option<DirEntry> {
        let index = self
            .entries
            .iter()
            .skip(2)
            .position(|entry| entry.node_id == node_id)?;
        Some(self.entries.remove(index + 2))
    }

    pub fn rename_node(&mut self, node_id: InodeId, new_name: &str) -> Result<()> {
        let fixed = validate_name(new_name)?;
        if self.contains(new_name) {
            return Err(FileSystemError::AlreadyExists(new_name.to_string()));
        }
        let entry = self
            .entries
            .iter_mut()
            .skip(2)
            .find(|entry| entry.node_id == node_id)
            .ok_or_else(|| {
                FileSystemError::Corrupted(format!(
                    "directory {} has no entry for inode {}",
                    self.inode_id, node_id
                ))
            })?;
        entry.name = fixed;
        Ok(())
    }

    /// 4 字节项数头，后跟各目录项
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.byte_len() as usize);
        bytes.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for entry in &self.entries {
            bytes.extend(bincode::serialize(entry)?);
        }
        Ok(bytes)
    }

    pub fn decode(inode_id: InodeId, bytes: &[u8]) -> Result<Self> {
        let header = DIR_HEADER_SIZE as usize;
        if bytes.len() < header {
            return Err(FileSystemError::Corrupted(format!(
                "directory {} has no header",
                inode_id
            )));
        }
        let count = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if (bytes.len() as u64) < Self::byte_len_for(count) || count < 2 {
            return Err(FileSystemError::Corrupted(format!(
                "directory {} claims {} entries in {} bytes",
                inode_id,
                count,
                bytes.len()
            )));
        }

        let entries = bytes[header..]
            .chunks_exact(DIR_ENTRY_SIZE as usize)
            .take(count)
            .map(bincode::deserialize)
            .collect::<std::result::Result<Vec<DirEntry>, _>>()?;
        Ok(Self { inode_id, entries })
    }
}

impl<D: BlockDevice> FileSystem<D> {
    /// 从目录 i-node 的直接簇读出目录内容
    pub fn read_directory(&self, id: InodeId) -> Result<Directory> {
        let inode = self.inode_table.get(id)?;
        if !inode.is_directory() {
            return Err(FileSystemError::NotADirectory(format!("inode {}", id)));
        }
        if inode.count_clusters as usize > DIRECT_LINKS {
            return Err(FileSystemError::Corrupted(format!(
                "directory {} spans {} clusters",
                id, inode.count_clusters
            )));
        }

        let mut bytes = Vec::with_capacity(inode.file_size as usize);
        for slot in &inode.directs[..inode.count_clusters as usize] {
            let cluster = slot.ok_or_else(|| {
                FileSystemError::Corrupted(format!("directory {} has a hole", id))
            })?;
            bytes.extend(self.data_area.read_cluster(&self.disk, cluster)?);
        }
        bytes.truncate(inode.file_size as usize);
        Directory::decode(id, &bytes)
    }

    /// 目录再增加 `extra` 项时需要新占用的簇数
    pub fn directory_growth(&self, dir: &Directory, extra: usize) -> Result<u64> {
        let needed = self.directory_clusters(dir.len() + extra)?;
        let owned = u64::from(self.inode_table.get(dir.inode_id())?.count_clusters);
        Ok(needed.saturating_sub(owned))
    }

    fn directory_clusters(&self, entries: usize) -> Result<u64> {
        let cluster_size = u64::from(self.data_area.cluster_size());
        let needed = Directory::byte_len_for(entries).div_ceil(cluster_size);
        if needed > DIRECT_LINKS as u64 {
            return Err(FileSystemError::TooLarge {
                clusters: needed,
                limit: DIRECT_LINKS as u64,
            });
        }
        Ok(needed)
    }

    /// 整体重写目录：按需追加或释放簇，更新大小和簇数
    pub fn write_directory(&mut self, dir: &Directory) -> Result<()> {
        self.journal_directory(dir.inode_id())?;
        let bytes = dir.encode()?;
        let needed = self.directory_clusters(dir.len())? as usize;
        let inode = self.inode_table.get(dir.inode_id())?;
        let owned = inode.count_clusters as usize;
        let mut links = ClusterLinks {
            directs: inode.directs,
            ..ClusterLinks::default()
        };

        if needed > owned {
            let fresh = self.bitmap.allocate((needed - owned) as u64)?;
            for (slot, cluster) in links.directs[owned..needed].iter_mut().zip(fresh) {
                *slot = Some(cluster);
            }
        } else {
            for slot in &mut links.directs[needed..owned] {
                if let Some(cluster) = slot.take() {
                    self.bitmap.free(cluster);
                }
            }
        }

        let clusters: Vec<ClusterId> = links.directs[..needed].iter().flatten().copied().collect();
        for (&cluster, chunk) in clusters
            .iter()
            .zip(bytes.chunks(self.data_area.cluster_size() as usize))
        {
            self.data_area.write_cluster(&self.disk, cluster, chunk)?;
        }

        if needed != owned {
            debug!(
                "directory {} now spans {} clusters",
                dir.inode_id(),
                needed
            );
        }
        self.inode_table
            .set_extent(dir.inode_id(), bytes.len() as u64, needed as u32, links)
    }

    /// 修改操作中第一次改写某个已有目录前，记下它的原始内容
    fn journal_directory(&mut self, id: InodeId) -> Result<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let fresh = self.inode_table.get(id)?.count_clusters == 0;
        if fresh || journal.iter().any(|d| d.inode_id() == id) {
            return Ok(());
        }
        let before = self.read_directory(id)?;
        if let Some(journal) = self.journal.as_mut() {
            journal.push(before);
        }
        Ok(())
    }

    /// 追加目录项、重写目录，并把新项的父指针指向该目录
    pub fn append_entry(
        &mut self,
        dir: &mut Directory,
        node_id: InodeId,
        name: &str,
    ) -> Result<()> {
        dir.push(node_id, name)?;
        self.write_directory(dir)?;
        self.inode_table.set_parent(node_id, dir.inode_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_16_bytes() {
        let entry = DirEntry {
            node_id: 3,
            name: validate_name("report.txt").unwrap(),
        };
        assert_eq!(bincode::serialize(&entry).unwrap().len(), DIR_ENTRY_SIZE as usize);
    }

    #[test]
    fn new_directory_starts_with_dot_entries() {
        let dir = Directory::new(4, 1);
        assert_eq!(dir.find("."), Some(4));
        assert_eq!(dir.find(".."), Some(1));
        assert_eq!(dir.parent_id(), 1);
        assert!(dir.is_empty());
        assert_eq!(dir.byte_len(), 36);
    }

    #[test]
    fn encode_decode_keeps_order() {
        let mut dir = Directory::new(0, 0);
        dir.push(5, "b").unwrap();
        dir.push(2, "a").unwrap();
        let bytes = dir.encode().unwrap();
        assert_eq!(bytes.len() as u64, dir.byte_len());
        assert_eq!(&bytes[..4], &4u32.to_le_bytes());

        // 簇里剩余的 0 不影响解码
        let mut padded = bytes.clone();
        padded.resize(200, 0);
        let back = Directory::decode(0, &padded).unwrap();
        assert_eq!(back, dir);
        assert_eq!(back.children()[0].name.to_string(), "b");
    }

    #[test]
    fn names_are_validated_and_unique() {
        let mut dir = Directory::new(0, 0);
        assert!(matches!(
            dir.push(1, "averyveryverylongname"),
            Err(FileSystemError::InvalidName(_))
        ));
        for bad in ["", ".", "..", "a/b"] {
            assert!(dir.push(1, bad).is_err());
        }
        dir.push(1, "twelve_chars").unwrap();
        assert!(matches!(
            dir.push(2, "twelve_chars"),
            Err(FileSystemError::AlreadyExists(_))
        ));
    }

    #[test]
    fn remove_and_rename_skip_dot_entries() {
        let mut dir = Directory::new(0, 0);
        dir.push(3, "x").unwrap();
        dir.rename_node(3, "y").unwrap();
        assert_eq!(dir.name_of(3).as_deref(), Some("y"));
        assert!(dir.remove_node(0).is_none());
        assert_eq!(dir.remove_node(3).map(|e| e.node_id), Some(3));
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn truncated_stream_is_corrupt() {
        let mut dir = Directory::new(0, 0);
        dir.push(1, "f").unwrap();
        let bytes = dir.encode().unwrap();
        assert!(Directory::decode(0, &bytes[..bytes.len() - 1]).is_err());
    }
}
