use std::{
    borrow::Cow,
    fmt,
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use log::info;

use crate::{
    disk::{BlockDevice, ClusterId, InodeId},
    fs::{
        config::{NO_LINK, ROOT_INODE_ID},
        data_area::FileExtent,
        directory::{validate_name, Directory},
        error::{FileSystemError, Result},
        inode_table::{indirect_blocks_needed, ClusterLinks, Inode, InodeKind},
        path::{split_parent, TypeFilter},
        FileSystem,
    },
};

/// `ls` 输出的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub kind: InodeKind,
    pub file_size: u64,
    pub parent_id: Option<InodeId>,
    pub node_id: InodeId,
    pub count_clusters: u32,
}

impl fmt::Display for ListEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = match self.kind {
            InodeKind::Directory => '+',
            InodeKind::File => '-',
            InodeKind::Symlink => '@',
        };
        write!(
            f,
            "{} SIZE: {}B, PARENT_ID: {}, NODE_ID: {}, CLUSTERS: {}, NAME: {}",
            mark,
            self.file_size,
            self.parent_id.map_or(i64::from(NO_LINK), i64::from),
            self.node_id,
            self.count_clusters,
            self.name
        )
    }
}

/// `info` 输出。符号链接显示目标 i-node 的数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeInfo {
    pub name: String,
    pub file_size: u64,
    pub node_id: InodeId,
    pub count_clusters: u32,
    pub links: ClusterLinks,
}

impl fmt::Display for InodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let directs: Vec<String> = self
            .links
            .directs
            .iter()
            .flatten()
            .map(ToString::to_string)
            .collect();
        let link =
            |cluster: Option<ClusterId>| cluster.map_or("none".to_string(), |c| c.to_string());
        write!(
            f,
            "NAME: {} - SIZE: {}B - I-NODE_ID: {} - CLUSTERS: {} - DIRECT: {} - INDIRECT1: {} - INDIRECT2: {}",
            self.name,
            self.file_size,
            self.node_id,
            self.count_clusters,
            if directs.is_empty() {
                "none".to_string()
            } else {
                directs.join(", ")
            },
            link(self.links.indirect1),
            link(self.links.indirect2)
        )
    }
}

/// `mv` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,   // 换了目录（可能同时改名）
    Renamed, // 同一目录内改名
}

impl<D: BlockDevice> FileSystem<D> {
    /// 在目录 `dir_id` 下新建名为 `name` 的文件。
    ///
    /// 所有检查（名字、重名、大小上限、i-node、空闲簇包括父目录增长）
    /// 都在第一次修改之前完成；之后的 I/O 失败会整体回滚。
    pub fn create_file(&mut self, dir_id: InodeId, name: &str, payload: &[u8]) -> Result<InodeId> {
        self.atomically(|fs| fs.write_new_file(dir_id, name, payload))
    }

    fn write_new_file(&mut self, dir_id: InodeId, name: &str, payload: &[u8]) -> Result<InodeId> {
        validate_name(name)?;
        let mut dir = self.read_directory(dir_id)?;
        if dir.contains(name) {
            return Err(FileSystemError::AlreadyExists(name.to_string()));
        }

        let (data_clusters, total) = self.plan_file(payload.len() as u64)?;
        let id = self.inode_table.find_free_inode().ok_or(FileSystemError::NoFreeInode)?;
        let growth = self.directory_growth(&dir, 1)?;
        self.ensure_free_clusters(total + growth)?;

        let allocated = self.bitmap.allocate(total)?;
        let extent = FileExtent::assemble(data_clusters, &allocated)?;
        self.data_area.write_file(&self.disk, &extent, payload)?;
        self.inode_table.initialize_inode(
            id,
            dir_id,
            InodeKind::File,
            payload.len() as u64,
            data_clusters as u32,
            extent.links,
        )?;
        self.append_entry(&mut dir, id, name)?;
        self.commit()?;

        info!(
            "created {} ({} bytes, inode {}, clusters {:?})",
            name,
            payload.len(),
            id,
            extent.data
        );
        Ok(id)
    }

    /// 返回（数据簇数，连同间接块的总簇数）
    fn plan_file(&self, len: u64) -> Result<(u64, u64)> {
        let data_clusters = len.div_ceil(u64::from(self.data_area.cluster_size()));
        let indirect = indirect_blocks_needed(data_clusters, self.data_area.links_per_cluster());
        if indirect > 2 {
            return Err(FileSystemError::TooLarge {
                clusters: data_clusters,
                limit: self.super_block.max_file_clusters(),
            });
        }
        Ok((data_clusters, data_clusters + indirect))
    }

    fn ensure_free_clusters(&self, needed: u64) -> Result<()> {
        if self.bitmap.find_n_free_clusters(needed) {
            Ok(())
        } else {
            Err(FileSystemError::NoFreeClusters {
                needed: u32::try_from(needed).unwrap_or(u32::MAX),
                available: self.bitmap.free_clusters(),
            })
        }
    }

    /// 新文件落在哪个目录、叫什么名字。
    ///
    /// `dest` 是已有目录时用 `default_name`；不存在时把它当作 `父目录/新名字`；
    /// 是已有文件时报 `AlreadyExists`。
    fn target_slot(&self, dest: Option<&str>, default_name: &str) -> Result<(InodeId, String)> {
        let Some(dest) = dest else {
            return Ok((self.current_inode, default_name.to_string()));
        };
        match self.resolve(dest, TypeFilter::Either) {
            Ok(id) if self.inode_table.get(id)?.is_directory() => {
                Ok((id, default_name.to_string()))
            }
            Ok(_) => Err(FileSystemError::AlreadyExists(dest.to_string())),
            Err(FileSystemError::NotFound { .. }) => {
                let (parent, name) = split_parent(dest);
                Ok((self.resolve_parent(parent)?, name.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// `incp`：把宿主机文件导入到 `dest`（默认当前目录），沿用宿主机文件名
    pub fn import_host_file(&mut self, host: &Path, dest: Option<&str>) -> Result<InodeId> {
        let payload = std::fs::read(host).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                FileSystemError::not_found(host.display().to_string(), TypeFilter::File)
            }
            _ => FileSystemError::Io(e),
        })?;
        let host_name = host
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| FileSystemError::InvalidName(host.display().to_string()))?;

        let (dir_id, name) = self.target_slot(dest, &host_name)?;
        self.create_file(dir_id, &name, payload.as_slice())
    }

    /// 符号链接解引用一层；目标已被删除时视为不存在
    pub fn follow_symlink(&self, id: InodeId) -> Result<InodeId> {
        let inode = self.inode_table.get(id)?;
        if !inode.is_symlink() {
            return Ok(id);
        }
        // 目标被删除时链接已被清空
        let target = inode
            .linked_node_id
            .ok_or_else(|| FileSystemError::not_found(format!("inode {}", id), TypeFilter::File))?;
        let linked = self.inode_table.get(target)?;
        if linked.is_free() || linked.is_directory() {
            return Err(FileSystemError::not_found(
                format!("inode {}", target),
                TypeFilter::File,
            ));
        }
        Ok(target)
    }

    /// `cat`：按簇把文件内容写到 `out`，返回写出的字节数
    pub fn read_file<W: Write>(&self, path: &str, out: &mut W) -> Result<u64> {
        let id = self.follow_symlink(self.resolve(path, TypeFilter::File)?)?;
        self.stream_inode(id, out)
    }

    fn stream_inode<W: Write>(&self, id: InodeId, out: &mut W) -> Result<u64> {
        let inode = self.inode_table.get(id)?;
        let mut remaining = inode.file_size;
        for cluster in self.data_area.enumerate_data_clusters(&self.disk, inode)? {
            let chunk = self.data_area.read_cluster(&self.disk, cluster)?;
            let take = remaining.min(chunk.len() as u64) as usize;
            out.write_all(&chunk[..take])?;
            remaining -= take as u64;
        }
        Ok(inode.file_size)
    }

    /// `outcp`：导出到宿主机。`host` 是目录时沿用文件名，否则当作目标文件路径
    pub fn export_file(&self, path: &str, host: &Path) -> Result<PathBuf> {
        let link_id = self.resolve(path, TypeFilter::File)?;
        let id = self.follow_symlink(link_id)?;

        let dest = if host.is_dir() {
            host.join(self.entry_name(link_id)?)
        } else {
            let parent_exists = host
                .parent()
                .map_or(true, |p| p.as_os_str().is_empty() || p.is_dir());
            if !parent_exists {
                return Err(FileSystemError::not_found(
                    host.display().to_string(),
                    TypeFilter::Directory,
                ));
            }
            host.to_path_buf()
        };

        let mut out = BufWriter::new(File::create(&dest)?);
        let written = self.stream_inode(id, &mut out)?;
        out.flush()?;
        info!("exported {} ({} bytes) to {}", path, written, dest.display());
        Ok(dest)
    }

    /// `cp`：读出源文件全部内容后写入新簇，不与源共享任何簇
    pub fn copy(&mut self, src: &str, dest: &str) -> Result<InodeId> {
        let src_id = self.resolve(src, TypeFilter::File)?;
        let data_id = self.follow_symlink(src_id)?;
        let payload = self
            .data_area
            .read_file(&self.disk, self.inode_table.get(data_id)?)?;

        let src_name = self.entry_name(src_id)?;
        let (dir_id, name) = self.target_slot(Some(dest), &src_name)?;
        self.create_file(dir_id, &name, &payload)
    }

    /// `mv`：移动到目录，或者在原目录中改名
    pub fn move_entry(&mut self, src: &str, dest: &str) -> Result<MoveOutcome> {
        self.atomically(|fs| fs.relink(src, dest))
    }

    fn relink(&mut self, src: &str, dest: &str) -> Result<MoveOutcome> {
        let id = self.resolve(src, TypeFilter::File)?;
        let from_id = self.parent_of(id)?;
        let current_name = self.entry_name(id)?;

        let (to_id, new_name) = match self.resolve(dest, TypeFilter::Either) {
            Ok(target) if self.inode_table.get(target)?.is_directory() => (target, current_name),
            Ok(_) => return Err(FileSystemError::AlreadyExists(dest.to_string())),
            Err(FileSystemError::NotFound { .. }) => {
                let (parent, name) = split_parent(dest);
                let to_id = match parent {
                    Some(_) => self.resolve_parent(parent)?,
                    None => from_id,
                };
                (to_id, name.to_string())
            }
            Err(e) => return Err(e),
        };

        if to_id == from_id {
            let mut dir = self.read_directory(from_id)?;
            dir.rename_node(id, &new_name)?;
            self.write_directory(&dir)?;
            self.commit()?;
            info!("renamed inode {} to {}", id, new_name);
            return Ok(MoveOutcome::Renamed);
        }

        validate_name(&new_name)?;
        let mut to = self.read_directory(to_id)?;
        if to.contains(&new_name) {
            return Err(FileSystemError::AlreadyExists(new_name));
        }
        let growth = self.directory_growth(&to, 1)?;
        self.ensure_free_clusters(growth)?;

        let mut from = self.read_directory(from_id)?;
        from.remove_node(id).ok_or_else(|| {
            FileSystemError::Corrupted(format!("inode {} is not listed in {}", id, from_id))
        })?;
        self.write_directory(&from)?;
        self.append_entry(&mut to, id, &new_name)?;
        self.commit()?;
        info!("moved inode {} into directory {} as {}", id, to_id, new_name);
        Ok(MoveOutcome::Moved)
    }

    /// `rm`
    pub fn remove_file(&mut self, path: &str) -> Result<()> {
        self.remove(path, TypeFilter::File)
    }

    /// `rmdir`：目录里只剩 `.` 和 `..` 时才能删除
    pub fn remove_directory(&mut self, path: &str) -> Result<()> {
        self.remove(path, TypeFilter::Directory)
    }

    fn remove(&mut self, path: &str, filter: TypeFilter) -> Result<()> {
        self.atomically(|fs| fs.unlink(path, filter))
    }

    fn unlink(&mut self, path: &str, filter: TypeFilter) -> Result<()> {
        let id = self.resolve(path, filter)?;
        if id == ROOT_INODE_ID || id == self.current_inode {
            return Err(FileSystemError::InvalidPath(path.to_string()));
        }

        let inode = self.inode_table.get(id)?.clone();
        if inode.is_directory() && !self.read_directory(id)?.is_empty() {
            return Err(FileSystemError::DirectoryNotEmpty(path.to_string()));
        }

        let parent_id = self.parent_of(id)?;
        let mut parent = self.read_directory(parent_id)?;
        parent.remove_node(id).ok_or_else(|| {
            FileSystemError::Corrupted(format!("inode {} is not listed in {}", id, parent_id))
        })?;
        let clusters = self.owned_clusters(&inode)?;

        self.write_directory(&parent)?;
        for &cluster in &clusters {
            self.bitmap.free(cluster);
        }
        self.inode_table.delete_inode(id)?;
        let orphaned = self.inode_table.detach_symlinks_to(id);
        self.commit()?;
        if orphaned > 0 {
            info!("{} symlink(s) to inode {} now dangle", orphaned, id);
        }

        info!("removed {} (inode {}, {} clusters released)", path, id, clusters.len());
        Ok(())
    }

    /// i-node 占用的全部簇：数据簇加间接块
    pub fn owned_clusters(&self, inode: &Inode) -> Result<Vec<ClusterId>> {
        let mut clusters = if inode.is_directory() {
            inode.directs[..inode.count_clusters as usize]
                .iter()
                .flatten()
                .copied()
                .collect()
        } else {
            self.data_area.enumerate_data_clusters(&self.disk, inode)?
        };
        clusters.extend(inode.links().indirect_blocks());
        Ok(clusters)
    }

    /// `mkdir`
    pub fn make_directory(&mut self, path: &str) -> Result<InodeId> {
        self.atomically(|fs| fs.new_directory(path))
    }

    fn new_directory(&mut self, path: &str) -> Result<InodeId> {
        let (parent, name) = split_parent(path);
        let parent_id = self.resolve_parent(parent)?;
        validate_name(name)?;

        let mut dir = self.read_directory(parent_id)?;
        if dir.contains(name) {
            return Err(FileSystemError::AlreadyExists(name.to_string()));
        }
        let id = self.inode_table.find_free_inode().ok_or(FileSystemError::NoFreeInode)?;
        let growth = self.directory_growth(&dir, 1)?;
        self.ensure_free_clusters(growth + 1)?;

        self.inode_table.initialize_inode(
            id,
            parent_id,
            InodeKind::Directory,
            0,
            0,
            ClusterLinks::default(),
        )?;
        self.write_directory(&Directory::new(id, parent_id))?;
        self.append_entry(&mut dir, id, name)?;
        self.commit()?;

        info!("created directory {} (inode {})", path, id);
        Ok(id)
    }

    /// `slink`：在当前目录中为同目录下的文件 `target` 建立符号链接
    pub fn symlink(&mut self, target: &str, link_name: &str) -> Result<InodeId> {
        self.atomically(|fs| fs.new_symlink(target, link_name))
    }

    fn new_symlink(&mut self, target: &str, link_name: &str) -> Result<InodeId> {
        let mut dir = self.current_dir.clone();
        validate_name(link_name)?;
        let target_id = dir
            .find(target)
            .ok_or_else(|| FileSystemError::not_found(target, TypeFilter::File))?;
        let target_inode = self.inode_table.get(target_id)?;
        if target_inode.is_directory() || target_inode.is_symlink() {
            return Err(FileSystemError::NotAFile(target.to_string()));
        }
        if dir.contains(link_name) {
            return Err(FileSystemError::AlreadyExists(link_name.to_string()));
        }

        let id = self.inode_table.find_free_inode().ok_or(FileSystemError::NoFreeInode)?;
        let growth = self.directory_growth(&dir, 1)?;
        self.ensure_free_clusters(growth)?;

        self.inode_table
            .initialize_symlink(id, dir.inode_id(), target_id)?;
        self.append_entry(&mut dir, id, link_name)?;
        self.commit()?;

        info!("linked {} -> {} (inode {})", link_name, target, id);
        Ok(id)
    }

    /// `ls`
    pub fn list(&self, path: Option<&str>) -> Result<Vec<ListEntry>> {
        let id = match path {
            Some(path) => self.resolve(path, TypeFilter::Directory)?,
            None => self.current_inode,
        };
        let dir = if id == self.current_inode {
            Cow::Borrowed(&self.current_dir)
        } else {
            Cow::Owned(self.read_directory(id)?)
        };

        dir.entries()
            .iter()
            .map(|entry| {
                let inode = self.inode_table.get(entry.node_id)?;
                Ok(ListEntry {
                    name: entry.name.to_string(),
                    kind: inode.kind(),
                    file_size: inode.file_size,
                    parent_id: inode.parent_id,
                    node_id: entry.node_id,
                    count_clusters: inode.count_clusters,
                })
            })
            .collect()
    }

    /// `info`
    pub fn info(&self, path: &str) -> Result<InodeInfo> {
        let id = self.resolve(path, TypeFilter::Either)?;
        let mut name = self.entry_name(id)?;

        let data_id = self.follow_symlink(id)?;
        if data_id != id {
            name = format!("{} -> {}", name, self.entry_name(data_id)?);
        }

        let inode = self.inode_table.get(data_id)?;
        Ok(InodeInfo {
            name,
            file_size: inode.file_size,
            node_id: data_id,
            count_clusters: inode.count_clusters,
            links: inode.links(),
        })
    }

    /// `cd`，不带参数时回到根目录
    pub fn change_directory(&mut self, path: Option<&str>) -> Result<()> {
        let id = match path {
            Some(path) => self.resolve(path, TypeFilter::Directory)?,
            None => ROOT_INODE_ID,
        };
        self.enter(id)
    }

    /// `pwd`
    pub fn working_directory(&self) -> &str {
        &self.current_path
    }

    fn parent_of(&self, id: InodeId) -> Result<InodeId> {
        self.inode_table
            .get(id)?
            .parent_id
            .ok_or_else(|| FileSystemError::Corrupted(format!("inode {} has no parent", id)))
    }

    /// i-node 在父目录中的名字，根目录为 `/`
    fn entry_name(&self, id: InodeId) -> Result<String> {
        if id == ROOT_INODE_ID {
            return Ok("/".to_string());
        }
        let parent = self.parent_of(id)?;
        self.read_directory(parent)?.name_of(id).ok_or_else(|| {
            FileSystemError::Corrupted(format!("inode {} is not listed in {}", id, parent))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_line_format() {
        let entry = ListEntry {
            name: "docs".into(),
            kind: InodeKind::Directory,
            file_size: 52,
            parent_id: Some(0),
            node_id: 3,
            count_clusters: 1,
        };
        assert_eq!(
            entry.to_string(),
            "+ SIZE: 52B, PARENT_ID: 0, NODE_ID: 3, CLUSTERS: 1, NAME: docs"
        );
    }

    #[test]
    fn info_line_format() {
        let mut links = ClusterLinks::default();
        links.directs[0] = Some(2);
        links.directs[1] = Some(3);
        links.directs[2] = Some(4);
        let info = InodeInfo {
            name: "localfile".into(),
            file_size: 2500,
            node_id: 2,
            count_clusters: 3,
            links,
        };
        assert_eq!(
            info.to_string(),
            "NAME: localfile - SIZE: 2500B - I-NODE_ID: 2 - CLUSTERS: 3 - DIRECT: 2, 3, 4 - INDIRECT1: none - INDIRECT2: none"
        );
    }
}
