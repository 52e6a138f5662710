use std::{collections::HashMap, fmt};

use crate::{
    disk::{BlockDevice, ClusterId, InodeId},
    fs::{
        config::ROOT_INODE_ID,
        error::{FileSystemError, Result},
        FileSystem,
    },
    utils::format_timestamp,
};

/// `printfs` 的输出：超级块、位图摘要和所有在用 i-node
pub struct FsDump<'a, D: BlockDevice> {
    fs: &'a FileSystem<D>,
}

/// 把有序簇编号压缩成 `0-3, 7, 9-10` 的形式
fn ranges(clusters: impl Iterator<Item = ClusterId>) -> String {
    let mut spans: Vec<(ClusterId, ClusterId)> = Vec::new();
    for c in clusters {
        match spans.last_mut() {
            Some((_, end)) if *end + 1 == c => *end = c,
            _ => spans.push((c, c)),
        }
    }
    if spans.is_empty() {
        return "none".to_string();
    }
    spans
        .iter()
        .map(|&(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{}-{}", start, end)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl<D: BlockDevice> fmt::Display for FsDump<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sb = self.fs.super_block();
        writeln!(f, "SUPERBLOCK")?;
        writeln!(f, "  signature:     {}", sb.signature)?;
        writeln!(f, "  descriptor:    {}", sb.descriptor)?;
        writeln!(f, "  volume id:     {}", sb.volume_uuid())?;
        writeln!(f, "  formatted:     {}", format_timestamp(sb.formatted_at))?;
        writeln!(f, "  disk size:     {}B", sb.disk_size)?;
        writeln!(f, "  cluster size:  {}B", sb.cluster_size)?;
        writeln!(f, "  cluster count: {}", sb.cluster_count)?;
        writeln!(f, "  inode count:   {}", sb.inode_count)?;
        writeln!(f, "  bitmap start:  {}", sb.bitmap_start)?;
        writeln!(f, "  inode start:   {}", sb.inode_start)?;
        writeln!(f, "  data start:    {}", sb.data_start)?;

        let bitmap = self.fs.bitmap();
        writeln!(f, "BITMAP")?;
        writeln!(f, "  free: {} of {}", bitmap.free_clusters(), bitmap.len())?;
        writeln!(f, "  used: {}", ranges(bitmap.used_clusters()))?;

        let table = self.fs.inode_table();
        writeln!(
            f,
            "INODES ({} of {} free)",
            table.free_inodes(),
            table.len()
        )?;
        for inode in table.live() {
            let show = |link: Option<u32>| link.map_or("-".to_string(), |l| l.to_string());
            let directs: Vec<String> = inode.directs.iter().map(|&d| show(d)).collect();
            write!(
                f,
                "  {:>4} {:?} parent={} size={}B clusters={} direct=[{}] indirect1={} indirect2={}",
                inode.node_id,
                inode.kind(),
                show(inode.parent_id),
                inode.file_size,
                inode.count_clusters,
                directs.join(", "),
                show(inode.indirect1),
                show(inode.indirect2)
            )?;
            if let Some(target) = inode.linked_node_id {
                write!(f, " -> {}", target)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl<D: BlockDevice> FileSystem<D> {
    pub fn dump(&self) -> FsDump<'_, D> {
        FsDump { fs: self }
    }

    /// 一致性检查：
    /// 位图中已用簇恰好等于所有在用 i-node 占有的簇，且没有簇被两个 i-node 共享；
    /// 每个目录以 `.`、`..` 开头，子项的父指针指回该目录；簇数与文件大小相符。
    pub fn verify(&self) -> Result<()> {
        let corrupted = |msg: String| Err(FileSystemError::Corrupted(msg));
        let cluster_size = u64::from(self.super_block.cluster_size);

        let mut owners: HashMap<ClusterId, InodeId> = HashMap::new();
        for inode in self.inode_table.live() {
            if u64::from(inode.count_clusters) != inode.file_size.div_ceil(cluster_size) {
                return corrupted(format!(
                    "inode {} has {} bytes in {} clusters",
                    inode.node_id, inode.file_size, inode.count_clusters
                ));
            }
            for cluster in self.owned_clusters(inode)? {
                if let Some(other) = owners.insert(cluster, inode.node_id) {
                    return corrupted(format!(
                        "cluster {} is shared by inodes {} and {}",
                        cluster, other, inode.node_id
                    ));
                }
                if self.bitmap.is_free(cluster) {
                    return corrupted(format!(
                        "cluster {} of inode {} is marked free",
                        cluster, inode.node_id
                    ));
                }
            }
        }
        let used = self.bitmap.used_clusters().count();
        if used != owners.len() {
            return corrupted(format!(
                "bitmap marks {} clusters used, inodes own {}",
                used,
                owners.len()
            ));
        }

        for inode in self.inode_table.live().filter(|i| i.is_directory()) {
            let dir = self.read_directory(inode.node_id)?;
            let expected_parent = inode.parent_id.unwrap_or(ROOT_INODE_ID);
            let entries = dir.entries();
            let dots_ok = entries.len() >= 2
                && entries[0].name.matches(".")
                && entries[0].node_id == inode.node_id
                && entries[1].name.matches("..")
                && entries[1].node_id == expected_parent
                && (inode.node_id != ROOT_INODE_ID || expected_parent == ROOT_INODE_ID);
            if !dots_ok {
                return corrupted(format!(
                    "directory {} does not start with . and ..",
                    inode.node_id
                ));
            }
            for child in dir.children() {
                let child_inode = self.inode_table.get(child.node_id)?;
                if child_inode.is_free() || child_inode.parent_id != Some(inode.node_id) {
                    return corrupted(format!(
                        "entry {} in directory {} does not point back to it",
                        child.name, inode.node_id
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ranges;

    #[test]
    fn ranges_compress_runs() {
        assert_eq!(ranges([0, 1, 2, 3, 7, 9, 10].into_iter()), "0-3, 7, 9-10");
        assert_eq!(ranges(std::iter::empty()), "none");
    }
}
