use std::{borrow::Cow, fmt};

use crate::{
    disk::{BlockDevice, InodeId},
    fs::{
        config::ROOT_INODE_ID,
        directory::Directory,
        error::{FileSystemError, Result},
        FileSystem,
    },
};

/// 路径解析时对目标类型的要求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFilter {
    File,      // 普通文件或符号链接
    Directory, // 目录
    Either,
}

impl fmt::Display for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeFilter::File => write!(f, "File"),
            TypeFilter::Directory => write!(f, "Directory"),
            TypeFilter::Either => write!(f, "File or directory"),
        }
    }
}

/// 把路径拆成（父路径，最后一级名字）。没有 `/` 时父路径为 `None`
pub fn split_parent(path: &str) -> (Option<&str>, &str) {
    let path = path.trim_end_matches(['\n', '\r']);
    let trimmed = path.trim_end_matches('/');
    let path = if trimmed.is_empty() { path } else { trimmed };
    match path.rfind('/') {
        Some(0) => (Some(&path[..1]), &path[1..]),
        Some(pos) => (Some(&path[..pos]), &path[pos + 1..]),
        None => (None, path),
    }
}

impl<D: BlockDevice> FileSystem<D> {
    /// 把路径解析成 i-node 编号，只有目录读取，没有其他副作用
    pub fn resolve(&self, path: &str, filter: TypeFilter) -> Result<InodeId> {
        let mut rest = path.trim_end_matches(['\n', '\r']);
        while let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        }

        // 末尾的 '/' 表示目录
        let mut wants_directory = false;
        let trimmed = rest.trim_end_matches('/');
        if !trimmed.is_empty() && trimmed.len() != rest.len() {
            if filter == TypeFilter::File {
                return Err(FileSystemError::not_found(path, filter));
            }
            rest = trimmed;
            wants_directory = true;
        }

        let found = match rest {
            "" | "." => self.current_inode,
            ".." => self.current_dir.parent_id(),
            _ => self.walk(rest, path, filter)?,
        };
        self.check_type(found, path, filter, wants_directory)?;
        Ok(found)
    }

    fn walk(&self, rest: &str, path: &str, filter: TypeFilter) -> Result<InodeId> {
        let mut dir: Cow<'_, Directory> = if rest.starts_with('/') {
            if self.current_inode == ROOT_INODE_ID {
                Cow::Borrowed(&self.current_dir)
            } else {
                Cow::Owned(self.read_directory(ROOT_INODE_ID)?)
            }
        } else {
            Cow::Borrowed(&self.current_dir)
        };

        let components: Vec<&str> = rest.split('/').filter(|c| !c.is_empty()).collect();
        let mut node = dir.inode_id();
        for (depth, component) in components.iter().enumerate() {
            node = dir
                .find(component)
                .ok_or_else(|| FileSystemError::not_found(path, filter))?;

            if depth + 1 < components.len() {
                // 文件后面还有路径分量
                if !self.inode_table.get(node)?.is_directory() {
                    return Err(FileSystemError::not_found(path, filter));
                }
                dir = Cow::Owned(self.read_directory(node)?);
            }
        }
        Ok(node)
    }

    fn check_type(
        &self,
        node: InodeId,
        path: &str,
        filter: TypeFilter,
        wants_directory: bool,
    ) -> Result<()> {
        let inode = self.inode_table.get(node)?;
        if inode.is_free() {
            return Err(FileSystemError::not_found(path, filter));
        }
        match filter {
            TypeFilter::File if inode.is_directory() => {
                Err(FileSystemError::NotAFile(path.to_string()))
            }
            TypeFilter::Directory if !inode.is_directory() => {
                Err(FileSystemError::NotADirectory(path.to_string()))
            }
            TypeFilter::Either if wants_directory && !inode.is_directory() => {
                Err(FileSystemError::NotADirectory(path.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// 解析父目录：没有父路径时就是当前目录
    pub fn resolve_parent(&self, parent: Option<&str>) -> Result<InodeId> {
        match parent {
            Some(parent) => self.resolve(parent, TypeFilter::Directory),
            None => Ok(self.current_inode),
        }
    }

    /// 沿父指针向上走，拼出目录的绝对路径
    pub fn absolute_path_of(&self, id: InodeId) -> Result<String> {
        let mut names = Vec::new();
        let mut node = id;
        while node != ROOT_INODE_ID {
            if names.len() > self.inode_table.len() as usize {
                return Err(FileSystemError::Corrupted(format!(
                    "parent chain of inode {} does not reach the root",
                    id
                )));
            }
            let parent = self.inode_table.get(node)?.parent_id.ok_or_else(|| {
                FileSystemError::Corrupted(format!("inode {} has no parent", node))
            })?;
            let name = self.read_directory(parent)?.name_of(node).ok_or_else(|| {
                FileSystemError::Corrupted(format!("inode {} is not listed in {}", node, parent))
            })?;
            names.push(name);
            node = parent;
        }

        if names.is_empty() {
            return Ok("/".to_string());
        }
        names.reverse();
        Ok(format!("/{}", names.join("/")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_parent_cases() {
        assert_eq!(split_parent("name"), (None, "name"));
        assert_eq!(split_parent("/name"), (Some("/"), "name"));
        assert_eq!(split_parent("/a/b/c"), (Some("/a/b"), "c"));
        assert_eq!(split_parent("a/b/\n"), (Some("a"), "b"));
        assert_eq!(split_parent("/"), (Some("/"), ""));
    }
}
