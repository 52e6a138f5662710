//! 单文件伪文件系统：超级块、簇位图、i-node 表和数据区都放在一个宿主机文件里。

pub mod disk;
pub mod fs;
pub mod shell;
pub mod utils;
