use std::io::Result;

/// 后备存储的抽象：整块虚拟磁盘按字节偏移读写。
///
/// 超级块、位图、i-node 表和数据区都只是这段字节空间里的不同区域，
/// 区域的起始偏移由超级块决定。
pub trait BlockDevice: Send + Sync {
    /// 从 `offset` 开始读满 `buf`，越界读视为错误。
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()>;

    /// 存储的总字节数
    fn len(&self) -> Result<u64>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// 把缓冲中的写入落盘
    fn flush(&self) -> Result<()>;
}
