use crate::disk::InodeId;

/// i-node 占用位图，每个 bit 表示一个 i-node 是否被占用。
///
/// 只存在于内存中：挂载时根据 i-node 表的空闲标志重建，
/// 为 `find_free_inode` 提供首次适配查找。
#[derive(Debug, Clone)]
pub struct InodeBitmap {
    bits: Vec<u8>,
    total_inodes: u32,
    free_inodes: u32,
}

impl InodeBitmap {
    // 创建一个新的 inode 位图（所有位清零 = 空闲）
    pub fn new(total_inodes: u32) -> Self {
        let byte_len = total_inodes.div_ceil(8) as usize;
        Self {
            bits: vec![0; byte_len],
            total_inodes,
            free_inodes: total_inodes,
        }
    }

    pub fn free_inodes(&self) -> u32 {
        self.free_inodes
    }

    /// 编号最小的空闲 inode，不修改位图
    pub fn first_free(&self) -> Option<InodeId> {
        for (byte_index, byte) in self.bits.iter().enumerate() {
            if *byte != 0xFF {
                for bit in 0..8 {
                    if *byte & (1 << bit) == 0 {
                        let id = (byte_index * 8 + bit) as InodeId;
                        // 最后一个字节里超出总数的位不算
                        return (id < self.total_inodes).then_some(id);
                    }
                }
            }
        }
        None
    }

    pub fn mark_used(&mut self, inode: InodeId) {
        if inode >= self.total_inodes {
            return;
        }
        let (byte_index, bit_index) = Self::position(inode);
        if self.bits[byte_index] & (1 << bit_index) == 0 {
            self.bits[byte_index] |= 1 << bit_index;
            self.free_inodes -= 1;
        }
    }

    // 释放一个 inode
    pub fn free(&mut self, inode: InodeId) {
        if inode >= self.total_inodes {
            return; // 防止越界
        }
        let (byte_index, bit_index) = Self::position(inode);
        if self.bits[byte_index] & (1 << bit_index) != 0 {
            // 防止空释放
            self.bits[byte_index] &= !(1 << bit_index);
            self.free_inodes += 1;
        }
    }

    // 检查 inode 是否被占用
    pub fn is_used(&self, inode: InodeId) -> bool {
        if inode >= self.total_inodes {
            return false;
        }
        let (byte_index, bit_index) = Self::position(inode);
        self.bits[byte_index] & (1 << bit_index) != 0
    }

    fn position(inode: InodeId) -> (usize, u8) {
        ((inode / 8) as usize, (inode % 8) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fit_reuses_lowest_freed_id() {
        let mut bitmap = InodeBitmap::new(10);
        for id in 0..4 {
            assert_eq!(bitmap.first_free(), Some(id));
            bitmap.mark_used(id);
        }
        bitmap.free(1);
        assert_eq!(bitmap.first_free(), Some(1));
        assert_eq!(bitmap.free_inodes(), 7);
        assert!(bitmap.is_used(0));
        assert!(!bitmap.is_used(1));
    }

    #[test]
    fn padding_bits_are_never_handed_out() {
        let mut bitmap = InodeBitmap::new(3);
        for id in 0..3 {
            bitmap.mark_used(id);
        }
        assert_eq!(bitmap.first_free(), None);
        assert_eq!(bitmap.free_inodes(), 0);

        bitmap.mark_used(5);
        bitmap.free(5);
        assert_eq!(bitmap.free_inodes(), 0);
    }
}
