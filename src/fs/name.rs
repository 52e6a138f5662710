use std::{borrow::Cow, fmt};

use serde::{
    de::{self, SeqAccess, Visitor},
    ser::SerializeTuple,
    Deserialize, Deserializer, Serialize, Serializer,
};

/// 定长字节串：内容靠左存放，剩余部分补 0。
///
/// 序列化成 N 个连续字节（serde tuple，无长度前缀），
/// 所以在磁盘上的宽度永远是 N。
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedStr<const N: usize>([u8; N]);

impl<const N: usize> FixedStr<N> {
    /// 放不下时返回 `None`
    pub fn new(s: &str) -> Option<Self> {
        if s.len() > N {
            return None;
        }
        let mut buf = [0u8; N];
        buf[..s.len()].copy_from_slice(s.as_bytes());
        Some(Self(buf))
    }

    /// 超长时在字符边界处截断
    pub fn truncated(s: &str) -> Self {
        let mut end = s.len().min(N);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        let mut buf = [0u8; N];
        buf[..end].copy_from_slice(&s.as_bytes()[..end]);
        Self(buf)
    }

    /// 去掉尾部的 0
    pub fn as_bytes(&self) -> &[u8] {
        let end = self.0.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        &self.0[..end]
    }

    pub fn to_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    pub fn matches(&self, s: &str) -> bool {
        self.as_bytes() == s.as_bytes()
    }
}

impl<const N: usize> Default for FixedStr<N> {
    fn default() -> Self {
        Self([0; N])
    }
}

impl<const N: usize> fmt::Debug for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_str())
    }
}

impl<const N: usize> fmt::Display for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str())
    }
}

impl<const N: usize> Serialize for FixedStr<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(N)?;
        for byte in &self.0 {
            tuple.serialize_element(byte)?;
        }
        tuple.end()
    }
}

impl<'de, const N: usize> Deserialize<'de> for FixedStr<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_tuple(N, FixedStrVisitor::<N>)
    }
}

struct FixedStrVisitor<const N: usize>;

impl<'de, const N: usize> Visitor<'de> for FixedStrVisitor<N> {
    type Value = FixedStr<N>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", N)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut buf = [0u8; N];
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(i, &self))?;
        }
        Ok(FixedStr(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_exactly_n_bytes() {
        let name = FixedStr::<12>::new("notes.txt").unwrap();
        let bytes = bincode::serialize(&name).unwrap();
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[..9], b"notes.txt");
        assert_eq!(&bytes[9..], &[0, 0, 0]);

        let back: FixedStr<12> = bincode::deserialize(&bytes).unwrap();
        assert!(back.matches("notes.txt"));
        assert!(!back.matches("notes"));
    }

    #[test]
    fn wide_strings_work_past_serde_array_limit() {
        let text = "x".repeat(251);
        let wide = FixedStr::<251>::new(&text).unwrap();
        let bytes = bincode::serialize(&wide).unwrap();
        assert_eq!(bytes.len(), 251);
        let back: FixedStr<251> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.to_str(), text);
    }

    #[test]
    fn too_long_is_rejected_or_truncated_on_char_boundary() {
        assert!(FixedStr::<4>::new("abcde").is_none());
        // "é" 占两个字节，不能切在中间
        let t = FixedStr::<4>::truncated("abcé");
        assert_eq!(t.to_str(), "abc");
    }
}
