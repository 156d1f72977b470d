//! # ancillary 模块说明
//!
//! ## 角色定位（Why）
//! - 套接字层需要随报文携带带外元数据（凭据、时间戳、接收接口等），它们不属于载荷字节；
//! - 容器以 `Box` 挂在至多一个缓冲上，缓冲之间转移时只移动所有权，时间复杂度 O(1)。
//!
//! ## 约定（What）
//! - 条目载荷使用 `bytes::Bytes`，克隆条目只增加引用计数；
//! - 容器不实现 `Clone`，任一时刻只有一个所有者；缓冲释放时容器及其条目随之释放。

use bytes::Bytes;

/// 条目类型：`level` 对应协议层级，`kind` 为层内类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AncillaryHeader {
    pub level: i32,
    pub kind: i32,
}

/// 一条带外元数据。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AncillaryEntry {
    header: AncillaryHeader,
    payload: Bytes,
}

impl AncillaryEntry {
    pub fn header(&self) -> AncillaryHeader {
        self.header
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

/// 带外元数据容器。
#[derive(Debug, Default)]
pub struct AncillaryContainer {
    entries: Vec<AncillaryEntry>,
}

impl AncillaryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加条目，返回其索引。
    pub fn add(&mut self, header: AncillaryHeader, payload: impl Into<Bytes>) -> usize {
        self.entries.push(AncillaryEntry {
            header,
            payload: payload.into(),
        });
        self.entries.len() - 1
    }

    /// 删除并返回索引处的条目，后续条目前移。
    pub fn remove(&mut self, index: usize) -> Option<AncillaryEntry> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    pub fn get(&self, index: usize) -> Option<&AncillaryEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AncillaryEntry> {
        self.entries.iter()
    }

    /// 按类型筛选条目。
    pub fn find(&self, header: AncillaryHeader) -> impl Iterator<Item = &AncillaryEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.header == header)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 把 `other` 的全部条目移到尾部，返回第一条移入条目的索引。
    pub fn move_from(&mut self, other: &mut AncillaryContainer) -> Option<usize> {
        if other.entries.is_empty() {
            return None;
        }
        let first = self.entries.len();
        self.entries.append(&mut other.entries);
        Some(first)
    }
}

impl<'a> IntoIterator for &'a AncillaryContainer {
    type Item = &'a AncillaryEntry;
    type IntoIter = core::slice::Iter<'a, AncillaryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
