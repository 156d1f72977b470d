use core::fmt;
use std::sync::Arc;

use super::chunk::{Chunk, ChunkId};

/// 视图对所在块空闲空间的认领权。
///
/// - `front`：视图起点与块的 `head` 标记重合时，可以向前认领前部空间；
/// - `back`：视图终点与块的 `tail` 标记重合时，可以向后认领尾部空间。
///
/// 拆分后左半只保留 `front`，右半只保留 `back`；只读共享视图两者皆无。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct SpaceRights {
    pub(crate) front: bool,
    pub(crate) back: bool,
}

impl SpaceRights {
    pub(crate) const FULL: Self = Self {
        front: true,
        back: true,
    };
    pub(crate) const NONE: Self = Self {
        front: false,
        back: false,
    };
}

/// `ChunkView` 是块内 `[start, start + len)` 的切片，是缓冲链表的节点。
///
/// # 设计背景（Why）
/// - 克隆、拆分、零拷贝追加都只复制视图并增加块的引用计数，不搬运字节；
/// - 写入前由块池检查 `Arc` 唯一性，共享时复制到新块（写时复制）。
///
/// # 契约说明（What）
/// - `start + len <= chunk.capacity()` 始终成立；
/// - 视图只能通过 [`claim_front`](Self::claim_front)/[`claim_back`](Self::claim_back)
///   扩张，扩张区域在认领成功后归视图独占；
/// - 收缩时若块已唯一，则把释放的字节交还为空闲空间，否则仅放弃对应方向的认领权。
pub(crate) struct ChunkView {
    chunk: Arc<Chunk>,
    start: usize,
    len: usize,
    rights: SpaceRights,
}

impl ChunkView {
    /// 覆盖新块锚点的空视图，拥有全部认领权。
    pub(crate) fn fresh(chunk: Arc<Chunk>) -> Self {
        let start = chunk.head_mark();
        Self {
            chunk,
            start,
            len: 0,
            rights: SpaceRights::FULL,
        }
    }

    pub(crate) fn chunk_id(&self) -> ChunkId {
        self.chunk.id()
    }

    pub(crate) fn start(&self) -> usize {
        self.start
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn end(&self) -> usize {
        self.start + self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[cfg(test)]
    pub(crate) fn rights(&self) -> SpaceRights {
        self.rights
    }

    #[cfg(test)]
    pub(crate) fn same_chunk(&self, other: &ChunkView) -> bool {
        Arc::ptr_eq(&self.chunk, &other.chunk)
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        self.chunk.bytes(self.start, self.len)
    }

    /// 块是否只被当前视图引用。
    pub(crate) fn is_unique(&mut self) -> bool {
        Arc::get_mut(&mut self.chunk).is_some()
    }

    /// 独占时的原地写入口；共享时返回 `None`，调用方需先私有化。
    pub(crate) fn bytes_mut(&mut self) -> Option<&mut [u8]> {
        let (start, len) = (self.start, self.len);
        Arc::get_mut(&mut self.chunk).map(|chunk| chunk.bytes_mut(start, len))
    }

    /// 唯一持有时把认领标记收缩回视图边界，恢复全部认领权。
    fn reclaim_if_unique(&mut self) -> bool {
        let (start, end) = (self.start, self.end());
        match Arc::get_mut(&mut self.chunk) {
            Some(chunk) => {
                chunk.reset_marks(start, end);
                self.rights = SpaceRights::FULL;
                true
            }
            None => false,
        }
    }

    /// 当前可认领的前部空间。
    pub(crate) fn front_space(&mut self) -> usize {
        self.reclaim_if_unique();
        if !self.rights.front {
            return 0;
        }
        if self.chunk.head_mark() == self.start {
            self.start
        } else {
            self.lose_right(Edge::Front);
            0
        }
    }

    /// 当前可认领的尾部空间。
    pub(crate) fn tail_space(&mut self) -> usize {
        self.reclaim_if_unique();
        if !self.rights.back {
            return 0;
        }
        if self.chunk.tail_mark() == self.end() {
            self.chunk.capacity() - self.end()
        } else {
            self.lose_right(Edge::Back);
            0
        }
    }

    /// 向前认领 `n` 字节并立即并入视图；失败时视图保持原状。
    pub(crate) fn claim_front(&mut self, n: usize) -> bool {
        if n == 0 {
            return true;
        }
        if !self.rights.front {
            return false;
        }
        if self.chunk.claim_front(self.start, n) {
            self.start -= n;
            self.len += n;
            true
        } else {
            self.lose_right(Edge::Front);
            false
        }
    }

    /// 向后认领 `n` 字节并立即并入视图。
    pub(crate) fn claim_back(&mut self, n: usize) -> bool {
        if n == 0 {
            return true;
        }
        if !self.rights.back {
            return false;
        }
        if self.chunk.claim_back(self.end(), n) {
            self.len += n;
            true
        } else {
            self.lose_right(Edge::Back);
            false
        }
    }

    /// 撤销刚刚成功的 [`claim_front`](Self::claim_front)。
    pub(crate) fn revert_front(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let claimed_start = self.start;
        self.start += n;
        self.len -= n;
        self.chunk.unclaim_front(claimed_start, n);
    }

    /// 撤销刚刚成功的 [`claim_back`](Self::claim_back)。
    pub(crate) fn revert_back(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let claimed_end = self.end();
        self.len -= n;
        self.chunk.unclaim_back(claimed_end, n);
    }

    /// 视图前 `n` 字节的写入口，仅用于刚认领的区域。
    ///
    /// # Safety
    /// 前 `n` 字节必须由本视图通过 `claim_front` 认领，且尚未被克隆或拆分共享出去。
    pub(crate) unsafe fn claimed_front_mut(&mut self, n: usize) -> &mut [u8] {
        debug_assert!(n <= self.len);
        // SAFETY: 由调用方保证区间为本视图独占的新认领字节。
        unsafe { self.chunk.claimed_mut(self.start, n) }
    }

    /// 视图末尾 `n` 字节的写入口，仅用于刚认领的区域。
    ///
    /// # Safety
    /// 末尾 `n` 字节必须由本视图通过 `claim_back` 认领，且尚未被克隆或拆分共享出去。
    pub(crate) unsafe fn claimed_back_mut(&mut self, n: usize) -> &mut [u8] {
        debug_assert!(n <= self.len);
        // SAFETY: 由调用方保证区间为本视图独占的新认领字节。
        unsafe { self.chunk.claimed_mut(self.end() - n, n) }
    }

    /// 从前端丢弃 `n` 字节。
    pub(crate) fn shrink_front(&mut self, n: usize) {
        debug_assert!(n <= self.len);
        self.start += n;
        self.len -= n;
        if !self.reclaim_if_unique() {
            self.rights.front = false;
        }
    }

    /// 从尾端丢弃 `n` 字节。
    pub(crate) fn shrink_back(&mut self, n: usize) {
        debug_assert!(n <= self.len);
        self.len -= n;
        if !self.reclaim_if_unique() {
            self.rights.back = false;
        }
    }

    /// 在视图内偏移 `at` 处零拷贝拆分，返回右半部分。
    pub(crate) fn split_off(&mut self, at: usize) -> ChunkView {
        debug_assert!(at <= self.len);
        let right = ChunkView {
            chunk: Arc::clone(&self.chunk),
            start: self.start + at,
            len: self.len - at,
            rights: SpaceRights {
                front: false,
                back: self.rights.back,
            },
        };
        self.len = at;
        self.rights.back = false;
        right
    }

    /// 视图内 `[offset, offset + len)` 的只读共享切片，不携带认领权。
    pub(crate) fn slice(&self, offset: usize, len: usize) -> ChunkView {
        debug_assert!(offset + len <= self.len);
        ChunkView {
            chunk: Arc::clone(&self.chunk),
            start: self.start + offset,
            len,
            rights: SpaceRights::NONE,
        }
    }

    /// 共享整个视图，按调用方意愿转授认领权。
    pub(crate) fn share(&self, rights: SpaceRights) -> ChunkView {
        ChunkView {
            chunk: Arc::clone(&self.chunk),
            start: self.start,
            len: self.len,
            rights: SpaceRights {
                front: rights.front && self.rights.front,
                back: rights.back && self.rights.back,
            },
        }
    }

    /// 把视图内容复制进一个尚未共享的新块，并切换到该块（写时复制的落地步骤）。
    pub(crate) fn adopt_copy(&mut self, mut target: Chunk) {
        assert_eq!(
            target.capacity(),
            self.chunk.capacity(),
            "copy-on-write target must match the source chunk capacity"
        );
        let (start, end) = (self.start, self.end());
        target.reset_marks(start, end);
        target
            .bytes_mut(start, self.len)
            .copy_from_slice(self.chunk.bytes(start, self.len));
        self.chunk = Arc::new(target);
        self.rights = SpaceRights::FULL;
    }

    fn lose_right(&mut self, edge: Edge) {
        match edge {
            Edge::Front => self.rights.front = false,
            Edge::Back => self.rights.back = false,
        }
        if cfg!(debug_assertions) {
            self.chunk.recycler().record_space_conflict(self.chunk.id());
            tracing::warn!(
                chunk = %self.chunk.id(),
                edge = ?edge,
                start = self.start,
                len = self.len,
                "shared free space was claimed by another view; falling back to a new chunk"
            );
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Edge {
    Front,
    Back,
}

impl fmt::Debug for ChunkView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkView")
            .field("chunk", &self.chunk.id())
            .field("start", &self.start)
            .field("len", &self.len)
            .field("rights", &self.rights)
            .field("refs", &Arc::strong_count(&self.chunk))
            .finish()
    }
}
