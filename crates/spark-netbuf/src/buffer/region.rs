//! 区间变更：头尾扩张、插入、删除、裁剪与零拷贝追加。
//!
//! 所有可能失败的步骤（块分配、原子认领）都发生在修改视图链之前；
//! 分配失败时已认领的空闲空间会被撤销，缓冲的字节与长度保持不变。

use super::NetBuffer;
use crate::arena::ChunkView;
use crate::error::{NetBufferError, Result, check_range};

/// 一次扩张落在哪些视图上。
#[derive(Clone, Copy, Debug)]
pub(crate) struct Growth {
    /// 承载新字节的视图数（从扩张端数起）。
    pub(crate) views: usize,
    /// 其中已有视图原地认领的字节数。
    pub(crate) in_place: usize,
}

impl Growth {
    pub(crate) fn is_contiguous(&self) -> bool {
        self.views <= 1
    }
}

impl NetBuffer {
    /// 在头部扩张 `n` 字节；新区域落在单个块内时返回其可写切片。
    ///
    /// 新字节的内容未定义，调用方负责填充。已保存的头部快照会被丢弃。
    pub fn prepend_size(&mut self, n: usize) -> Result<Option<&mut [u8]>> {
        let growth = self.grow_front(n)?;
        if !growth.is_contiguous() {
            return Ok(None);
        }
        Ok(Some(self.fresh_front_mut(n)))
    }

    /// 在尾部扩张 `n` 字节；新区域落在单个块内时返回其可写切片。
    pub fn append_size(&mut self, n: usize) -> Result<Option<&mut [u8]>> {
        let growth = self.grow_back(n)?;
        if !growth.is_contiguous() {
            return Ok(None);
        }
        Ok(Some(self.fresh_back_mut(n)))
    }

    /// 在头部写入 `data`，跨块时自动分段。
    pub fn prepend(&mut self, data: &[u8]) -> Result<()> {
        let growth = self.grow_front(data.len())?;
        let mut remaining = data;
        for index in 0..growth.views {
            let view = &mut self.views[index];
            let take = remaining.len().min(view.len());
            let (head, rest) = remaining.split_at(take);
            // SAFETY: 前 `growth.views` 个视图的前部是本次扩张刚认领的字节。
            unsafe { view.claimed_front_mut(take) }.copy_from_slice(head);
            remaining = rest;
        }
        debug_assert!(remaining.is_empty());
        Ok(())
    }

    /// 在尾部写入 `data`。
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        self.append_segments(&[data])
    }

    /// 在尾部依次写入多段数据，作为一次原子扩张。
    pub(crate) fn append_segments(&mut self, segments: &[&[u8]]) -> Result<()> {
        let total = segments.iter().map(|segment| segment.len()).sum();
        let growth = self.grow_back(total)?;
        let first = self.views.len() - growth.views;
        let mut pending = segments.iter().copied().filter(|segment| !segment.is_empty());
        let mut current: &[u8] = pending.next().unwrap_or_default();
        for index in first..self.views.len() {
            let view = &mut self.views[index];
            let take = if index == first && growth.in_place > 0 {
                growth.in_place
            } else {
                view.len()
            };
            // SAFETY: 末尾 `growth.views` 个视图的尾部是本次扩张刚认领的字节。
            let mut target = unsafe { view.claimed_back_mut(take) };
            while !target.is_empty() {
                if current.is_empty() {
                    current = pending.next().unwrap_or_default();
                    if current.is_empty() {
                        break;
                    }
                }
                let step = target.len().min(current.len());
                let (slot, rest_target) = core::mem::take(&mut target).split_at_mut(step);
                slot.copy_from_slice(&current[..step]);
                target = rest_target;
                current = &current[step..];
            }
        }
        Ok(())
    }

    /// 在 `offset` 处插入 `data`，新字节放入新块并拼接到拆开的视图之间。
    ///
    /// `offset == 0` 等同于 [`prepend`](Self::prepend)，成功时同样丢弃头部快照。
    pub fn insert(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        if offset > self.size {
            return Err(NetBufferError::out_of_range(offset, data.len(), self.size));
        }
        if data.is_empty() {
            return Ok(());
        }
        if offset == 0 {
            return self.prepend(data);
        }
        if offset == self.size {
            return self.append(data);
        }
        let chunk_size = self.arena.chunk_size();
        let chunks = self.arena.allocate_batch(data.len().div_ceil(chunk_size), 0)?;
        let mut index = self.cut_at(offset);
        for (chunk, piece) in chunks.into_iter().zip(data.chunks(chunk_size)) {
            let mut view = ChunkView::fresh(chunk);
            let claimed = view.claim_back(piece.len());
            debug_assert!(claimed, "fresh chunk must accept its first claim");
            // SAFETY: 新块只被该视图引用，且字节刚被认领。
            unsafe { view.claimed_back_mut(piece.len()) }.copy_from_slice(piece);
            self.views.insert(index, view);
            index += 1;
        }
        self.size += data.len();
        tracing::trace!(offset, bytes = data.len(), size = self.size, "insert");
        self.check_invariants();
        Ok(())
    }

    /// 删除 `[offset, offset + bytes)`。
    pub fn remove(&mut self, offset: usize, bytes: usize) -> Result<()> {
        check_range(offset, bytes, self.size)?;
        if bytes == 0 {
            return Ok(());
        }
        if offset == 0 {
            return self.remove_header(bytes);
        }
        if offset + bytes == self.size {
            return self.remove_trailer(bytes);
        }
        let first = self.cut_at(offset);
        let last = self.cut_at(offset + bytes);
        self.views.drain(first..last);
        self.size -= bytes;
        tracing::trace!(offset, bytes, size = self.size, "remove");
        self.check_invariants();
        Ok(())
    }

    /// 从头部剥离 `bytes` 字节。
    ///
    /// 保存过头部快照时，被剥离的字节以只读视图的形式进入快照，之后仍可恢复。
    pub fn remove_header(&mut self, bytes: usize) -> Result<()> {
        if bytes > self.size {
            return Err(NetBufferError::out_of_range(0, bytes, self.size));
        }
        let mut remaining = bytes;
        while remaining > 0 {
            let many = self.views.len() > 1;
            let Some(front) = self.views.front_mut() else {
                break;
            };
            let take = remaining.min(front.len());
            if let Some(snapshot) = self.snapshot.as_mut() {
                snapshot.record(front.slice(0, take));
            }
            if take == front.len() && many {
                self.views.pop_front();
            } else {
                front.shrink_front(take);
            }
            remaining -= take;
        }
        self.size -= bytes;
        tracing::trace!(bytes, size = self.size, "remove_header");
        self.check_invariants();
        Ok(())
    }

    /// 从尾部剥离 `bytes` 字节，等价于 `trim(size - bytes)`。
    pub fn remove_trailer(&mut self, bytes: usize) -> Result<()> {
        let new_size = self
            .size
            .checked_sub(bytes)
            .ok_or(NetBufferError::InvalidSize {
                requested: bytes,
                current: self.size,
            })?;
        self.trim(new_size)
    }

    /// 截断到 `new_size`；释放的字节在块独占时回到尾部空闲空间。
    pub fn trim(&mut self, new_size: usize) -> Result<()> {
        if new_size > self.size {
            return Err(NetBufferError::InvalidSize {
                requested: new_size,
                current: self.size,
            });
        }
        let mut excess = self.size - new_size;
        while excess > 0 {
            let many = self.views.len() > 1;
            let Some(back) = self.views.back_mut() else {
                break;
            };
            let len = back.len();
            if len <= excess && many {
                self.views.pop_back();
                excess -= len;
            } else {
                let take = excess.min(len);
                back.shrink_back(take);
                excess -= take;
            }
        }
        self.size = new_size;
        tracing::trace!(size = self.size, "trim");
        self.check_invariants();
        Ok(())
    }

    /// 以只读共享视图的形式追加 `source` 的 `[offset, offset + bytes)`，不复制字节、不修改 `source`。
    ///
    /// `source` 必须来自同一块池，否则返回 [`NetBufferError::InvalidHandle`]。
    pub fn append_cloned(&mut self, source: &NetBuffer, offset: usize, bytes: usize) -> Result<()> {
        self.ensure_same_arena(source)?;
        check_range(offset, bytes, source.size)?;
        let end = offset + bytes;
        let mut position = 0;
        for view in &source.views {
            let view_start = position;
            position += view.len();
            let lo = offset.max(view_start);
            let hi = end.min(position);
            if lo < hi {
                self.views
                    .push_back(view.slice(lo - view_start, hi - lo));
            }
            if position >= end {
                break;
            }
        }
        self.size += bytes;
        tracing::trace!(offset, bytes, size = self.size, "append_cloned");
        self.check_invariants();
        Ok(())
    }

    /// 头部扩张的公共部分：认领、分配、拼接，返回新字节所在的视图分布。
    pub(crate) fn grow_front(&mut self, n: usize) -> Result<Growth> {
        if n == 0 {
            return Ok(Growth {
                views: 0,
                in_place: 0,
            });
        }
        let chunk_size = self.arena.chunk_size();
        let available = self.views.front_mut().map_or(0, ChunkView::front_space);
        let planned = plan_in_place(available, n, chunk_size);
        let in_place = match self.views.front_mut() {
            Some(front) if planned > 0 => {
                if front.claim_front(planned) {
                    planned
                } else {
                    0
                }
            }
            _ => 0,
        };
        let rest = n - in_place;
        let chunks = match self.arena.allocate_batch(rest.div_ceil(chunk_size), chunk_size) {
            Ok(chunks) => chunks,
            Err(err) => {
                if let Some(front) = self.views.front_mut() {
                    front.revert_front(in_place);
                }
                return Err(err);
            }
        };
        // 扩张已确定成功，之前保存的头部与新头部不再衔接。
        self.snapshot = None;
        let mut remaining = rest;
        let added = chunks.len();
        for chunk in chunks {
            let mut view = ChunkView::fresh(chunk);
            let take = remaining.min(chunk_size);
            let claimed = view.claim_front(take);
            debug_assert!(claimed, "fresh chunk must accept its first claim");
            remaining -= take;
            self.views.push_front(view);
        }
        self.size += n;
        tracing::trace!(bytes = n, in_place, new_chunks = added, size = self.size, "prepend_size");
        self.check_invariants();
        Ok(Growth {
            views: added + usize::from(in_place > 0),
            in_place,
        })
    }

    /// 尾部扩张的公共部分。
    pub(crate) fn grow_back(&mut self, n: usize) -> Result<Growth> {
        if n == 0 {
            return Ok(Growth {
                views: 0,
                in_place: 0,
            });
        }
        let chunk_size = self.arena.chunk_size();
        let available = self.views.back_mut().map_or(0, ChunkView::tail_space);
        let planned = plan_in_place(available, n, chunk_size);
        let in_place = match self.views.back_mut() {
            Some(back) if planned > 0 => {
                if back.claim_back(planned) {
                    planned
                } else {
                    0
                }
            }
            _ => 0,
        };
        let rest = n - in_place;
        let chunks = match self.arena.allocate_batch(rest.div_ceil(chunk_size), 0) {
            Ok(chunks) => chunks,
            Err(err) => {
                if let Some(back) = self.views.back_mut() {
                    back.revert_back(in_place);
                }
                return Err(err);
            }
        };
        let mut remaining = rest;
        let added = chunks.len();
        for chunk in chunks {
            let mut view = ChunkView::fresh(chunk);
            let take = remaining.min(chunk_size);
            let claimed = view.claim_back(take);
            debug_assert!(claimed, "fresh chunk must accept its first claim");
            remaining -= take;
            self.views.push_back(view);
        }
        self.size += n;
        tracing::trace!(bytes = n, in_place, new_chunks = added, size = self.size, "append_size");
        self.check_invariants();
        Ok(Growth {
            views: added + usize::from(in_place > 0),
            in_place,
        })
    }

    /// 刚完成的单视图头部扩张区域。
    pub(crate) fn fresh_front_mut(&mut self, n: usize) -> &mut [u8] {
        match self.views.front_mut() {
            // SAFETY: 仅在 `grow_front` 报告单视图扩张后调用，前 `n` 字节为刚认领的独占区域。
            Some(front) => unsafe { front.claimed_front_mut(n) },
            None => &mut [],
        }
    }

    /// 刚完成的单视图尾部扩张区域。
    pub(crate) fn fresh_back_mut(&mut self, n: usize) -> &mut [u8] {
        match self.views.back_mut() {
            // SAFETY: 仅在 `grow_back` 报告单视图扩张后调用，末尾 `n` 字节为刚认领的独占区域。
            Some(back) => unsafe { back.claimed_back_mut(n) },
            None => &mut [],
        }
    }
}

/// 决定已有视图原地承载多少字节。
///
/// 空间足够时全部原地完成；不够但一个新块装得下时整体放入新块以保持连续；
/// 否则先用尽原地空间，剩余部分放入新块。
fn plan_in_place(available: usize, n: usize, chunk_size: usize) -> usize {
    if available >= n {
        n
    } else if n <= chunk_size {
        0
    } else {
        available
    }
}
