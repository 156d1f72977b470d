//! 头部快照：保存之后被 `remove_header` 剥离的字节仍可读取，用于重传时免去重新封装。
//!
//! 快照只持有被剥离字节的只读视图，不复制数据；缓冲之后对头部的写入会先触发写时复制，
//! 因此快照看到的始终是剥离时的内容。

use super::NetBuffer;
use crate::arena::{ChunkView, SpaceRights};
use crate::error::{NetBufferError, Result, check_range};

/// 保存后被剥离的头部字节，按剥离顺序排列。
#[derive(Debug, Default)]
pub(crate) struct HeaderSnapshot {
    stripped: Vec<ChunkView>,
    len: usize,
}

impl HeaderSnapshot {
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn record(&mut self, view: ChunkView) {
        if view.is_empty() {
            return;
        }
        self.len += view.len();
        self.stripped.push(view);
    }

    /// `[offset, offset + len)`（相对快照起点）对应的视图片段。
    fn slices(&self, offset: usize, len: usize) -> impl Iterator<Item = ChunkView> + '_ {
        let end = offset + len;
        let mut position = 0;
        self.stripped.iter().filter_map(move |view| {
            let view_start = position;
            position += view.len();
            let lo = offset.max(view_start);
            let hi = end.min(position);
            (lo < hi).then(|| view.slice(lo - view_start, hi - lo))
        })
    }
}

impl Clone for HeaderSnapshot {
    fn clone(&self) -> Self {
        Self {
            stripped: self
                .stripped
                .iter()
                .map(|view| view.share(SpaceRights::NONE))
                .collect(),
            len: self.len,
        }
    }
}

impl NetBuffer {
    /// 开始保存头部：此后 `remove_header` 剥离的字节进入快照。
    ///
    /// 快照已存在时无法区分两个保存方，快照被丢弃并返回 `SnapshotConflict`。
    pub fn store_header(&mut self) -> Result<()> {
        if self.snapshot.take().is_some() {
            tracing::debug!("header stored twice; discarding snapshot");
            return Err(NetBufferError::SnapshotConflict);
        }
        self.snapshot = Some(HeaderSnapshot::default());
        Ok(())
    }

    /// 已保存的头部字节数。
    pub fn stored_header_length(&self) -> Result<usize> {
        self.snapshot
            .as_ref()
            .map(HeaderSnapshot::len)
            .ok_or(NetBufferError::NoSnapshot)
    }

    /// 从“已保存头部 ++ 当前字节”组成的连续流中，读取 `offset` 起的 `out.len()` 字节。
    pub fn restore_header(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        let snapshot = self.snapshot.as_ref().ok_or(NetBufferError::NoSnapshot)?;
        let stored = snapshot.len();
        check_range(offset, out.len(), stored + self.size)?;

        let mut written = 0;
        if offset < stored {
            let take = out.len().min(stored - offset);
            for view in snapshot.slices(offset, take) {
                let bytes = view.bytes();
                out[written..written + bytes.len()].copy_from_slice(bytes);
                written += bytes.len();
            }
        }
        if written < out.len() {
            let live_offset = (offset + written) - stored;
            self.read(live_offset, &mut out[written..])?;
        }
        Ok(())
    }

    /// 把 `source` 的“已保存头部 ++ 当前字节”流中 `[offset, offset + bytes)` 追加到 `self`。
    ///
    /// 两部分都以只读共享视图追加，不复制字节；之后对这些字节的写入会触发写时复制。
    pub fn append_restored_header(
        &mut self,
        source: &NetBuffer,
        offset: usize,
        bytes: usize,
    ) -> Result<()> {
        self.ensure_same_arena(source)?;
        let snapshot = source.snapshot.as_ref().ok_or(NetBufferError::NoSnapshot)?;
        let stored = snapshot.len();
        check_range(offset, bytes, stored + source.size)?;

        let mut appended = 0;
        if offset < stored {
            let take = bytes.min(stored - offset);
            for view in snapshot.slices(offset, take) {
                appended += view.len();
                self.views.push_back(view);
            }
            self.size += appended;
        }
        if appended < bytes {
            let live_offset = (offset + appended) - stored;
            self.append_cloned(source, live_offset, bytes - appended)?;
        }
        tracing::trace!(offset, bytes, size = self.size, "append_restored_header");
        self.check_invariants();
        Ok(())
    }
}
