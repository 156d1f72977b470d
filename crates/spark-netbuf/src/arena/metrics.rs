use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// 块池统计快照。
///
/// # 契约说明（What）
/// - `live_chunks`/`peak_chunks`：当前与历史最高的存活块数；
/// - `cached_chunks`：自由链表中等待复用的块数；
/// - `total_allocations`/`failed_allocations`：成功与失败的块分配次数，失败即 `OutOfMemory`；
/// - `copy_on_write_copies`：因写共享块而发生的私有化复制次数；
/// - `live_buffers`/`total_buffers`：存活与累计创建的缓冲句柄数；
/// - `space_conflicts`：共享空闲空间认领失败次数（仅调试构建统计）。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    pub chunk_size: usize,
    pub max_chunks: usize,
    pub live_chunks: usize,
    pub peak_chunks: usize,
    pub cached_chunks: usize,
    pub total_allocations: u64,
    pub failed_allocations: u64,
    pub copy_on_write_copies: u64,
    pub live_buffers: usize,
    pub total_buffers: u64,
    pub space_conflicts: u64,
}

#[derive(Default)]
pub(crate) struct ArenaMetrics {
    live_chunks: AtomicUsize,
    peak_chunks: AtomicUsize,
    total_allocations: AtomicU64,
    failed_allocations: AtomicU64,
    copies: AtomicU64,
    live_buffers: AtomicUsize,
    total_buffers: AtomicU64,
    space_conflicts: AtomicU64,
}

impl ArenaMetrics {
    /// 在上限内预留一个块位；成功返回预留后的存活数。
    pub(crate) fn try_reserve_chunk(&self, limit: usize) -> Result<usize, usize> {
        let reserved = self
            .live_chunks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < limit).then_some(live + 1)
            })
            .map(|previous| previous + 1);
        match reserved {
            Ok(live) => {
                self.peak_chunks.fetch_max(live, Ordering::Relaxed);
                self.total_allocations.fetch_add(1, Ordering::Relaxed);
                Ok(live)
            }
            Err(live) => {
                self.failed_allocations.fetch_add(1, Ordering::Relaxed);
                Err(live)
            }
        }
    }

    pub(crate) fn release_chunk(&self) {
        saturating_sub(&self.live_chunks, 1);
    }

    pub(crate) fn record_copy(&self) {
        self.copies.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn buffer_created(&self) {
        self.live_buffers.fetch_add(1, Ordering::Relaxed);
        self.total_buffers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn buffer_released(&self) {
        saturating_sub(&self.live_buffers, 1);
    }

    pub(crate) fn record_space_conflict(&self) {
        self.space_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, chunk_size: usize, max_chunks: usize, cached: usize) -> ArenaStats {
        ArenaStats {
            chunk_size,
            max_chunks,
            live_chunks: self.live_chunks.load(Ordering::Relaxed),
            peak_chunks: self.peak_chunks.load(Ordering::Relaxed),
            cached_chunks: cached,
            total_allocations: self.total_allocations.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
            copy_on_write_copies: self.copies.load(Ordering::Relaxed),
            live_buffers: self.live_buffers.load(Ordering::Relaxed),
            total_buffers: self.total_buffers.load(Ordering::Relaxed),
            space_conflicts: self.space_conflicts.load(Ordering::Relaxed),
        }
    }
}

fn saturating_sub(target: &AtomicUsize, value: usize) {
    let _ = target.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        Some(current.saturating_sub(value))
    });
}
