//! # arena 模块说明
//!
//! ## 角色定位（Why）
//! - 为报文缓冲提供定长块的获取与回收，接收中断路径上只允许自旋锁与原子操作，绝不睡眠；
//! - 块以 `Arc<Chunk>` 计数，克隆/拆分/零拷贝追加只增加引用，写入前由 [`ChunkArena::privatize`]
//!   完成写时复制。
//!
//! ## 结构（How）
//! - [`ChunkArena`]：对外句柄，内部 `Arc<ArenaInner>` 可廉价克隆并注入各层；
//! - `ArenaInner`：`spin::Mutex` 保护的自由链表、块编号与统计；同时实现 [`ChunkRecycler`]，
//!   块在最后一个视图释放时经由该接口归还存储；
//! - `chunk`/`view`：块本体与块内切片。
//!
//! ## 契约（What）
//! - 存活块数达到 `max_chunks` 时分配返回 [`NetBufferError::OutOfMemory`]；
//! - 批量分配要么全部成功，要么把已取得的块全部退回，不留下部分结果。

mod chunk;
mod metrics;
mod view;

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use spin::Mutex;

pub use chunk::{ChunkId, ChunkRecycler, ReclaimedChunk};
pub use metrics::ArenaStats;

pub(crate) use chunk::Chunk;
pub(crate) use view::{ChunkView, SpaceRights};

use crate::config::ArenaConfig;
use crate::error::{NetBufferError, Result};
use metrics::ArenaMetrics;

/// 定长块池句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：所有缓冲共享同一块池，块大小统一，复用时无需重新分配；
/// - **逻辑 (How)**：分配先在统计中原子预留一个块位，再从自由链表弹出存储，链表为空时向全局分配器申请；
/// - **契约 (What)**：`allocate*` 永不阻塞；块释放时存储回到链表，超过 `cache_limit` 的部分直接释放；
/// - **风险 (Trade-offs)**：自由链表使用自旋锁，临界区只有一次 `push`/`pop`，避免在中断上下文中睡眠。
#[derive(Clone)]
pub struct ChunkArena {
    inner: Arc<ArenaInner>,
}

struct ArenaInner {
    config: ArenaConfig,
    free_list: Mutex<Vec<Box<[u8]>>>,
    next_id: AtomicU64,
    metrics: ArenaMetrics,
}

impl ChunkArena {
    /// 按配置构建块池。
    pub fn new(config: ArenaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(ArenaInner {
                config,
                free_list: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                metrics: ArenaMetrics::default(),
            }),
        })
    }

    pub fn config(&self) -> ArenaConfig {
        self.inner.config
    }

    pub fn chunk_size(&self) -> usize {
        self.inner.config.chunk_size
    }

    /// 丢弃自由链表中缓存的全部存储，返回释放的字节数。
    pub fn shrink_to_fit(&self) -> usize {
        let drained = core::mem::take(&mut *self.inner.free_list.lock());
        let bytes = drained.iter().map(|storage| storage.len()).sum();
        tracing::debug!(released_bytes = bytes, "chunk arena cache drained");
        bytes
    }

    /// 当前统计快照。
    pub fn stats(&self) -> ArenaStats {
        let cached = self.inner.free_list.lock().len();
        self.inner.metrics.snapshot(
            self.inner.config.chunk_size,
            self.inner.config.max_chunks,
            cached,
        )
    }

    /// 两个句柄是否指向同一块池。
    pub fn same_arena(&self, other: &ChunkArena) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// 取得一个尚未共享的块，认领标记位于 `anchor`。
    pub(crate) fn reserve(&self, anchor: usize) -> Result<Chunk> {
        let limit = self.inner.config.max_chunks;
        if let Err(live) = self.inner.metrics.try_reserve_chunk(limit) {
            tracing::debug!(live, limit, "chunk allocation refused");
            return Err(NetBufferError::OutOfMemory { live, limit });
        }
        let storage = self
            .inner
            .free_list
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.inner.config.chunk_size].into_boxed_slice());
        let id = ChunkId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let recycler: Arc<dyn ChunkRecycler> = self.inner.clone();
        Ok(Chunk::new(id, storage, anchor, recycler))
    }

    /// 取得一个可共享的块。
    pub(crate) fn allocate(&self, anchor: usize) -> Result<Arc<Chunk>> {
        self.reserve(anchor).map(Arc::new)
    }

    /// 一次取得 `count` 个块；任一失败时已取得的块随 `Vec` 析构退回块池。
    pub(crate) fn allocate_batch(&self, count: usize, anchor: usize) -> Result<Vec<Arc<Chunk>>> {
        (0..count).map(|_| self.allocate(anchor)).collect()
    }

    /// 一次取得 `count` 个用于写时复制的块。
    pub(crate) fn reserve_batch(&self, count: usize) -> Result<Vec<Chunk>> {
        (0..count).map(|_| self.reserve(0)).collect()
    }

    /// 确保视图独占其块；共享时复制到新块。
    pub(crate) fn privatize(&self, view: &mut ChunkView) -> Result<()> {
        if view.is_unique() {
            return Ok(());
        }
        let target = self.reserve(0)?;
        self.adopt(view, target);
        Ok(())
    }

    /// 用预先取得的块完成一次写时复制。
    pub(crate) fn adopt(&self, view: &mut ChunkView, target: Chunk) {
        tracing::trace!(from = %view.chunk_id(), to = %target.id(), len = view.len(), "copy on write");
        view.adopt_copy(target);
        self.inner.metrics.record_copy();
    }

    pub(crate) fn buffer_created(&self) {
        self.inner.metrics.buffer_created();
    }

    pub(crate) fn buffer_released(&self) {
        self.inner.metrics.buffer_released();
    }
}

impl fmt::Debug for ChunkArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkArena")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl ChunkRecycler for ArenaInner {
    fn reclaim(&self, reclaimed: ReclaimedChunk) {
        self.metrics.release_chunk();
        if reclaimed.capacity() != self.config.chunk_size {
            return;
        }
        let mut free_list = self.free_list.lock();
        if free_list.len() < self.config.cache_limit {
            free_list.push(reclaimed.into_storage());
        }
    }

    fn record_space_conflict(&self, _id: ChunkId) {
        self.metrics.record_space_conflict();
    }
}
