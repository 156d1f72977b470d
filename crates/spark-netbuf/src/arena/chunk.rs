use core::{
    fmt,
    ptr::{self, NonNull},
    slice,
    sync::atomic::{AtomicUsize, Ordering},
};
use std::sync::Arc;

/// 块的稳定标识，仅用于日志与调试输出。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(pub(crate) u64);

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk#{}", self.0)
    }
}

/// `ChunkRecycler` 描述块池在块生命周期结束时的回收入口。
///
/// # 设计初衷（Why）
/// - 块由 `Arc<Chunk>` 计数，最后一个视图释放时才能归还存储；把归还动作放进 `Chunk::drop`，
///   上层的缓冲、快照、克隆都无需关心回收细节。
/// - 共享空闲空间的争用也经由该接口上报，块池据此维护统计。
///
/// # 契约定义（What）
/// - **前置条件**：实现必须线程安全且不得 panic，`reclaim` 运行在 `Drop` 路径上；
/// - **后置条件**：`reclaim` 收到的存储不再被任何视图引用，可直接复用或释放。
pub trait ChunkRecycler: Send + Sync + 'static {
    /// 归还块存储。
    fn reclaim(&self, reclaimed: ReclaimedChunk);

    /// 记录一次共享空闲空间的认领冲突。
    fn record_space_conflict(&self, id: ChunkId);
}

/// 一次回收动作携带的上下文。
#[derive(Debug)]
pub struct ReclaimedChunk {
    id: ChunkId,
    storage: Box<[u8]>,
}

impl ReclaimedChunk {
    pub(crate) fn new(id: ChunkId, storage: Box<[u8]>) -> Self {
        Self { id, storage }
    }

    /// 被回收块的标识。
    pub fn id(&self) -> ChunkId {
        self.id
    }

    /// 回收的字节容量。
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// 消耗结构并返回可复用的存储。
    pub fn into_storage(self) -> Box<[u8]> {
        self.storage
    }
}

/// `Chunk` 是一段定长的连续存储，由 `Arc` 提供原子引用计数。
///
/// # 结构设计（How）
/// - `base`/`capacity`：从 `Box<[u8]>` 拆出的裸指针与长度，`Drop` 时重新装箱交还回收器；
/// - `head`/`tail`：认领标记。`[head, tail)` 是曾被任一视图认领的字节，区间之外是空闲的
///   前部/尾部空间。视图只能在自己的边界与标记重合时，通过 CAS 移动标记来扩张。
///
/// # 并发契约（What）
/// - 已认领字节只在块独占（`Arc::get_mut` 成功，获得 `&mut Chunk`）时原地修改；
/// - 新认领的字节在 CAS 成功的瞬间仅属于认领者，即使块仍被共享也可以写入；
/// - 因此任意视图在自身区间上形成的 `&[u8]` 永远不会与写入重叠。
pub(crate) struct Chunk {
    id: ChunkId,
    base: NonNull<u8>,
    capacity: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
    recycler: Arc<dyn ChunkRecycler>,
}

// SAFETY: `Chunk` 独占其堆存储；跨线程访问遵循上文的认领协议，
// 只读切片与写入在字节区间上互不重叠。
unsafe impl Send for Chunk {}
// SAFETY: 同上，`&Chunk` 只暴露只读切片与原子标记操作。
unsafe impl Sync for Chunk {}

impl Chunk {
    /// 接管 `storage`，认领标记初始化为 `head == tail == anchor`。
    pub(crate) fn new(
        id: ChunkId,
        storage: Box<[u8]>,
        anchor: usize,
        recycler: Arc<dyn ChunkRecycler>,
    ) -> Self {
        let capacity = storage.len();
        let anchor = anchor.min(capacity);
        let base = NonNull::from(Box::leak(storage)).cast::<u8>();
        Self {
            id,
            base,
            capacity,
            head: AtomicUsize::new(anchor),
            tail: AtomicUsize::new(anchor),
            recycler,
        }
    }

    pub(crate) fn id(&self) -> ChunkId {
        self.id
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn head_mark(&self) -> usize {
        self.head.load(Ordering::Acquire)
    }

    pub(crate) fn tail_mark(&self) -> usize {
        self.tail.load(Ordering::Acquire)
    }

    /// 只读访问 `[start, start + len)`。
    ///
    /// 调用方必须是覆盖该区间的视图；已认领字节在共享期间不会被修改。
    pub(crate) fn bytes(&self, start: usize, len: usize) -> &[u8] {
        debug_assert!(start + len <= self.capacity);
        // SAFETY: 区间位于存储之内，且按认领协议不存在并发写入。
        unsafe { slice::from_raw_parts(self.base.as_ptr().add(start), len) }
    }

    /// 独占时的可写访问。
    pub(crate) fn bytes_mut(&mut self, start: usize, len: usize) -> &mut [u8] {
        debug_assert!(start + len <= self.capacity);
        // SAFETY: `&mut self` 证明没有其它 `Arc` 指向该块，因而没有其它切片存活。
        unsafe { slice::from_raw_parts_mut(self.base.as_ptr().add(start), len) }
    }

    /// 写访问刚认领的字节。
    ///
    /// # Safety
    /// `[start, start + len)` 必须是调用方通过 [`claim_front`](Self::claim_front) 或
    /// [`claim_back`](Self::claim_back) 认领、且尚未与任何其它视图共享的字节，
    /// 返回的切片存活期间调用方不得再为这些字节创建其它引用。
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn claimed_mut(&self, start: usize, len: usize) -> &mut [u8] {
        debug_assert!(start + len <= self.capacity);
        // SAFETY: 由调用方保证区间为独占认领。
        unsafe { slice::from_raw_parts_mut(self.base.as_ptr().add(start), len) }
    }

    /// 以 `start` 为当前前沿，向前认领 `len` 字节。
    pub(crate) fn claim_front(&self, start: usize, len: usize) -> bool {
        len <= start
            && self
                .head
                .compare_exchange(start, start - len, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// 以 `end` 为当前尾沿，向后认领 `len` 字节。
    pub(crate) fn claim_back(&self, end: usize, len: usize) -> bool {
        end.checked_add(len).is_some_and(|limit| limit <= self.capacity)
            && self
                .tail
                .compare_exchange(end, end + len, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// 撤销一次尚未被视图采用的前向认领；若期间他人继续认领则放弃，字节仅被闲置。
    pub(crate) fn unclaim_front(&self, claimed_start: usize, len: usize) {
        let _ = self.head.compare_exchange(
            claimed_start,
            claimed_start + len,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// 撤销一次尚未被视图采用的后向认领。
    pub(crate) fn unclaim_back(&self, claimed_end: usize, len: usize) {
        let _ = self.tail.compare_exchange(
            claimed_end,
            claimed_end - len,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// 独占时把认领标记收缩到唯一视图的边界，归还其余空间。
    pub(crate) fn reset_marks(&mut self, start: usize, end: usize) {
        *self.head.get_mut() = start;
        *self.tail.get_mut() = end;
    }

    pub(crate) fn recycler(&self) -> &Arc<dyn ChunkRecycler> {
        &self.recycler
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        let raw = ptr::slice_from_raw_parts_mut(self.base.as_ptr(), self.capacity);
        // SAFETY: `base`/`capacity` 来自 `Box::leak`，且此处是唯一一次重新装箱。
        let storage = unsafe { Box::from_raw(raw) };
        self.recycler
            .reclaim(ReclaimedChunk::new(self.id, storage));
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("head", &self.head_mark())
            .field("tail", &self.tail_mark())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingRecycler {
        reclaimed: Mutex<Vec<(ChunkId, usize)>>,
        conflicts: AtomicUsize,
    }

    impl ChunkRecycler for CountingRecycler {
        fn reclaim(&self, reclaimed: ReclaimedChunk) {
            self.reclaimed
                .lock()
                .expect("测试锁不应中毒")
                .push((reclaimed.id(), reclaimed.capacity()));
        }

        fn record_space_conflict(&self, _id: ChunkId) {
            self.conflicts.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn chunk_with(recycler: &Arc<CountingRecycler>, anchor: usize) -> Chunk {
        let recycler: Arc<dyn ChunkRecycler> = recycler.clone();
        Chunk::new(ChunkId(7), vec![0u8; 64].into_boxed_slice(), anchor, recycler)
    }

    #[test]
    fn claims_move_marks_only_from_matching_edges() {
        let recycler = Arc::new(CountingRecycler::default());
        let chunk = chunk_with(&recycler, 16);

        assert!(chunk.claim_front(16, 8));
        assert_eq!(chunk.head_mark(), 8);
        assert!(!chunk.claim_front(16, 4), "前沿已移动，旧边界的认领必须失败");
        assert!(!chunk.claim_front(8, 9), "不能越过块起点");

        assert!(chunk.claim_back(16, 48));
        assert!(!chunk.claim_back(64, 1), "不能越过块容量");
        assert_eq!(chunk.tail_mark(), 64);
    }

    #[test]
    fn unclaim_restores_untouched_marks() {
        let recycler = Arc::new(CountingRecycler::default());
        let chunk = chunk_with(&recycler, 32);
        assert!(chunk.claim_back(32, 10));
        chunk.unclaim_back(42, 10);
        assert_eq!(chunk.tail_mark(), 32);
        assert!(chunk.claim_front(32, 4));
        chunk.unclaim_front(28, 4);
        assert_eq!(chunk.head_mark(), 32);
    }

    #[test]
    fn drop_hands_storage_back() {
        let recycler = Arc::new(CountingRecycler::default());
        {
            let mut chunk = chunk_with(&recycler, 0);
            chunk.bytes_mut(0, 4).copy_from_slice(&[1, 2, 3, 4]);
            assert_eq!(chunk.bytes(0, 4), &[1, 2, 3, 4]);
        }
        let reclaimed = recycler.reclaimed.lock().expect("测试锁不应中毒");
        assert_eq!(reclaimed.as_slice(), &[(ChunkId(7), 64)]);
    }
}
