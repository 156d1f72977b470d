//! # buffer 模块说明
//!
//! ## 角色定位（Why）
//! - [`NetBuffer`] 是“一个在途报文”的句柄：驱动在其中接收数据，协议层逐层剥离或封装头部，
//!   套接字层最终释放它；
//! - 报文字节分散在若干可能被共享的块上，缓冲对外呈现连续的逻辑地址空间 `[0, size)`。
//!
//! ## 结构（How）
//! - `views`：有序的块视图链，逻辑偏移按顺序累加；允许零长度视图存在（例如新建缓冲保留的头部空间），
//!   导出与定位时跳过它们；
//! - `meta`：地址、接口反向引用、分层标量、标志与协议号；
//! - `ancillary`：至多一个辅助数据容器；`snapshot`：头部快照。
//!
//! ## 契约（What）
//! - `size` 恒等于各视图长度之和，调试构建在每次变更后校验；
//! - 变更操作先完成所有可能失败的步骤（块分配、写时复制），再修改视图链，失败时缓冲保持原状；
//! - 句柄单一所有者：所有变更需要 `&mut self`，由借用检查保证同一句柄不会被并发修改。

mod export;
mod io;
mod meta;
mod region;
mod snapshot;

use core::fmt;
use std::collections::VecDeque;
use std::sync::Arc;

pub use export::Chunks;
pub use meta::{BufferFlags, InterfaceAddress, LayerScalar, NetAddress};

use crate::ancillary::AncillaryContainer;
use crate::arena::{ChunkArena, ChunkView, SpaceRights};
use crate::error::{NetBufferError, Result};
use meta::Metadata;
use snapshot::HeaderSnapshot;

/// 在途报文句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：让每一层都以连续区间的视角读写报文，同时保持零拷贝的克隆、拆分与拼接；
/// - **逻辑 (How)**：字节由块视图链承载，写入前对共享块执行写时复制；头部空间通过块内的认领标记
///   原地扩张，常见的封装路径无需分配；
/// - **契约 (What)**：
///   - 释放即 `Drop`，依次归还块引用、辅助数据与快照；
///   - `clone_buffer` 与原缓冲共享块，任一方写入都不会被另一方观察到；
///   - 区间操作失败时返回错误且不修改缓冲；
/// - **风险 (Trade-offs)**：视图链使用 `VecDeque`，偏移定位为线性扫描；典型报文只有一到三个视图。
pub struct NetBuffer {
    arena: ChunkArena,
    views: VecDeque<ChunkView>,
    size: usize,
    meta: Metadata,
    ancillary: Option<Box<AncillaryContainer>>,
    snapshot: Option<HeaderSnapshot>,
}

impl NetBuffer {
    /// 在 `arena` 上创建空缓冲，首块预留 `header_space` 字节头部空间（超过块容量时截断）。
    pub fn with_arena(arena: &ChunkArena, header_space: usize) -> Result<Self> {
        let header_space = header_space.min(arena.chunk_size());
        let chunk = arena.allocate(header_space)?;
        let mut buffer = Self::detached(arena.clone(), Metadata::default());
        buffer.views.push_back(ChunkView::fresh(chunk));
        tracing::trace!(header_space, "create buffer");
        Ok(buffer)
    }

    /// 不持有任何视图的缓冲，供拆分与克隆复用。
    fn detached(arena: ChunkArena, meta: Metadata) -> Self {
        arena.buffer_created();
        Self {
            arena,
            views: VecDeque::new(),
            size: 0,
            meta,
            ancillary: None,
            snapshot: None,
        }
    }

    /// 逻辑字节数。
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// 缓冲所属的块池。
    pub fn arena(&self) -> &ChunkArena {
        &self.arena
    }

    /// 深拷贝全部字节到新块；结果与原缓冲不共享任何存储。
    ///
    /// 新缓冲保留与原缓冲首个视图相同的头部空间，并复制元数据；辅助数据与头部快照不随之复制。
    pub fn duplicate(&self) -> Result<NetBuffer> {
        let header_space = self.views.front().map_or(0, ChunkView::start);
        let mut copy = NetBuffer::with_arena(&self.arena, header_space)?;
        copy.meta = self.meta.clone();
        let segments: Vec<&[u8]> = self.chunks().collect();
        copy.append_segments(&segments)?;
        tracing::trace!(size = self.size, "duplicate buffer");
        Ok(copy)
    }

    /// 共享全部块创建新句柄。
    ///
    /// `share_free_space` 为真时，克隆的首尾视图同时获得块内空闲空间的认领权，可以原地扩张。
    /// 这是调用方自行保证的优化：两个句柄竞争同一段空闲空间时，只有先完成原子认领的一方原地扩张，
    /// 另一方退回到新块，字节不会互相覆盖；调试构建会记录并告警这种竞争。
    pub fn clone_buffer(&self, share_free_space: bool) -> NetBuffer {
        let rights = if share_free_space {
            SpaceRights::FULL
        } else {
            SpaceRights::NONE
        };
        let mut clone = NetBuffer::detached(self.arena.clone(), self.meta.clone());
        clone.views = self.views.iter().map(|view| view.share(rights)).collect();
        clone.size = self.size;
        clone.snapshot = self.snapshot.clone();
        tracing::trace!(size = self.size, share_free_space, "clone buffer");
        clone.check_invariants();
        clone
    }

    /// 在 `offset` 处拆分：返回持有 `[0, offset)` 的新缓冲，`self` 保留 `[offset, size)`。
    ///
    /// 偏移落在视图中间时零拷贝地拆分该视图，两半共享同一块，之后任一半的写入都会触发写时复制。
    /// 头部快照随前半部分迁移，元数据复制到前半部分，辅助数据留在 `self`。
    pub fn split(&mut self, offset: usize) -> Result<NetBuffer> {
        if offset > self.size {
            return Err(NetBufferError::out_of_range(offset, 0, self.size));
        }
        let mut head = NetBuffer::detached(self.arena.clone(), self.meta.clone());
        let boundary = self.cut_at(offset);
        head.views = self.views.drain(..boundary).collect();
        head.size = offset;
        head.snapshot = self.snapshot.take();
        self.size -= offset;
        tracing::trace!(offset, remaining = self.size, "split buffer");
        self.check_invariants();
        head.check_invariants();
        Ok(head)
    }

    /// 把 `with` 的视图拼接到尾部（`after`）或头部，`with` 被消耗。
    ///
    /// 头部拼接会丢弃 `self` 的头部快照；`with` 的快照与辅助数据随其释放。
    /// `with` 来自其他块池时返回 [`NetBufferError::InvalidHandle`]，`self` 不变、`with` 被释放。
    pub fn merge(&mut self, mut with: NetBuffer, after: bool) -> Result<()> {
        self.ensure_same_arena(&with)?;
        let views = core::mem::take(&mut with.views);
        let added = core::mem::take(&mut with.size);
        if after {
            self.views.extend(views);
        } else {
            self.snapshot = None;
            for view in views.into_iter().rev() {
                self.views.push_front(view);
            }
        }
        self.size += added;
        tracing::trace!(added, after, size = self.size, "merge buffer");
        self.check_invariants();
        Ok(())
    }

    pub fn source(&self) -> &NetAddress {
        &self.meta.source
    }

    pub fn set_source(&mut self, address: impl Into<NetAddress>) {
        self.meta.source = address.into();
    }

    pub fn destination(&self) -> &NetAddress {
        &self.meta.destination
    }

    pub fn set_destination(&mut self, address: impl Into<NetAddress>) {
        self.meta.destination = address.into();
    }

    pub fn interface_address(&self) -> Option<&Arc<InterfaceAddress>> {
        self.meta.interface_address.as_ref()
    }

    /// 替换接口地址引用，返回旧引用。
    pub fn set_interface_address(
        &mut self,
        address: Option<Arc<InterfaceAddress>>,
    ) -> Option<Arc<InterfaceAddress>> {
        core::mem::replace(&mut self.meta.interface_address, address)
    }

    pub fn scalar(&self) -> LayerScalar {
        self.meta.scalar
    }

    pub fn set_scalar(&mut self, scalar: LayerScalar) {
        self.meta.scalar = scalar;
    }

    pub fn flags(&self) -> BufferFlags {
        self.meta.flags
    }

    pub fn flags_mut(&mut self) -> &mut BufferFlags {
        &mut self.meta.flags
    }

    pub fn msg_flags(&self) -> u32 {
        self.meta.msg_flags
    }

    pub fn set_msg_flags(&mut self, flags: u32) {
        self.meta.msg_flags = flags;
    }

    pub fn protocol(&self) -> u16 {
        self.meta.protocol
    }

    pub fn set_protocol(&mut self, protocol: u16) {
        self.meta.protocol = protocol;
    }

    /// 复制 `other` 的地址、标志、接口引用、分层标量与协议号。
    pub fn copy_metadata_from(&mut self, other: &NetBuffer) {
        self.meta = other.meta.clone();
    }

    /// 交换源地址与目的地址，不触碰载荷。
    pub fn swap_addresses(&mut self) {
        core::mem::swap(&mut self.meta.source, &mut self.meta.destination);
    }

    pub fn ancillary(&self) -> Option<&AncillaryContainer> {
        self.ancillary.as_deref()
    }

    pub fn ancillary_mut(&mut self) -> Option<&mut AncillaryContainer> {
        self.ancillary.as_deref_mut()
    }

    /// 挂接辅助数据容器，返回此前挂接的容器。
    pub fn set_ancillary(
        &mut self,
        container: Option<Box<AncillaryContainer>>,
    ) -> Option<Box<AncillaryContainer>> {
        core::mem::replace(&mut self.ancillary, container)
    }

    /// 取下辅助数据容器。
    pub fn take_ancillary(&mut self) -> Option<Box<AncillaryContainer>> {
        self.ancillary.take()
    }

    /// 返回已挂接的容器，没有时挂接一个空容器。
    pub fn ancillary_or_default(&mut self) -> &mut AncillaryContainer {
        self.ancillary.get_or_insert_with(Box::default)
    }

    /// 把 `from` 的辅助数据全部移到 `self`。
    ///
    /// `self` 尚无容器时整体移交（O(1)）；否则逐条追加，`from` 的空容器随之释放。
    /// 返回第一条被移入条目在 `self` 容器中的索引，没有条目移动时返回 `None`。
    pub fn transfer_ancillary_from(&mut self, from: &mut NetBuffer) -> Option<usize> {
        let mut source = from.ancillary.take()?;
        match self.ancillary.as_deref_mut() {
            None => {
                let first = (!source.is_empty()).then_some(0);
                self.ancillary = Some(source);
                first
            }
            Some(target) => target.move_from(&mut source),
        }
    }

    /// 写时复制的替换块取自本缓冲的块池，因此跨缓冲共享视图只允许发生在同一块池内。
    fn ensure_same_arena(&self, other: &NetBuffer) -> Result<()> {
        if self.arena.same_arena(&other.arena) {
            Ok(())
        } else {
            tracing::warn!(
                ours = self.arena.chunk_size(),
                theirs = other.arena.chunk_size(),
                "rejected buffer from a foreign arena"
            );
            Err(NetBufferError::InvalidHandle)
        }
    }

    /// 把逻辑偏移 `offset` 变成视图边界，返回边界之后第一个视图的下标。
    fn cut_at(&mut self, offset: usize) -> usize {
        let mut remaining = offset;
        for index in 0..self.views.len() {
            if remaining == 0 {
                return index;
            }
            let len = self.views[index].len();
            if remaining < len {
                let right = self.views[index].split_off(remaining);
                self.views.insert(index + 1, right);
                return index + 1;
            }
            remaining -= len;
        }
        self.views.len()
    }

    /// 调试构建下校验 `size` 与视图链一致。
    fn check_invariants(&self) {
        if cfg!(debug_assertions) {
            let total: usize = self.views.iter().map(ChunkView::len).sum();
            debug_assert_eq!(total, self.size, "net buffer size desynchronized from its views");
        }
    }
}

impl Drop for NetBuffer {
    fn drop(&mut self) {
        self.arena.buffer_released();
        tracing::trace!(size = self.size, views = self.views.len(), "free buffer");
    }
}

impl fmt::Debug for NetBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetBuffer")
            .field("size", &self.size)
            .field("source", &format_args!("{}", self.meta.source))
            .field("destination", &format_args!("{}", self.meta.destination))
            .field("scalar", &self.meta.scalar)
            .field("flags", &self.meta.flags)
            .field("msg_flags", &self.meta.msg_flags)
            .field("protocol", &self.meta.protocol)
            .field(
                "stored_header",
                &self.snapshot.as_ref().map(HeaderSnapshot::len),
            )
            .field(
                "ancillary",
                &self.ancillary.as_ref().map(|container| container.len()),
            )
            .field("views", &self.views)
            .finish()
    }
}
