//! # field 模块说明
//!
//! ## 角色定位（Why）
//! - 协议层读写固定长度的头部字段时，希望像解引用一个定长数组那样方便，
//!   同时在字段跨块时依然正确；
//! - 常见情况下字段落在单个块内，可直接借出块内存，避免任何拷贝。
//!
//! ## 结构（How）
//! - 构造时先询问区间是否连续：连续则借出块内切片（[`View::Direct`]），
//!   否则把字节读入内联暂存区（[`View::Scratch`]）；
//! - [`NetBufferField::sync`] 对两种视图分别处理：直接视图的修改已在原处生效，暂存区需要写回；
//! - 作用域结束时自动同步，写回失败只能记录告警，需要感知错误的调用方应显式调用
//!   [`NetBufferField::finish`]。
//!
//! ## 约定（What）
//! - 访问器独占借用缓冲，存活期间缓冲不能被其它代码修改；
//! - 所有访问器均不是线程安全的句柄，随借用一同受限于所属线程。

use core::ops::{Deref, DerefMut};

use crate::buffer::NetBuffer;
use crate::error::Result;

/// 字段字节所在的位置。
pub enum View<'a, const N: usize> {
    /// 块内连续区域，修改即时生效。
    Direct(&'a mut [u8; N]),
    /// 跨块字段的暂存副本，同步时写回 `offset`。
    Scratch {
        buffer: &'a mut NetBuffer,
        bytes: [u8; N],
    },
}

/// 偏移 `offset` 处 `N` 字节的可写字段视图。
pub struct NetBufferField<'a, const N: usize> {
    offset: usize,
    view: View<'a, N>,
    dirty: bool,
}

impl<'a, const N: usize> NetBufferField<'a, N> {
    /// 借出 `[offset, offset + N)`；块被共享时先复制，因此可能返回 `OutOfMemory`。
    pub fn new(buffer: &'a mut NetBuffer, offset: usize) -> Result<Self> {
        let view = if buffer.is_contiguous(offset, N)? {
            let bytes = buffer.direct_access_mut(offset, N)?;
            match bytes.first_chunk_mut::<N>() {
                Some(field) => View::Direct(field),
                None => unreachable!("direct access returns exactly N bytes"),
            }
        } else {
            let mut bytes = [0u8; N];
            buffer.read(offset, &mut bytes)?;
            View::Scratch { buffer, bytes }
        };
        Ok(Self {
            offset,
            view,
            dirty: false,
        })
    }

    /// 字段是否直接借自块内存。
    pub fn is_direct(&self) -> bool {
        matches!(self.view, View::Direct(_))
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 写回暂存区；直接视图无需任何动作。
    pub fn sync(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let View::Scratch { buffer, bytes } = &mut self.view {
            buffer.write(self.offset, bytes)?;
        }
        self.dirty = false;
        Ok(())
    }

    /// 同步并结束访问，把写回错误交给调用方。
    pub fn finish(mut self) -> Result<()> {
        let result = self.sync();
        self.dirty = false;
        result
    }

    pub fn read_u16(&self, at: usize) -> u16 {
        u16::from_be_bytes([self[at], self[at + 1]])
    }

    pub fn read_u32(&self, at: usize) -> u32 {
        u32::from_be_bytes([self[at], self[at + 1], self[at + 2], self[at + 3]])
    }

    pub fn write_u16(&mut self, at: usize, value: u16) {
        self[at..at + 2].copy_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, at: usize, value: u32) {
        self[at..at + 4].copy_from_slice(&value.to_be_bytes());
    }
}

impl<const N: usize> Deref for NetBufferField<'_, N> {
    type Target = [u8; N];

    fn deref(&self) -> &[u8; N] {
        match &self.view {
            View::Direct(field) => field,
            View::Scratch { bytes, .. } => bytes,
        }
    }
}

impl<const N: usize> DerefMut for NetBufferField<'_, N> {
    fn deref_mut(&mut self) -> &mut [u8; N] {
        self.dirty = true;
        match &mut self.view {
            View::Direct(field) => field,
            View::Scratch { bytes, .. } => bytes,
        }
    }
}

impl<const N: usize> Drop for NetBufferField<'_, N> {
    fn drop(&mut self) {
        if let Err(err) = self.sync() {
            tracing::warn!(
                offset = self.offset,
                len = N,
                code = err.code(),
                error = %err,
                "field write-back failed on drop"
            );
        }
    }
}

/// 只读字段视图：连续时借出块内存，否则读入暂存区；没有写回。
pub struct NetBufferFieldReader<'a, const N: usize> {
    view: ReadView<'a, N>,
}

enum ReadView<'a, const N: usize> {
    Direct(&'a [u8; N]),
    Scratch([u8; N]),
}

impl<'a, const N: usize> NetBufferFieldReader<'a, N> {
    pub fn new(buffer: &'a NetBuffer, offset: usize) -> Result<Self> {
        let view = match buffer.direct_access(offset, N) {
            Ok(bytes) => match bytes.first_chunk::<N>() {
                Some(field) => ReadView::Direct(field),
                None => unreachable!("direct access returns exactly N bytes"),
            },
            Err(err) if err.is_control_signal() => {
                let mut bytes = [0u8; N];
                buffer.read(offset, &mut bytes)?;
                ReadView::Scratch(bytes)
            }
            Err(err) => return Err(err),
        };
        Ok(Self { view })
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.view, ReadView::Direct(_))
    }

    pub fn read_u16(&self, at: usize) -> u16 {
        u16::from_be_bytes([self[at], self[at + 1]])
    }

    pub fn read_u32(&self, at: usize) -> u32 {
        u32::from_be_bytes([self[at], self[at + 1], self[at + 2], self[at + 3]])
    }
}

impl<const N: usize> Deref for NetBufferFieldReader<'_, N> {
    type Target = [u8; N];

    fn deref(&self) -> &[u8; N] {
        match &self.view {
            ReadView::Direct(field) => field,
            ReadView::Scratch(bytes) => bytes,
        }
    }
}

/// 缓冲头部 `N` 字节的可写视图。
pub struct NetBufferHeaderReader<'a, const N: usize>(NetBufferField<'a, N>);

impl<'a, const N: usize> NetBufferHeaderReader<'a, N> {
    pub fn new(buffer: &'a mut NetBuffer) -> Result<Self> {
        NetBufferField::new(buffer, 0).map(Self)
    }

    pub fn finish(self) -> Result<()> {
        self.0.finish()
    }
}

impl<'a, const N: usize> Deref for NetBufferHeaderReader<'a, N> {
    type Target = NetBufferField<'a, N>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const N: usize> DerefMut for NetBufferHeaderReader<'_, N> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// 解析后剥离头部的只读视图。
///
/// 调用 [`remove`](Self::remove) 立即剥离并返回结果；未显式剥离时在作用域结束时剥离，
/// 失败只记录告警。
pub struct NetBufferHeaderRemover<'a, const N: usize> {
    buffer: &'a mut NetBuffer,
    scratch: Option<[u8; N]>,
    removed: bool,
}

impl<'a, const N: usize> NetBufferHeaderRemover<'a, N> {
    pub fn new(buffer: &'a mut NetBuffer) -> Result<Self> {
        let scratch = if buffer.is_contiguous(0, N)? {
            None
        } else {
            let mut bytes = [0u8; N];
            buffer.read(0, &mut bytes)?;
            Some(bytes)
        };
        Ok(Self {
            buffer,
            scratch,
            removed: false,
        })
    }

    pub fn is_direct(&self) -> bool {
        self.scratch.is_none()
    }

    /// 剥离头部并结束访问。
    pub fn remove(mut self) -> Result<()> {
        self.removed = true;
        self.buffer.remove_header(N)
    }

    /// 放弃剥离。
    pub fn keep(mut self) {
        self.removed = true;
    }

    pub fn read_u16(&self, at: usize) -> u16 {
        u16::from_be_bytes([self[at], self[at + 1]])
    }

    pub fn read_u32(&self, at: usize) -> u32 {
        u32::from_be_bytes([self[at], self[at + 1], self[at + 2], self[at + 3]])
    }
}

impl<const N: usize> Deref for NetBufferHeaderRemover<'_, N> {
    type Target = [u8; N];

    fn deref(&self) -> &[u8; N] {
        if let Some(bytes) = &self.scratch {
            return bytes;
        }
        match self
            .buffer
            .direct_access(0, N)
            .ok()
            .and_then(<[u8]>::first_chunk::<N>)
        {
            Some(field) => field,
            None => unreachable!("header stays contiguous while the remover holds the buffer"),
        }
    }
}

impl<const N: usize> Drop for NetBufferHeaderRemover<'_, N> {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(err) = self.buffer.remove_header(N) {
            tracing::warn!(len = N, code = err.code(), error = %err, "header removal failed on drop");
        }
    }
}

/// 在头部扩张 `N` 字节并借出新区域，作用域结束时写回。
pub struct NetBufferPrepend<'a, const N: usize>(NetBufferField<'a, N>);

impl<'a, const N: usize> NetBufferPrepend<'a, N> {
    pub fn new(buffer: &'a mut NetBuffer) -> Result<Self> {
        let growth = buffer.grow_front(N)?;
        let view = if growth.is_contiguous() {
            match buffer.fresh_front_mut(N).first_chunk_mut::<N>() {
                Some(field) => View::Direct(field),
                None => unreachable!("fresh region holds exactly N bytes"),
            }
        } else {
            View::Scratch {
                buffer,
                bytes: [0u8; N],
            }
        };
        Ok(Self(NetBufferField {
            offset: 0,
            view,
            dirty: true,
        }))
    }

    pub fn finish(self) -> Result<()> {
        self.0.finish()
    }
}

impl<'a, const N: usize> Deref for NetBufferPrepend<'a, N> {
    type Target = NetBufferField<'a, N>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const N: usize> DerefMut for NetBufferPrepend<'_, N> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
