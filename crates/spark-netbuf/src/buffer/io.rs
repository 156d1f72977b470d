//! 字节读写与直接访问。
//!
//! `direct_access*` 只在区间落在单个视图内时给出切片，否则返回 `NotContiguous` 提示改用拷贝接口；
//! `read`/`write` 对任意合法区间都可用，跨视图时逐段拷贝。写入前对触及的共享块执行写时复制。

use super::NetBuffer;
use crate::error::{NetBufferError, Result, check_range};

impl NetBuffer {
    /// `offset` 所在视图的下标与视图内偏移，跳过零长度视图；`offset` 必须小于 `size`。
    fn locate(&self, offset: usize) -> Option<(usize, usize)> {
        let mut position = 0;
        for (index, view) in self.views.iter().enumerate() {
            let len = view.len();
            if offset < position + len {
                return Some((index, offset - position));
            }
            position += len;
        }
        None
    }

    /// 区间是否落在单个视图内；越界返回 `OutOfRange`。
    pub fn is_contiguous(&self, offset: usize, len: usize) -> Result<bool> {
        check_range(offset, len, self.size)?;
        if len == 0 {
            return Ok(true);
        }
        Ok(self
            .locate(offset)
            .is_some_and(|(index, inner)| inner + len <= self.views[index].len()))
    }

    /// 只读直接访问。
    pub fn direct_access(&self, offset: usize, len: usize) -> Result<&[u8]> {
        check_range(offset, len, self.size)?;
        if len == 0 {
            return Ok(&[]);
        }
        let (index, inner) = self
            .locate(offset)
            .ok_or_else(|| NetBufferError::out_of_range(offset, len, self.size))?;
        let bytes = self.views[index].bytes();
        if inner + len > bytes.len() {
            return Err(NetBufferError::NotContiguous { offset, len });
        }
        Ok(&bytes[inner..inner + len])
    }

    /// 可写直接访问；所在块被共享时先复制，因此可能返回 `OutOfMemory`。
    pub fn direct_access_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8]> {
        check_range(offset, len, self.size)?;
        if len == 0 {
            return Ok(&mut []);
        }
        let (index, inner) = self
            .locate(offset)
            .ok_or_else(|| NetBufferError::out_of_range(offset, len, self.size))?;
        if inner + len > self.views[index].len() {
            return Err(NetBufferError::NotContiguous { offset, len });
        }
        let view = &mut self.views[index];
        self.arena.privatize(view)?;
        match view.bytes_mut() {
            Some(bytes) => Ok(&mut bytes[inner..inner + len]),
            None => unreachable!("privatized view must own its chunk"),
        }
    }

    /// 把 `[offset, offset + out.len())` 拷贝到 `out`。
    pub fn read(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        check_range(offset, out.len(), self.size)?;
        let mut written = 0;
        for segment in self.segments(offset, out.len()) {
            out[written..written + segment.len()].copy_from_slice(segment);
            written += segment.len();
        }
        debug_assert_eq!(written, out.len());
        Ok(())
    }

    /// 把 `data` 写到 `offset` 处；先为所有触及的共享块取得副本，任何一块分配失败则不写入。
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        check_range(offset, data.len(), self.size)?;
        if data.is_empty() {
            return Ok(());
        }
        let touched = self.touched_views(offset, data.len());
        let mut shared = 0;
        for index in touched.clone() {
            if !self.views[index].is_unique() {
                shared += 1;
            }
        }
        let mut spares = self.arena.reserve_batch(shared)?;

        let end = offset + data.len();
        let mut position: usize = self.views.iter().take(touched.start).map(|view| view.len()).sum();
        for index in touched {
            let view = &mut self.views[index];
            if !view.is_unique() {
                if let Some(target) = spares.pop() {
                    self.arena.adopt(view, target);
                }
            }
            let view_start = position;
            position += view.len();
            let lo = offset.max(view_start);
            let hi = end.min(position);
            if lo >= hi {
                continue;
            }
            match view.bytes_mut() {
                Some(bytes) => bytes[lo - view_start..hi - view_start]
                    .copy_from_slice(&data[lo - offset..hi - offset]),
                None => unreachable!("privatized view must own its chunk"),
            }
        }
        tracing::trace!(offset, bytes = data.len(), copies = shared, "write");
        Ok(())
    }

    /// 拷贝全部字节。
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size);
        for segment in self.chunks() {
            out.extend_from_slice(segment);
        }
        out
    }

    /// `[offset, offset + len)` 按视图切开的只读片段。
    pub(crate) fn segments(&self, offset: usize, len: usize) -> impl Iterator<Item = &[u8]> + '_ {
        let end = offset + len;
        let mut position = 0;
        self.views.iter().filter_map(move |view| {
            let view_start = position;
            position += view.len();
            let lo = offset.max(view_start);
            let hi = end.min(position);
            (lo < hi).then(|| &view.bytes()[lo - view_start..hi - view_start])
        })
    }

    /// 与 `[offset, offset + len)` 相交的视图下标区间。
    fn touched_views(&self, offset: usize, len: usize) -> core::ops::Range<usize> {
        let end = offset + len;
        let mut position = 0;
        let mut first = None;
        let mut last = 0;
        for (index, view) in self.views.iter().enumerate() {
            let view_start = position;
            position += view.len();
            if view.len() > 0 && view_start < end && position > offset {
                first.get_or_insert(index);
                last = index + 1;
            }
        }
        first.map_or(0..0, |first| first..last)
    }
}
