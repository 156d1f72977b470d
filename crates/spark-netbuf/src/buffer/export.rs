//! 分散/聚集导出：把视图链交给驱动或向量化 I/O，不复制字节。零长度视图不导出。

use std::collections::vec_deque;
use std::io::{IoSlice, IoSliceMut};

use super::NetBuffer;
use crate::arena::ChunkView;
use crate::error::Result;

/// 按顺序遍历缓冲中非空的连续片段。
#[derive(Clone)]
pub struct Chunks<'a> {
    inner: vec_deque::Iter<'a, ChunkView>,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .by_ref()
            .find(|view| !view.is_empty())
            .map(ChunkView::bytes)
    }
}

impl NetBuffer {
    /// 非空片段迭代器。
    pub fn chunks(&self) -> Chunks<'_> {
        Chunks {
            inner: self.views.iter(),
        }
    }

    /// 导出所需的片段数。
    pub fn iovec_count(&self) -> usize {
        self.views.iter().filter(|view| !view.is_empty()).count()
    }

    /// 把片段写入 `out`，返回写入个数；`out` 不足时只导出前缀。
    pub fn fill_iovecs<'a>(&'a self, out: &mut [IoSlice<'a>]) -> usize {
        let mut count = 0;
        for (slot, chunk) in out.iter_mut().zip(self.chunks()) {
            *slot = IoSlice::new(chunk);
            count += 1;
        }
        count
    }

    /// 可写导出，供驱动直接接收数据；先私有化全部共享块，任一分配失败则不导出。
    pub fn fill_iovecs_mut<'a>(&'a mut self, out: &mut [IoSliceMut<'a>]) -> Result<usize> {
        let mut shared = 0;
        for view in self.views.iter_mut() {
            if !view.is_empty() && !view.is_unique() {
                shared += 1;
            }
        }
        let mut spares = self.arena.reserve_batch(shared)?;
        for view in self.views.iter_mut() {
            if !view.is_empty() && !view.is_unique() {
                if let Some(target) = spares.pop() {
                    self.arena.adopt(view, target);
                }
            }
        }

        let mut count = 0;
        let writable = self
            .views
            .iter_mut()
            .filter(|view| !view.is_empty())
            .filter_map(ChunkView::bytes_mut);
        for (slot, bytes) in out.iter_mut().zip(writable) {
            *slot = IoSliceMut::new(bytes);
            count += 1;
        }
        Ok(count)
    }
}
