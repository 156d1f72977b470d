//! # checksum 模块说明
//!
//! ## 角色定位（Why）
//! - 协议层（IPv4 头、UDP/TCP 伪头部 + 载荷）需要互联网校验和（RFC 1071），
//!   载荷分散在多个视图中，逐段累加即可避免线性化拷贝；
//! - 伪头部与载荷往往分别求和，未取反的部分和需要可以直接合并。
//!
//! ## 约定（What）
//! - 数值以网络字节序解释：返回的 `u16` 通过 `to_be_bytes` 写回报文即可；
//! - 部分和按**缓冲内绝对偏移**对齐：从奇数偏移开始的片段，其和按字节交换后再累加，
//!   因此 `[0, n)` 与 `[n, n + m)` 的部分和经 [`combine`] 合并后等于 `[0, n + m)` 的部分和；
//! - [`finalize`] 对折叠后的和取反，得到可直接写入头部的校验和。

use crate::buffer::NetBuffer;
use crate::error::{NetBufferError, Result, check_range};

/// 把 32 位以上的累加折叠成 16 位反码和。
fn fold(mut sum: u64) -> u16 {
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}

/// 计算一段字节的反码和（未取反），末尾的奇数字节作为高位补零。
pub fn ones_complement_sum(data: &[u8]) -> u16 {
    let mut words = data.chunks_exact(2);
    let mut sum: u64 = words
        .by_ref()
        .map(|word| u64::from(u16::from_be_bytes([word[0], word[1]])))
        .sum();
    if let [last] = words.remainder() {
        sum += u64::from(*last) << 8;
    }
    fold(sum)
}

/// 合并两个部分和。
pub fn combine(left: u16, right: u16) -> u16 {
    fold(u64::from(left) + u64::from(right))
}

/// 取反得到最终校验和。
pub fn finalize(sum: u16) -> u16 {
    !sum
}

/// 把位于绝对偏移 `offset` 的片段计入累加器。
fn accumulate(sum: u64, segment: &[u8], offset: usize) -> u64 {
    let partial = ones_complement_sum(segment);
    let aligned = if offset % 2 == 1 {
        partial.swap_bytes()
    } else {
        partial
    };
    sum + u64::from(aligned)
}

impl NetBuffer {
    /// 计算 `[offset, offset + len)` 的互联网校验和。
    ///
    /// `finalize` 为假时返回折叠后的部分和，可与其它部分和通过 [`combine`] 合并；
    /// 为真时返回取反后的最终值。`len == 0` 返回 `InvalidSize`。
    pub fn checksum(&self, offset: usize, len: usize, finalize: bool) -> Result<u16> {
        if len == 0 {
            return Err(NetBufferError::InvalidSize {
                requested: 0,
                current: self.size(),
            });
        }
        check_range(offset, len, self.size())?;
        let mut sum = 0u64;
        let mut position = offset;
        for segment in self.segments(offset, len) {
            sum = accumulate(sum, segment, position);
            position += segment.len();
        }
        let folded = fold(sum);
        Ok(if finalize { self::finalize(folded) } else { folded })
    }
}
