//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为报文缓冲引擎的全部操作提供统一的结果类型，调用层（驱动、协议、套接字）据此决定丢包、
//!   回送协议错误或改走慢路径；
//! - 每个变体附带稳定错误码（[`codes`]），便于栈级计数器与日志按码聚合。
//!
//! ## 设计要求（What）
//! - `OutOfMemory`、`OutOfRange` 属于可预期的运行期失败，由调用层处理；
//! - `NotContiguous` 只是控制流信号，表示应改用字节拷贝接口；
//! - `InvalidHandle` 表示把另一个块池的缓冲交给了拼接或共享追加，属于调用方的编程错误。

use thiserror::Error;

/// 引擎内的稳定错误码表。
///
/// 码值遵循 `<域>.<语义>` 约定，与错误变体一一对应，不随消息文本变化。
pub mod codes {
    /// 块池已耗尽，无法获取新的存储块。
    pub const OUT_OF_MEMORY: &str = "netbuf.out_of_memory";
    /// 长度参数非法，例如裁剪长度超过当前大小或零长度校验和。
    pub const INVALID_SIZE: &str = "netbuf.invalid_size";
    /// 请求区间跨越多个块，无法提供直接指针。
    pub const NOT_CONTIGUOUS: &str = "netbuf.not_contiguous";
    /// 偏移或长度超出缓冲逻辑大小。
    pub const OUT_OF_RANGE: &str = "netbuf.out_of_range";
    /// 缓冲上不存在头部快照。
    pub const NO_SNAPSHOT: &str = "netbuf.no_snapshot";
    /// 参与操作的缓冲来自其他块池。
    pub const INVALID_HANDLE: &str = "netbuf.invalid_handle";
    /// 重复保存头部快照，原快照已被丢弃。
    pub const SNAPSHOT_CONFLICT: &str = "netbuf.snapshot_conflict";
    /// 配置无法解析或未通过校验。
    pub const INVALID_CONFIG: &str = "netbuf.invalid_config";
}

/// 报文缓冲引擎的错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把“块分配失败”“越界访问”“不连续”等情况显式化为返回值，
///   确保中断接收路径与发送快路径永不因错误而 panic。
/// - **契约 (What)**：
///   - 所有变体均为 `Copy`/`Send + Sync + 'static` 或仅携带 `String`，可安全跨线程传播；
///   - 任何返回错误的区间操作都保证缓冲保持调用前的状态；
///   - [`NetBufferError::code`] 返回稳定错误码，用于计数器与告警维度。
/// - **风险 (Trade-offs)**：`InvalidConfig` 携带自然语言描述，仅在初始化阶段出现，不影响数据面性能。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NetBufferError {
    /// 块池达到上限或系统分配失败。
    #[error("chunk arena exhausted: {live} of {limit} chunks in use")]
    OutOfMemory { live: usize, limit: usize },

    /// 长度参数不被接受。
    #[error("invalid size {requested} (current size {current})")]
    InvalidSize { requested: usize, current: usize },

    /// 请求区间跨越块边界，只能通过字节拷贝访问。
    #[error("range [{offset}, {offset}+{len}) is not chunk-contiguous")]
    NotContiguous { offset: usize, len: usize },

    /// 区间超出逻辑大小。
    #[error("range [{offset}, {offset}+{len}) exceeds buffer size {size}")]
    OutOfRange {
        offset: usize,
        len: usize,
        size: usize,
    },

    /// 未保存头部快照。
    #[error("buffer carries no stored header")]
    NoSnapshot,

    /// 参与操作的缓冲来自其他块池。
    #[error("buffer handle belongs to a different chunk arena")]
    InvalidHandle,

    /// 重复保存快照，原快照已作废。
    #[error("header was already stored by another layer; snapshot discarded")]
    SnapshotConflict,

    /// 配置未通过解析或校验。
    #[error("invalid net buffer configuration: {0}")]
    InvalidConfig(String),
}

impl NetBufferError {
    /// 返回与变体对应的稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            NetBufferError::OutOfMemory { .. } => codes::OUT_OF_MEMORY,
            NetBufferError::InvalidSize { .. } => codes::INVALID_SIZE,
            NetBufferError::NotContiguous { .. } => codes::NOT_CONTIGUOUS,
            NetBufferError::OutOfRange { .. } => codes::OUT_OF_RANGE,
            NetBufferError::NoSnapshot => codes::NO_SNAPSHOT,
            NetBufferError::InvalidHandle => codes::INVALID_HANDLE,
            NetBufferError::SnapshotConflict => codes::SNAPSHOT_CONFLICT,
            NetBufferError::InvalidConfig(_) => codes::INVALID_CONFIG,
        }
    }

    /// 是否为“改走字节拷贝”的控制流信号，而非真正的失败。
    pub fn is_control_signal(&self) -> bool {
        matches!(self, NetBufferError::NotContiguous { .. })
    }

    pub(crate) fn out_of_range(offset: usize, len: usize, size: usize) -> Self {
        NetBufferError::OutOfRange { offset, len, size }
    }
}

/// 引擎统一的结果别名。
pub type Result<T, E = NetBufferError> = core::result::Result<T, E>;

/// 校验 `[offset, offset + len)` 是否落在 `size` 之内，溢出同样视为越界。
pub(crate) fn check_range(offset: usize, len: usize, size: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(NetBufferError::out_of_range(offset, len, size)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_per_variant() {
        let cases = [
            (
                NetBufferError::OutOfMemory { live: 1, limit: 1 },
                codes::OUT_OF_MEMORY,
            ),
            (NetBufferError::NoSnapshot, codes::NO_SNAPSHOT),
            (
                NetBufferError::NotContiguous { offset: 0, len: 4 },
                codes::NOT_CONTIGUOUS,
            ),
            (
                NetBufferError::InvalidConfig("chunk_size".into()),
                codes::INVALID_CONFIG,
            ),
        ];
        for (error, code) in cases {
            assert_eq!(error.code(), code);
        }
    }

    #[test]
    fn range_check_rejects_overflow() {
        assert!(check_range(4, 4, 8).is_ok());
        assert!(check_range(8, 0, 8).is_ok());
        assert_eq!(
            check_range(usize::MAX, 2, 8),
            Err(NetBufferError::out_of_range(usize::MAX, 2, 8))
        );
        assert!(check_range(5, 4, 8).is_err());
    }

    #[test]
    fn not_contiguous_is_only_a_signal() {
        assert!(NetBufferError::NotContiguous { offset: 0, len: 1 }.is_control_signal());
        assert!(!NetBufferError::NoSnapshot.is_control_signal());
    }
}
