//! `spark-netbuf` 提供分层协议栈使用的零拷贝报文缓冲引擎。
//!
//! # 模块定位（Why）
//! - 报文从驱动经数据链路、网络、传输层上行，或反向下行，每层都要添加或剥离头部；
//!   引擎让每一层看到连续的逻辑区间，而字节实际分散在若干可共享的定长块中；
//! - 克隆、拆分、拼接与零拷贝追加只移动块引用，写入共享字节前自动复制，
//!   接收中断与发送快路径上不会阻塞，也不会因错误而 panic。
//!
//! # 设计概要（How）
//! - `arena`：定长块池，`Arc` 引用计数与原子认领标记，`spin::Mutex` 保护自由链表；
//! - `buffer`：[`NetBuffer`] 句柄及其区间操作、字节读写、头部快照与分散/聚集导出；
//! - `checksum`：跨块的互联网校验和，部分和可合并；
//! - `ancillary`：随报文转移的带外元数据容器；
//! - `field`：定长协议字段的作用域访问器，连续时直接借出块内存，跨块时使用暂存区并写回；
//! - `module`：[`NetBufferModule`] 上下文对象，协议栈初始化时构建并注入各层。
//!
//! # 使用示例
//! ```
//! use spark_netbuf::{NetBufferModule, NetBufferConfig};
//!
//! let module = NetBufferModule::new(NetBufferConfig::default()).unwrap();
//! let mut packet = module.create(14).unwrap();
//! packet.append(b"payload").unwrap();
//! packet.prepend(&[0x45; 20]).unwrap();
//! assert_eq!(packet.size(), 27);
//! assert_eq!(packet.direct_access(0, 1).unwrap(), &[0x45]);
//! ```

mod ancillary;
mod arena;
mod buffer;
pub mod checksum;
pub mod config;
pub mod error;
mod field;
mod module;

pub use ancillary::{AncillaryContainer, AncillaryEntry, AncillaryHeader};
pub use arena::{ArenaStats, ChunkArena, ChunkId, ChunkRecycler, ReclaimedChunk};
pub use buffer::{BufferFlags, Chunks, InterfaceAddress, LayerScalar, NetAddress, NetBuffer};
pub use config::{ArenaConfig, NetBufferConfig};
pub use error::{NetBufferError, Result};
pub use field::{
    NetBufferField, NetBufferFieldReader, NetBufferHeaderReader, NetBufferHeaderRemover,
    NetBufferPrepend, View,
};
pub use module::NetBufferModule;
