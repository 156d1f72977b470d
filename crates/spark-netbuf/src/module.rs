use crate::arena::{ArenaStats, ChunkArena};
use crate::buffer::NetBuffer;
use crate::config::NetBufferConfig;
use crate::error::Result;

/// `NetBufferModule` 是协议栈启动时构建、随后注入各层的缓冲引擎上下文。
///
/// # 设计背景（Why）
/// - 各层（驱动、数据链路、网络、传输、套接字）都需要创建缓冲，但不应依赖进程级全局状态；
/// - 上下文对象持有块池与默认参数，克隆成本只是一次 `Arc` 计数，可随层初始化参数传递。
///
/// # 契约说明（What）
/// - 由同一上下文创建的缓冲共享块池，统计信息通过 [`stats`](Self::stats) 汇总；
/// - 上下文被丢弃后，已创建的缓冲仍然有效，块池在最后一个缓冲释放后回收。
#[derive(Clone, Debug)]
pub struct NetBufferModule {
    arena: ChunkArena,
    config: NetBufferConfig,
}

impl NetBufferModule {
    /// 校验配置并构建块池。
    pub fn new(config: NetBufferConfig) -> Result<Self> {
        config.validate()?;
        let arena = ChunkArena::new(config.arena)?;
        tracing::debug!(
            chunk_size = config.arena.chunk_size,
            max_chunks = config.arena.max_chunks,
            default_header_space = config.default_header_space,
            "net buffer module initialized"
        );
        Ok(Self { arena, config })
    }

    /// 从 TOML 配置片段构建。
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Self::new(NetBufferConfig::from_toml_str(source)?)
    }

    /// 创建空缓冲，预留 `header_space` 字节头部空间。
    pub fn create(&self, header_space: usize) -> Result<NetBuffer> {
        NetBuffer::with_arena(&self.arena, header_space)
    }

    /// 以配置中的默认头部空间创建缓冲。
    pub fn create_default(&self) -> Result<NetBuffer> {
        self.create(self.config.default_header_space)
    }

    /// 释放缓冲；传入 `None` 时什么也不做。
    pub fn free(&self, buffer: Option<NetBuffer>) {
        drop(buffer);
    }

    pub fn arena(&self) -> &ChunkArena {
        &self.arena
    }

    pub fn config(&self) -> &NetBufferConfig {
        &self.config
    }

    pub fn stats(&self) -> ArenaStats {
        self.arena.stats()
    }

    /// 丢弃块池缓存，返回释放的字节数。
    pub fn shrink_to_fit(&self) -> usize {
        self.arena.shrink_to_fit()
    }
}

impl Default for NetBufferModule {
    fn default() -> Self {
        let config = NetBufferConfig::default();
        match ChunkArena::new(config.arena) {
            Ok(arena) => Self { arena, config },
            Err(err) => unreachable!("default configuration must validate: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn free_accepts_absent_handles() {
        let module = NetBufferModule::default();
        module.free(None);
        let buffer = module.create_default().expect("创建缓冲");
        assert_eq!(module.stats().live_buffers, 1);
        module.free(Some(buffer));
        assert_eq!(module.stats().live_buffers, 0);
        assert_eq!(module.stats().live_chunks, 0);
    }

    #[traced_test]
    #[test]
    fn exhaustion_is_logged() {
        let module = NetBufferModule::from_toml_str("[arena]\nmax_chunks = 1\n").expect("配置合法");
        let _held = module.create(0).expect("第一块");
        assert!(module.create(0).is_err());
        assert!(logs_contain("chunk allocation refused"));
    }
}
