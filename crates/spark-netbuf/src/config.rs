use serde::Deserialize;

use crate::error::{NetBufferError, Result};

/// 默认块容量，与经典内核网络缓冲的 2 KiB 数据块保持一致。
pub const DEFAULT_CHUNK_SIZE: usize = 2048;
/// 默认块池上限。
pub const DEFAULT_MAX_CHUNKS: usize = 8192;
/// 默认空闲块缓存上限。
pub const DEFAULT_CACHE_LIMIT: usize = 512;
/// 默认预留的头部空间，覆盖以太网 + IPv6 + TCP 选项的常见组合。
pub const DEFAULT_HEADER_SPACE: usize = 128;
/// 可接受的最小块容量。
pub const MIN_CHUNK_SIZE: usize = 64;

/// `ArenaConfig` 描述块池的容量参数。
///
/// # 契约说明（What）
/// - `chunk_size`：单个块的字节容量，所有块等长；
/// - `max_chunks`：同时存活的块上限，达到后分配返回 `OutOfMemory` 而不是阻塞；
/// - `cache_limit`：释放后保留在自由链表中的块数上限，超出部分直接归还系统。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArenaConfig {
    pub chunk_size: usize,
    pub max_chunks: usize,
    pub cache_limit: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunks: DEFAULT_MAX_CHUNKS,
            cache_limit: DEFAULT_CACHE_LIMIT,
        }
    }
}

impl ArenaConfig {
    /// 校验参数组合。
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size < MIN_CHUNK_SIZE {
            return Err(NetBufferError::InvalidConfig(format!(
                "chunk_size {} is below the minimum of {MIN_CHUNK_SIZE}",
                self.chunk_size
            )));
        }
        if self.max_chunks == 0 {
            return Err(NetBufferError::InvalidConfig(
                "max_chunks must allow at least one chunk".to_owned(),
            ));
        }
        Ok(())
    }
}

/// `NetBufferConfig` 是引擎在协议栈启动时接收的完整配置。
///
/// # 设计背景（Why）
/// - 协议栈初始化阶段一次性确定块池规模与默认头部空间，之后以上下文对象注入各层；
/// - 支持从 TOML 片段加载，字段缺省时回落到编译期默认值，便于在部署脚本中只覆盖关心的项。
///
/// # 示例
/// ```
/// use spark_netbuf::NetBufferConfig;
///
/// let config = NetBufferConfig::from_toml_str(
///     r#"
///     default_header_space = 64
///
///     [arena]
///     chunk_size = 1024
///     max_chunks = 32
///     "#,
/// )
/// .unwrap();
/// assert_eq!(config.arena.chunk_size, 1024);
/// assert_eq!(config.arena.cache_limit, spark_netbuf::config::DEFAULT_CACHE_LIMIT);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetBufferConfig {
    pub arena: ArenaConfig,
    pub default_header_space: usize,
}

impl Default for NetBufferConfig {
    fn default() -> Self {
        Self {
            arena: ArenaConfig::default(),
            default_header_space: DEFAULT_HEADER_SPACE,
        }
    }
}

impl NetBufferConfig {
    /// 从 TOML 文本解析并校验配置。
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: NetBufferConfig =
            toml::from_str(source).map_err(|err| NetBufferError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 校验块池参数与默认头部空间。
    pub fn validate(&self) -> Result<()> {
        self.arena.validate()?;
        if self.default_header_space > self.arena.chunk_size {
            return Err(NetBufferError::InvalidConfig(format!(
                "default_header_space {} exceeds chunk_size {}",
                self.default_header_space, self.arena.chunk_size
            )));
        }
        Ok(())
    }
}
