use core::fmt;
use std::net::{Ipv6Addr, SocketAddr};

/// `NetAddress` 是缓冲头部携带的源/目的地址槽位，容量覆盖所有支持的地址族。
///
/// # 设计初衷（Why）
/// - 各层在同一个缓冲上读写地址：数据链路层填入 MAC，网络层与传输层覆盖为 IP/端口；
/// - 以值类型内联存储，避免每个报文额外分配地址对象。
///
/// # 契约定义（What）
/// - `Unspecified` 为新建缓冲的初始值；
/// - `V4`/`V6` 存储原始地址与端口，`Link` 存储接口索引与硬件地址；
/// - `Display` 输出稳定格式，可直接用于日志字段。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum NetAddress {
    #[default]
    Unspecified,
    /// IPv4 地址。
    V4 { addr: [u8; 4], port: u16 },
    /// IPv6 地址。
    V6 { addr: [u16; 8], port: u16 },
    /// 链路层地址。
    Link { index: u32, mac: [u8; 6] },
}

impl NetAddress {
    pub fn is_unspecified(&self) -> bool {
        matches!(self, NetAddress::Unspecified)
    }

    /// IP 地址族的端口；链路层地址没有端口。
    pub fn port(&self) -> Option<u16> {
        match self {
            NetAddress::V4 { port, .. } | NetAddress::V6 { port, .. } => Some(*port),
            _ => None,
        }
    }

    /// 转换为标准库地址，仅 IP 地址族可用。
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        match *self {
            NetAddress::V4 { addr, port } => Some(SocketAddr::from((addr, port))),
            NetAddress::V6 { addr, port } => Some(SocketAddr::from((Ipv6Addr::from(addr), port))),
            _ => None,
        }
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetAddress::Unspecified => f.write_str("-"),
            NetAddress::V4 { addr, port } => {
                write!(f, "{}.{}.{}.{}:{}", addr[0], addr[1], addr[2], addr[3], port)
            }
            NetAddress::V6 { addr, port } => write!(f, "[{}]:{}", Ipv6Addr::from(*addr), port),
            NetAddress::Link { index, mac } => write!(
                f,
                "link#{index}/{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
            ),
        }
    }
}

impl From<SocketAddr> for NetAddress {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => NetAddress::V4 {
                addr: v4.ip().octets(),
                port: v4.port(),
            },
            SocketAddr::V6(v6) => NetAddress::V6 {
                addr: v6.ip().segments(),
                port: v6.port(),
            },
        }
    }
}

/// 报文进出的接口地址记录，缓冲以 `Arc` 反向引用。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub interface_index: u32,
    pub local: NetAddress,
    pub mask: Option<NetAddress>,
}

/// 各层复用的标量槽位，以显式标签区分含义。
///
/// 同一时刻只有设置标签的那一层解读它；读取方标签不符时得到 `None`，而不是被误读的数值。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LayerScalar {
    #[default]
    Unset,
    /// 分片重组使用的 `[start, end)` 区间。
    FragmentRange { start: u32, end: u32 },
    /// 传输层序号。
    Sequence(u32),
    /// 队列内的偏移或索引。
    QueueIndex(u32),
    /// 类型标签，例如链路层帧类型。
    TypeTag(u32),
}

impl LayerScalar {
    pub fn fragment_range(&self) -> Option<(u32, u32)> {
        match *self {
            LayerScalar::FragmentRange { start, end } => Some((start, end)),
            _ => None,
        }
    }

    pub fn sequence(&self) -> Option<u32> {
        match *self {
            LayerScalar::Sequence(value) => Some(value),
            _ => None,
        }
    }

    pub fn queue_index(&self) -> Option<u32> {
        match *self {
            LayerScalar::QueueIndex(value) => Some(value),
            _ => None,
        }
    }

    pub fn type_tag(&self) -> Option<u32> {
        match *self {
            LayerScalar::TypeTag(value) => Some(value),
            _ => None,
        }
    }
}

/// 缓冲标志位。
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const BROADCAST: Self = Self(1 << 0);
    pub const MULTICAST: Self = Self(1 << 1);
    pub const RAW: Self = Self(1 << 2);
    pub const FRAGMENTED: Self = Self(1 << 3);
    pub const CHECKSUM_VALID: Self = Self(1 << 4);
    pub const REASSEMBLED: Self = Self(1 << 5);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl core::ops::BitOr for BufferFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for BufferFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferFlags({:#06x})", self.0)
    }
}

/// 随缓冲在各层之间流转的元数据，复制/克隆/拆分时整体拷贝。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Metadata {
    pub(crate) source: NetAddress,
    pub(crate) destination: NetAddress,
    pub(crate) interface_address: Option<std::sync::Arc<InterfaceAddress>>,
    pub(crate) scalar: LayerScalar,
    pub(crate) flags: BufferFlags,
    pub(crate) msg_flags: u32,
    pub(crate) protocol: u16,
}
