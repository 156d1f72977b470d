//! 报文生命周期场景测试。
//!
//! # 教案级说明
//! - **Why**：协议栈对缓冲的使用集中在少数几条路径上：接收后逐层剥离、发送前逐层封装、
//!   克隆入队重传、块池耗尽时丢包。这里按真实调用顺序复现这些路径；
//! - **How**：使用小块（256 字节）与受限块池放大跨块与耗尽场景；
//! - **What**：每个场景同时断言逻辑长度与逐字节内容，失败时能定位到具体步骤。

use std::net::SocketAddr;
use std::sync::Arc;

use spark_netbuf::{
    AncillaryHeader, ArenaConfig, BufferFlags, InterfaceAddress, LayerScalar, NetAddress,
    NetBufferConfig, NetBufferError, NetBufferModule,
};

fn module(max_chunks: usize) -> NetBufferModule {
    NetBufferModule::new(NetBufferConfig {
        arena: ArenaConfig {
            chunk_size: 256,
            max_chunks,
            cache_limit: 64,
        },
        default_header_space: 64,
    })
    .expect("测试配置合法")
}

#[test]
fn udp_encapsulation_builds_contiguous_headers() {
    let module = module(16);
    let mut packet = module.create(14).expect("创建缓冲");
    let ipv4: Vec<u8> = (0..20u8).map(|byte| byte | 0x40).collect();
    packet.prepend(&ipv4).expect("写入 IPv4 头");
    packet.append(&[0x11; 8]).expect("写入 UDP 头");
    packet.append(&[0xab; 100]).expect("写入载荷");

    assert_eq!(packet.size(), 128);
    let header = packet.direct_access(0, 20).expect("IPv4 头应连续");
    assert_eq!(header[0], ipv4[0]);
    assert_eq!(header, &ipv4[..]);
    let mut udp = [0u8; 8];
    packet.read(20, &mut udp).expect("读取 UDP 头");
    assert_eq!(udp, [0x11; 8]);
}

#[test]
fn receive_path_strips_headers_layer_by_layer() {
    let module = module(16);
    let mut frame = module.create(0).expect("创建缓冲");
    frame.append(&[0xee; 14]).expect("以太网头");
    frame.append(&[0x45; 20]).expect("IPv4 头");
    frame.append(b"datagram body").expect("载荷");
    frame.set_scalar(LayerScalar::TypeTag(0x0800));

    frame.remove_header(14).expect("剥离以太网头");
    assert_eq!(frame.scalar().type_tag(), Some(0x0800));
    frame.set_scalar(LayerScalar::FragmentRange { start: 0, end: 13 });
    frame.remove_header(20).expect("剥离 IPv4 头");
    assert_eq!(frame.to_vec(), b"datagram body");
    assert_eq!(frame.scalar().type_tag(), None);
    assert_eq!(frame.scalar().fragment_range(), Some((0, 13)));
}

#[test]
fn prepend_then_remove_header_is_identity() {
    let module = module(16);
    let mut packet = module.create(32).expect("创建缓冲");
    packet.append(b"stable payload").expect("载荷");
    let before = packet.to_vec();
    packet.prepend(&[7; 300]).expect("跨块头部");
    packet.remove_header(300).expect("剥离");
    assert_eq!(packet.size(), before.len());
    assert_eq!(packet.to_vec(), before);
}

#[test]
fn duplicate_is_fully_independent() {
    let module = module(16);
    let mut original = module.create(16).expect("创建缓冲");
    original.append(&[1; 300]).expect("跨块载荷");
    original.set_protocol(6);
    let mut copy = original.duplicate().expect("深拷贝");
    assert_eq!(copy.to_vec(), original.to_vec());
    assert_eq!(copy.protocol(), 6);

    original.write(0, &[9; 10]).expect("写原缓冲");
    copy.write(290, &[8; 10]).expect("写副本");
    assert_eq!(&original.to_vec()[..10], &[9; 10]);
    assert_eq!(&copy.to_vec()[..10], &[1; 10]);
    assert_eq!(&original.to_vec()[290..], &[1; 10]);
}

#[test]
fn clone_without_free_space_is_copy_on_write_both_ways() {
    let module = module(16);
    let mut a = module.create(0).expect("创建缓冲");
    a.append(b"shared bytes").expect("载荷");
    let mut b = a.clone_buffer(false);

    a.write(0, b"SHARED").expect("写 a");
    assert_eq!(b.to_vec(), b"shared bytes");
    b.write(7, b"BYTES").expect("写 b");
    assert_eq!(a.to_vec(), b"SHARED bytes");
    assert_eq!(b.to_vec(), b"shared BYTES");

    b.append(b"!").expect("b 追加");
    assert_eq!(a.to_vec(), b"SHARED bytes");
}

#[test]
fn clone_sharing_free_space_appends_in_place() {
    let module = module(16);
    let mut a = module.create(0).expect("创建缓冲");
    a.append(b"request").expect("载荷");
    let mut clone = a.clone_buffer(true);
    let chunks_before = module.stats().live_chunks;

    clone.append(b" + reply").expect("克隆追加");
    assert_eq!(module.stats().live_chunks, chunks_before, "应原地使用共享尾部空间");
    assert_eq!(a.size(), 7);
    assert_eq!(a.to_vec(), b"request");
    assert_eq!(clone.to_vec(), b"request + reply");
}

#[test]
fn competing_appenders_never_overwrite_each_other() {
    let module = module(16);
    let mut a = module.create(0).expect("创建缓冲");
    a.append(b"base").expect("载荷");
    let mut clone = a.clone_buffer(true);
    clone.append(b"-clone").expect("克隆先追加");
    a.append(b"-owner").expect("原缓冲退回新块");
    assert_eq!(clone.to_vec(), b"base-clone");
    assert_eq!(a.to_vec(), b"base-owner");
    if cfg!(debug_assertions) {
        assert_eq!(module.stats().space_conflicts, 1);
    }
}

#[test]
fn split_then_merge_reproduces_original() {
    let module = module(32);
    let mut original = module.create(8).expect("创建缓冲");
    let data: Vec<u8> = (0..=255u8).cycle().take(700).collect();
    original.append(&data).expect("跨块载荷");

    for offset in [0, 1, 255, 256, 257, 511, 699, 700] {
        let mut rest = original.clone_buffer(false);
        let mut head = rest.split(offset).expect("拆分");
        assert_eq!(head.size(), offset);
        assert_eq!(rest.size(), data.len() - offset);
        head.merge(rest, true).expect("同一块池");
        assert_eq!(head.to_vec(), data, "offset {offset}");
    }
}

#[test]
fn merge_in_front_prepends_views() {
    let module = module(16);
    let mut payload = module.create(0).expect("创建缓冲");
    payload.append(b"payload").expect("载荷");
    let mut header = module.create(0).expect("创建缓冲");
    header.append(b"header:").expect("头部");
    payload.merge(header, false).expect("同一块池");
    assert_eq!(payload.to_vec(), b"header:payload");
    assert_eq!(module.stats().live_buffers, 1);
}

#[test]
fn exhausted_pool_leaves_buffer_untouched() {
    let module = module(2);
    let mut packet = module.create(0).expect("创建缓冲");
    packet.append(&[5; 200]).expect("首块");
    let before = packet.to_vec();

    let err = packet.append_size(600).expect_err("块池不足");
    assert!(matches!(err, NetBufferError::OutOfMemory { .. }));
    assert_eq!(err.code(), "netbuf.out_of_memory");
    assert_eq!(packet.size(), 200);
    assert_eq!(packet.to_vec(), before);

    assert!(packet.prepend(&[1; 300]).is_err());
    assert_eq!(packet.to_vec(), before);

    packet.append(&[6; 56]).expect("剩余尾部空间仍可原地使用");
    assert_eq!(packet.size(), 256);
}

#[test]
fn failed_growth_keeps_snapshot_and_metadata() {
    let module = module(2);
    let mut packet = module.create(0).expect("创建缓冲");
    let frame: Vec<u8> = (0..200u8).collect();
    packet.append(&frame).expect("首块");
    packet.set_protocol(6);
    packet.set_scalar(LayerScalar::Sequence(41));
    packet.flags_mut().insert(BufferFlags::CHECKSUM_VALID);
    packet.store_header().expect("开始保存");
    packet.remove_header(20).expect("剥离 IPv4 头");

    let failures = [
        packet.prepend(&[0; 600]),
        packet.prepend_size(600).map(|_| ()),
        packet.append_size(600).map(|_| ()),
        packet.insert(0, &[0; 600]),
        packet.insert(90, &[0; 600]),
    ];
    for result in failures {
        assert!(matches!(result, Err(NetBufferError::OutOfMemory { .. })));
    }

    assert_eq!(packet.to_vec(), &frame[20..]);
    assert_eq!(packet.stored_header_length(), Ok(20));
    let mut restored = vec![0u8; 200];
    packet.restore_header(0, &mut restored).expect("快照仍然完整");
    assert_eq!(restored, frame);
    assert_eq!(packet.protocol(), 6);
    assert_eq!(packet.scalar(), LayerScalar::Sequence(41));
    assert_eq!(packet.flags().bits(), BufferFlags::CHECKSUM_VALID.bits());
}

#[test]
fn foreign_arena_buffers_are_rejected() {
    let small = NetBufferModule::new(NetBufferConfig {
        arena: ArenaConfig {
            chunk_size: 64,
            max_chunks: 16,
            cache_limit: 4,
        },
        default_header_space: 0,
    })
    .expect("测试配置合法");
    let large = NetBufferModule::new(NetBufferConfig {
        arena: ArenaConfig {
            chunk_size: 2048,
            max_chunks: 16,
            cache_limit: 4,
        },
        default_header_space: 0,
    })
    .expect("测试配置合法");

    let mut foreign = large.create(0).expect("创建缓冲");
    foreign.append(&[7; 1000]).expect("载荷");
    foreign.store_header().expect("开始保存");
    foreign.remove_header(10).expect("剥离");
    let mut local = small.create(0).expect("创建缓冲");
    local.append(&[1; 20]).expect("载荷");
    let before = local.to_vec();

    let err = local
        .merge(foreign.clone_buffer(false), true)
        .expect_err("不同块池");
    assert_eq!(err, NetBufferError::InvalidHandle);
    assert_eq!(err.code(), "netbuf.invalid_handle");
    assert_eq!(
        local.merge(foreign.clone_buffer(false), false),
        Err(NetBufferError::InvalidHandle)
    );
    assert_eq!(
        local.append_cloned(&foreign, 0, 100),
        Err(NetBufferError::InvalidHandle)
    );
    assert_eq!(
        local.append_restored_header(&foreign, 0, 100),
        Err(NetBufferError::InvalidHandle)
    );
    assert_eq!(local.to_vec(), before);

    local.write(10, &[1, 2, 3]).expect("只涉及本块池的块");
    assert_eq!(&local.to_vec()[10..13], &[1, 2, 3]);
    assert_eq!(foreign.to_vec(), vec![7; 990]);
    assert_eq!(large.stats().live_chunks, 1);
}

#[test]
fn metadata_follows_clone_and_split() {
    let module = module(16);
    let mut packet = module.create(0).expect("创建缓冲");
    packet.append(b"abcdef").expect("载荷");
    let source: SocketAddr = "192.0.2.1:5353".parse().expect("合法地址");
    let destination: SocketAddr = "192.0.2.9:53".parse().expect("合法地址");
    packet.set_source(source);
    packet.set_destination(destination);
    packet.set_interface_address(Some(Arc::new(InterfaceAddress {
        interface_index: 3,
        local: NetAddress::from(destination),
        mask: None,
    })));
    packet.set_msg_flags(0x40);

    let clone = packet.clone_buffer(false);
    assert_eq!(clone.source(), &NetAddress::from(source));
    assert_eq!(clone.msg_flags(), 0x40);
    assert_eq!(
        clone.interface_address().map(|address| address.interface_index),
        Some(3)
    );

    let head = packet.split(2).expect("拆分");
    assert_eq!(head.destination(), &NetAddress::from(destination));

    packet.swap_addresses();
    assert_eq!(packet.source(), &NetAddress::from(destination));
    assert_eq!(packet.destination(), &NetAddress::from(source));
    assert_eq!(packet.to_vec(), b"cdef");
}

#[test]
fn checksum_partials_combine_across_chunks() {
    let module = module(16);
    let mut packet = module.create(0).expect("创建缓冲");
    let data: Vec<u8> = (0..600u32).map(|value| (value * 7 % 251) as u8).collect();
    packet.append(&data).expect("跨块载荷");

    let whole = packet.checksum(0, 600, true).expect("整体校验和");
    for split in [1, 255, 256, 301, 599] {
        let left = packet.checksum(0, split, false).expect("前段");
        let right = packet.checksum(split, 600 - split, false).expect("后段");
        let combined = spark_netbuf::checksum::finalize(spark_netbuf::checksum::combine(left, right));
        assert_eq!(combined, whole, "split {split}");
    }
    assert_eq!(
        whole,
        spark_netbuf::checksum::finalize(spark_netbuf::checksum::ones_complement_sum(&data))
    );
    assert!(matches!(
        packet.checksum(0, 0, true),
        Err(NetBufferError::InvalidSize { .. })
    ));
    assert!(matches!(
        packet.checksum(590, 20, true),
        Err(NetBufferError::OutOfRange { .. })
    ));
}

#[test]
fn ancillary_data_moves_with_one_owner() {
    let module = module(16);
    let mut received = module.create(0).expect("创建缓冲");
    let mut queued = module.create(0).expect("创建缓冲");
    let header = AncillaryHeader { level: 0, kind: 1 };
    received.ancillary_or_default().add(header, vec![1, 2, 3, 4]);
    queued.ancillary_or_default().add(header, vec![9]);

    assert_eq!(queued.transfer_ancillary_from(&mut received), Some(1));
    assert!(received.ancillary().is_none());
    let container = queued.ancillary().expect("目标持有容器");
    assert_eq!(container.len(), 2);
    assert_eq!(
        container.get(1).map(|entry| entry.payload().to_vec()),
        Some(vec![1, 2, 3, 4])
    );
}

#[test]
fn freeing_all_buffers_returns_every_chunk() {
    let module = module(32);
    {
        let mut packet = module.create(64).expect("创建缓冲");
        packet.append(&[3; 900]).expect("跨块载荷");
        let clone = packet.clone_buffer(true);
        let mut copy = packet.duplicate().expect("深拷贝");
        copy.append_cloned(&clone, 100, 400).expect("零拷贝追加");
        module.free(Some(clone));
        module.free(None);
        assert!(module.stats().live_chunks > 0);
    }
    let stats = module.stats();
    assert_eq!(stats.live_chunks, 0);
    assert_eq!(stats.live_buffers, 0);
    assert!(stats.cached_chunks > 0);
    assert!(module.shrink_to_fit() > 0);
}
