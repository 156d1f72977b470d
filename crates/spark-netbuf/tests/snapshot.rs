//! 头部快照的接收/重传路径测试。
//!
//! # 教案级说明
//! - **Why**：可靠传输在剥离头部后仍可能需要原始报文（例如回送 ICMP 错误或重传），
//!   快照让已剥离的字节继续可读；
//! - **What**：覆盖保存、逐层剥离、恢复读取、零拷贝追加，以及重复保存与头部扩张时的丢弃语义。

use spark_netbuf::{ArenaConfig, NetBuffer, NetBufferConfig, NetBufferError, NetBufferModule};

fn module() -> NetBufferModule {
    NetBufferModule::new(NetBufferConfig {
        arena: ArenaConfig {
            chunk_size: 64,
            max_chunks: 64,
            cache_limit: 16,
        },
        default_header_space: 0,
    })
    .expect("测试配置合法")
}

/// 以太网头 14 字节、IPv4 头 20 字节、载荷 50 字节，跨越两个块。
fn frame(module: &NetBufferModule) -> (NetBuffer, Vec<u8>) {
    let mut frame = module.create(0).expect("创建缓冲");
    let bytes: Vec<u8> = (0..84u8).collect();
    frame.append(&bytes[..64]).expect("首块");
    frame.append(&bytes[64..]).expect("次块");
    (frame, bytes)
}

#[test]
fn stripped_headers_remain_restorable() {
    let module = module();
    let (mut frame, bytes) = frame(&module);
    assert_eq!(frame.stored_header_length(), Err(NetBufferError::NoSnapshot));

    frame.store_header().expect("开始保存");
    frame.remove_header(14).expect("剥离以太网头");
    frame.remove_header(20).expect("剥离 IPv4 头");
    assert_eq!(frame.stored_header_length(), Ok(34));
    assert_eq!(frame.size(), 50);

    let mut whole = vec![0u8; 84];
    frame.restore_header(0, &mut whole).expect("恢复全部");
    assert_eq!(whole, bytes);

    let mut straddle = [0u8; 10];
    frame.restore_header(30, &mut straddle).expect("跨越快照与当前字节");
    assert_eq!(&straddle, &bytes[30..40]);

    let mut too_long = [0u8; 2];
    assert!(matches!(
        frame.restore_header(83, &mut too_long),
        Err(NetBufferError::OutOfRange { .. })
    ));
}

#[test]
fn header_stripped_across_chunks_is_recorded_in_order() {
    let module = module();
    let (mut frame, bytes) = frame(&module);
    frame.store_header().expect("开始保存");
    frame.remove_header(70).expect("跨块剥离");
    let mut restored = vec![0u8; 84];
    frame.restore_header(0, &mut restored).expect("恢复");
    assert_eq!(restored, bytes);
}

#[test]
fn writes_after_stripping_do_not_alter_snapshot() {
    let module = module();
    let (mut frame, bytes) = frame(&module);
    frame.store_header().expect("开始保存");
    frame.remove_header(14).expect("剥离");
    frame.write(0, &[0xff; 4]).expect("改写当前头部");
    let mut restored = [0u8; 18];
    frame.restore_header(0, &mut restored).expect("恢复");
    assert_eq!(&restored[..14], &bytes[..14]);
    assert_eq!(&restored[14..], &[0xff; 4]);
}

#[test]
fn append_restored_header_rebuilds_original_frame() {
    let module = module();
    let (mut frame, bytes) = frame(&module);
    frame.store_header().expect("开始保存");
    frame.remove_header(34).expect("剥离");

    let mut rebuilt = module.create(0).expect("创建缓冲");
    rebuilt
        .append_restored_header(&frame, 0, 84)
        .expect("追加恢复字节");
    assert_eq!(rebuilt.to_vec(), bytes);

    rebuilt.write(0, &[0; 14]).expect("写时复制");
    let mut restored = [0u8; 14];
    frame.restore_header(0, &mut restored).expect("原快照不受影响");
    assert_eq!(&restored, &bytes[..14]);

    let mut partial = module.create(0).expect("创建缓冲");
    partial
        .append_restored_header(&frame, 10, 10)
        .expect("只追加快照片段");
    assert_eq!(partial.to_vec(), &bytes[10..20]);
    assert_eq!(
        partial.append_restored_header(&frame, 80, 10),
        Err(NetBufferError::OutOfRange {
            offset: 80,
            len: 10,
            size: 84
        })
    );
}

#[test]
fn storing_twice_discards_the_snapshot() {
    let module = module();
    let (mut frame, _) = frame(&module);
    frame.store_header().expect("第一次保存");
    frame.remove_header(14).expect("剥离");
    assert_eq!(frame.store_header(), Err(NetBufferError::SnapshotConflict));
    assert_eq!(frame.stored_header_length(), Err(NetBufferError::NoSnapshot));
    frame.store_header().expect("丢弃后可以重新保存");
    assert_eq!(frame.stored_header_length(), Ok(0));
}

#[test]
fn growing_the_front_discards_the_snapshot() {
    let module = module();
    let (mut frame, _) = frame(&module);
    frame.store_header().expect("开始保存");
    frame.remove_header(14).expect("剥离");
    frame.prepend(&[0; 4]).expect("重新封装");
    let mut out = [0u8; 1];
    assert_eq!(
        frame.restore_header(0, &mut out),
        Err(NetBufferError::NoSnapshot)
    );
}

#[test]
fn snapshot_follows_clones_and_split_heads() {
    let module = module();
    let (mut frame, bytes) = frame(&module);
    frame.store_header().expect("开始保存");
    frame.remove_header(14).expect("剥离");

    let clone = frame.clone_buffer(false);
    assert_eq!(clone.stored_header_length(), Ok(14));

    let head = frame.split(20).expect("拆分");
    assert_eq!(head.stored_header_length(), Ok(14));
    assert_eq!(frame.stored_header_length(), Err(NetBufferError::NoSnapshot));
    let mut restored = [0u8; 34];
    head.restore_header(0, &mut restored).expect("恢复");
    assert_eq!(&restored[..], &bytes[..34]);
}

#[test]
fn failed_prepend_keeps_the_snapshot() {
    let module = NetBufferModule::new(NetBufferConfig {
        arena: ArenaConfig {
            chunk_size: 64,
            max_chunks: 1,
            cache_limit: 0,
        },
        default_header_space: 0,
    })
    .expect("测试配置合法");
    let mut packet = module.create(0).expect("创建缓冲");
    packet.append(b"HDRpayload").expect("载荷");
    packet.store_header().expect("开始保存");
    packet.remove_header(3).expect("剥离");

    assert!(matches!(
        packet.prepend(&[0; 200]),
        Err(NetBufferError::OutOfMemory { .. })
    ));
    assert_eq!(packet.to_vec(), b"payload");
    assert_eq!(packet.stored_header_length(), Ok(3));
    let mut restored = [0u8; 10];
    packet.restore_header(0, &mut restored).expect("恢复");
    assert_eq!(&restored, b"HDRpayload");
}

#[test]
fn inserting_at_the_front_discards_the_snapshot() {
    let module = module();
    let (mut frame, bytes) = frame(&module);
    frame.store_header().expect("开始保存");
    frame.remove_header(14).expect("剥离");
    frame.insert(0, &[0xee; 4]).expect("插入到最前");
    assert_eq!(frame.stored_header_length(), Err(NetBufferError::NoSnapshot));
    assert_eq!(&frame.to_vec()[..4], &[0xee; 4]);
    assert_eq!(&frame.to_vec()[4..], &bytes[14..]);

    frame.store_header().expect("重新保存");
    frame.insert(2, &[0xdd; 3]).expect("插入到中间");
    assert_eq!(frame.stored_header_length(), Ok(0));
}
