#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use spark_netbuf::{ArenaConfig, NetBuffer, NetBufferConfig, NetBufferModule};

/// Fuzz 输入：一组缓冲句柄上的操作序列。
///
/// - **Why**：克隆共享空闲空间、写时复制与块池耗尽三者交织时最容易出现字节串扰，
///   手写用例难以覆盖全部组合；
/// - **How**：块池只有 24 个 64 字节的块，操作经常因 `OutOfMemory` 失败，
///   每个句柄配一个 `Vec<u8>` 影子模型，失败时模型不变；
/// - **What**：每步之后所有句柄的字节都必须与各自模型一致，任何串扰都会触发断言。
#[derive(Debug, Arbitrary)]
struct NetBufCase {
    ops: Vec<BufferOp>,
}

#[derive(Debug, Arbitrary)]
enum BufferOp {
    Create { header_space: u8 },
    Append { id: u8, data: Vec<u8> },
    Prepend { id: u8, data: Vec<u8> },
    Write { id: u8, offset: u16, data: Vec<u8> },
    RemoveHeader { id: u8, len: u16 },
    Trim { id: u8, size: u16 },
    Clone { id: u8, share_free_space: bool },
    Duplicate { id: u8 },
    Split { id: u8, offset: u16 },
    Merge { id: u8, with: u8, after: bool },
    AppendCloned { id: u8, from: u8, offset: u16, len: u16 },
    Free { id: u8 },
}

fn index(handles: &[(NetBuffer, Vec<u8>)], id: u8) -> Option<usize> {
    (!handles.is_empty()).then(|| usize::from(id) % handles.len())
}

fuzz_target!(|case: NetBufCase| {
    let Ok(module) = NetBufferModule::new(NetBufferConfig {
        arena: ArenaConfig {
            chunk_size: 64,
            max_chunks: 24,
            cache_limit: 4,
        },
        default_header_space: 8,
    }) else {
        return;
    };
    let mut handles: Vec<(NetBuffer, Vec<u8>)> = Vec::new();

    for op in case.ops {
        match op {
            BufferOp::Create { header_space } => {
                if let Ok(buffer) = module.create(usize::from(header_space)) {
                    handles.push((buffer, Vec::new()));
                }
            }
            BufferOp::Append { id, data } => {
                let Some(i) = index(&handles, id) else { continue };
                let (buffer, model) = &mut handles[i];
                if buffer.append(&data).is_ok() {
                    model.extend_from_slice(&data);
                }
            }
            BufferOp::Prepend { id, data } => {
                let Some(i) = index(&handles, id) else { continue };
                let (buffer, model) = &mut handles[i];
                if buffer.prepend(&data).is_ok() {
                    model.splice(0..0, data.iter().copied());
                }
            }
            BufferOp::Write { id, offset, data } => {
                let Some(i) = index(&handles, id) else { continue };
                let (buffer, model) = &mut handles[i];
                let offset = usize::from(offset);
                if buffer.write(offset, &data).is_ok() {
                    model[offset..offset + data.len()].copy_from_slice(&data);
                }
            }
            BufferOp::RemoveHeader { id, len } => {
                let Some(i) = index(&handles, id) else { continue };
                let (buffer, model) = &mut handles[i];
                let len = usize::from(len);
                if buffer.remove_header(len).is_ok() {
                    model.drain(..len);
                }
            }
            BufferOp::Trim { id, size } => {
                let Some(i) = index(&handles, id) else { continue };
                let (buffer, model) = &mut handles[i];
                let size = usize::from(size);
                if buffer.trim(size).is_ok() {
                    model.truncate(size);
                }
            }
            BufferOp::Clone { id, share_free_space } => {
                let Some(i) = index(&handles, id) else { continue };
                let clone = handles[i].0.clone_buffer(share_free_space);
                let model = handles[i].1.clone();
                handles.push((clone, model));
            }
            BufferOp::Duplicate { id } => {
                let Some(i) = index(&handles, id) else { continue };
                if let Ok(copy) = handles[i].0.duplicate() {
                    let model = handles[i].1.clone();
                    handles.push((copy, model));
                }
            }
            BufferOp::Split { id, offset } => {
                let Some(i) = index(&handles, id) else { continue };
                let (buffer, model) = &mut handles[i];
                let offset = usize::from(offset);
                if let Ok(head) = buffer.split(offset) {
                    let head_model: Vec<u8> = model.drain(..offset).collect();
                    handles.push((head, head_model));
                }
            }
            BufferOp::Merge { id, with, after } => {
                let (Some(i), Some(j)) = (index(&handles, id), index(&handles, with)) else {
                    continue;
                };
                if i == j {
                    continue;
                }
                let (other, other_model) = handles.swap_remove(j);
                let i = if i == handles.len() { j } else { i };
                let (buffer, model) = &mut handles[i];
                buffer.merge(other, after).expect("all handles share one arena");
                if after {
                    model.extend_from_slice(&other_model);
                } else {
                    model.splice(0..0, other_model);
                }
            }
            BufferOp::AppendCloned { id, from, offset, len } => {
                let (Some(i), Some(j)) = (index(&handles, id), index(&handles, from)) else {
                    continue;
                };
                let (offset, len) = (usize::from(offset), usize::from(len));
                let source = handles[j].0.clone_buffer(false);
                if handles[i].0.append_cloned(&source, offset, len).is_ok() {
                    let copied = handles[j].1[offset..offset + len].to_vec();
                    handles[i].1.extend_from_slice(&copied);
                }
            }
            BufferOp::Free { id } => {
                let Some(i) = index(&handles, id) else { continue };
                let (buffer, _) = handles.swap_remove(i);
                module.free(Some(buffer));
            }
        }

        for (buffer, model) in &handles {
            assert_eq!(buffer.size(), model.len());
            assert_eq!(&buffer.to_vec(), model);
        }
    }

    drop(handles);
    let stats = module.stats();
    assert_eq!(stats.live_chunks, 0);
    assert_eq!(stats.live_buffers, 0);
});
