//! Stream behavior across backings, and streams as engine endpoints.

mod common;

use std::io::SeekFrom;
use std::sync::{Arc, Mutex};

use common::{structured_payload, temp_root, write_file};
use lzarch::{
    Decoder, Encoder, EraseMode, FileType, InStream, Method, OutStream, Path, StreamCallbacks,
};

#[test]
fn out_stream_content_matches_write_offsets() {
    let stream = OutStream::with_memory();
    stream.open().unwrap();
    stream.write(b"AAAA").unwrap();
    stream.seek(SeekFrom::Start(8)).unwrap();
    stream.write(b"BBBB").unwrap();
    stream.seek(SeekFrom::Start(4)).unwrap();
    stream.write(b"CCCC").unwrap();
    stream.close();
    assert_eq!(stream.copy_content().unwrap(), b"AAAACCCCBBBB");
}

#[test]
fn out_stream_set_size_zero_fills() {
    let stream = OutStream::with_memory();
    stream.open().unwrap();
    stream.write(b"abc").unwrap();
    stream.set_size(6).unwrap();
    stream.close();
    assert_eq!(stream.copy_content().unwrap(), b"abc\0\0\0");
}

#[test]
fn file_in_stream_erase_zero_removes_file() {
    let (_guard, root) = temp_root();
    let path = write_file(&root, "wipe.bin", &structured_payload(4_096, 1));
    let stream = InStream::with_path(path.clone()).unwrap();
    stream.open().unwrap();
    assert!(!stream.erase(EraseMode::Zero).unwrap());
    stream.close();
    assert!(stream.erase(EraseMode::Zero).unwrap());
    assert!(path.exists().is_none());
}

#[test]
fn callback_stream_feeds_the_decoder() {
    // Build an xz archive in memory first.
    let payload = structured_payload(25_000, 2);
    let destination = OutStream::with_memory();
    let mut encoder = Encoder::new(destination.clone(), FileType::Xz, Method::Lzma2);
    let source = InStream::with_memory(payload.clone()).unwrap();
    encoder.add_stream(source, Path::new("payload")).unwrap();
    assert!(encoder.open().unwrap());
    assert!(encoder.compress().unwrap());
    let archive = destination.copy_content().unwrap();

    // Serve those bytes through user callbacks.
    let backing = Arc::new(archive);
    let position = Arc::new(Mutex::new(0u64));
    let read_backing = Arc::clone(&backing);
    let read_position = Arc::clone(&position);
    let seek_backing = Arc::clone(&backing);
    let seek_position = Arc::clone(&position);

    let stream = InStream::with_callbacks(StreamCallbacks {
        open: Box::new(|| true),
        close: Box::new(|| {}),
        seek: Box::new(move |pos| {
            let size = seek_backing.len() as i64;
            let mut position = seek_position.lock().unwrap();
            let target = match pos {
                SeekFrom::Start(v) => v as i64,
                SeekFrom::Current(d) => *position as i64 + d,
                SeekFrom::End(d) => size + d,
            };
            if target < 0 || target > size {
                return None;
            }
            *position = target as u64;
            Some(*position)
        }),
        read: Box::new(move |buf| {
            let mut position = read_position.lock().unwrap();
            let start = *position as usize;
            let step = buf.len().min(read_backing.len().saturating_sub(start));
            buf[..step].copy_from_slice(&read_backing[start..start + step]);
            *position += step as u64;
            Some(step)
        }),
    });

    let mut decoder = Decoder::new(stream, FileType::Xz);
    assert!(decoder.open().unwrap());
    assert_eq!(decoder.count(), 1);
    assert_eq!(decoder.item_at(0).unwrap().size, payload.len() as u64);
    assert!(decoder.test().unwrap());
}

#[test]
fn multi_in_stream_requires_erasable_children() {
    let (_guard, root) = temp_root();
    let path = write_file(&root, "part.bin", b"0123");
    let file = InStream::with_path(path).unwrap();
    let memory = InStream::with_memory(b"4567".to_vec()).unwrap();
    let multi = InStream::multi(vec![file, memory]).unwrap();

    multi.open().unwrap();
    assert!(!multi.erase(EraseMode::None).unwrap());
    multi.close();
    assert!(multi.erase(EraseMode::None).unwrap());
}

#[test]
fn file_out_stream_truncates_on_open() {
    let (_guard, root) = temp_root();
    let path = write_file(&root, "trunc.bin", b"old content that is long");
    let stream = OutStream::with_path(path.clone()).unwrap();
    stream.open().unwrap();
    stream.write(b"new").unwrap();
    stream.close();
    assert_eq!(std::fs::read(path.as_str()).unwrap(), b"new");
}

#[test]
fn copy_content_of_open_stream_is_empty() {
    let stream = OutStream::with_memory();
    stream.open().unwrap();
    stream.write(b"pending").unwrap();
    assert!(stream.copy_content().unwrap().is_empty());
    stream.close();
    assert_eq!(stream.copy_content().unwrap(), b"pending");
}
