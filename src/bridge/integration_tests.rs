// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! End-to-end behaviour of the bridge: an engine on blocking threads, a host
//! answering from async tasks.

use crate::bridge::{DeviceBridge, OpenMode, WeakBridge};
use crate::config::LivenessConfig;
use crate::devices::{DeviceKind, DeviceOptions, WriterMode};
use crate::errors::{ErrorCategory, Errno, HostError, OperationError};
use crate::host::{CaptureSink, SpawnedHooks};
use crate::traits::{AsyncDeviceHooks, DeviceHooks};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::SeekFrom;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn bridge() -> DeviceBridge {
    DeviceBridge::current(&LivenessConfig {
        tick_ms: Some(5),
        host_deadline_ms: None,
    })
}

async fn wait_for_outstanding(bridge: &DeviceBridge, name: &str, expected: usize) {
    for _ in 0..400 {
        if bridge.outstanding(name).unwrap_or(0) >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("'{}' never reached {} outstanding requests", name, expected);
}

/// Records block read notifications and leaves answering to the test.
#[derive(Default)]
struct RecordingHooks {
    block_reads: Mutex<Vec<(u64, usize)>>,
}

impl RecordingHooks {
    async fn wait_for(&self, expected: usize) -> Vec<(u64, usize)> {
        for _ in 0..400 {
            let seen = self.block_reads.lock().unwrap().clone();
            if seen.len() >= expected {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("never saw {} block read notifications", expected);
    }
}

impl DeviceHooks for RecordingHooks {
    fn on_block_read(&self, _name: &str, offset: u64, length: usize) -> Result<(), HostError> {
        self.block_reads.lock().unwrap().push((offset, length));
        Ok(())
    }
}

/// Answers block reads from inside the hook, before the engine parks.
struct InlineHooks {
    bridge: WeakBridge,
}

impl DeviceHooks for InlineHooks {
    fn on_block_read(&self, name: &str, offset: u64, length: usize) -> Result<(), HostError> {
        let bridge = self.bridge.upgrade().ok_or(ErrorCategory::Io)?;
        let data = Bytes::from(vec![offset as u8; length]);
        bridge
            .send_block(name, offset, length, Some(data))
            .map_err(HostError::application)?;
        Ok(())
    }
}

struct ThrowingHooks;

impl DeviceHooks for ThrowingHooks {
    fn on_block_read(&self, _name: &str, _offset: u64, _length: usize) -> Result<(), HostError> {
        Err(HostError::message("passthru"))
    }
}

struct AsyncThrowingHooks;

#[async_trait]
impl AsyncDeviceHooks for AsyncThrowingHooks {
    async fn on_block_read(
        &self,
        _bridge: DeviceBridge,
        _name: String,
        _offset: u64,
        _length: usize,
    ) -> Result<(), HostError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Err(HostError::message("async passthru"))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn sequential_read_waits_for_the_full_length() {
    let bridge = bridge();
    bridge
        .make_device("f", DeviceKind::SequentialReader, DeviceOptions::default())
        .unwrap();

    let engine = bridge.engine();
    let read = tokio::task::spawn_blocking(move || engine.read("f", 10));
    wait_for_outstanding(&bridge, "f", 1).await;

    bridge.send("f", Some(Bytes::from_static(b"abcdef"))).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!read.is_finished());

    bridge.send("f", Some(Bytes::from_static(b"ghij"))).unwrap();
    let data = read.await.unwrap().unwrap();
    assert_eq!(&data[..], b"abcdefghij");
}

#[tokio::test(flavor = "multi_thread")]
async fn block_answers_resolve_out_of_order() {
    let bridge = bridge();
    let hooks = Arc::new(RecordingHooks::default());
    bridge.set_hooks(hooks.clone());
    bridge
        .make_device("g", DeviceKind::BlockReader, DeviceOptions::default())
        .unwrap();

    let engine = bridge.engine();
    let high = tokio::task::spawn_blocking(move || engine.read_at("g", 100, 50));
    hooks.wait_for(1).await;
    let engine = bridge.engine();
    let low = tokio::task::spawn_blocking(move || engine.read_at("g", 0, 50));

    let seen = hooks.wait_for(2).await;
    assert_eq!(seen, vec![(100, 50), (0, 50)]);
    assert_eq!(bridge.outstanding("g").unwrap(), 2);

    assert!(bridge
        .send_block("g", 0, 50, Some(Bytes::from(vec![0xAA; 50])))
        .unwrap());
    let low = low.await.unwrap().unwrap();
    assert_eq!(low, Bytes::from(vec![0xAA; 50]));
    assert!(!high.is_finished());

    assert!(bridge
        .send_block("g", 100, 50, Some(Bytes::from(vec![0xBB; 50])))
        .unwrap());
    let high = high.await.unwrap().unwrap();
    assert_eq!(high, Bytes::from(vec![0xBB; 50]));
}

#[tokio::test(flavor = "multi_thread")]
async fn every_answer_order_reaches_the_right_reader() {
    const ORDERS: [[u64; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    for order in ORDERS {
        let bridge = bridge();
        let hooks = Arc::new(RecordingHooks::default());
        bridge.set_hooks(hooks.clone());
        bridge
            .make_device("g", DeviceKind::BlockReader, DeviceOptions::default())
            .unwrap();

        let mut parked = Vec::new();
        for i in 0..3u64 {
            let engine = bridge.engine();
            parked.push(tokio::task::spawn_blocking(move || {
                engine.read_at("g", i * 32, 32)
            }));
        }
        hooks.wait_for(3).await;
        wait_for_outstanding(&bridge, "g", 3).await;

        for i in order {
            let payload = Bytes::from(vec![i as u8 + 1; 32]);
            assert!(bridge.send_block("g", i * 32, 32, Some(payload)).unwrap());
        }
        for (i, call) in parked.into_iter().enumerate() {
            let data = call.await.unwrap().unwrap();
            assert_eq!(data, Bytes::from(vec![i as u8 + 1; 32]), "order {:?}", order);
        }
        assert_eq!(bridge.outstanding("g").unwrap(), 0);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn uneven_sends_feed_consecutive_reads_in_order() {
    let stream: Vec<u8> = (0..20_000u32).map(|i| (i % 253) as u8).collect();
    let read_sizes = [1usize, 7, 64, 500, 3, 1024, 33];
    let send_sizes = [2000usize, 1, 13, 700, 4096, 5, 250];

    let bridge = bridge();
    bridge
        .make_device("f", DeviceKind::SequentialReader, DeviceOptions::default())
        .unwrap();

    let expected = stream.len();
    let consumer = {
        let bridge = bridge.clone();
        tokio::spawn(async move {
            bridge
                .run_engine(move |engine| {
                    let mut received = Vec::with_capacity(expected);
                    for round in 0.. {
                        let data = engine.read("f", read_sizes[round % read_sizes.len()])?;
                        if data.is_empty() {
                            break;
                        }
                        received.extend_from_slice(&data);
                    }
                    Ok(received)
                })
                .await
        })
    };

    let mut sent = 0;
    for size in send_sizes.iter().cycle() {
        if sent == stream.len() {
            break;
        }
        let end = (sent + size).min(stream.len());
        bridge
            .send("f", Some(Bytes::copy_from_slice(&stream[sent..end])))
            .unwrap();
        sent = end;
        tokio::task::yield_now().await;
    }
    bridge.send("f", None).unwrap();

    let received = consumer.await.unwrap().unwrap();
    assert_eq!(received, stream);
}

#[tokio::test(flavor = "multi_thread")]
async fn removing_a_device_fails_every_parked_call() {
    let bridge = bridge();
    bridge.set_hooks(Arc::new(RecordingHooks::default()));
    bridge
        .make_device("g", DeviceKind::BlockReader, DeviceOptions::default())
        .unwrap();

    let mut parked = Vec::new();
    for i in 0..3u64 {
        let engine = bridge.engine();
        parked.push(tokio::task::spawn_blocking(move || {
            engine.read_at("g", i * 16, 16)
        }));
    }
    wait_for_outstanding(&bridge, "g", 3).await;

    bridge.remove_device("g").unwrap();
    for call in parked {
        assert_eq!(call.await.unwrap().unwrap_err(), Errno::ENODEV);
    }

    let err = bridge
        .run_engine(|engine| engine.read_at("g", 0, 16))
        .await
        .unwrap_err();
    assert_eq!(err.errno(), Some(Errno::ENOENT));
}

#[tokio::test(flavor = "multi_thread")]
async fn writer_output_round_trips_into_a_reader() {
    let bridge = bridge();
    let capture = Arc::new(CaptureSink::new());
    bridge.set_hooks(capture.clone());
    bridge
        .make_device("out", DeviceKind::Writer, DeviceOptions::default())
        .unwrap();

    let written = bridge
        .run_engine(|engine| {
            let a = engine.write("out", 0, b"hello ")?;
            let b = engine.write("out", 6, b"world")?;
            Ok(a + b)
        })
        .await
        .unwrap();
    assert_eq!(written, 11);
    let captured = capture.contents("out").unwrap();
    assert_eq!(captured, b"hello world".to_vec());

    bridge
        .make_device("in", DeviceKind::SequentialReader, DeviceOptions::default())
        .unwrap();
    let read = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.run_engine(|engine| engine.read("in", 64)).await })
    };
    wait_for_outstanding(&bridge, "in", 1).await;
    let (head, tail) = captured.split_at(4);
    bridge.send("in", Some(Bytes::copy_from_slice(head))).unwrap();
    bridge.send("in", Some(Bytes::copy_from_slice(tail))).unwrap();
    bridge.send("in", None).unwrap();

    let data = read.await.unwrap().unwrap();
    assert_eq!(&data[..], b"hello world");
}

#[tokio::test(flavor = "multi_thread")]
async fn writer_filesystem_creates_files_by_pattern() {
    let bridge = bridge();
    let capture = Arc::new(CaptureSink::new());
    bridge.set_hooks(capture.clone());
    bridge.mount_writer_fs("/out", Some("%03d.bin")).unwrap();

    let mismatch = bridge
        .run_engine(|engine| {
            for i in 0..3u8 {
                engine.write(&format!("/out/{:03}.bin", i), 0, &[i; 4])?;
            }
            Ok(engine.write("/out/frame.bin", 0, b"nope").unwrap_err())
        })
        .await
        .unwrap();
    assert_eq!(mismatch, Errno::ENOENT);

    let files = bridge.writer_fs_files("/out").unwrap();
    assert_eq!(files, vec!["/out/000.bin", "/out/001.bin", "/out/002.bin"]);
    assert_eq!(capture.contents("/out/002.bin").unwrap(), vec![2u8; 4]);

    let removed = bridge.unmount_writer_fs("/out").unwrap();
    assert_eq!(removed.len(), 3);
    assert!(bridge.registry().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn hook_errors_reach_the_caller_verbatim() {
    let bridge = bridge();
    bridge
        .make_device_with_hooks(
            "g",
            DeviceKind::BlockReader,
            DeviceOptions::default(),
            Arc::new(ThrowingHooks),
        )
        .unwrap();

    let err = bridge
        .run_engine(|engine| {
            let errno = engine.read_at("g", 0, 8).unwrap_err();
            assert_eq!(errno, Errno::ECANCELED);
            Err::<(), _>(errno)
        })
        .await
        .unwrap_err();

    assert!(matches!(err, OperationError::Host(_)));
    assert_eq!(err.to_string(), "passthru");
    assert!(bridge.take_thrown_error().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn async_hook_errors_reach_the_caller_verbatim() {
    let bridge = bridge();
    let hooks = SpawnedHooks::new(&bridge, Arc::new(AsyncThrowingHooks));
    bridge
        .make_device_with_hooks(
            "g",
            DeviceKind::BlockReader,
            DeviceOptions::default(),
            Arc::new(hooks),
        )
        .unwrap();

    let err = bridge
        .run_engine(|engine| engine.read_at("g", 0, 8))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "async passthru");
}

#[tokio::test(flavor = "multi_thread")]
async fn categorized_failures_become_errnos() {
    let bridge = bridge();
    bridge.set_hooks(Arc::new(RecordingHooks::default()));
    bridge
        .make_device("g", DeviceKind::BlockReader, DeviceOptions::default())
        .unwrap();

    let read = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.run_engine(|engine| engine.read_at("g", 0, 8)).await })
    };
    wait_for_outstanding(&bridge, "g", 1).await;
    assert!(bridge
        .fail_block("g", 0, 8, ErrorCategory::Io.into())
        .unwrap());

    let err = read.await.unwrap().unwrap_err();
    assert!(matches!(err, OperationError::Errno(Errno::EIO)));
}

#[tokio::test(flavor = "multi_thread")]
async fn hooks_may_answer_before_the_engine_parks() {
    let bridge = bridge();
    bridge.set_hooks(Arc::new(InlineHooks {
        bridge: bridge.downgrade(),
    }));
    bridge
        .make_device("g", DeviceKind::BlockReader, DeviceOptions::default())
        .unwrap();

    let data = bridge
        .run_engine(|engine| engine.read_at("g", 3, 5))
        .await
        .unwrap();
    assert_eq!(data, Bytes::from(vec![3u8; 5]));
}

#[tokio::test(flavor = "multi_thread")]
async fn block_read_without_hooks_is_an_io_error() {
    let bridge = bridge();
    bridge
        .make_device("g", DeviceKind::BlockReader, DeviceOptions::default())
        .unwrap();

    let err = bridge
        .run_engine(|engine| engine.read_at("g", 0, 8))
        .await
        .unwrap_err();
    assert_eq!(err.errno(), Some(Errno::EIO));
    assert_eq!(bridge.outstanding("g").unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn silent_host_hits_the_deadline() {
    let bridge = DeviceBridge::current(&LivenessConfig {
        tick_ms: Some(5),
        host_deadline_ms: Some(50),
    });
    bridge
        .make_device("live", DeviceKind::SequentialReader, DeviceOptions::default())
        .unwrap();

    let err = bridge
        .run_engine(|engine| engine.read("live", 4))
        .await
        .unwrap_err();
    assert_eq!(err.errno(), Some(Errno::ETIMEDOUT));
    assert_eq!(bridge.outstanding("live").unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn keepalive_holds_off_the_deadline() {
    let bridge = DeviceBridge::current(&LivenessConfig {
        tick_ms: Some(5),
        host_deadline_ms: Some(60),
    });
    bridge
        .make_device("live", DeviceKind::SequentialReader, DeviceOptions::default())
        .unwrap();

    let read = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.run_engine(|engine| engine.read("live", 4)).await })
    };
    wait_for_outstanding(&bridge, "live", 1).await;
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        bridge.keepalive("live").unwrap();
    }
    bridge.send("live", Some(Bytes::from_static(b"late"))).unwrap();

    let data = read.await.unwrap().unwrap();
    assert_eq!(&data[..], b"late");
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_releases_parked_calls() {
    let bridge = bridge();
    bridge
        .make_device("f", DeviceKind::SequentialReader, DeviceOptions::default())
        .unwrap();

    let engine = bridge.engine();
    let read = tokio::task::spawn_blocking(move || engine.read("f", 4));
    wait_for_outstanding(&bridge, "f", 1).await;

    bridge.shutdown();
    assert_eq!(read.await.unwrap().unwrap_err(), Errno::ETIMEDOUT);

    let err = bridge
        .run_engine(|engine| engine.read("f", 4))
        .await
        .unwrap_err();
    assert_eq!(err.errno(), Some(Errno::ETIMEDOUT));
}

#[tokio::test(flavor = "multi_thread")]
async fn second_sequential_read_is_rejected_while_one_is_parked() {
    let bridge = bridge();
    bridge
        .make_device("f", DeviceKind::SequentialReader, DeviceOptions::default())
        .unwrap();

    let engine = bridge.engine();
    let first = tokio::task::spawn_blocking(move || engine.read("f", 2));
    wait_for_outstanding(&bridge, "f", 1).await;

    let engine = bridge.engine();
    let second = tokio::task::spawn_blocking(move || engine.read("f", 2))
        .await
        .unwrap();
    assert_eq!(second.unwrap_err(), Errno::EBUSY);

    bridge.send("f", Some(Bytes::from_static(b"ok"))).unwrap();
    assert_eq!(&first.await.unwrap().unwrap()[..], b"ok");
}

#[tokio::test(flavor = "multi_thread")]
async fn outstanding_limit_applies_backpressure() {
    let bridge = bridge();
    let hooks = Arc::new(RecordingHooks::default());
    bridge.set_hooks(hooks.clone());
    bridge
        .make_device(
            "g",
            DeviceKind::BlockReader,
            DeviceOptions {
                max_outstanding: Some(1),
                ..DeviceOptions::default()
            },
        )
        .unwrap();

    let engine = bridge.engine();
    let a = tokio::task::spawn_blocking(move || engine.read_at("g", 0, 4));
    let engine = bridge.engine();
    let b = tokio::task::spawn_blocking(move || engine.read_at("g", 4, 4));
    let (offset, length) = hooks.wait_for(1).await[0];
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(bridge.outstanding("g").unwrap(), 1);
    assert_eq!(hooks.block_reads.lock().unwrap().len(), 1);

    bridge
        .send_block("g", offset, length, Some(Bytes::from_static(b"1111")))
        .unwrap();
    let (offset, length) = hooks.wait_for(2).await[1];
    bridge
        .send_block("g", offset, length, Some(Bytes::from_static(b"2222")))
        .unwrap();

    assert_eq!(a.await.unwrap().unwrap().len(), 4);
    assert_eq!(b.await.unwrap().unwrap().len(), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn open_files_track_position_and_pin_the_device() {
    let bridge = bridge();
    bridge.set_hooks(Arc::new(InlineHooks {
        bridge: bridge.downgrade(),
    }));
    bridge
        .make_device(
            "g",
            DeviceKind::BlockReader,
            DeviceOptions {
                size: Some(20),
                ..DeviceOptions::default()
            },
        )
        .unwrap();

    let engine = bridge.engine();
    let file = tokio::task::spawn_blocking(move || {
        let mut file = engine.open("g", OpenMode::Read)?;
        file.seek(SeekFrom::Start(8))?;
        let data = file.read(4)?;
        assert_eq!(data, Bytes::from(vec![8u8; 4]));
        assert_eq!(file.seek(SeekFrom::End(-2))?, 18);
        assert_eq!(file.read(10)?.len(), 2);
        assert!(file.read(10)?.is_empty());
        assert_eq!(file.write(b"x").unwrap_err(), Errno::EBADF);
        Ok::<_, Errno>(file)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(bridge.remove_device("g").unwrap_err().errno(), Errno::EBUSY);
    assert_eq!(file.position(), 20);
    drop(file);
    bridge.remove_device("g").unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn open_mode_and_seekability_follow_the_device() {
    let bridge = bridge();
    bridge.set_hooks(Arc::new(CaptureSink::new()));
    bridge
        .make_device("f", DeviceKind::SequentialReader, DeviceOptions::default())
        .unwrap();
    bridge
        .make_device(
            "log",
            DeviceKind::Writer,
            DeviceOptions {
                writer_mode: WriterMode::Stream,
                ..DeviceOptions::default()
            },
        )
        .unwrap();
    bridge
        .make_device("image.raw", DeviceKind::Writer, DeviceOptions::default())
        .unwrap();

    bridge
        .run_engine(|engine| {
            assert_eq!(engine.open("log", OpenMode::Read).unwrap_err(), Errno::EPERM);
            assert_eq!(engine.open("f", OpenMode::Write).unwrap_err(), Errno::EPERM);

            let mut reader = engine.open("f", OpenMode::Read)?;
            assert_eq!(reader.seek(SeekFrom::Start(3)).unwrap_err(), Errno::ESPIPE);

            let mut log = engine.open("log", OpenMode::Write)?;
            assert_eq!(log.write(b"abc")?, 3);
            assert_eq!(log.write(b"def")?, 3);
            assert_eq!(log.seek(SeekFrom::Start(0)).unwrap_err(), Errno::ESPIPE);
            assert_eq!(engine.write("log", 0, b"again").unwrap_err(), Errno::ESPIPE);
            assert_eq!(engine.stat("log")?.size, Some(6));

            let mut image = engine.open("image.raw", OpenMode::Write)?;
            assert_eq!(image.seek(SeekFrom::Start(4))?, 4);
            assert_eq!(image.write(b"xy")?, 2);
            assert_eq!(image.seek(SeekFrom::Current(-2))?, 4);
            assert_eq!(image.seek(SeekFrom::End(0)).unwrap_err(), Errno::EIO);
            Ok(())
        })
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_block_answers_are_discarded() {
    let bridge = bridge();
    bridge
        .make_device("g", DeviceKind::BlockReader, DeviceOptions::default())
        .unwrap();

    let matched = bridge
        .send_block("g", 0, 4, Some(Bytes::from_static(b"lost")))
        .unwrap();
    assert!(!matched);
    assert_eq!(bridge.send("g", None).unwrap_err().errno(), Errno::EPERM);
}
