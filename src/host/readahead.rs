// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::bridge::DeviceBridge;
use crate::devices::{DeviceKind, DeviceOptions};
use crate::errors::{DeviceError, HostError};
use crate::host::SpawnedHooks;
use crate::traits::AsyncDeviceHooks;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

/// A local file served to the engine as a block reader, with one-window prefetch.
///
/// After answering a request for `(offset, length)` the next window
/// `(offset + length, length)` is read ahead, so a linear scan mostly
/// finds its data already in memory.
pub struct ReadaheadFile {
    file: Mutex<File>,
    size: u64,
    prefetched: Mutex<Option<(u64, usize, Bytes)>>,
}

impl ReadaheadFile {
    /// Register `file` under `name` as a block reader of its current size.
    pub async fn attach(
        bridge: &DeviceBridge,
        name: &str,
        file: File,
    ) -> Result<Arc<Self>, DeviceError> {
        let size = file
            .metadata()
            .await
            .map_err(|e| DeviceError::host(name, e.into()))?
            .len();
        let readahead = Arc::new(Self {
            file: Mutex::new(file),
            size,
            prefetched: Mutex::new(None),
        });

        let options = DeviceOptions {
            size: Some(size),
            ..DeviceOptions::default()
        };
        let hooks = SpawnedHooks::new(bridge, Arc::clone(&readahead));
        bridge.make_device_with_hooks(name, DeviceKind::BlockReader, options, Arc::new(hooks))?;
        tracing::debug!(device = name, size, "Attached readahead file");
        Ok(readahead)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    async fn read_window(&self, offset: u64, length: usize) -> std::io::Result<Bytes> {
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = BytesMut::zeroed(length);
        let mut filled = 0;
        while filled < length {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf.freeze())
    }

    async fn take_prefetched(&self, offset: u64, length: usize) -> Option<Bytes> {
        let mut slot = self.prefetched.lock().await;
        match slot.take() {
            Some((o, l, data)) if o == offset && l == length => Some(data),
            _ => None,
        }
    }
}

#[async_trait]
impl AsyncDeviceHooks for ReadaheadFile {
    async fn on_block_read(
        &self,
        bridge: DeviceBridge,
        name: String,
        offset: u64,
        length: usize,
    ) -> Result<(), HostError> {
        let data = match self.take_prefetched(offset, length).await {
            Some(data) => data,
            None => self.read_window(offset, length).await?,
        };
        let answer = if data.is_empty() { None } else { Some(data) };
        bridge
            .send_block(&name, offset, length, answer)
            .map_err(HostError::application)?;

        let next = offset + length as u64;
        if next < self.size {
            let ahead = self.read_window(next, length).await?;
            *self.prefetched.lock().await = Some((next, length, ahead));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LivenessConfig;
    use std::io::Write;

    async fn fixture(content: &[u8]) -> (tempfile::NamedTempFile, File) {
        let mut temp = tempfile::NamedTempFile::new().unwrap();
        temp.write_all(content).unwrap();
        let file = File::open(temp.path()).await.unwrap();
        (temp, file)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn linear_scan_reads_the_whole_file() {
        let content: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let (_temp, file) = fixture(&content).await;
        let bridge = DeviceBridge::current(&LivenessConfig::default());
        let readahead = ReadaheadFile::attach(&bridge, "input.bin", file).await.unwrap();
        assert_eq!(readahead.size(), 1000);

        let read = bridge
            .run_engine(|engine| {
                let mut out = Vec::new();
                let mut offset = 0;
                loop {
                    let chunk = engine.read_at("input.bin", offset, 128)?;
                    if chunk.is_empty() {
                        break;
                    }
                    offset += chunk.len() as u64;
                    out.extend_from_slice(&chunk);
                }
                Ok(out)
            })
            .await
            .unwrap();

        assert_eq!(read, content);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn window_is_prefetched_after_an_answer() {
        let (_temp, file) = fixture(b"0123456789").await;
        let bridge = DeviceBridge::current(&LivenessConfig::default());
        let readahead = ReadaheadFile::attach(&bridge, "digits", file).await.unwrap();

        let first = bridge
            .run_engine(|engine| engine.read_at("digits", 0, 4))
            .await
            .unwrap();
        assert_eq!(&first[..], b"0123");

        for _ in 0..100 {
            if readahead.prefetched.lock().await.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let prefetched = readahead.take_prefetched(4, 4).await.unwrap();
        assert_eq!(&prefetched[..], b"4567");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unlinking_removes_the_device() {
        let (_temp, file) = fixture(b"abc").await;
        let bridge = DeviceBridge::current(&LivenessConfig::default());
        ReadaheadFile::attach(&bridge, "abc", file).await.unwrap();

        bridge.remove_device("abc").unwrap();
        assert!(!bridge.registry().contains("abc"));
    }
}
