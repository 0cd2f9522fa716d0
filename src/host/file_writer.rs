// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::bridge::DeviceBridge;
use crate::devices::{DeviceKind, DeviceOptions, WriterMode};
use crate::errors::{DeviceError, ErrorCategory, HostError};
use crate::traits::DeviceHooks;
use bytes::Bytes;
use std::io::SeekFrom;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type WriteQueue = mpsc::UnboundedSender<(u64, Bytes)>;

/// A local file receiving a writer device's output.
///
/// Engine writes are queued and applied by a single task, in the order the
/// engine issued them. [`detach`](Self::detach) removes the device, drains
/// the queue, then flushes and closes the file.
pub struct FileWriter {
    name: String,
    queue: Mutex<Option<WriteQueue>>,
    task: Mutex<Option<JoinHandle<std::io::Result<u64>>>>,
}

impl FileWriter {
    /// Register a writer device `name` whose writes land in `file`.
    pub fn attach(
        bridge: &DeviceBridge,
        name: &str,
        file: File,
        mode: WriterMode,
    ) -> Result<Arc<Self>, DeviceError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = Arc::new(Self {
            name: name.to_string(),
            queue: Mutex::new(Some(tx)),
            task: Mutex::new(None),
        });

        let options = DeviceOptions {
            writer_mode: mode,
            ..DeviceOptions::default()
        };
        bridge.make_device_with_hooks(name, DeviceKind::Writer, options, writer.clone())?;

        let task = bridge.runtime().spawn(apply_writes(file, rx));
        *writer.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        tracing::debug!(device = name, ?mode, "Attached file writer");
        Ok(writer)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remove the device and close the file once every queued write landed.
    ///
    /// Fails with "busy", leaving everything in place, while the engine holds
    /// the file open. Returns the number of bytes written.
    pub async fn detach(&self, bridge: &DeviceBridge) -> Result<u64, DeviceError> {
        bridge.remove_device(&self.name)?;
        self.close().await
    }

    async fn close(&self) -> Result<u64, DeviceError> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(task) = task else {
            return Ok(0);
        };

        let written = task
            .await
            .map_err(|e| DeviceError::host(&self.name, HostError::application(e)))?
            .map_err(|e| DeviceError::host(&self.name, e.into()))?;
        tracing::debug!(device = %self.name, written, "Closed file writer");
        Ok(written)
    }
}

impl DeviceHooks for FileWriter {
    fn on_write(&self, _name: &str, offset: u64, data: &[u8]) -> Result<(), HostError> {
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = queue.as_ref() else {
            return Err(ErrorCategory::BadDescriptor.into());
        };
        // A closed queue means the file task already failed.
        tx.send((offset, Bytes::copy_from_slice(data)))
            .map_err(|_| HostError::from(ErrorCategory::Io))
    }
}

async fn apply_writes(
    mut file: File,
    mut queue: mpsc::UnboundedReceiver<(u64, Bytes)>,
) -> std::io::Result<u64> {
    let mut written = 0;
    while let Some((offset, data)) = queue.recv().await {
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(&data).await?;
        written += data.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::OpenMode;
    use crate::config::LivenessConfig;
    use crate::errors::Errno;

    async fn fixture() -> (tempfile::NamedTempFile, File) {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let file = File::create(temp.path()).await.unwrap();
        (temp, file)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn writes_land_in_the_file_after_detach() {
        let (temp, file) = fixture().await;
        let bridge = DeviceBridge::current(&LivenessConfig::default());
        let writer =
            FileWriter::attach(&bridge, "out.bin", file, WriterMode::RandomAccess).unwrap();

        bridge
            .run_engine(|engine| {
                engine.write("out.bin", 6, b"world")?;
                engine.write("out.bin", 0, b"hello ")?;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(writer.detach(&bridge).await.unwrap(), 11);
        assert_eq!(std::fs::read(temp.path()).unwrap(), b"hello world");
        assert!(!bridge.registry().contains("out.bin"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn overlapping_writes_apply_in_issue_order() {
        let (temp, file) = fixture().await;
        let bridge = DeviceBridge::current(&LivenessConfig::default());
        let writer =
            FileWriter::attach(&bridge, "log.bin", file, WriterMode::RandomAccess).unwrap();

        bridge
            .run_engine(|engine| {
                for i in 0..200u8 {
                    engine.write("log.bin", 0, &[i; 4])?;
                }
                Ok(())
            })
            .await
            .unwrap();

        writer.detach(&bridge).await.unwrap();
        assert_eq!(std::fs::read(temp.path()).unwrap(), vec![199u8; 4]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stream_writer_appends_and_detach_waits_for_open_handles() {
        let (temp, file) = fixture().await;
        let bridge = DeviceBridge::current(&LivenessConfig::default());
        let writer = FileWriter::attach(&bridge, "copy.bin", file, WriterMode::Stream).unwrap();

        let engine = bridge.engine();
        let handle = tokio::task::spawn_blocking(move || {
            let mut out = engine.open("copy.bin", OpenMode::Write)?;
            out.write(b"abc")?;
            out.write(b"def")?;
            Ok::<_, Errno>(out)
        })
        .await
        .unwrap()
        .unwrap();

        let err = writer.detach(&bridge).await.unwrap_err();
        assert_eq!(err.errno(), Errno::EBUSY);

        drop(handle);
        assert_eq!(writer.detach(&bridge).await.unwrap(), 6);
        assert_eq!(std::fs::read(temp.path()).unwrap(), b"abcdef");

        let err = writer.on_write("copy.bin", 6, b"late").unwrap_err();
        assert_eq!(err.errno(), Errno::EBADF);
    }
}
