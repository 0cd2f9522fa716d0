// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::{bail, Context};
use bytes::Bytes;
use std::env;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;
use vdev_bridge::config::{load_and_validate_config, RuntimeBuilder};
use vdev_bridge::devices::{DeviceKind, DeviceOptions, WriterMode};
use vdev_bridge::host::{CaptureSink, FileWriter, ReadaheadFile};

const DEFAULT_CHUNK: usize = 4096;
const SEQUENTIAL_DEVICE: &str = "input.stream";
const BLOCK_DEVICE: &str = "input.block";
const OUTPUT_MOUNT: &str = "/out";
const STREAM_OUTPUT: &str = "copy.stream";
const FILE_OUTPUT: &str = "copy.file";

struct Args {
    config: String,
    input: String,
    output: Option<String>,
    chunk: usize,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("vdev-bridge");
    let mut positional = Vec::new();
    let mut chunk = DEFAULT_CHUNK;
    let mut output = None;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--chunk" {
            let value = iter.next().context("--chunk needs a value")?;
            chunk = value
                .parse()
                .with_context(|| format!("invalid chunk size '{}'", value))?;
        } else if arg == "--output" {
            output = Some(iter.next().context("--output needs a path")?.clone());
        } else {
            positional.push(arg.clone());
        }
    }

    if positional.len() != 2 || chunk == 0 {
        eprintln!(
            "Usage: {} <config.yaml> <input-file> [--chunk N] [--output PATH]",
            program
        );
        eprintln!("Example: {} configs/demo.yaml README.md --chunk 512", program);
        bail!("expected a config file and an input file");
    }
    let input = positional.pop().context("missing input file")?;
    let config = positional.pop().context("missing config file")?;
    Ok(Args {
        config,
        input,
        output,
        chunk,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args()?;
    let config = load_and_validate_config(&args.config)
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("loading {}", args.config))?;

    println!("🚀 Virtual Device Bridge Demo");
    println!("═══════════════════════════════");
    println!("Config: {}", args.config);
    println!("Input:  {}", args.input);
    println!("Chunk:  {} bytes", args.chunk);
    println!();

    let bridge = RuntimeBuilder::from_config(&config, tokio::runtime::Handle::current())?;
    let capture = Arc::new(CaptureSink::new());
    bridge.set_hooks(capture.clone());
    if bridge.writer_fs_files(OUTPUT_MOUNT).is_err() {
        bridge.mount_writer_fs(OUTPUT_MOUNT, Some("%04d.bin"))?;
    }

    bridge.make_device(
        STREAM_OUTPUT,
        DeviceKind::Writer,
        DeviceOptions {
            writer_mode: WriterMode::Stream,
            ..DeviceOptions::default()
        },
    )?;

    let file_output = match &args.output {
        Some(path) => {
            let file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("creating {}", path))?;
            Some(FileWriter::attach(&bridge, FILE_OUTPUT, file, WriterMode::Stream)?)
        }
        None => None,
    };
    let to_file = file_output.is_some();

    // Block reader: the engine pulls by offset, the host answers from disk.
    let file = tokio::fs::File::open(&args.input)
        .await
        .with_context(|| format!("opening {}", args.input))?;
    let readahead = ReadaheadFile::attach(&bridge, BLOCK_DEVICE, file).await?;
    println!("📦 Block device '{}' ({} bytes)", BLOCK_DEVICE, readahead.size());

    let chunk = args.chunk;
    let started = Instant::now();
    let blocks = bridge
        .run_engine(move |engine| {
            let mut offset = 0u64;
            let mut index = 0u64;
            loop {
                let data = engine.read_at(BLOCK_DEVICE, offset, chunk)?;
                if data.is_empty() {
                    break;
                }
                engine.write(&format!("{}/{:04}.bin", OUTPUT_MOUNT, index), 0, &data)?;
                engine.write(STREAM_OUTPUT, offset, &data)?;
                if to_file {
                    engine.write(FILE_OUTPUT, offset, &data)?;
                }
                offset += data.len() as u64;
                index += 1;
            }
            Ok(index)
        })
        .await?;
    println!(
        "   ✅ Copied into {} files under {} and '{}' in {:?}",
        blocks,
        OUTPUT_MOUNT,
        STREAM_OUTPUT,
        started.elapsed()
    );

    // Sequential reader: the host pushes, the engine consumes in order.
    bridge.make_device(SEQUENTIAL_DEVICE, DeviceKind::SequentialReader, DeviceOptions::default())?;
    let consumer = {
        let bridge = bridge.clone();
        tokio::spawn(async move {
            bridge
                .run_engine(move |engine| {
                    let mut total = 0usize;
                    loop {
                        let data = engine.read(SEQUENTIAL_DEVICE, chunk)?;
                        if data.is_empty() {
                            return Ok(total);
                        }
                        total += data.len();
                    }
                })
                .await
        })
    };

    let mut input = tokio::fs::File::open(&args.input).await?;
    let mut buf = vec![0u8; chunk];
    loop {
        let n = input.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        bridge.send(SEQUENTIAL_DEVICE, Some(Bytes::copy_from_slice(&buf[..n])))?;
    }
    bridge.send(SEQUENTIAL_DEVICE, None)?;
    let streamed = consumer.await??;
    println!("🌊 Streamed {} bytes through '{}'", streamed, SEQUENTIAL_DEVICE);

    let original = tokio::fs::read(&args.input).await?;
    let files = bridge.writer_fs_files(OUTPUT_MOUNT)?;
    let copied: Vec<u8> = files
        .iter()
        .filter_map(|name| capture.contents(name))
        .flatten()
        .collect();
    let stream_copy = capture.contents(STREAM_OUTPUT).unwrap_or_default();
    if copied != original || stream_copy != original || streamed != original.len() {
        bail!(
            "content mismatch: file {} bytes, copied {}, stream copy {}, streamed {}",
            original.len(),
            copied.len(),
            stream_copy.len(),
            streamed
        );
    }
    println!("🔍 Verified {} bytes in every copy", original.len());

    let removed = bridge.unmount_writer_fs(OUTPUT_MOUNT)?;
    bridge.remove_device(BLOCK_DEVICE)?;
    bridge.remove_device(SEQUENTIAL_DEVICE)?;
    bridge.remove_device(STREAM_OUTPUT)?;
    if let (Some(writer), Some(path)) = (&file_output, &args.output) {
        let written = writer.detach(&bridge).await?;
        println!("💾 Wrote {} bytes to {}", written, path);
    }
    bridge.shutdown();

    println!("🧹 Unmounted {} ({} files removed)", OUTPUT_MOUNT, removed.len());
    println!("\n🎉 Demo complete!");
    Ok(())
}
