//! GPU Census Backend
//!
//! Implements [`ComputeBackend`] on the WGSL kernels in `shaders.rs`:
//! - sequence-record expansion with an atomic child counter
//! - occupancy signatures
//! - orbit minima over the rotation maps
//! - line tests with per-outcome atomic counters
//!
//! Every count a kernel reports is checked against what the host reads back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;
use rayon::prelude::*;
use wgpu::{util::DeviceExt, BindGroupDescriptor, BindGroupEntry, Buffer, BufferUsages, CommandEncoderDescriptor};

use super::context::{GpuContext, GpuError, Kernel};
use crate::backend::{BackendLimits, ComputeBackend, CpuBackend};
use crate::board::{MoveSequence, PackedBoard};
use crate::classify::Outcome;
use crate::error::{Error, Result};
use crate::stats::DeviceUsage;
use crate::tables::ConstantTables;

/// u32 words per device sequence record
pub const RECORD_WORDS: usize = 8;

/// Uniform block shared by every kernel
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
struct KernelParams {
    count: u32,
    ply: u32,
    extra: u32,
    _reserved: u32,
}

impl KernelParams {
    fn new(count: usize, ply: usize, extra: usize) -> Self {
        Self {
            count: count as u32,
            ply: ply as u32,
            extra: extra as u32,
            _reserved: 0,
        }
    }
}

/// Packs sequences into 8-word device records.
pub fn encode_sequences(batch: &[MoveSequence]) -> Vec<u32> {
    let mut words = vec![0u32; batch.len() * RECORD_WORDS];
    for (seq, record) in batch.iter().zip(words.chunks_exact_mut(RECORD_WORDS)) {
        for (i, &byte) in seq.as_bytes().iter().enumerate() {
            record[i / 4] |= (byte as u32) << ((i % 4) * 8);
        }
        record[RECORD_WORDS - 1] = seq.ply() as u32;
    }
    words
}

/// Unpacks one device record; `None` for an empty child slot.
pub fn decode_record(record: &[u32]) -> Result<Option<MoveSequence>> {
    if record.len() != RECORD_WORDS {
        return Err(Error::codec(format!(
            "device record is {} words, expected {RECORD_WORDS}",
            record.len()
        )));
    }
    let ply = record[RECORD_WORDS - 1] as usize;
    if ply == 0 {
        return Ok(None);
    }
    if ply > cube_shared::MAX_PLY {
        return Err(Error::codec(format!("device record claims ply {ply}")));
    }
    let bytes: Vec<u8> = (0..ply).map(|i| (record[i / 4] >> ((i % 4) * 8)) as u8).collect();
    MoveSequence::from_bytes(&bytes).map(Some)
}

#[derive(Debug, Default)]
struct DispatchStats {
    total_gpu_time_us: u64,
    dispatch_count: u64,
}

/// wgpu implementation of the census kernels
pub struct GpuBackend {
    context: Arc<GpuContext>,
    tables: Arc<ConstantTables>,
    /// Small batches run here instead of paying the transfer cost
    host: CpuBackend,
    maps_buffer: Buffer,
    lines_buffer: Buffer,
    stats: Mutex<DispatchStats>,
}

impl GpuBackend {
    pub fn new(context: GpuContext, tables: Arc<ConstantTables>) -> Self {
        let device = context.device();
        let maps_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Rotation Maps"),
            contents: bytemuck::cast_slice(&tables.rotations.flattened()),
            usage: BufferUsages::STORAGE,
        });
        let lines_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Win Line Masks"),
            contents: bytemuck::cast_slice(tables.win_lines.masks()),
            usage: BufferUsages::STORAGE,
        });
        Self {
            host: CpuBackend::new(Arc::clone(&tables)),
            context: Arc::new(context),
            tables,
            maps_buffer,
            lines_buffer,
            stats: Mutex::new(DispatchStats::default()),
        }
    }

    pub fn adapter_name(&self) -> &str {
        self.context.adapter_name()
    }

    fn on_host(&self, count: usize) -> bool {
        count < self.context.config().min_batch_threshold
    }

    fn check_size(&self, bytes: u64, what: &str) -> std::result::Result<(), GpuError> {
        if bytes > self.context.max_buffer_size() {
            return Err(GpuError::BufferError(format!(
                "{what} needs {bytes} bytes, device allows {}",
                self.context.max_buffer_size()
            )));
        }
        Ok(())
    }

    fn input_buffer(&self, label: &str, contents: &[u8]) -> std::result::Result<Buffer, GpuError> {
        self.check_size(contents.len() as u64, label)?;
        Ok(self.context.device().create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: BufferUsages::STORAGE,
        }))
    }

    fn output_buffer(&self, label: &str, size: u64) -> std::result::Result<Buffer, GpuError> {
        self.check_size(size, label)?;
        Ok(self.context.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        }))
    }

    /// Binds `buffers` then the params block, runs `kernel` over `params.count`
    /// invocations and copies each of `outputs` into a fresh staging buffer.
    fn dispatch(
        &self,
        kernel: &Kernel,
        label: &str,
        buffers: &[&Buffer],
        params: KernelParams,
        outputs: &[&Buffer],
    ) -> std::result::Result<Vec<Buffer>, GpuError> {
        let start = Instant::now();
        let device = self.context.device();
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Params")),
            contents: bytemuck::bytes_of(&params),
            usage: BufferUsages::UNIFORM,
        });
        let mut entries: Vec<BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        entries.push(BindGroupEntry {
            binding: buffers.len() as u32,
            resource: params_buffer.as_entire_binding(),
        });
        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some(&format!("{label} Bind Group")),
            layout: &kernel.layout,
            entries: &entries,
        });

        let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some(&format!("{label} Encoder")),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&format!("{label} Pass")),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let (x, y) = self.context.workgroups(params.count);
            pass.dispatch_workgroups(x, y, 1);
        }

        let staging: Vec<Buffer> = outputs
            .iter()
            .map(|output| {
                let staging = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("{label} Staging")),
                    size: output.size(),
                    usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                encoder.copy_buffer_to_buffer(output, 0, &staging, 0, output.size());
                staging
            })
            .collect();
        self.context.submit_and_wait(encoder.finish());

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(GpuError::ComputeError(format!("{label}: {err}")));
        }

        let mut stats = self.stats.lock();
        stats.total_gpu_time_us += start.elapsed().as_micros() as u64;
        stats.dispatch_count += 1;
        Ok(staging)
    }

    fn read_buffer<T: Pod>(&self, staging_buffer: &Buffer, count: usize) -> std::result::Result<Vec<T>, GpuError> {
        let buffer_slice = staging_buffer.slice(..);

        let (tx, rx) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.context.device().poll(wgpu::Maintain::Wait);

        pollster::block_on(rx)
            .map_err(|_| GpuError::BufferError("Mapping cancelled".to_string()))?
            .map_err(|e| GpuError::BufferError(format!("{:?}", e)))?;

        let data = buffer_slice.get_mapped_range();
        let results: Vec<T> = bytemuck::cast_slice(&data[..count * std::mem::size_of::<T>()]).to_vec();
        drop(data);
        staging_buffer.unmap();

        Ok(results)
    }

    fn upload_codes(&self, codes: &[PackedBoard]) -> std::result::Result<Buffer, GpuError> {
        let words: Vec<u32> = codes
            .iter()
            .flat_map(|c| {
                let (lo, hi) = cube_shared::split_code(c.raw());
                [lo, hi]
            })
            .collect();
        self.input_buffer("Codes", bytemuck::cast_slice(&words))
    }

    /// Child slot words plus the kernel's child count
    fn gpu_expand(&self, parents: &[MoveSequence]) -> std::result::Result<(Vec<u32>, u32), GpuError> {
        let records = encode_sequences(parents);
        let input = self.input_buffer("Parents", bytemuck::cast_slice(&records))?;
        let child_words = (parents.len() * crate::expansion::EXPANSION_FACTOR * RECORD_WORDS) as u64;
        let children = self.output_buffer("Children", child_words * 4)?;
        let produced = self.counter_buffer("Produced", 1)?;
        let staging = self.dispatch(
            &self.context.expand,
            "Expand",
            &[&input, &children, &produced],
            KernelParams::new(parents.len(), 0, 0),
            &[&children, &produced],
        )?;
        let words = self.read_buffer::<u32>(&staging[0], child_words as usize)?;
        let produced = self.read_buffer::<u32>(&staging[1], 1)?;
        Ok((words, produced.first().copied().unwrap_or(0)))
    }

    fn counter_buffer(&self, label: &str, count: usize) -> std::result::Result<Buffer, GpuError> {
        let zeros = vec![0u32; count];
        Ok(self.context.device().create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&zeros),
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
        }))
    }

    pub fn usage(&self) -> DeviceUsage {
        let stats = self.stats.lock();
        DeviceUsage {
            dispatches: stats.dispatch_count,
            busy: Duration::from_micros(stats.total_gpu_time_us),
        }
    }

    pub fn debug_info(&self) -> String {
        let usage = self.usage();
        let avg_us = match usage.dispatches {
            0 => 0.0,
            n => usage.busy.as_micros() as f64 / n as f64,
        };
        format!(
            "{}\nStats: {} dispatches, {:.2?} total, {:.2}µs avg",
            self.context.debug_info(),
            usage.dispatches,
            usage.busy,
            avg_us
        )
    }
}

fn backend_error(e: GpuError) -> Error {
    Error::backend("gpu", e.to_string())
}

impl ComputeBackend for GpuBackend {
    fn name(&self) -> &str {
        "gpu"
    }

    fn device_usage(&self) -> Option<DeviceUsage> {
        Some(self.usage())
    }

    /// The children buffer and its staging copy share the memory budget.
    fn limits(&self) -> BackendLimits {
        BackendLimits {
            max_buffer_bytes: self.context.max_buffer_size(),
            memory_budget_bytes: self.context.config().memory_budget_bytes / 2,
        }
    }

    fn tables(&self) -> &ConstantTables {
        &self.tables
    }

    fn expand(&self, parents: &[MoveSequence]) -> Result<Vec<MoveSequence>> {
        if parents.is_empty() || self.on_host(parents.len()) {
            return self.host.expand(parents);
        }
        let (words, produced) = self.gpu_expand(parents).map_err(backend_error)?;
        let produced = produced as usize;
        let children: Vec<MoveSequence> = words
            .par_chunks_exact(RECORD_WORDS)
            .map(decode_record)
            .collect::<Result<Vec<Option<MoveSequence>>>>()?
            .into_iter()
            .flatten()
            .collect();
        if children.len() != produced {
            return Err(Error::backend(
                "gpu",
                format!("expand kernel counted {produced} children, buffer holds {}", children.len()),
            ));
        }
        Ok(children)
    }

    fn signatures(&self, batch: &[MoveSequence]) -> Result<Vec<PackedBoard>> {
        if batch.is_empty() || self.on_host(batch.len()) {
            return self.host.signatures(batch);
        }
        let run = || -> std::result::Result<Vec<u32>, GpuError> {
            let records = encode_sequences(batch);
            let input = self.input_buffer("Sequences", bytemuck::cast_slice(&records))?;
            let codes = self.output_buffer("Signatures", batch.len() as u64 * 8)?;
            let staging = self.dispatch(
                &self.context.signature,
                "Signature",
                &[&input, &codes],
                KernelParams::new(batch.len(), 0, 0),
                &[&codes],
            )?;
            self.read_buffer::<u32>(&staging[0], batch.len() * 2)
        };
        let words = run().map_err(backend_error)?;
        words
            .chunks_exact(2)
            .map(|pair| PackedBoard::from_raw(cube_shared::join_code(pair[0], pair[1])))
            .collect()
    }

    fn rotation_keys(&self, codes: &[PackedBoard]) -> Result<Vec<u64>> {
        if codes.is_empty() || self.on_host(codes.len()) {
            return self.host.rotation_keys(codes);
        }
        let run = || -> std::result::Result<Vec<u32>, GpuError> {
            let input = self.upload_codes(codes)?;
            let keys = self.output_buffer("Rotation Keys", codes.len() as u64 * 8)?;
            let staging = self.dispatch(
                &self.context.rotation,
                "Rotation",
                &[&input, &self.maps_buffer, &keys],
                KernelParams::new(codes.len(), 0, self.tables.rotations.len()),
                &[&keys],
            )?;
            self.read_buffer::<u32>(&staging[0], codes.len() * 2)
        };
        let words = run().map_err(backend_error)?;
        Ok(words
            .chunks_exact(2)
            .map(|pair| cube_shared::join_code(pair[0], pair[1]))
            .collect())
    }

    fn classify(&self, codes: &[PackedBoard], ply: usize) -> Result<Vec<Outcome>> {
        if codes.is_empty() || self.on_host(codes.len()) {
            return self.host.classify(codes, ply);
        }
        let run = || -> std::result::Result<(Vec<u32>, Vec<u32>), GpuError> {
            let input = self.upload_codes(codes)?;
            let outcomes = self.output_buffer("Outcomes", codes.len() as u64 * 4)?;
            let counters = self.counter_buffer("Outcome Counters", 4)?;
            let staging = self.dispatch(
                &self.context.classify,
                "Classify",
                &[&input, &self.lines_buffer, &outcomes, &counters],
                KernelParams::new(codes.len(), ply, self.tables.win_lines.len()),
                &[&outcomes, &counters],
            )?;
            Ok((
                self.read_buffer::<u32>(&staging[0], codes.len())?,
                self.read_buffer::<u32>(&staging[1], 4)?,
            ))
        };
        let (tags, counters) = run().map_err(backend_error)?;
        let mut seen = [0u32; 4];
        let outcomes = tags
            .iter()
            .map(|&tag| {
                let outcome = Outcome::from_tag(tag as u8)?;
                seen[outcome.tag() as usize] += 1;
                Ok(outcome)
            })
            .collect::<Result<Vec<Outcome>>>()?;
        if seen[..] != counters[..] {
            return Err(Error::backend(
                "gpu",
                format!("classify counters {counters:?} disagree with outcomes {seen:?}"),
            ));
        }
        Ok(outcomes)
    }
}

impl std::fmt::Debug for GpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBackend")
            .field("context", &self.context)
            .field("rotations", &self.tables.rotations.len())
            .field("win_lines", &self.tables.win_lines.len())
            .finish()
    }
}
