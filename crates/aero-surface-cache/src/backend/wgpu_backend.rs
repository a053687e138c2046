use hashbrown::HashMap;
use tracing::debug;

use super::{
    ColorAttachmentPoint, FramebufferAttachments, FramebufferStatus, RegionCopy, SurfaceBackend,
    TextureRegion, TextureStorageDesc,
};
use crate::error::BackendError;
use crate::format::{InternalFormat, TexelLayout};
use crate::handle::{BufferId, FramebufferId, IdAllocator, TextureId};

const COPY_ROW_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

#[derive(Debug)]
struct StoredTexture {
    texture: wgpu::Texture,
    desc: TextureStorageDesc,
}

#[derive(Debug)]
struct StoredBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

/// `wgpu` backing store.
///
/// A [`TextureId`] names a slot whose `wgpu::Texture` is replaced whenever its storage is
/// re-specified, so handle identity survives reshapes. Framebuffers are recorded attachment sets;
/// the one-time clear is a render pass with clear load ops.
pub struct WgpuSurfaceBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,

    texture_ids: IdAllocator,
    buffer_ids: IdAllocator,
    framebuffer_ids: IdAllocator,

    /// `None` until the texture is defined.
    textures: HashMap<TextureId, Option<StoredTexture>>,
    buffers: HashMap<BufferId, StoredBuffer>,
    framebuffers: HashMap<FramebufferId, (FramebufferAttachments, FramebufferStatus)>,
}

impl WgpuSurfaceBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            texture_ids: IdAllocator::new(),
            buffer_ids: IdAllocator::new(),
            framebuffer_ids: IdAllocator::new(),
            textures: HashMap::new(),
            buffers: HashMap::new(),
            framebuffers: HashMap::new(),
        }
    }

    /// Creates a backing store on a headless device. Intended for tests and offscreen use.
    pub async fn new_headless() -> Result<Self, BackendError> {
        // wgpu's GL backend warns when `XDG_RUNTIME_DIR` is missing or world-readable.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let needs_runtime_dir = match std::env::var("XDG_RUNTIME_DIR") {
                Ok(dir) if !dir.is_empty() => match std::fs::metadata(&dir) {
                    Ok(meta) => !meta.is_dir() || (meta.permissions().mode() & 0o077) != 0,
                    Err(_) => true,
                },
                _ => true,
            };
            if needs_runtime_dir {
                let dir = std::env::temp_dir().join(format!(
                    "aero-surface-cache-xdg-runtime-{}",
                    std::process::id()
                ));
                let _ = std::fs::create_dir_all(&dir);
                let _ = std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700));
                std::env::set_var("XDG_RUNTIME_DIR", &dir);
            }
        }

        let options = wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        };

        // Linux CI software Vulkan adapters are less reliable than GL; try GL first there.
        let adapter = if cfg!(target_os = "linux") {
            let gl_instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
                backends: wgpu::Backends::GL,
                ..Default::default()
            });
            match gl_instance.request_adapter(&options).await {
                Some(adapter) => Some(adapter),
                None => {
                    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
                        backends: wgpu::Backends::PRIMARY,
                        ..Default::default()
                    });
                    instance.request_adapter(&options).await
                }
            }
        } else {
            let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
                backends: wgpu::Backends::PRIMARY,
                ..Default::default()
            });
            instance.request_adapter(&options).await
        }
        .ok_or_else(|| BackendError::Unsupported("no suitable wgpu adapter found".into()))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("aero-surface-cache device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                },
                None,
            )
            .await
            .map_err(|err| BackendError::Internal(err.to_string()))?;

        Ok(Self::new(device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// The `wgpu` texture currently backing `texture`, if it has storage.
    pub fn texture(&self, texture: TextureId) -> Option<&wgpu::Texture> {
        self.textures
            .get(&texture)?
            .as_ref()
            .map(|stored| &stored.texture)
    }

    /// Uploads tightly packed texel rows into a defined texture.
    pub fn write_texture_data(
        &mut self,
        texture: TextureId,
        data: &[u8],
    ) -> Result<(), BackendError> {
        let stored = self.stored(texture)?;
        let desc = stored.desc;
        let bytes_per_row = desc.width * desc.layout.bytes_per_texel();
        if data.len() as u64 != desc.byte_len() {
            return Err(BackendError::InvalidResource(format!(
                "{texture:?} holds {} bytes, got {}",
                desc.byte_len(),
                data.len()
            )));
        }
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &stored.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(desc.height),
            },
            extent(desc.width, desc.height),
        );
        Ok(())
    }

    /// Reads a defined texture back as tightly packed texel rows. Blocks until the GPU is idle.
    pub fn read_texture_data(&mut self, texture: TextureId) -> Result<Vec<u8>, BackendError> {
        let desc = self.stored(texture)?.desc;
        let bpt = desc.layout.bytes_per_texel();
        let region = TextureRegion {
            x: 0,
            y: 0,
            width: desc.width,
            height: desc.height,
        };
        let size = self.staging_bytes_required(&region, bpt);
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("aero-surface-cache.readback"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let pitch = padded_bytes_per_row(desc.width * bpt)?;

        let stored = self.stored(texture)?;
        let mut encoder = self.encoder("aero-surface-cache.readback");
        encoder.copy_texture_to_buffer(
            image_copy(&stored.texture, 0, 0),
            wgpu::ImageCopyBuffer {
                buffer: &readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(pitch),
                    rows_per_image: Some(desc.height),
                },
            },
            extent(desc.width, desc.height),
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = sender.send(res);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| BackendError::Internal("readback map_async sender dropped".into()))?
            .map_err(|err| BackendError::Internal(format!("readback map_async failed: {err:?}")))?;

        let row_len = (desc.width * bpt) as usize;
        let mapped = slice.get_mapped_range();
        let mut out = Vec::with_capacity(row_len * desc.height as usize);
        for row in mapped.chunks(pitch as usize).take(desc.height as usize) {
            out.extend_from_slice(&row[..row_len]);
        }
        drop(mapped);
        readback.unmap();
        readback.destroy();
        Ok(out)
    }

    fn stored(&self, texture: TextureId) -> Result<&StoredTexture, BackendError> {
        self.textures
            .get(&texture)
            .ok_or_else(|| BackendError::InvalidResource(format!("unknown {texture:?}")))?
            .as_ref()
            .ok_or_else(|| BackendError::InvalidResource(format!("{texture:?} has no storage")))
    }

    fn buffer(&self, buffer: BufferId) -> Result<&StoredBuffer, BackendError> {
        self.buffers
            .get(&buffer)
            .ok_or_else(|| BackendError::InvalidResource(format!("unknown {buffer:?}")))
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    fn allowed_usages(&self, format: wgpu::TextureFormat) -> wgpu::TextureUsages {
        format
            .guaranteed_format_features(self.device.features())
            .allowed_usages
    }

    fn new_buffer(&self, label: &str, size: u64) -> Result<wgpu::Buffer, BackendError> {
        with_error_scope(&self.device, label, || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: size.max(4),
                usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })
    }
}

fn map_format(format: InternalFormat) -> wgpu::TextureFormat {
    match format {
        InternalFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        InternalFormat::Rgba8Snorm => wgpu::TextureFormat::Rgba8Snorm,
        InternalFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        InternalFormat::Rgba16Uint => wgpu::TextureFormat::Rgba16Uint,
        InternalFormat::Rgb10A2Unorm => wgpu::TextureFormat::Rgb10a2Unorm,
        InternalFormat::Depth24Stencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn image_copy(texture: &wgpu::Texture, x: u32, y: u32) -> wgpu::ImageCopyTexture<'_> {
    wgpu::ImageCopyTexture {
        texture,
        mip_level: 0,
        origin: wgpu::Origin3d { x, y, z: 0 },
        aspect: wgpu::TextureAspect::All,
    }
}

fn padded_bytes_per_row(unpadded: u32) -> Result<u32, BackendError> {
    unpadded
        .checked_add(COPY_ROW_ALIGNMENT - 1)
        .map(|v| v & !(COPY_ROW_ALIGNMENT - 1))
        .ok_or_else(|| BackendError::OutOfMemory("row pitch overflow".into()))
}

/// Runs `f` inside validation and out-of-memory error scopes.
fn with_error_scope<R>(
    device: &wgpu::Device,
    what: &str,
    f: impl FnOnce() -> R,
) -> Result<R, BackendError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let out = f();
    let oom = pollster::block_on(device.pop_error_scope());
    let validation = pollster::block_on(device.pop_error_scope());
    if let Some(err) = oom {
        return Err(BackendError::OutOfMemory(format!("{what}: {err}")));
    }
    if let Some(err) = validation {
        return Err(BackendError::Internal(format!("{what}: {err}")));
    }
    Ok(out)
}

impl SurfaceBackend for WgpuSurfaceBackend {
    fn create_texture(&mut self) -> Result<TextureId, BackendError> {
        let id = self
            .texture_ids
            .allocate()
            .map(TextureId::new)
            .ok_or_else(|| BackendError::OutOfMemory("texture ids exhausted".into()))?;
        self.textures.insert(id, None);
        Ok(id)
    }

    fn define_texture(
        &mut self,
        texture: TextureId,
        desc: &TextureStorageDesc,
    ) -> Result<(), BackendError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::InvalidResource(format!(
                "define_texture {texture:?} width/height must be non-zero"
            )));
        }
        if !self.textures.contains_key(&texture) {
            return Err(BackendError::InvalidResource(format!("unknown {texture:?}")));
        }

        let format = map_format(desc.layout.internal);
        let usage = (wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST)
            & self.allowed_usages(format);

        let new_texture = with_error_scope(&self.device, "define_texture", || {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("aero-surface-cache.texture"),
                size: extent(desc.width, desc.height),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        })?;

        let previous = self.textures.insert(
            texture,
            Some(StoredTexture {
                texture: new_texture,
                desc: *desc,
            }),
        );
        if let Some(Some(old)) = previous {
            old.texture.destroy();
        }
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) -> Result<(), BackendError> {
        match self.textures.remove(&texture) {
            Some(Some(stored)) => {
                stored.texture.destroy();
                Ok(())
            }
            Some(None) => Ok(()),
            None => Err(BackendError::InvalidResource(format!("unknown {texture:?}"))),
        }
    }

    fn copy_texture_region(
        &mut self,
        src: TextureId,
        dst: TextureId,
        region: &RegionCopy,
    ) -> Result<(), BackendError> {
        let src_tex = self.stored(src)?;
        let dst_tex = self.stored(dst)?;
        let bpt = src_tex.desc.layout.bytes_per_texel();
        if bpt != dst_tex.desc.layout.bytes_per_texel() {
            return Err(BackendError::Unsupported(format!(
                "region copy between {:?} and {:?} texels",
                src_tex.desc.layout.internal, dst_tex.desc.layout.internal
            )));
        }
        if region.width == 0 || region.height == 0 {
            return Ok(());
        }

        let size = extent(region.width, region.height);
        let mut encoder = self.encoder("aero-surface-cache.region_copy");

        // Texture-to-texture copies need identical formats; reinterpretation goes through a
        // scratch buffer instead.
        let scratch = if src_tex.desc.layout.internal == dst_tex.desc.layout.internal {
            encoder.copy_texture_to_texture(
                image_copy(&src_tex.texture, region.src_x, region.src_y),
                image_copy(&dst_tex.texture, region.dst_x, region.dst_y),
                size,
            );
            None
        } else {
            let pitch = padded_bytes_per_row(region.width * bpt)?;
            let scratch = self.new_buffer(
                "aero-surface-cache.region_copy_scratch",
                u64::from(pitch) * u64::from(region.height),
            )?;
            let layout = wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(pitch),
                rows_per_image: Some(region.height),
            };
            encoder.copy_texture_to_buffer(
                image_copy(&src_tex.texture, region.src_x, region.src_y),
                wgpu::ImageCopyBuffer {
                    buffer: &scratch,
                    layout,
                },
                size,
            );
            encoder.copy_buffer_to_texture(
                wgpu::ImageCopyBuffer {
                    buffer: &scratch,
                    layout,
                },
                image_copy(&dst_tex.texture, region.dst_x, region.dst_y),
                size,
            );
            Some(scratch)
        };

        with_error_scope(&self.device, "copy_texture_region", || {
            self.queue.submit(Some(encoder.finish()));
        })?;
        if let Some(scratch) = scratch {
            scratch.destroy();
        }
        Ok(())
    }

    fn create_staging_buffer(&mut self, size: u64) -> Result<BufferId, BackendError> {
        let buffer = self.new_buffer("aero-surface-cache.staging", size)?;
        let id = self
            .buffer_ids
            .allocate()
            .map(BufferId::new)
            .ok_or_else(|| BackendError::OutOfMemory("buffer ids exhausted".into()))?;
        self.buffers.insert(id, StoredBuffer { buffer, size });
        Ok(id)
    }

    fn resize_staging_buffer(&mut self, buffer: BufferId, size: u64) -> Result<(), BackendError> {
        self.buffer(buffer)?;
        let replacement = self.new_buffer("aero-surface-cache.staging", size)?;
        if let Some(old) = self.buffers.insert(
            buffer,
            StoredBuffer {
                buffer: replacement,
                size,
            },
        ) {
            old.buffer.destroy();
        }
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) -> Result<(), BackendError> {
        let stored = self
            .buffers
            .remove(&buffer)
            .ok_or_else(|| BackendError::InvalidResource(format!("unknown {buffer:?}")))?;
        stored.buffer.destroy();
        Ok(())
    }

    fn staging_bytes_required(&self, region: &TextureRegion, bytes_per_texel: u32) -> u64 {
        let unpadded = region.width.saturating_mul(bytes_per_texel);
        let pitch = padded_bytes_per_row(unpadded).unwrap_or(u32::MAX);
        u64::from(pitch) * u64::from(region.height)
    }

    fn read_texture_into_buffer(
        &mut self,
        texture: TextureId,
        layout: TexelLayout,
        region: &TextureRegion,
        buffer: BufferId,
    ) -> Result<u32, BackendError> {
        let stored = self.stored(texture)?;
        if map_format(layout.internal) != stored.texture.format() {
            return Err(BackendError::Unsupported(format!(
                "reading {:?} texture as {:?}",
                stored.desc.layout.internal, layout.internal
            )));
        }
        let pitch = padded_bytes_per_row(region.width * layout.bytes_per_texel())?;
        let staging = self.buffer(buffer)?;
        let needed = u64::from(pitch) * u64::from(region.height);
        if staging.size < needed {
            return Err(BackendError::InvalidResource(format!(
                "{buffer:?} holds {} bytes, readback needs {needed}",
                staging.size
            )));
        }

        let mut encoder = self.encoder("aero-surface-cache.typeless_read");
        encoder.copy_texture_to_buffer(
            image_copy(&stored.texture, region.x, region.y),
            wgpu::ImageCopyBuffer {
                buffer: &staging.buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(pitch),
                    rows_per_image: Some(region.height),
                },
            },
            extent(region.width, region.height),
        );
        with_error_scope(&self.device, "read_texture_into_buffer", || {
            self.queue.submit(Some(encoder.finish()));
        })?;
        Ok(pitch)
    }

    fn write_buffer_into_texture(
        &mut self,
        buffer: BufferId,
        bytes_per_row: u32,
        texture: TextureId,
        desc: &TextureStorageDesc,
        filled: &TextureRegion,
    ) -> Result<(), BackendError> {
        if bytes_per_row % COPY_ROW_ALIGNMENT != 0 {
            return Err(BackendError::Unsupported(format!(
                "buffer rows must be {COPY_ROW_ALIGNMENT}-byte aligned, got {bytes_per_row}"
            )));
        }
        if filled.x != 0
            || filled.y != 0
            || filled.width > desc.width
            || filled.height > desc.height
        {
            return Err(BackendError::InvalidResource(format!(
                "{filled:?} exceeds the {}x{} upload target",
                desc.width, desc.height
            )));
        }
        let filled_row_bytes =
            u64::from(filled.width) * u64::from(desc.layout.bytes_per_texel());
        if u64::from(bytes_per_row) < filled_row_bytes {
            return Err(BackendError::Unsupported(format!(
                "buffer pitch {bytes_per_row} is shorter than a {}-texel row",
                filled.width
            )));
        }
        // Fresh textures are zero-initialised, so texels outside `filled` read as zero.
        self.define_texture(texture, desc)?;
        if filled.width == 0 || filled.height == 0 {
            return Ok(());
        }

        let stored = self.stored(texture)?;
        let staging = self.buffer(buffer)?;
        let mut encoder = self.encoder("aero-surface-cache.typeless_write");
        encoder.copy_buffer_to_texture(
            wgpu::ImageCopyBuffer {
                buffer: &staging.buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(filled.height),
                },
            },
            image_copy(&stored.texture, 0, 0),
            extent(filled.width, filled.height),
        );
        with_error_scope(&self.device, "write_buffer_into_texture", || {
            self.queue.submit(Some(encoder.finish()));
        })
    }

    fn create_framebuffer(
        &mut self,
        attachments: &FramebufferAttachments,
    ) -> Result<(FramebufferId, FramebufferStatus), BackendError> {
        let color = self.stored(attachments.color)?;
        let depth = self.stored(attachments.depth_stencil)?;

        let status = if !self
            .allowed_usages(color.texture.format())
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
        {
            FramebufferStatus::Incomplete(format!(
                "{:?} is not renderable",
                color.desc.layout.internal
            ))
        } else if !depth.texture.format().has_depth_aspect() {
            FramebufferStatus::Incomplete(format!(
                "{:?} is not a depth format",
                depth.desc.layout.internal
            ))
        } else if color.texture.size() != depth.texture.size() {
            FramebufferStatus::Incomplete(format!(
                "color is {}x{} but depth-stencil is {}x{}",
                color.desc.width, color.desc.height, depth.desc.width, depth.desc.height
            ))
        } else {
            FramebufferStatus::Complete
        };

        let id = self
            .framebuffer_ids
            .allocate()
            .map(FramebufferId::new)
            .ok_or_else(|| BackendError::OutOfMemory("framebuffer ids exhausted".into()))?;
        self.framebuffers.insert(id, (*attachments, status.clone()));
        Ok((id, status))
    }

    fn clear_framebuffer(
        &mut self,
        framebuffer: FramebufferId,
        color: [f32; 4],
        depth: f32,
    ) -> Result<(), BackendError> {
        let (attachments, status) = self
            .framebuffers
            .get(&framebuffer)
            .ok_or_else(|| BackendError::InvalidResource(format!("unknown {framebuffer:?}")))?;
        if let FramebufferStatus::Incomplete(reason) = status {
            debug!(framebuffer = ?framebuffer, %reason, "skipping clear of incomplete framebuffer");
            return Ok(());
        }

        let color_view = self
            .stored(attachments.color)?
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = self
            .stored(attachments.depth_stencil)?
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let color_attachment = Some(wgpu::RenderPassColorAttachment {
            view: &color_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color {
                    r: f64::from(color[0]),
                    g: f64::from(color[1]),
                    b: f64::from(color[2]),
                    a: f64::from(color[3]),
                }),
                store: wgpu::StoreOp::Store,
            },
        });
        let color_attachments = match attachments.color_point {
            ColorAttachmentPoint::Color0 => vec![color_attachment],
            ColorAttachmentPoint::Color1 => vec![None, color_attachment],
        };

        let mut encoder = self.encoder("aero-surface-cache.framebuffer_clear");
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("aero-surface-cache.framebuffer_clear"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(depth),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0),
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        with_error_scope(&self.device, "clear_framebuffer", || {
            self.queue.submit(Some(encoder.finish()));
        })
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) -> Result<(), BackendError> {
        self.framebuffers
            .remove(&framebuffer)
            .map(drop)
            .ok_or_else(|| BackendError::InvalidResource(format!("unknown {framebuffer:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_pitch_rounds_up_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(4).unwrap(), 256);
        assert_eq!(padded_bytes_per_row(256).unwrap(), 256);
        assert_eq!(padded_bytes_per_row(257).unwrap(), 512);
        assert!(padded_bytes_per_row(u32::MAX).is_err());
    }

    #[test]
    fn guest_layouts_map_to_distinct_wgpu_formats() {
        assert_eq!(map_format(InternalFormat::Rgba16Uint), wgpu::TextureFormat::Rgba16Uint);
        assert_eq!(
            map_format(InternalFormat::Depth24Stencil8),
            wgpu::TextureFormat::Depth24PlusStencil8
        );
    }
}
