//! GPU device access without a window.

use anyhow::Context as _;

#[derive(Debug)]
pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Requests an adapter and device with no surface attached (offscreen rendering, tests).
    pub async fn headless() -> anyhow::Result<Self> {
        let instance = wgpu::Instance::default();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("no GPU adapter available")?;
        log::info!("using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("skinscope device"),
                required_features: wgpu::Features::empty(),
                // the bone texture path only needs what WebGL2 offers
                required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                    .using_resolution(adapter.limits()),
                ..Default::default()
            })
            .await
            .context("failed to create GPU device")?;

        Ok(Self {
            adapter,
            device,
            queue,
        })
    }

    /// Copies a whole bone texture back to the CPU.
    pub async fn read_bone_texture(
        &self,
        texture: &wgpu::Texture,
        size: u32,
    ) -> anyhow::Result<Vec<f32>> {
        let bytes = self.read_texture(texture, 4 * std::mem::size_of::<f32>() as u32).await?;
        debug_assert_eq!(bytes.len(), (size * size * 16) as usize);
        Ok(bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    /**
     * Copies mip level 0 of a 2D texture into tightly packed rows.
     *
     * `bytes_per_texel` must match the texture format, e.g. 4 for
     * `Rgba8Unorm` and 16 for `Rgba32Float`. The texture needs `COPY_SRC`.
     */
    pub async fn read_texture(
        &self,
        texture: &wgpu::Texture,
        bytes_per_texel: u32,
    ) -> anyhow::Result<Vec<u8>> {
        let (width, height) = (texture.width(), texture.height());
        let bytes_per_row = width * bytes_per_texel;
        // wgpu wants rows aligned to 256 bytes when copying textures into buffers
        let padded_bytes_per_row = bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("texture readback"),
            size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("texture readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = buffer.slice(..);
        // NOTE: We have to create the mapping THEN device.poll() before await
        // the future. Otherwise the application will freeze.
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        })?;
        rx.receive()
            .await
            .context("readback channel closed")?
            .context("failed to map readback buffer")?;

        let data = buffer_slice.get_mapped_range();
        let mut texels = Vec::with_capacity((bytes_per_row * height) as usize);
        for row in data.chunks(padded_bytes_per_row as usize) {
            texels.extend_from_slice(&row[..bytes_per_row as usize]);
        }
        drop(data);
        buffer.unmap();
        Ok(texels)
    }
}
