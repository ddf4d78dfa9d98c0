//! The rendering backend collaborator.

use terra_tiles::{TextureBackend, TextureHandle};

/// A vertex handed to the backend, 20 bytes.
///
/// `position` is relative to the eye, which keeps `f32` precise near the camera.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StripVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

static_assertions::assert_eq_size!(StripVertex, [u8; 20]);

/// Draw primitives the engine emits geometry through.
///
/// Called only from the render thread.
pub trait RenderBackend: TextureBackend {
    /// Make `handle` the texture for subsequent strips.
    fn bind_texture(&mut self, handle: TextureHandle);

    /// Draw one triangle strip.
    fn submit_triangle_strip(&mut self, vertices: &[StripVertex]);
}

/// Backend that draws nothing and keeps counts, for tools and tests.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    pub textures_created: u32,
    pub texture_uploads: u64,
    pub uploaded_bytes: u64,
    pub binds: u64,
    pub strips: u64,
    pub triangles: u64,
    /// Texture bound when each strip of the current frame was submitted.
    pub frame_strips: Vec<(TextureHandle, usize)>,
    bound: Option<TextureHandle>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the per-frame strip log.
    pub fn begin_frame(&mut self) {
        self.frame_strips.clear();
    }

    pub fn bound(&self) -> Option<TextureHandle> {
        self.bound
    }
}

impl TextureBackend for HeadlessBackend {
    fn create_texture(&mut self, _size: u32) -> TextureHandle {
        self.textures_created += 1;
        TextureHandle(self.textures_created)
    }

    fn update_texture(&mut self, handle: TextureHandle, size: u32, rgba: &[u8]) {
        debug_assert!(handle.0 >= 1 && handle.0 <= self.textures_created);
        debug_assert_eq!(rgba.len(), (size * size * 4) as usize);
        self.texture_uploads += 1;
        self.uploaded_bytes += rgba.len() as u64;
    }
}

impl RenderBackend for HeadlessBackend {
    fn bind_texture(&mut self, handle: TextureHandle) {
        self.binds += 1;
        self.bound = Some(handle);
    }

    fn submit_triangle_strip(&mut self, vertices: &[StripVertex]) {
        self.strips += 1;
        self.triangles += vertices.len().saturating_sub(2) as u64;
        if let Some(bound) = self.bound {
            self.frame_strips.push((bound, vertices.len()));
        }
    }
}
