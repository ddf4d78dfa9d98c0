//! The texture side of the rendering backend.

/// Opaque handle to a backend texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// GPU texture storage used by the tile cache.
///
/// Only the render thread calls these methods.
pub trait TextureBackend {
    /// Allocate a square RGBA8 texture of `size × size` texels.
    fn create_texture(&mut self, size: u32) -> TextureHandle;

    /// Replace the full contents of `handle`. `rgba` holds `size * size * 4` bytes,
    /// row 0 at the southern edge.
    fn update_texture(&mut self, handle: TextureHandle, size: u32, rgba: &[u8]);
}
