//! Display surface and captured frame types.

use crate::domain::channel::ChannelId;

/// Geometry of the guest's primary surface, as described by the remote side
/// when the display channel becomes ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceFormat {
    /// Backend-specific pixel format code.
    pub pixel_format: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes per row.
    pub stride: u32,
}

/// The rendered guest screen.
///
/// At most one exists per session, and only while its channel is the current
/// display channel and has signalled ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySurface {
    /// Channel that owns the surface.  Always `None` for the single-transport
    /// backend.
    pub channel: Option<ChannelId>,
    /// Surface geometry, when the backend reported one.
    pub format: Option<SurfaceFormat>,
}

/// One captured image of the guest screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Bytes per row of `data`.
    pub stride: u32,
    /// Packed pixel rows, `stride * height` bytes.
    pub data: Vec<u8>,
}

impl Frame {
    /// Returns `true` when `data` is large enough for the declared geometry.
    pub fn is_well_formed(&self) -> bool {
        let needed = u64::from(self.stride) * u64::from(self.height);
        self.data.len() as u64 >= needed
    }
}
