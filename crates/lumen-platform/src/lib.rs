// SPDX-License-Identifier: CEPL-1.0
pub use winit;

use lumen_present::SurfaceSize;
use winit::dpi::PhysicalSize;

pub fn surface_size(size: PhysicalSize<u32>) -> SurfaceSize {
    SurfaceSize::new(size.width, size.height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_size_maps_to_surface_size() {
        let s = surface_size(PhysicalSize::new(800, 600));
        assert_eq!(s, SurfaceSize::new(800, 600));
        assert!(surface_size(PhysicalSize::new(0, 600)).is_empty());
    }
}
