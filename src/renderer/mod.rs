//! Atlas rasterization backends: the GPU two-pass renderer and the
//! portable software fallback, behind one dispatch type.

mod context;
mod cpu;
mod gpu;
mod offscreen;

pub use context::VulkanContext;
pub use cpu::CpuRasterizer;
pub use gpu::GpuRasterizer;

use anyhow::Result;

use crate::geometry::SdfVertex;

pub enum Rasterizer {
    Gpu(GpuRasterizer),
    Cpu(CpuRasterizer),
}

impl Rasterizer {
    /// Largest supported atlas dimension
    pub fn max_size(&self) -> u32 {
        match self {
            Rasterizer::Gpu(gpu) => gpu.max_size(),
            Rasterizer::Cpu(cpu) => cpu.max_size(),
        }
    }

    pub fn render(
        &self,
        width: u32,
        height: u32,
        fill_vertices: &[SdfVertex],
        line_vertices: &[SdfVertex],
    ) -> Result<Vec<u8>> {
        match self {
            Rasterizer::Gpu(gpu) => gpu.render(width, height, fill_vertices, line_vertices),
            Rasterizer::Cpu(cpu) => Ok(cpu.render(width, height, fill_vertices, line_vertices)),
        }
    }
}

/// Flip the image vertically in place, so world y = 0 lands on the last
/// row and the written PNG has its origin at the top left.
pub fn flip_rows(pixels: &mut [u8], width: usize, height: usize) {
    for iy in 0..height / 2 {
        let (head, tail) = pixels.split_at_mut((height - 1 - iy) * width);
        head[iy * width..(iy + 1) * width].swap_with_slice(&mut tail[..width]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_rows() {
        let mut pixels = vec![
            1, 1, 1, //
            2, 2, 2, //
            3, 3, 3, //
            4, 4, 4,
        ];
        flip_rows(&mut pixels, 3, 4);
        assert_eq!(pixels, vec![4, 4, 4, 3, 3, 3, 2, 2, 2, 1, 1, 1]);
    }
}
