// Allow dead code for data-model fields the pipeline decodes but does not
// consume itself
#![allow(dead_code)]

mod atlas;
mod font;
mod geometry;
mod math;
mod metadata;
mod renderer;

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use crate::atlas::AtlasPacker;
use crate::font::Font;
use crate::geometry::GlyphPainter;
use crate::metadata::MetadataEmitter;
use crate::renderer::{flip_rows, CpuRasterizer, GpuRasterizer, Rasterizer};

// ============================================================================
// CLI
// ============================================================================

const HELP: &str = "Generates a signed distance field font atlas.
Given a TTF file, produces a PNG image and a metadata document with glyph
rectangles, metrics and kerning pairs.
Usage: sdf-atlas -f font_file.ttf [options]
Options:
    -h              this help
    -o 'filename'   output file name (without extension)
    -tw 'size'      atlas image width in pixels, default 1024
    -th 'size'      atlas image height in pixels (optional)
    -ur 'ranges'    unicode ranges 'start1:end1,start2:end2,single_codepoint'
                    without spaces, default: 0x21:0x7E,0xFFFF
    -bs 'size'      SDF distance in pixels, default 16
    -rh 'size'      row height in pixels (without SDF border), default 96
    -cpu            render with the software rasterizer (no GPU required)
Example:
    sdf-atlas -f Roboto-Regular.ttf -o roboto -tw 2048 -th 2048 -bs 22 -rh 70 -ur 0x20:0x7E,0xA0:0xFF,0x400:0x4FF,0xFFFF
";

struct CliArgs {
    font_path: Option<PathBuf>,
    out_stem: Option<PathBuf>,
    tex_width: u32,
    tex_height: Option<u32>,
    row_height: u32,
    sdf_border: u32,
    ranges: Vec<(u32, u32)>,
    use_cpu: bool,
    show_help: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            font_path: None,
            out_stem: None,
            tex_width: 1024,
            tex_height: None,
            row_height: 96,
            sdf_border: 16,
            ranges: Vec::new(),
            use_cpu: false,
            show_help: false,
        }
    }
}

/// Parse a decimal or 0x-prefixed hex number.
fn parse_num(s: &str) -> Option<u32> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

/// `start[:end]` entries joined with `,`; a bare entry is a single
/// codepoint. Ends are inclusive.
fn parse_ranges(s: &str) -> Result<Vec<(u32, u32)>> {
    let mut ranges = Vec::new();
    for entry in s.split(',') {
        let (start, end) = match entry.split_once(':') {
            Some((a, b)) => (
                parse_num(a).context("Error reading unicode ranges")?,
                parse_num(b).context("Error reading unicode ranges")?,
            ),
            None => {
                let v = parse_num(entry).context("Error reading unicode ranges")?;
                (v, v)
            }
        };
        if start > end {
            bail!("Error reading unicode ranges");
        }
        ranges.push((start, end));
    }
    Ok(ranges)
}

fn parse_args(argv: impl Iterator<Item = String>) -> Result<CliArgs> {
    let mut args = CliArgs::default();
    let mut iter = argv.peekable();

    if iter.peek().is_none() {
        args.show_help = true;
        return Ok(args);
    }

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" => args.show_help = true,
            "-f" => args.font_path = iter.next().map(PathBuf::from),
            "-o" => args.out_stem = iter.next().map(PathBuf::from),
            "-tw" => {
                args.tex_width = iter
                    .next()
                    .and_then(|s| parse_num(&s))
                    .filter(|&v| v > 0)
                    .context("Error reading texture width")?;
            }
            "-th" => {
                let height = iter
                    .next()
                    .and_then(|s| parse_num(&s))
                    .filter(|&v| v > 0)
                    .context("Error reading texture height")?;
                args.tex_height = Some(height);
            }
            "-rh" => {
                args.row_height = iter
                    .next()
                    .and_then(|s| parse_num(&s))
                    .filter(|&v| v > 4)
                    .context("Error reading row height")?;
            }
            "-bs" => {
                args.sdf_border = iter
                    .next()
                    .and_then(|s| parse_num(&s))
                    .filter(|&v| v > 0)
                    .context("Error reading border size")?;
            }
            "-ur" => {
                let ranges = iter.next().context("Error reading unicode ranges")?;
                args.ranges = parse_ranges(&ranges)?;
            }
            "-cpu" => args.use_cpu = true,
            _ => {}
        }
    }

    Ok(args)
}

// ============================================================================
// Pipeline
// ============================================================================

fn run() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    if args.show_help {
        print!("{HELP}");
        return Ok(());
    }

    let font_path = args.font_path.context("Input file not specified")?;
    let bytes = std::fs::read(&font_path)
        .with_context(|| format!("Failed to read input file '{}'", font_path.display()))?;
    let font = Font::decode(&bytes)
        .with_context(|| format!("Error reading TTF file '{}'", font_path.display()))?;

    let out_stem = args
        .out_stem
        .unwrap_or_else(|| font_path.with_extension(""));

    let rasterizer = if args.use_cpu {
        Rasterizer::Cpu(CpuRasterizer::new())
    } else {
        Rasterizer::Gpu(GpuRasterizer::new().context("Failed to initialize GPU rasterizer")?)
    };

    let max_size = rasterizer.max_size();
    let mut tex_width = args.tex_width;
    if tex_width > max_size {
        eprintln!("Maximum texture size is {max_size}. Clamping width.");
        tex_width = max_size;
    }

    // Allocate glyph rects in unicode-range order
    let mut packer = AtlasPacker::new(
        &font,
        tex_width as f32,
        args.row_height as f32,
        args.sdf_border as f32,
    );
    let ranges = if args.ranges.is_empty() {
        vec![(0x21, 0x7e), (0xffff, 0xffff)]
    } else {
        args.ranges.clone()
    };
    for (start, end) in ranges {
        packer.allocate_range(start, end);
    }

    println!("Allocated {} glyphs", packer.rects.len());
    let max_height = packer.max_height.ceil() as u32;
    println!("Atlas maximum height is {max_height}");

    let tex_height = match args.tex_height {
        Some(h) if h > max_size => {
            eprintln!("Height exceeds maximum texture size. Setting to {max_size}.");
            max_size
        }
        Some(h) => h,
        None => {
            if max_height > max_size {
                bail!(
                    "Atlas too small: glyphs need a {max_height} px tall texture but the \
                     device limit is {max_size} (use a larger -tw or a smaller -rh/-bs)"
                );
            }
            max_height
        }
    };

    // Build geometry for every allocated glyph and render the whole atlas
    let mut painter = GlyphPainter::default();
    packer.draw_glyphs(&mut painter);

    let mut pixels = rasterizer.render(
        tex_width,
        tex_height,
        &painter.fill.vertices,
        &painter.line.vertices,
    )?;

    // World y points up; flip so the PNG origin is the top left
    flip_rows(&mut pixels, tex_width as usize, tex_height as usize);

    let png_path = out_stem.with_extension("png");
    let image = image::GrayImage::from_raw(tex_width, tex_height, pixels)
        .context("Failed to assemble output image")?;
    image
        .save(&png_path)
        .with_context(|| format!("Error writing png file '{}'", png_path.display()))?;
    println!("Wrote {}", png_path.display());

    let emitter = MetadataEmitter {
        font: &font,
        rects: &packer.rects,
        tex_width: tex_width as f32,
        tex_height: tex_height as f32,
        row_height: args.row_height as f32,
        sdf_border: args.sdf_border as f32,
        flip_texcoord_y: true,
    };
    let js_path = out_stem.with_extension("js");
    std::fs::write(&js_path, emitter.emit())
        .with_context(|| format!("Error writing metadata file '{}'", js_path.display()))?;
    println!("Wrote {}", js_path.display());

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("sdf-atlas: {e:#}");
        std::process::exit(1);
    }
}
