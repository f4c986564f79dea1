//! Uncompressed Windows `.bmp` files, the external image format the image
//! codecs grab from and export to.

use deku::{DekuContainerRead, DekuContainerWrite, DekuRead, DekuWrite};

use crate::{
    codec::{
        bitmap::{Bitmap, Pixels},
        palette::{Palette, Rgb},
    },
    error::Error,
};

const FILE_HEADER_SIZE: usize = 14;
const INFO_HEADER_SIZE: usize = 40;
const BI_RGB: u32 = 0;

#[derive(DekuRead, DekuWrite, Debug)]
#[deku(magic = b"BM", endian = "little")]
pub struct BmpFileHeader {
    pub file_size: u32,
    pub reserved: u32,
    pub data_offset: u32,
}

#[derive(DekuRead, DekuWrite, Debug)]
#[deku(endian = "little")]
pub struct BmpInfoHeader {
    pub header_size: u32,
    pub width: i32,
    pub height: i32,
    pub planes: u16,
    pub bit_count: u16,
    pub compression: u32,
    pub image_size: u32,
    pub x_pixels_per_meter: i32,
    pub y_pixels_per_meter: i32,
    pub colors_used: u32,
    pub colors_important: u32,
}

/// A decoded `.bmp`. Truecolor files get the 3-3-2 palette.
pub struct BmpImage {
    pub bitmap: Bitmap,
    pub palette: Palette,
}

fn stride(width: usize, bit_count: usize) -> usize {
    (width * bit_count).div_ceil(32) * 4
}

pub fn read(data: &[u8]) -> Result<BmpImage, Error> {
    if !data.starts_with(b"BM") || data.len() < FILE_HEADER_SIZE + INFO_HEADER_SIZE {
        return Err(Error::UnsupportedImage("not a Windows bitmap".into()));
    }
    let ((rest, _), file_header) = BmpFileHeader::from_bytes((data, 0))?;
    let (_, info) = BmpInfoHeader::from_bytes((rest, 0))?;

    if info.compression != BI_RGB {
        return Err(Error::UnsupportedImage(format!(
            "compression type {} is not supported",
            info.compression
        )));
    }
    if info.width <= 0 || info.height == 0 || info.width > u16::MAX as i32 {
        return Err(Error::UnsupportedImage(format!(
            "bad dimensions {}x{}",
            info.width, info.height
        )));
    }
    let width = info.width as usize;
    let height = info.height.unsigned_abs() as usize;
    if height > u16::MAX as usize {
        return Err(Error::UnsupportedImage(format!("bad height {}", height)));
    }
    let top_down = info.height < 0;
    let bit_count = info.bit_count as usize;

    let palette = match bit_count {
        1 | 4 | 8 => read_color_table(data, &info)?,
        24 | 32 => Palette::generate_332(),
        other => {
            return Err(Error::UnsupportedImage(format!(
                "{} bits per pixel is not supported",
                other
            )))
        }
    };

    let row_size = stride(width, bit_count);
    let start = file_header.data_offset as usize;
    let needed = start + row_size * height;
    if data.len() < needed {
        return Err(Error::Truncated {
            needed,
            available: data.len(),
        });
    }

    let rows = (0..height).map(|y| {
        let file_row = if top_down { y } else { height - 1 - y };
        let offset = start + file_row * row_size;
        &data[offset..offset + row_size]
    });

    let bitmap = match bit_count {
        1 | 4 | 8 => {
            let mut indices = Vec::with_capacity(width * height);
            for row in rows {
                for x in 0..width {
                    let bit = x * bit_count;
                    let byte = row[bit / 8];
                    let shift = 8 - bit_count - (bit % 8);
                    indices.push((byte >> shift) & ((1u16 << bit_count) - 1) as u8);
                }
            }
            Bitmap {
                depth: 8,
                width: width as u16,
                height: height as u16,
                pixels: Pixels::Indexed(indices),
            }
        }
        _ => {
            let bytes_per_pixel = bit_count / 8;
            let mut colors = Vec::with_capacity(width * height);
            for row in rows {
                for px in row[..width * bytes_per_pixel].chunks_exact(bytes_per_pixel) {
                    colors.push([px[2], px[1], px[0], 255]);
                }
            }
            Bitmap {
                depth: bit_count as i32,
                width: width as u16,
                height: height as u16,
                pixels: Pixels::Rgba(colors),
            }
        }
    };

    Ok(BmpImage { bitmap, palette })
}

fn read_color_table(data: &[u8], info: &BmpInfoHeader) -> Result<Palette, Error> {
    let count = match info.colors_used {
        0 => 1usize << info.bit_count,
        n => (n as usize).min(256),
    };
    let start = FILE_HEADER_SIZE + info.header_size as usize;
    let needed = start + count * 4;
    if data.len() < needed {
        return Err(Error::Truncated {
            needed,
            available: data.len(),
        });
    }

    let mut palette = Palette {
        colors: [Rgb::default(); 256],
    };
    for (color, bgrx) in palette
        .colors
        .iter_mut()
        .zip(data[start..needed].chunks_exact(4))
    {
        *color = Rgb::from_rgb8(bgrx[2], bgrx[1], bgrx[0]);
    }
    Ok(palette)
}

/// Encodes a bitmap as a bottom-up `.bmp`. 8-bit bitmaps use `palette` as
/// their colour table, alpha bitmaps are written at 32 bits and everything
/// else at 24.
pub fn write(bitmap: &Bitmap, palette: &Palette) -> Result<Vec<u8>, Error> {
    let width = bitmap.width as usize;
    let height = bitmap.height as usize;
    let (bit_count, table_size) = match bitmap.depth {
        8 => (8, 256 * 4),
        -32 => (32, 0),
        _ => (24, 0),
    };
    let row_size = stride(width, bit_count);
    let data_offset = FILE_HEADER_SIZE + INFO_HEADER_SIZE + table_size;
    let image_size = row_size * height;

    let file_header = BmpFileHeader {
        file_size: (data_offset + image_size) as u32,
        reserved: 0,
        data_offset: data_offset as u32,
    };
    let info = BmpInfoHeader {
        header_size: INFO_HEADER_SIZE as u32,
        width: width as i32,
        height: height as i32,
        planes: 1,
        bit_count: bit_count as u16,
        compression: BI_RGB,
        image_size: image_size as u32,
        x_pixels_per_meter: 2835,
        y_pixels_per_meter: 2835,
        colors_used: if bit_count == 8 { 256 } else { 0 },
        colors_important: 0,
    };

    let mut out = file_header.to_bytes()?;
    out.extend(info.to_bytes()?);
    if bit_count == 8 {
        for color in &palette.colors {
            let [r, g, b] = color.to_rgb8();
            out.extend_from_slice(&[b, g, r, 0]);
        }
    }

    for y in (0..height).rev() {
        let row_start = out.len();
        for x in 0..width {
            let i = y * width + x;
            match &bitmap.pixels {
                Pixels::Indexed(indices) => out.push(indices[i]),
                Pixels::Rgba(colors) => {
                    let [r, g, b, a] = colors[i];
                    out.extend_from_slice(&[b, g, r]);
                    if bit_count == 32 {
                        out.push(a);
                    }
                }
            }
        }
        out.resize(row_start + row_size, 0);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truecolor_round_trip() {
        let bitmap = Bitmap {
            depth: 24,
            width: 3,
            height: 2,
            pixels: Pixels::Rgba(vec![
                [255, 0, 0, 255],
                [0, 255, 0, 255],
                [0, 0, 255, 255],
                [10, 20, 30, 255],
                [40, 50, 60, 255],
                [70, 80, 90, 255],
            ]),
        };
        let data = write(&bitmap, &Palette::default()).unwrap();
        assert_eq!(&data[..2], b"BM");
        assert_eq!(data.len(), 14 + 40 + 12 * 2);

        let image = read(&data).unwrap();
        assert_eq!(image.bitmap, bitmap);
    }

    #[test]
    fn test_indexed_round_trip() {
        let bitmap = Bitmap {
            depth: 8,
            width: 5,
            height: 1,
            pixels: Pixels::Indexed(vec![0, 1, 2, 3, 255]),
        };
        let palette = Palette::generate_332();
        let image = read(&write(&bitmap, &palette).unwrap()).unwrap();
        assert_eq!(image.bitmap, bitmap);
        assert_eq!(image.palette, palette);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            read(b"not an image at all"),
            Err(Error::UnsupportedImage(_))
        ));
    }
}
