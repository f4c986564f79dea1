//! Bitmaps and RLE sprites in their archive encodings, plus the codecs for
//! the image object types.
//!
//! Every encoding starts with a big-endian `i16` colour depth and `u16`
//! width and height. A depth of -32 means 32-bit with alpha. Hicolor pixels
//! are always stored as 5-6-5 regardless of whether the depth is 15 or 16.

use std::path::Path;

use deku::{DekuContainerRead, DekuContainerWrite, DekuRead, DekuWrite};
use log::debug;

use crate::{
    codec::{bmp, palette::Palette, Codec, ImportRequest, Imported},
    datafile::Session,
    error::Error,
    object::{Body, DataObject},
    tag::Tag,
};

pub type Rgba = [u8; 4];

const MAGENTA: Rgba = [255, 0, 255, 255];
const EOL_16: u16 = 0xF81F;
const EOL_32: u32 = 0x00FF_00FF;
const MAX_RUN_8: usize = 127;
// A skip of 2017 would encode as the end-of-line marker.
const MAX_RUN_16: usize = 2016;
const MAX_RUN_32: usize = 0x7FFF_FFFF;

#[derive(DekuRead, DekuWrite, Debug)]
#[deku(endian = "big")]
struct BitmapHeader {
    depth: i16,
    width: u16,
    height: u16,
}

#[derive(DekuRead, DekuWrite, Debug)]
#[deku(endian = "big")]
struct RleHeader {
    depth: i16,
    width: u16,
    height: u16,
    size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pixels {
    Indexed(Vec<u8>),
    Rgba(Vec<Rgba>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub depth: i32,
    pub width: u16,
    pub height: u16,
    pub pixels: Pixels,
}

fn is_valid_depth(depth: i32) -> bool {
    matches!(depth, 8 | 15 | 16 | 24 | 32 | -32)
}

fn bytes_per_pixel(depth: i32) -> usize {
    match depth {
        8 => 1,
        15 | 16 => 2,
        -32 => 4,
        _ => 3,
    }
}

fn pack_565([r, g, b, _]: Rgba) -> u16 {
    ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3)
}

fn unpack_565(c: u16) -> Rgba {
    let r = ((c >> 11) & 0x1F) as u8;
    let g = ((c >> 5) & 0x3F) as u8;
    let b = (c & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2), 255]
}

fn is_magenta([r, g, b, _]: Rgba) -> bool {
    r == 255 && g == 0 && b == 255
}

/// Bounds-checked cursor over pixel data.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let available = self.data.len() - self.pos;
        if available < len {
            return Err(Error::Truncated {
                needed: len,
                available,
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn u16_le(&mut self) -> Result<u16, Error> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32_le(&mut self) -> Result<u32, Error> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn pixel(&mut self, depth: i32) -> Result<Rgba, Error> {
        Ok(match depth {
            15 | 16 => unpack_565(self.u16_le()?),
            -32 => {
                let b = self.take(4)?;
                [b[0], b[1], b[2], b[3]]
            }
            _ => {
                let b = self.take(3)?;
                [b[0], b[1], b[2], 255]
            }
        })
    }
}

fn put_pixel(out: &mut Vec<u8>, depth: i32, color: Rgba) {
    match depth {
        15 | 16 => out.extend_from_slice(&pack_565(color).to_le_bytes()),
        -32 => out.extend_from_slice(&color),
        _ => out.extend_from_slice(&color[..3]),
    }
}

impl Bitmap {
    /// A bitmap cleared to the mask colour of `depth`.
    pub fn new(depth: i32, width: u16, height: u16) -> Self {
        let len = width as usize * height as usize;
        let pixels = match depth {
            8 => Pixels::Indexed(vec![0; len]),
            -32 => Pixels::Rgba(vec![[255, 0, 255, 0]; len]),
            _ => Pixels::Rgba(vec![MAGENTA; len]),
        };
        Bitmap {
            depth,
            width,
            height,
            pixels,
        }
    }

    fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let ((rest, _), header) = BitmapHeader::from_bytes((data, 0))?;
        let depth = header.depth as i32;
        if !is_valid_depth(depth) {
            return Err(Error::MalformedObject(
                Tag::BITMAP,
                format!("unknown colour depth {}", depth),
            ));
        }
        let len = header.width as usize * header.height as usize;
        let expected = len * bytes_per_pixel(depth);
        if rest.len() != expected {
            return Err(Error::SizeMismatch {
                expected,
                actual: rest.len(),
            });
        }

        let pixels = if depth == 8 {
            Pixels::Indexed(rest.to_vec())
        } else {
            let mut cursor = Cursor { data: rest, pos: 0 };
            let mut colors = Vec::with_capacity(len);
            for _ in 0..len {
                colors.push(cursor.pixel(depth)?);
            }
            Pixels::Rgba(colors)
        };

        Ok(Bitmap {
            depth,
            width: header.width,
            height: header.height,
            pixels,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let header = BitmapHeader {
            depth: self.depth as i16,
            width: self.width,
            height: self.height,
        };
        let mut out = header.to_bytes()?;
        match &self.pixels {
            Pixels::Indexed(indices) => out.extend_from_slice(indices),
            Pixels::Rgba(colors) => {
                for &color in colors {
                    put_pixel(&mut out, self.depth, color);
                }
            }
        }
        Ok(out)
    }

    fn is_transparent(&self, i: usize) -> bool {
        match &self.pixels {
            Pixels::Indexed(indices) => indices[i] == 0,
            Pixels::Rgba(colors) => is_magenta(colors[i]),
        }
    }

    /// Run-length encodes the bitmap. Mask-coloured pixels become skips.
    pub fn encode_rle(&self) -> Result<Vec<u8>, Error> {
        let (max_run, unit) = match self.depth {
            8 => (MAX_RUN_8, 1),
            15 | 16 => (MAX_RUN_16, 2),
            _ => (MAX_RUN_32, 4),
        };
        let width = self.width as usize;

        let mut body = Vec::new();
        let mut entries = 0usize;
        for y in 0..self.height as usize {
            let mut x = 0;
            while x < width {
                let transparent = self.is_transparent(y * width + x);
                let mut run = 1;
                while x + run < width
                    && run < max_run
                    && self.is_transparent(y * width + x + run) == transparent
                {
                    run += 1;
                }

                let count = if transparent { -(run as i32) } else { run as i32 };
                match self.depth {
                    8 => body.push(count as i8 as u8),
                    15 | 16 => body.extend_from_slice(&(count as i16).to_le_bytes()),
                    _ => body.extend_from_slice(&count.to_le_bytes()),
                }
                entries += 1;

                if !transparent {
                    for i in y * width + x..y * width + x + run {
                        match &self.pixels {
                            Pixels::Indexed(indices) => body.push(indices[i]),
                            Pixels::Rgba(colors) => put_pixel(&mut body, self.depth, colors[i]),
                        }
                    }
                    entries += run;
                }
                x += run;
            }

            match self.depth {
                8 => body.push(0),
                15 | 16 => body.extend_from_slice(&EOL_16.to_le_bytes()),
                _ => body.extend_from_slice(&EOL_32.to_le_bytes()),
            }
            entries += 1;
        }

        let header = RleHeader {
            depth: self.depth as i16,
            width: self.width,
            height: self.height,
            size: (entries * unit) as u32,
        };
        let mut out = header.to_bytes()?;
        out.extend(body);
        Ok(out)
    }

    pub fn decode_rle(data: &[u8]) -> Result<Self, Error> {
        let ((rest, _), header) = RleHeader::from_bytes((data, 0))?;
        let depth = header.depth as i32;
        if !is_valid_depth(depth) {
            return Err(Error::MalformedObject(
                Tag::RLE_SPRITE,
                format!("unknown colour depth {}", depth),
            ));
        }

        let mut bitmap = Bitmap::new(depth, header.width, header.height);
        let width = header.width as usize;
        let overrun =
            || Error::MalformedObject(Tag::RLE_SPRITE, "run extends past the end of a row".into());
        let mut cursor = Cursor { data: rest, pos: 0 };

        if depth == 8 {
            cursor = Cursor {
                data: cursor.take(header.size as usize)?,
                pos: 0,
            };
        }

        for y in 0..header.height as usize {
            let mut x = 0;
            loop {
                let count = match depth {
                    8 => cursor.take(1)?[0] as i8 as i32,
                    15 | 16 => {
                        let c = cursor.u16_le()?;
                        if c == EOL_16 {
                            break;
                        }
                        c as i16 as i32
                    }
                    _ => {
                        let c = cursor.u32_le()?;
                        if c == EOL_32 {
                            break;
                        }
                        c as i32
                    }
                };
                if depth == 8 && count == 0 {
                    break;
                }

                let run = count.unsigned_abs() as usize;
                if x + run > width {
                    return Err(overrun());
                }
                if count > 0 {
                    let start = y * width + x;
                    match &mut bitmap.pixels {
                        Pixels::Indexed(indices) => {
                            indices[start..start + run].copy_from_slice(cursor.take(run)?)
                        }
                        Pixels::Rgba(colors) => {
                            for color in &mut colors[start..start + run] {
                                *color = cursor.pixel(depth)?;
                            }
                        }
                    }
                }
                x += run;
            }
        }

        Ok(bitmap)
    }

    /// Copies the `w`x`h` area at (`x`, `y`) into a new bitmap. Parts that
    /// fall outside this bitmap are left as the mask colour.
    pub fn crop(&self, x: u32, y: u32, w: u16, h: u16) -> Bitmap {
        let mut out = Bitmap::new(self.depth, w, h);
        for dy in 0..h as usize {
            let sy = y as usize + dy;
            if sy >= self.height as usize {
                break;
            }
            for dx in 0..w as usize {
                let sx = x as usize + dx;
                if sx >= self.width as usize {
                    break;
                }
                let src = sy * self.width as usize + sx;
                let dst = dy * w as usize + dx;
                match (&mut out.pixels, &self.pixels) {
                    (Pixels::Indexed(d), Pixels::Indexed(s)) => d[dst] = s[src],
                    (Pixels::Rgba(d), Pixels::Rgba(s)) => d[dst] = s[src],
                    _ => {}
                }
            }
        }
        out
    }

    /// Converts to another colour depth. Reducing to 8 bits maps each pixel
    /// to its closest `palette` entry; expanding from 8 bits looks indices up
    /// in `palette`.
    pub fn convert(&self, depth: i32, palette: &Palette) -> Bitmap {
        if depth == self.depth {
            return self.clone();
        }
        let pixels = match (&self.pixels, depth) {
            (Pixels::Indexed(indices), 8) => Pixels::Indexed(indices.clone()),
            (Pixels::Indexed(indices), _) => Pixels::Rgba(
                indices
                    .iter()
                    .map(|&i| {
                        let [r, g, b] = palette.colors[i as usize].to_rgb8();
                        [r, g, b, 255]
                    })
                    .collect(),
            ),
            (Pixels::Rgba(colors), 8) => Pixels::Indexed(
                colors
                    .iter()
                    .map(|&[r, g, b, _]| palette.bestfit(r, g, b))
                    .collect(),
            ),
            (Pixels::Rgba(colors), -32) => Pixels::Rgba(colors.clone()),
            (Pixels::Rgba(colors), _) => {
                Pixels::Rgba(colors.iter().map(|&[r, g, b, _]| [r, g, b, 255]).collect())
            }
        };
        Bitmap {
            depth,
            width: self.width,
            height: self.height,
            pixels,
        }
    }
}

/// Reads an image file for one of the image types, applying the requested
/// depth and the crop region in the object's properties.
fn grab_image(request: &ImportRequest) -> Result<(Bitmap, Palette), Error> {
    let image = bmp::read(&std::fs::read(request.path)?)?;
    let mut bitmap = image.bitmap;

    if let Some(depth) = request.color_depth {
        if depth != bitmap.depth {
            debug!("converting {} from {} to {} bit", request.path.display(), bitmap.depth, depth);
            bitmap = bitmap.convert(depth, &image.palette);
        }
    }

    let x = request.properties.number(Tag::XPOS);
    let y = request.properties.number(Tag::YPOS);
    let w = request.properties.number(Tag::XSIZ);
    let h = request.properties.number(Tag::YSIZ);
    if x >= 0 && y >= 0 && w >= 0 && h >= 0 {
        bitmap = bitmap.crop(
            x as u32,
            y as u32,
            w.min(u16::MAX as i32) as u16,
            h.min(u16::MAX as i32) as u16,
        );
    }

    Ok((bitmap, image.palette))
}

fn describe_depth(depth: i32) -> String {
    if depth == -32 {
        "32 bit with alpha".to_string()
    } else {
        format!("{} bit", depth)
    }
}

const IMAGE_PROPERTIES: &[Tag] = &[Tag::XPOS, Tag::YPOS, Tag::XSIZ, Tag::YSIZ];

/// Codec for the types stored as plain bitmaps: `BMP `, and the two
/// compiled sprite types, which share the bitmap encoding on disk.
pub struct BitmapCodec {
    tag: Tag,
    name: &'static str,
    kind: &'static str,
}

impl BitmapCodec {
    pub fn bitmap() -> Self {
        BitmapCodec {
            tag: Tag::BITMAP,
            name: "Bitmap",
            kind: "bitmap",
        }
    }

    pub fn compiled_sprite() -> Self {
        BitmapCodec {
            tag: Tag::C_SPRITE,
            name: "Compiled sprite",
            kind: "compiled sprite",
        }
    }

    pub fn mode_x_sprite() -> Self {
        BitmapCodec {
            tag: Tag::XC_SPRITE,
            name: "Compiled X-sprite",
            kind: "mode-X compiled sprite",
        }
    }

    fn bitmap_of(&self, object: &DataObject) -> Result<Bitmap, Error> {
        let data = object
            .bytes()
            .ok_or_else(|| Error::MalformedObject(self.tag, "not a binary object".into()))?;
        Bitmap::decode(data)
    }
}

impl Codec for BitmapCodec {
    fn tag(&self) -> Tag {
        self.tag
    }

    fn name(&self) -> &str {
        self.name
    }

    fn construct(&self) -> Result<Body, Error> {
        Ok(Body::Binary(Bitmap::new(8, 32, 32).encode()?))
    }

    fn decode(&self, data: Vec<u8>) -> Result<Body, Error> {
        Bitmap::decode(&data)?;
        Ok(Body::Binary(data))
    }

    fn describe(&self, object: &DataObject) -> String {
        match self.bitmap_of(object) {
            Ok(b) => format!("{} ({}x{}, {})", self.kind, b.width, b.height, describe_depth(b.depth)),
            Err(_) => format!("{} (invalid)", self.kind),
        }
    }

    fn grab_extensions(&self) -> &[&'static str] {
        &["bmp"]
    }

    fn export_extensions(&self) -> &[&'static str] {
        &["bmp"]
    }

    fn property_tags(&self) -> &[Tag] {
        IMAGE_PROPERTIES
    }

    fn grab(&self, request: &ImportRequest, _session: &Session) -> Result<Option<Imported>, Error> {
        let (bitmap, palette) = grab_image(request)?;
        Ok(Some(Imported {
            body: Body::Binary(bitmap.encode()?),
            palette: Some(palette),
        }))
    }

    fn export(&self, object: &DataObject, path: &Path, session: &Session) -> Result<(), Error> {
        let bitmap = self.bitmap_of(object)?;
        std::fs::write(path, bmp::write(&bitmap, &session.palette)?)?;
        Ok(())
    }

    fn color_depth(&self, object: &DataObject) -> Option<i32> {
        self.bitmap_of(object).ok().map(|b| b.depth)
    }

    fn convert_depth(&self, body: Body, depth: i32, palette: &Palette) -> Result<Body, Error> {
        let data = match body {
            Body::Binary(data) => data,
            other => return Ok(other),
        };
        let bitmap = Bitmap::decode(&data)?.convert(depth, palette);
        Ok(Body::Binary(bitmap.encode()?))
    }
}

pub struct RleCodec;

impl RleCodec {
    fn sprite_of(object: &DataObject) -> Result<Bitmap, Error> {
        let data = object
            .bytes()
            .ok_or_else(|| Error::MalformedObject(Tag::RLE_SPRITE, "not a binary object".into()))?;
        Bitmap::decode_rle(data)
    }
}

impl Codec for RleCodec {
    fn tag(&self) -> Tag {
        Tag::RLE_SPRITE
    }

    fn name(&self) -> &str {
        "RLE sprite"
    }

    fn construct(&self) -> Result<Body, Error> {
        Ok(Body::Binary(Bitmap::new(8, 32, 32).encode_rle()?))
    }

    fn decode(&self, data: Vec<u8>) -> Result<Body, Error> {
        Bitmap::decode_rle(&data)?;
        Ok(Body::Binary(data))
    }

    fn describe(&self, object: &DataObject) -> String {
        match Self::sprite_of(object) {
            Ok(b) => format!("RLE sprite ({}x{}, {})", b.width, b.height, describe_depth(b.depth)),
            Err(_) => "RLE sprite (invalid)".to_string(),
        }
    }

    fn grab_extensions(&self) -> &[&'static str] {
        &["bmp"]
    }

    fn export_extensions(&self) -> &[&'static str] {
        &["bmp"]
    }

    fn property_tags(&self) -> &[Tag] {
        IMAGE_PROPERTIES
    }

    fn grab(&self, request: &ImportRequest, _session: &Session) -> Result<Option<Imported>, Error> {
        let (bitmap, palette) = grab_image(request)?;
        Ok(Some(Imported {
            body: Body::Binary(bitmap.encode_rle()?),
            palette: Some(palette),
        }))
    }

    fn export(&self, object: &DataObject, path: &Path, session: &Session) -> Result<(), Error> {
        let sprite = Self::sprite_of(object)?;
        std::fs::write(path, bmp::write(&sprite, &session.palette)?)?;
        Ok(())
    }

    fn color_depth(&self, object: &DataObject) -> Option<i32> {
        Self::sprite_of(object).ok().map(|b| b.depth)
    }

    fn convert_depth(&self, body: Body, depth: i32, palette: &Palette) -> Result<Body, Error> {
        let data = match body {
            Body::Binary(data) => data,
            other => return Ok(other),
        };
        let sprite = Bitmap::decode_rle(&data)?.convert(depth, palette);
        Ok(Body::Binary(sprite.encode_rle()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(depth: i32) -> Bitmap {
        let colors = vec![
            MAGENTA,
            [248, 252, 248, 255],
            [8, 4, 8, 255],
            MAGENTA,
            MAGENTA,
            [0, 0, 0, 255],
        ];
        Bitmap {
            depth,
            width: 3,
            height: 2,
            pixels: Pixels::Rgba(colors),
        }
    }

    #[test]
    fn test_bitmap_encoding_layout() {
        let bitmap = Bitmap {
            depth: 8,
            width: 2,
            height: 1,
            pixels: Pixels::Indexed(vec![5, 6]),
        };
        assert_eq!(bitmap.encode().unwrap(), vec![0, 8, 0, 2, 0, 1, 5, 6]);
        assert_eq!(Bitmap::decode(&bitmap.encode().unwrap()).unwrap(), bitmap);
    }

    #[test]
    fn test_hicolor_is_565() {
        let bitmap = sample(16);
        let data = bitmap.encode().unwrap();
        assert_eq!(&data[6..8], &0xF81Fu16.to_le_bytes());
        assert_eq!(Bitmap::decode(&data).unwrap().encode().unwrap(), data);
    }

    #[test]
    fn test_decode_rejects_short_body() {
        let data = [0, 24, 0, 2, 0, 2, 1, 2, 3];
        assert!(matches!(
            Bitmap::decode(&data),
            Err(Error::SizeMismatch { expected: 12, actual: 3 })
        ));
    }

    #[test]
    fn test_rle_8bit() {
        let bitmap = Bitmap {
            depth: 8,
            width: 4,
            height: 2,
            pixels: Pixels::Indexed(vec![0, 0, 7, 9, 3, 0, 0, 0]),
        };
        let data = bitmap.encode_rle().unwrap();
        assert_eq!(
            &data[10..],
            &[0xFE, 2, 7, 9, 0, 1, 3, 0xFD, 0]
        );
        assert_eq!(u32::from_be_bytes([data[6], data[7], data[8], data[9]]), 9);
        assert_eq!(Bitmap::decode_rle(&data).unwrap(), bitmap);
    }

    #[test]
    fn test_rle_truecolor() {
        for depth in [16, 24, 32] {
            let bitmap = sample(depth);
            let data = bitmap.encode_rle().unwrap();
            let decoded = Bitmap::decode_rle(&data).unwrap();
            assert_eq!(decoded.encode_rle().unwrap(), data);
            assert_eq!(decoded.width, 3);
        }
    }

    #[test]
    fn test_rle_row_overrun() {
        let mut data = RleHeader { depth: 8, width: 2, height: 1, size: 5 }.to_bytes().unwrap();
        data.extend_from_slice(&[3, 1, 1, 1, 0]);
        assert!(matches!(
            Bitmap::decode_rle(&data),
            Err(Error::MalformedObject(Tag::RLE_SPRITE, _))
        ));
    }

    #[test]
    fn test_crop_pads_with_mask() {
        let bitmap = Bitmap {
            depth: 8,
            width: 2,
            height: 2,
            pixels: Pixels::Indexed(vec![1, 2, 3, 4]),
        };
        let cropped = bitmap.crop(1, 1, 2, 2);
        assert_eq!(cropped.pixels, Pixels::Indexed(vec![4, 0, 0, 0]));
    }

    #[test]
    fn test_convert_to_8bit_uses_palette() {
        let mut palette = Palette::generate_332();
        palette.colors[0] = crate::codec::palette::Rgb::MASK;
        let reduced = sample(24).convert(8, &palette);
        let Pixels::Indexed(indices) = &reduced.pixels else {
            panic!("expected indexed pixels");
        };
        assert_eq!(indices[0], 0);
        assert_eq!(indices[5], palette.bestfit(0, 0, 0));
        assert_eq!(reduced.depth, 8);
    }
}
