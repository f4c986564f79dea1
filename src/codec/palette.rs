use std::path::Path;

use crate::{
    codec::{bitmap::{Bitmap, Pixels}, bmp, Codec, ImportRequest, Imported},
    datafile::Session,
    error::Error,
    object::{Body, DataObject},
    tag::Tag,
};

pub const PALETTE_SIZE: usize = 256;
const ENCODED_SIZE: usize = PALETTE_SIZE * 3;

/// A palette entry with 6-bit components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const MASK: Rgb = Rgb { r: 63, g: 0, b: 63 };

    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Rgb {
            r: r >> 2,
            g: g >> 2,
            b: b >> 2,
        }
    }

    pub fn to_rgb8(self) -> [u8; 3] {
        [scale6(self.r), scale6(self.g), scale6(self.b)]
    }
}

fn scale6(v: u8) -> u8 {
    (v << 2) | (v >> 4)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    pub colors: [Rgb; PALETTE_SIZE],
}

impl Default for Palette {
    fn default() -> Self {
        Palette::generate_332()
    }
}

impl Palette {
    /// The 3-3-2 palette used for truecolor images, which carry no palette
    /// of their own.
    pub fn generate_332() -> Self {
        let mut colors = [Rgb::default(); PALETTE_SIZE];
        for (i, color) in colors.iter_mut().enumerate() {
            *color = Rgb {
                r: (((i >> 5) & 7) * 63 / 7) as u8,
                g: (((i >> 2) & 7) * 63 / 7) as u8,
                b: ((i & 3) * 63 / 3) as u8,
            };
        }
        Palette { colors }
    }

    /// Parses the archive encoding: 256 entries of 8-bit R, G, B.
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        if data.len() != ENCODED_SIZE {
            return Err(Error::MalformedObject(
                Tag::PALETTE,
                format!("expected {} bytes, got {}", ENCODED_SIZE, data.len()),
            ));
        }
        let mut colors = [Rgb::default(); PALETTE_SIZE];
        for (color, rgb) in colors.iter_mut().zip(data.chunks_exact(3)) {
            *color = Rgb::from_rgb8(rgb[0], rgb[1], rgb[2]);
        }
        Ok(Palette { colors })
    }

    pub fn encode(&self) -> Vec<u8> {
        self.colors.iter().flat_map(|c| c.to_rgb8()).collect()
    }

    /// Index of the closest entry to an 8-bit colour. Ties go to the lowest
    /// index.
    pub fn bestfit(&self, r: u8, g: u8, b: u8) -> u8 {
        let target = Rgb::from_rgb8(r, g, b);
        let mut best = 0;
        let mut best_distance = i32::MAX;
        for (i, color) in self.colors.iter().enumerate() {
            let dr = color.r as i32 - target.r as i32;
            let dg = color.g as i32 - target.g as i32;
            let db = color.b as i32 - target.b as i32;
            let distance = dr * dr + dg * dg + db * db;
            if distance < best_distance {
                best = i;
                best_distance = distance;
                if distance == 0 {
                    break;
                }
            }
        }
        best as u8
    }
}

pub struct PaletteCodec;

impl Codec for PaletteCodec {
    fn tag(&self) -> Tag {
        Tag::PALETTE
    }

    fn name(&self) -> &str {
        "Palette"
    }

    fn construct(&self) -> Result<Body, Error> {
        Ok(Body::Binary(Palette::default().encode()))
    }

    fn decode(&self, data: Vec<u8>) -> Result<Body, Error> {
        Palette::decode(&data)?;
        Ok(Body::Binary(data))
    }

    fn describe(&self, _object: &DataObject) -> String {
        "palette (256 colors)".to_string()
    }

    fn grab_extensions(&self) -> &[&'static str] {
        &["bmp"]
    }

    fn export_extensions(&self) -> &[&'static str] {
        &["bmp"]
    }

    fn grab(&self, request: &ImportRequest, _session: &Session) -> Result<Option<Imported>, Error> {
        let image = bmp::read(&std::fs::read(request.path)?)?;
        Ok(Some(Imported {
            body: Body::Binary(image.palette.encode()),
            palette: Some(image.palette),
        }))
    }

    /// Writes the palette as a 32x8 swatch image, one pixel per entry.
    fn export(&self, object: &DataObject, path: &Path, _session: &Session) -> Result<(), Error> {
        let data = object
            .bytes()
            .ok_or_else(|| Error::MalformedObject(Tag::PALETTE, "not a binary object".into()))?;
        let palette = Palette::decode(data)?;
        let swatch = Bitmap {
            depth: 8,
            width: 32,
            height: 8,
            pixels: Pixels::Indexed((0..=255).collect()),
        };
        std::fs::write(path, bmp::write(&swatch, &palette)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let palette = Palette::generate_332();
        let data = palette.encode();
        assert_eq!(data.len(), 768);
        assert_eq!(Palette::decode(&data).unwrap(), palette);
    }

    #[test]
    fn test_decode_rejects_wrong_size() {
        assert!(matches!(
            Palette::decode(&[0; 10]),
            Err(Error::MalformedObject(Tag::PALETTE, _))
        ));
    }

    #[test]
    fn test_bestfit() {
        let mut palette = Palette::generate_332();
        palette.colors[0] = Rgb::MASK;
        assert_eq!(palette.bestfit(255, 0, 255), 0);
        assert_eq!(palette.bestfit(255, 255, 255), 255);
    }

    #[test]
    fn test_scale() {
        assert_eq!(Rgb { r: 63, g: 0, b: 32 }.to_rgb8(), [255, 0, 130]);
        assert_eq!(Rgb::from_rgb8(255, 0, 130), Rgb { r: 63, g: 0, b: 32 });
    }
}
