use std::fmt;
use std::str::FromStr;

/// Four ASCII characters packed big-endian into a `u32`. Used both for
/// object types and for property keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub u32);

macro_rules! tags {
    ($($name:ident = $id:literal;)*) => {
        impl Tag {
            $(pub const $name: Tag = Tag::new(*$id);)*
        }
    }
}

tags! {
    MAGIC = b"ALL.";
    FILE = b"FILE";
    DATA = b"DATA";
    FONT = b"FONT";
    SAMPLE = b"SAMP";
    MIDI = b"MIDI";
    PATCH = b"PAT ";
    FLI = b"FLIC";
    BITMAP = b"BMP ";
    RLE_SPRITE = b"RLE ";
    C_SPRITE = b"CMP ";
    XC_SPRITE = b"XCMP";
    PALETTE = b"PAL ";
    PROPERTY = b"prop";
    INFO = b"info";

    NAME = b"NAME";
    ORIG = b"ORIG";
    DATE = b"DATE";
    XPOS = b"XPOS";
    YPOS = b"YPOS";
    XSIZ = b"XSIZ";
    YSIZ = b"YSIZ";
    XCRP = b"XCRP";
    YCRP = b"YCRP";
    PACK = b"PACK";
    HNAM = b"HNAM";
    HPRE = b"HPRE";
    BACK = b"BACK";
    XGRD = b"XGRD";
    YGRD = b"YGRD";
    SORT = b"SORT";
    RELF = b"RELF";
}

impl Tag {
    /// End-of-list marker. Never a valid object type.
    pub const END: Tag = Tag(0xFFFF_FFFF);

    pub const fn new(id: [u8; 4]) -> Self {
        Tag(u32::from_be_bytes(id))
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Uppercases a user-typed type name and pads it with spaces to four
    /// characters, so `bmp` becomes `BMP `.
    pub fn clean(name: &str) -> Self {
        let mut id = [b' '; 4];
        for (slot, c) in id.iter_mut().zip(name.bytes()) {
            *slot = c.to_ascii_uppercase();
        }
        Tag::new(id)
    }

    /// The tag characters up to the first one that isn't alphanumeric.
    pub fn alphanumeric_prefix(self) -> String {
        self.to_bytes()
            .iter()
            .take_while(|c| c.is_ascii_alphanumeric())
            .map(|&c| c as char)
            .collect()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.to_bytes() {
            write!(f, "{}", c as char)?;
        }
        Ok(())
    }
}

impl FromStr for Tag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 4 || !s.is_ascii() {
            return Err(format!("type names are 1 to 4 ASCII characters, got {:?}", s));
        }
        Ok(Tag::clean(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_packing() {
        assert_eq!(Tag::MAGIC.0, 0x414C4C2E);
        assert_eq!(Tag::BITMAP.to_bytes(), *b"BMP ");
        assert_eq!(Tag::BITMAP.to_string(), "BMP ");
    }

    #[test]
    fn test_clean() {
        assert_eq!(Tag::clean("bmp"), Tag::BITMAP);
        assert_eq!(Tag::clean("file"), Tag::FILE);
        assert_eq!(Tag::clean("xcmpx"), Tag::XC_SPRITE);
        assert_eq!("pal".parse::<Tag>(), Ok(Tag::PALETTE));
        assert!("".parse::<Tag>().is_err());
    }

    #[test]
    fn test_alphanumeric_prefix() {
        assert_eq!(Tag::BITMAP.alphanumeric_prefix(), "BMP");
        assert_eq!(Tag::DATA.alphanumeric_prefix(), "DATA");
        assert_eq!(Tag::PATCH.alphanumeric_prefix(), "PAT");
    }
}
