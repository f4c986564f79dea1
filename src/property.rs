use crate::tag::Tag;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub tag: Tag,
    pub value: String,
}

/// Tag-keyed string metadata attached to an object. At most one entry per
/// tag; entries keep insertion order until `sort` is called.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: Vec<Property>,
}

impl Properties {
    pub fn new() -> Self {
        Properties::default()
    }

    /// Returns the value for `tag`, or `""` if it isn't set.
    pub fn get(&self, tag: Tag) -> &str {
        self.entries
            .iter()
            .find(|p| p.tag == tag)
            .map(|p| p.value.as_str())
            .unwrap_or("")
    }

    /// Parses a leading decimal integer the way `atoi` does. Absent or
    /// unparsable properties read as -1.
    pub fn number(&self, tag: Tag) -> i32 {
        parse_leading_int(self.get(tag)).unwrap_or(-1)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.entries.iter().any(|p| p.tag == tag)
    }

    /// Sets `tag` to `value`, replacing any existing entry in place. An
    /// empty value removes the entry.
    pub fn set(&mut self, tag: Tag, value: &str) {
        let existing = self.entries.iter().position(|p| p.tag == tag);
        match (existing, value.is_empty()) {
            (Some(index), true) => {
                self.entries.remove(index);
            }
            (Some(index), false) => self.entries[index].value = value.to_string(),
            (None, true) => {}
            (None, false) => self.entries.push(Property {
                tag,
                value: value.to_string(),
            }),
        }
    }

    pub fn remove(&mut self, tag: Tag) {
        self.set(tag, "");
    }

    pub fn sort(&mut self) {
        self.entries.sort_by_key(|p| p.tag);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copies every entry of `other` over this list.
    pub fn merge(&mut self, other: &Properties) {
        for prop in other.iter() {
            self.set(prop.tag, &prop.value);
        }
    }
}

pub(crate) fn parse_leading_int(s: &str) -> Option<i32> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let len = digits.bytes().take_while(u8::is_ascii_digit).count();
    if len == 0 {
        return None;
    }
    let mut value: i32 = 0;
    for c in digits[..len].bytes() {
        value = value.wrapping_mul(10).wrapping_add((c - b'0') as i32);
    }
    Some(if negative { value.wrapping_neg() } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let mut props = Properties::new();
        props.set(Tag::NAME, "X");
        assert_eq!(props.get(Tag::NAME), "X");
        props.set(Tag::NAME, "");
        assert_eq!(props.get(Tag::NAME), "");
        assert!(!props.contains(Tag::NAME));
        assert!(props.is_empty());
    }

    #[test]
    fn test_set_is_unique_per_tag() {
        let mut props = Properties::new();
        props.set(Tag::ORIG, "a.bmp");
        props.set(Tag::NAME, "A");
        props.set(Tag::ORIG, "b.bmp");
        props.set(Tag::NAME, "B");
        assert_eq!(props.len(), 2);
        let tags: Vec<Tag> = props.iter().map(|p| p.tag).collect();
        assert_eq!(tags, vec![Tag::ORIG, Tag::NAME]);
        assert_eq!(props.get(Tag::ORIG), "b.bmp");
    }

    #[test]
    fn test_sort_by_tag() {
        let mut props = Properties::new();
        props.set(Tag::YPOS, "1");
        props.set(Tag::DATE, "1-01-2000, 0:00");
        props.set(Tag::NAME, "N");
        props.sort();
        let tags: Vec<Tag> = props.iter().map(|p| p.tag).collect();
        assert_eq!(tags, vec![Tag::DATE, Tag::NAME, Tag::YPOS]);
    }

    #[test]
    fn test_number() {
        let mut props = Properties::new();
        assert_eq!(props.number(Tag::XPOS), -1);
        props.set(Tag::XPOS, "42");
        props.set(Tag::YPOS, "12px");
        props.set(Tag::XSIZ, "junk");
        assert_eq!(props.number(Tag::XPOS), 42);
        assert_eq!(props.number(Tag::YPOS), 12);
        assert_eq!(props.number(Tag::XSIZ), -1);
    }
}
