use std::cmp::Ordering;

use crate::property::Properties;
use crate::tag::Tag;

/// The payload of an object. Leaf objects hold their archive encoding as
/// raw bytes; `FILE` objects own a nested archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Binary(Vec<u8>),
    Archive(Archive),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataObject {
    pub tag: Tag,
    pub body: Body,
    pub properties: Properties,
}

impl DataObject {
    pub fn new(tag: Tag, body: Body) -> Self {
        DataObject {
            tag,
            body,
            properties: Properties::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.properties.get(Tag::NAME)
    }

    pub fn property(&self, tag: Tag) -> &str {
        self.properties.get(tag)
    }

    pub fn set_property(&mut self, tag: Tag, value: &str) {
        self.properties.set(tag, value);
    }

    /// Stored byte length. Nested archives report 0.
    pub fn size(&self) -> usize {
        match &self.body {
            Body::Binary(data) => data.len(),
            Body::Archive(_) => 0,
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Binary(data) => Some(data),
            Body::Archive(_) => None,
        }
    }

    pub fn archive(&self) -> Option<&Archive> {
        match &self.body {
            Body::Archive(archive) => Some(archive),
            Body::Binary(_) => None,
        }
    }

    pub fn archive_mut(&mut self) -> Option<&mut Archive> {
        match &mut self.body {
            Body::Archive(archive) => Some(archive),
            Body::Binary(_) => None,
        }
    }
}

/// An ordered sequence of objects. The top level of a datafile and every
/// nested `FILE` object are archives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    pub objects: Vec<DataObject>,
}

impl Archive {
    pub fn new() -> Self {
        Archive::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataObject> {
        self.objects.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DataObject> {
        self.objects.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&DataObject> {
        self.objects.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut DataObject> {
        self.objects.get_mut(index)
    }

    /// Appends a new object named `name` and returns it.
    pub fn insert(&mut self, name: &str, tag: Tag, body: Body) -> &mut DataObject {
        let mut object = DataObject::new(tag, body);
        object.set_property(Tag::NAME, name);
        self.push(object)
    }

    pub fn push(&mut self, object: DataObject) -> &mut DataObject {
        self.objects.push(object);
        let last = self.objects.len() - 1;
        &mut self.objects[last]
    }

    /// Removes the object at `index`, shifting later objects down.
    pub fn delete(&mut self, index: usize) -> DataObject {
        self.objects.remove(index)
    }

    pub fn swap(&mut self, a: usize, b: usize) {
        self.objects.swap(a, b);
    }

    /// Case-insensitive name lookup at this level only.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.objects
            .iter()
            .position(|o| o.name().eq_ignore_ascii_case(name))
    }

    /// Resolves a `parent/child` path through nested archives.
    pub fn find(&self, path: &str) -> Option<&DataObject> {
        let (head, rest) = match path.split_once('/') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let object = &self.objects[self.position(head)?];
        match rest {
            None => Some(object),
            Some(rest) => object.archive()?.find(rest),
        }
    }

    /// Stable, case-insensitive sort by name, applied to every nested
    /// archive independently.
    pub fn sort(&mut self) {
        self.objects.sort_by(|a, b| compare_names(a.name(), b.name()));
        for object in &mut self.objects {
            if let Some(nested) = object.archive_mut() {
                nested.sort();
            }
        }
    }

    pub fn sort_properties(&mut self) {
        for object in &mut self.objects {
            object.properties.sort();
            if let Some(nested) = object.archive_mut() {
                nested.sort_properties();
            }
        }
    }

    /// Gives every unnamed object a `NNN_TYPE` name. The counter runs
    /// depth-first through nested archives and is returned for chaining.
    pub fn generate_names(&mut self, mut counter: usize) -> usize {
        for object in &mut self.objects {
            if object.name().is_empty() {
                let name = format!("{:03}_{}", counter, object.tag.alphanumeric_prefix());
                counter += 1;
                object.set_property(Tag::NAME, &name);
            }
            if let Some(nested) = object.archive_mut() {
                counter = nested.generate_names(counter);
            }
        }
        counter
    }
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}
