pub mod codec;
pub mod datafile;
pub mod depend;
pub mod error;
pub mod grab;
pub mod header;
pub mod object;
pub mod packfile;
pub mod property;
pub mod select;
pub mod tag;
pub mod timestamp;
pub mod update;
pub mod util;

pub use codec::{Codec, CodecRegistry};
pub use datafile::{load, save, SaveOptions, Session};
pub use error::Error;
pub use object::{Archive, Body, DataObject};
pub use property::Properties;
pub use tag::Tag;
