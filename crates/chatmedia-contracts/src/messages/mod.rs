mod fragment;
mod part;

pub use fragment::{fragments_from_chunk, Fragment};
pub use part::{InlineImage, Message, Part, PartContent, Role};
