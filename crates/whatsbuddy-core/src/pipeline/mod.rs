//! Enumerate, read and save status media through a content resolver

mod enumerator;
mod reader;
mod save;

pub use enumerator::MediaEnumerator;
pub use reader::ContentReader;
pub use save::SavePipeline;
