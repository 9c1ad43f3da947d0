//! Content resolver seam and its filesystem implementation

mod local;
mod traits;

pub use local::LocalResolver;
pub use traits::{ByteReader, ByteWriter, ContentResolver};

#[cfg(test)]
pub use traits::MockContentResolver;
