//! Pure media helpers: eligibility filtering and output naming

pub mod filter;
pub mod naming;

pub use filter::{is_eligible, MEDIA_EXTENSIONS};
pub use naming::{generate_name, NamingGenerator, DEFAULT_NAME_PREFIX};
