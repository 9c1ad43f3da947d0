//! Output file naming

use chrono::NaiveDateTime;

/// Prefix used when no other is configured
pub const DEFAULT_NAME_PREFIX: &str = "whatsapp_status_";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const FALLBACK_EXTENSION: &str = "jpg";
const VIDEO_EXTENSION: &str = "mp4";
const MAX_EXTENSION_LEN: usize = 4;

/// Builds output names of the form `<prefix><yyyyMMdd_HHmmss>.<ext>`
#[derive(Debug, Clone)]
pub struct NamingGenerator {
    prefix: String,
}

impl Default for NamingGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_NAME_PREFIX)
    }
}

impl NamingGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn generate(&self, original_name: &str, mime_type: &str, now: NaiveDateTime) -> String {
        format!(
            "{}{}.{}",
            self.prefix,
            now.format(TIMESTAMP_FORMAT),
            extension_for(original_name, mime_type)
        )
    }

    /// Variant of `name` carrying a numeric suffix before the extension
    pub fn disambiguate(name: &str, attempt: u32) -> String {
        if attempt == 0 {
            return name.to_string();
        }
        match name.rsplit_once('.') {
            Some((stem, ext)) => format!("{}_{}.{}", stem, attempt, ext),
            None => format!("{}_{}", name, attempt),
        }
    }
}

/// Name for `original_name` with the default prefix
pub fn generate_name(original_name: &str, mime_type: &str, now: NaiveDateTime) -> String {
    NamingGenerator::default().generate(original_name, mime_type, now)
}

fn extension_for(original_name: &str, mime_type: &str) -> String {
    if mime_type.starts_with("video/") {
        return VIDEO_EXTENSION.to_string();
    }

    if mime_type.starts_with("image/") {
        return match original_name.rsplit_once('.') {
            // Long suffixes are not real extensions
            Some((_, ext)) if !ext.is_empty() && ext.chars().count() <= MAX_EXTENSION_LEN => {
                ext.to_string()
            }
            _ => FALLBACK_EXTENSION.to_string(),
        };
    }

    FALLBACK_EXTENSION.to_string()
}
