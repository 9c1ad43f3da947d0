//! Eligibility filter for status media

/// Extensions accepted as status media, lowercase
pub const MEDIA_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "webp", "mp4", "mov", "avi", "webm"];

/// Returns true when `name` looks like a visible image or video file.
///
/// Hidden names (leading `.`, including `.nomedia`) are rejected; otherwise the
/// text after the last `.` is compared case-insensitively against
/// [`MEDIA_EXTENSIONS`].
pub fn is_eligible(name: &str) -> bool {
    if name.eq_ignore_ascii_case(".nomedia") || name.starts_with('.') {
        return false;
    }

    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    MEDIA_EXTENSIONS.contains(&ext.as_str())
}
