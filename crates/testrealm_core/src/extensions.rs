//! Stubbed import extension registry.
//!
//! Test code running in a client-like realm routinely imports files that are not executable: style
//! sheets and static assets a bundler would normally handle. This module centralizes which extensions
//! are stubbed and what kind of stub each one gets.
//!
//! ## Notes
//! - Spellings are stored **without** the leading dot; use [`dotted`] to build table keys.
//! - `jpe?g` and `woff2?` from the bundler's pattern list are expanded into their concrete spellings.

/// How an intercepted import is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StubKind {
    /// The module's value becomes the empty string.
    Style,
    /// The module's value becomes the asset's resolved URL/path.
    Asset,
}

impl StubKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StubKind::Style => "style",
            StubKind::Asset => "asset",
        }
    }
}

/// Style-like extensions that cannot be processed inside the realm.
pub const STYLE_TYPES: &[&str] = &["css", "scss", "sass", "less"];

/// Static asset types a bundler resolves to a URL.
pub const KNOWN_ASSET_TYPES: &[&str] = &[
    // images
    "apng", "png", "jpg", "jpeg", "jfif", "pjpeg", "pjp", "gif", "svg", "ico", "webp", "avif",
    // media
    "mp4", "webm", "ogg", "mp3", "wav", "flac", "aac",
    // fonts
    "woff", "woff2", "eot", "ttf", "otf",
    // other
    "webmanifest", "pdf", "txt",
];

/// Build the interception-table key for an extension spelling (`"css"` → `".css"`).
pub fn dotted(ty: &str) -> String {
    format!(".{ty}")
}

/// Classify an extension spelling (leading dot optional). Matching is case-sensitive, like module
/// loaders' extension tables.
///
/// ## Returns
/// - `Some(kind)` when the extension is part of either registry, otherwise `None`.
pub fn kind_of(ty: &str) -> Option<StubKind> {
    let ty = ty.trim_start_matches('.');
    if STYLE_TYPES.contains(&ty) {
        Some(StubKind::Style)
    } else if KNOWN_ASSET_TYPES.contains(&ty) {
        Some(StubKind::Asset)
    } else {
        None
    }
}

/// Extract the dotted extension of an import id, case preserved.
///
/// Query strings and fragments (`?inline`, `#hash`) are ignored, as is anything before the last path
/// separator. Dotfiles without a further extension (`.env`) have no extension.
pub fn extension_of(id: &str) -> Option<String> {
    let id = id.split(['?', '#']).next().unwrap_or(id);
    let file = id.rsplit(['/', '\\']).next().unwrap_or(id);
    let dot = file.rfind('.')?;
    if dot == 0 || dot + 1 == file.len() {
        return None;
    }
    Some(file[dot..].to_string())
}
