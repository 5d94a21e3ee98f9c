//! Language Inference
//!
//! Fixed extension table used to tag imported files and to pick an
//! extension when exporting nodes that have no file yet.

use std::path::Path;

/// Language assigned to unmapped extensions
pub const DEFAULT_LANGUAGE: &str = "text";

const EXTENSIONS: &[(&str, &str)] = &[
    ("js", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("py", "python"),
    ("go", "go"),
    ("rs", "rust"),
    ("java", "java"),
    ("md", "markdown"),
    ("sh", "shell"),
    ("bash", "shell"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("json", "json"),
    ("css", "css"),
    ("html", "html"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "cpp"),
    ("hpp", "cpp"),
    ("rb", "ruby"),
    ("toml", "toml"),
    ("sql", "sql"),
    ("txt", "text"),
];

/// Language for a file path, by extension (case-insensitive)
pub fn detect_language(path: &str) -> &'static str {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .and_then(|ext| {
            EXTENSIONS
                .iter()
                .find(|(known, _)| *known == ext)
                .map(|(_, language)| *language)
        })
        .unwrap_or(DEFAULT_LANGUAGE)
}

/// Preferred extension for a language: the first table entry naming it
pub fn extension_for(language: &str) -> Option<&'static str> {
    EXTENSIONS
        .iter()
        .find(|(_, known)| *known == language)
        .map(|(ext, _)| *ext)
}

/// Content that is not valid UTF-8 is binary
pub fn decode_text(bytes: Vec<u8>) -> Option<String> {
    String::from_utf8(bytes).ok()
}
