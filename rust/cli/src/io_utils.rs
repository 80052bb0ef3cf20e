//! File helpers for match record files.
//!
//! Record files are JSONL, optionally Zstandard-compressed (`.jsonl.zst`). Errors are
//! returned as `String` so commands can print them directly.

use std::io::Write;
use std::path::Path;

/// Read a text file, decompressing it first when the path ends with ".zst".
///
/// A leading UTF-8 BOM is removed.
///
/// ```rust,no_run
/// # use mextrain_cli::io_utils::read_text_auto;
/// let plain = read_text_auto("data/matches.jsonl").unwrap();
/// let packed = read_text_auto("data/matches.jsonl.zst").unwrap();
/// ```
pub fn read_text_auto(path: &str) -> Result<String, String> {
    let mut content = if path.ends_with(".zst") {
        let comp = std::fs::read(path).map_err(|e| e.to_string())?;
        let dec = zstd::bulk::decompress(&comp, 64 * 1024 * 1024).map_err(|e| e.to_string())?;
        String::from_utf8(dec).map_err(|e| e.to_string())?
    } else {
        std::fs::read_to_string(path).map_err(|e| e.to_string())?
    };
    strip_utf8_bom(&mut content);
    Ok(content)
}

/// Write `content` to `path`, compressing it when the path ends with ".zst".
pub fn write_text_auto(path: &str, content: &str) -> Result<(), String> {
    ensure_parent_dir(Path::new(path))?;
    if path.ends_with(".zst") {
        let packed = zstd::bulk::compress(content.as_bytes(), 3).map_err(|e| e.to_string())?;
        std::fs::write(path, packed).map_err(|e| e.to_string())
    } else {
        let mut file = std::fs::File::create(path).map_err(|e| e.to_string())?;
        file.write_all(content.as_bytes()).map_err(|e| e.to_string())
    }
}

/// Ensure parent directory exists for given path, creating if needed.
pub fn ensure_parent_dir(path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create directory {}: {}", parent.display(), e))?;
    }
    Ok(())
}

fn strip_utf8_bom(s: &mut String) {
    const UTF8_BOM: &str = "\u{feff}";
    if s.starts_with(UTF8_BOM) {
        s.drain(..UTF8_BOM.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_strip_utf8_bom() {
        let mut s = "\u{feff}hello".to_string();
        strip_utf8_bom(&mut s);
        assert_eq!(s, "hello");
    }

    #[test]
    fn test_strip_utf8_bom_no_bom() {
        let mut s = "hello".to_string();
        strip_utf8_bom(&mut s);
        assert_eq!(s, "hello");
    }

    #[test]
    fn test_ensure_parent_dir_creates_directory() {
        let temp_dir = tempdir().unwrap();
        let nested_path = temp_dir.path().join("subdir").join("file.txt");

        let result = ensure_parent_dir(&nested_path);
        assert!(result.is_ok());
        assert!(temp_dir.path().join("subdir").exists());
    }

    #[test]
    fn test_compressed_text_round_trips() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("out").join("records.jsonl.zst");
        let path = path.to_str().unwrap();

        write_text_auto(path, "{\"a\":1}\n{\"a\":2}\n").unwrap();
        assert_ne!(std::fs::read(path).unwrap(), b"{\"a\":1}\n{\"a\":2}\n");
        assert_eq!(read_text_auto(path).unwrap(), "{\"a\":1}\n{\"a\":2}\n");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(read_text_auto("definitely/not/here.jsonl").is_err());
    }
}
