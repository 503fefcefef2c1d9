use std::io::Read;
use std::path::Path;

const BINARY_SNIFF_BYTES: usize = 1024;

fn is_binary_file(path: &Path) -> std::io::Result<bool> {
    let mut f = std::fs::File::open(path)?;
    let mut buf = [0u8; BINARY_SNIFF_BYTES];
    let read = f.read(&mut buf)?;
    Ok(buf[..read].contains(&0))
}

/// Read a file as UTF-8 text. Binary or non-UTF-8 files yield `None`.
pub fn read_text_file(path: &Path) -> std::io::Result<Option<String>> {
    if is_binary_file(path)? {
        return Ok(None);
    }

    match std::fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => Ok(None),
        Err(e) => Err(e),
    }
}

/// Corpus key for `path`: relative to `root`, `/`-separated.
///
/// Paths outside `root` keep their full lossy form.
pub fn corpus_key(root: &Path, path: &Path) -> String {
    let Ok(rel) = path.strip_prefix(root) else {
        return path.to_string_lossy().into_owned();
    };
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
