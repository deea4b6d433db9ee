use std::borrow::Cow;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

/// Return the contents of `text` if it names a `.sql` file, else `text` itself.
pub fn resolve_sql(text: &str) -> Result<Cow<'_, str>> {
    let trimmed = text.trim();
    let path = Path::new(trimmed);

    if !trimmed.ends_with(".sql") || !path.is_file() {
        return Ok(Cow::Borrowed(text));
    }

    debug!(path = %path.display(), "reading SQL from file");
    fs::read_to_string(path)
        .map(Cow::Owned)
        .map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
}
