//! The page served by the `solo` binary.
//!
//! An `index.html` template whose first `{}` is replaced by how many times the
//! page has been rendered before. The counter lives in the [`IndexPage`] the
//! handler owns; nothing is process-global.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

const PLACEHOLDER: &str = "{}";

/// Errors loading the page template.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A template plus its render counter.
///
/// # Examples
///
/// ```
/// use solo::page::IndexPage;
///
/// let page = IndexPage::from_template("<p>visit #{}</p>");
/// assert_eq!(page.render(), "<p>visit #0</p>");
/// assert_eq!(page.render(), "<p>visit #1</p>");
/// ```
#[derive(Debug)]
pub struct IndexPage {
    template: String,
    hits: AtomicU64,
}

impl IndexPage {
    /// Reads `index.html` from `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::Read`] if the file cannot be read as UTF-8.
    pub fn load(dir: &Path) -> Result<Self, PageError> {
        let path = dir.join("index.html");
        let template = std::fs::read_to_string(&path).map_err(|source| PageError::Read {
            path: path.clone(),
            source,
        })?;
        Ok(Self::from_template(template))
    }

    /// Wraps an in-memory template.
    pub fn from_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            hits: AtomicU64::new(0),
        }
    }

    /// Returns the template with its first placeholder replaced by the
    /// counter, then advances the counter.
    ///
    /// A template without a placeholder is returned as is and leaves the
    /// counter alone.
    pub fn render(&self) -> String {
        if !self.template.contains(PLACEHOLDER) {
            return self.template.clone();
        }
        let count = self.hits.fetch_add(1, Ordering::SeqCst);
        self.template.replacen(PLACEHOLDER, &count.to_string(), 1)
    }

    /// Returns how many times a placeholder has been filled.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_first_placeholder_is_replaced() {
        let page = IndexPage::from_template("{} and {}");
        assert_eq!(page.render(), "0 and {}");
        assert_eq!(page.hits(), 1);
    }

    #[test]
    fn no_placeholder_no_count() {
        let page = IndexPage::from_template("static");
        assert_eq!(page.render(), "static");
        assert_eq!(page.render(), "static");
        assert_eq!(page.hits(), 0);
    }

    #[test]
    fn load_reads_index_html() {
        let dir = std::env::temp_dir().join(format!("solo-page-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.html"), "<h1>{}</h1>").unwrap();

        let page = IndexPage::load(&dir).unwrap();
        assert_eq!(page.render(), "<h1>0</h1>");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn load_missing_file() {
        let dir = Path::new("/nonexistent/solo");
        assert!(matches!(IndexPage::load(dir), Err(PageError::Read { .. })));
    }
}
