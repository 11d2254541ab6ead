// src/fetch/urls.rs
use url::Url;

use crate::config::INDEX_PLACEHOLDER;

/// Maps a page index onto the feed URL. The index is opaque: it counts
/// published trading days, so it cannot be derived from a calendar date.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageUrls {
    template: String,
}

impl PageUrls {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn page(&self, index: u64) -> Result<Url, url::ParseError> {
        Url::parse(&self.template.replace(INDEX_PLACEHOLDER, &index.to_string()))
    }
}
