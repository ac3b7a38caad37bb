//! Retrieval options

use serde::{Deserialize, Serialize};

/// Options for search queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Passages retrieved when the question is about one book
    pub book_limit: usize,

    /// Passages retrieved when the question spans the whole library
    pub library_limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            book_limit: 5,
            library_limit: 10,
        }
    }
}

impl SearchOptions {
    /// Passages to retrieve for a question scoped to `book`, or to the library
    pub fn limit_for(&self, book: Option<&str>) -> usize {
        match book {
            Some(_) => self.book_limit,
            None => self.library_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_options_default() {
        let options = SearchOptions::default();

        assert_eq!(options.limit_for(Some("book_1")), 5);
        assert_eq!(options.limit_for(None), 10);
    }

    #[test]
    fn test_search_options_partial_json() {
        let options: SearchOptions = serde_json::from_str(r#"{"book_limit": 3}"#).unwrap();
        assert_eq!(options.book_limit, 3);
        assert_eq!(options.library_limit, 10);
    }
}
