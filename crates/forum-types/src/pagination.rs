use serde::Serialize;
use thiserror::Error;

/// One window of a keyset-paginated listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_next_page: bool,
}

impl<T> Page<T> {
    /// Build a page from a `limit + 1` fetch: anything past `limit` only
    /// signals that another page exists.
    pub fn from_overfetch(mut items: Vec<T>, limit: usize) -> Self {
        let has_next_page = items.len() > limit;
        items.truncate(limit);
        Self {
            items,
            has_next_page,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            has_next_page: self.has_next_page,
        }
    }
}

/// Number of rows an engine should ask its backend for.
pub fn fetch_count(limit: usize) -> usize {
    limit.saturating_add(1)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("after is not a number: {0:?}")]
    Malformed(String),
    #[error("after must not be negative")]
    Negative,
}

/// Parse an `after` cursor. Absent or empty means "from the start".
pub fn parse_cursor(raw: Option<&str>) -> Result<i64, CursorError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(0),
        Some(raw) => raw,
    };
    let after: i64 = raw
        .parse()
        .map_err(|_| CursorError::Malformed(raw.to_string()))?;
    if after < 0 {
        return Err(CursorError::Negative);
    }
    Ok(after)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overfetch_sets_flag_and_trims() {
        let page = Page::from_overfetch(vec![1, 2, 3], 2);
        assert_eq!(page.items, vec![1, 2]);
        assert!(page.has_next_page);

        let page = Page::from_overfetch(vec![1, 2], 2);
        assert_eq!(page.items, vec![1, 2]);
        assert!(!page.has_next_page);

        let page = Page::from_overfetch(vec![1], 0);
        assert!(page.items.is_empty());
        assert!(page.has_next_page);
    }

    #[test]
    fn cursor_parsing() {
        assert_eq!(parse_cursor(None), Ok(0));
        assert_eq!(parse_cursor(Some("")), Ok(0));
        assert_eq!(parse_cursor(Some("42")), Ok(42));
        assert_eq!(parse_cursor(Some("-3")), Err(CursorError::Negative));
        assert_eq!(
            parse_cursor(Some("abc")),
            Err(CursorError::Malformed("abc".into()))
        );
    }
}
