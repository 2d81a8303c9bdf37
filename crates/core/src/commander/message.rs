//! Structured output
//!
//! Messages carry plain strings only; colouring, clickable components and
//! translation are the host's business.

/// Output sent to a commander
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Info(String),
    Debug(String),
    Error(String),
    Paginated(PaginatedMessage),
}

impl Message {
    pub fn info(text: impl Into<String>) -> Self {
        Self::Info(text.into())
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::Error(text.into())
    }
}

/// One page of a longer listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginatedMessage {
    pub title: String,
    pub header: Option<String>,
    pub lines: Vec<String>,
    /// 1-based
    pub page: usize,
    pub total_pages: usize,
    /// Callback token showing the next page
    pub next: Option<String>,
    /// Callback token showing the previous page
    pub previous: Option<String>,
}

/// Splits listings into pages of a fixed size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    page_size: usize,
}

impl Paginator {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Pages needed for `len` lines; an empty listing still has one page
    pub fn page_count(&self, len: usize) -> usize {
        len.div_ceil(self.page_size).max(1)
    }

    /// Clamp `page` into range and return it with its lines
    pub fn page<'a>(&self, lines: &'a [String], page: usize) -> (usize, &'a [String]) {
        let page = page.clamp(1, self.page_count(lines.len()));
        let start = (page - 1) * self.page_size;
        let end = (start + self.page_size).min(lines.len());
        (page, &lines[start.min(end)..end])
    }
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(10)
    }
}
