//! Pagination parameters and the metadata reported alongside every list
//! response.

use serde::Serialize;

/// Normalized page request. Page and limit default to 1 and 10 and are
/// clamped to at least 1.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(10).max(1),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_items: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PageInfo {
    pub fn compute(req: PageRequest, total: usize) -> Self {
        let limit = req.limit as usize;
        Self {
            current_page: req.page,
            total_pages: total.div_ceil(limit) as u32,
            total_items: total,
            has_next: (req.page as usize) * limit < total,
            has_prev: req.page > 1,
        }
    }
}

/// Slice `items` for the requested page, clamping out-of-range pages to an
/// empty slice rather than failing.
pub fn paginate<T>(items: &[T], req: PageRequest) -> &[T] {
    let start = req.offset().min(items.len());
    let end = (start + req.limit as usize).min(items.len());
    &items[start..end]
}
