//! Paginated request/response model.

use serde::{Deserialize, Serialize};

/// Free-text and label filters applied to a list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl SearchQuery {
    pub fn name(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), label: None }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self { name: None, label: Some(label.into()) }
    }

    pub fn is_empty(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().map(|s| s.trim().is_empty()).unwrap_or(true);
        blank(&self.name) && blank(&self.label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// One logical "current view" of a list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaginatedRequest {
    pub page: u32,
    pub size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<SearchQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<OrderBy>,
}

impl Default for PaginatedRequest {
    fn default() -> Self { Self::new(1, 10) }
}

impl PaginatedRequest {
    /// Page and size are clamped to at least 1.
    pub fn new(page: u32, size: u32) -> Self {
        Self { page: page.max(1), size: size.max(1), query: None, order_by: None }
    }

    pub fn with_query(mut self, query: SearchQuery) -> Self {
        self.query = if query.is_empty() { None } else { Some(query) };
        self
    }

    pub fn with_order(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }

    /// Merge a patch into this request; fields the patch leaves unset are retained.
    pub fn merge(&mut self, patch: &RequestPatch) {
        if let Some(p) = patch.page { self.page = p.max(1); }
        if let Some(s) = patch.size { self.size = s.max(1); }
        if let Some(q) = &patch.query {
            self.query = q.clone().filter(|q| !q.is_empty());
        }
        if let Some(o) = &patch.order_by { self.order_by = o.clone(); }
    }
}

/// Partial request. `query`/`order_by` use a nested option: `None` leaves the
/// field untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestPatch {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub query: Option<Option<SearchQuery>>,
    pub order_by: Option<Option<OrderBy>>,
}

impl RequestPatch {
    pub fn page(page: u32) -> Self {
        Self { page: Some(page), ..Default::default() }
    }

    pub fn size(size: u32) -> Self {
        Self { page: Some(1), size: Some(size), ..Default::default() }
    }

    /// New search restarts from the first page.
    pub fn search(query: SearchQuery) -> Self {
        Self { page: Some(1), query: Some(Some(query)), ..Default::default() }
    }

    pub fn clear_search() -> Self {
        Self { page: Some(1), query: Some(None), ..Default::default() }
    }

    pub fn order(order_by: OrderBy) -> Self {
        Self { order_by: Some(Some(order_by)), ..Default::default() }
    }

    pub fn clear_order() -> Self {
        Self { order_by: Some(None), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.page.is_none() && self.size.is_none() && self.query.is_none() && self.order_by.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, page: u32, size: u32, total: u64) -> Self {
        Self { items, page, size, total }
    }

    /// `ceil(total / size)`, at least 1.
    pub fn last_page(&self) -> u32 {
        last_page(self.total, self.size)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedResponse<U> {
        PaginatedResponse { items: self.items.into_iter().map(f).collect(), page: self.page, size: self.size, total: self.total }
    }
}

pub fn last_page(total: u64, size: u32) -> u32 {
    let size = u64::from(size.max(1));
    let pages = total.div_ceil(size);
    pages.max(1).min(u64::from(u32::MAX)) as u32
}
