//! ABOUTME: Repositories for marketplace entities with pagination support
//! ABOUTME: Users, projects, applications, and feedback over the shared pool

use serde::{Deserialize, Serialize};

pub mod applications;
pub mod feedback;
pub mod projects;
pub mod users;

/// Maximum page size accepted from clients
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Default page size
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Client-supplied pagination parameters
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PageParams {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl PageParams {
    /// Clamp to the allowed ranges: page >= 1, limit in 1..=100
    pub fn clamped(self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}

/// Pagination metadata attached to list responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: u32,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl PageInfo {
    pub fn new(params: PageParams, total: i64) -> Self {
        let total_pages = if total <= 0 {
            0
        } else {
            ((total as u64).div_ceil(u64::from(params.limit))) as u32
        };

        Self {
            page: params.page,
            limit: params.limit,
            total,
            total_pages,
            has_next_page: params.page < total_pages,
            has_prev_page: params.page > 1 && total_pages > 0,
        }
    }
}

/// A page of results plus its pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, params: PageParams, total: i64) -> Self {
        Self {
            data,
            pagination: PageInfo::new(params, total),
        }
    }

    /// Convert the page's items, keeping the pagination metadata
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Paginated<U> {
        Paginated {
            data: self.data.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_params_clamping() {
        let params = PageParams { page: 0, limit: 0 }.clamped();
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, 1);

        let params = PageParams { page: 3, limit: 500 }.clamped();
        assert_eq!(params.page, 3);
        assert_eq!(params.limit, MAX_PAGE_LIMIT);

        let params = PageParams::default().clamped();
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, DEFAULT_PAGE_LIMIT);
    }

    #[test]
    fn test_page_params_offset() {
        assert_eq!(PageParams { page: 1, limit: 10 }.offset(), 0);
        assert_eq!(PageParams { page: 3, limit: 10 }.offset(), 20);
        assert_eq!(PageParams { page: 2, limit: 25 }.offset(), 25);
    }

    #[test]
    fn test_page_info_math() {
        let info = PageInfo::new(PageParams { page: 2, limit: 10 }, 35);
        assert_eq!(info.total_pages, 4);
        assert!(info.has_next_page);
        assert!(info.has_prev_page);

        let info = PageInfo::new(PageParams { page: 4, limit: 10 }, 35);
        assert!(!info.has_next_page);
        assert!(info.has_prev_page);

        let info = PageInfo::new(PageParams { page: 1, limit: 10 }, 0);
        assert_eq!(info.total_pages, 0);
        assert!(!info.has_next_page);
        assert!(!info.has_prev_page);
    }

    #[test]
    fn test_page_info_serializes_camel_case() {
        let info = PageInfo::new(PageParams { page: 1, limit: 10 }, 12);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["totalPages"], 2);
        assert_eq!(json["hasNextPage"], true);
        assert_eq!(json["hasPrevPage"], false);
    }
}
