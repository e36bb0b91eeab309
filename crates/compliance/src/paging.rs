//! 1-based paging over an already ordered listing.

use serde::Serialize;

use vigil_core::{Result, VigilError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paging {
    pub this_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// Cut page `page` of size `page_size` out of `items`.
///
/// A page past the end yields a valid header and no items.
pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> Result<(Paging, Vec<T>)> {
    if page == 0 {
        return Err(VigilError::Validation("page must be at least 1".to_string()));
    }
    if page_size == 0 {
        return Err(VigilError::Validation("pageSize must be at least 1".to_string()));
    }

    let total_items = items.len();
    let paging = Paging {
        this_page: page,
        total_pages: total_items.div_ceil(page_size),
        total_items,
    };

    let start = (page - 1).saturating_mul(page_size);
    let slice = items.into_iter().skip(start).take(page_size).collect();
    Ok((paging, slice))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_is_ceiling() {
        for (items, size, pages) in [(0, 5, 0), (1, 5, 1), (5, 5, 1), (6, 5, 2), (11, 3, 4)] {
            let (paging, _) = paginate((0..items).collect::<Vec<_>>(), 1, size).unwrap();
            assert_eq!(paging.total_pages, pages, "{items} items / {size}");
            assert_eq!(paging.total_items, items);
        }
    }

    #[test]
    fn last_page_is_partial() {
        let (paging, page) = paginate((0..7).collect::<Vec<_>>(), 3, 3).unwrap();
        assert_eq!(paging.this_page, 3);
        assert_eq!(page, vec![6]);
    }

    #[test]
    fn page_beyond_last_is_empty_not_error() {
        let (paging, page) = paginate((0..7).collect::<Vec<_>>(), 9, 3).unwrap();
        assert!(page.is_empty());
        assert_eq!(paging, Paging { this_page: 9, total_pages: 3, total_items: 7 });
    }

    #[test]
    fn zero_page_or_size_is_rejected() {
        assert!(matches!(paginate(vec![1], 0, 1), Err(VigilError::Validation(_))));
        assert!(matches!(paginate(vec![1], 1, 0), Err(VigilError::Validation(_))));
    }
}
