//! Cursor-driven filter, sort and paginate shared by point search and visit history.
//!
//! Rows arrive one at a time from a SQLite statement cursor. Without an ordering the
//! scan only keeps rows that fall inside the requested window; with an ordering every
//! match has to be held until the sort completes.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::models::{Page, PageRequest};

pub type Comparator<'a, T> = &'a dyn Fn(&T, &T) -> Ordering;

pub fn paginate<T, I, P>(
    rows: I,
    mut predicate: P,
    order: Option<Comparator<'_, T>>,
    request: PageRequest,
) -> Result<Page<T>>
where
    I: IntoIterator<Item = Result<T>>,
    P: FnMut(&T) -> bool,
{
    if request.page_size == 0 {
        return Err(Error::InvalidArgument("page size must be positive".into()));
    }
    let start = request.offset();
    let end = start.saturating_add(request.page_size);

    let (items, total) = match order {
        None => {
            let mut total = 0usize;
            let mut items = Vec::with_capacity(request.page_size);
            for row in rows {
                let row = row?;
                if !predicate(&row) {
                    continue;
                }
                if total >= start && total < end {
                    items.push(row);
                }
                total += 1;
            }
            (items, total)
        }
        Some(compare) => {
            let mut matched = Vec::new();
            for row in rows {
                let row = row?;
                if predicate(&row) {
                    matched.push(row);
                }
            }
            // stable, so equal keys keep cursor order
            matched.sort_by(|a, b| compare(a, b));
            let total = matched.len();
            let items = if start >= total {
                Vec::new()
            } else {
                matched.drain(start..end.min(total)).collect()
            };
            (items, total)
        }
    };

    Ok(Page {
        items,
        total,
        page_index: request.page_index,
        page_size: request.page_size,
    })
}

/// Collects every row passing `predicate`, optionally sorted. Used for unpaged listings.
pub fn collect<T, I, P>(rows: I, mut predicate: P, order: Option<Comparator<'_, T>>) -> Result<Vec<T>>
where
    I: IntoIterator<Item = Result<T>>,
    P: FnMut(&T) -> bool,
{
    let mut matched = Vec::new();
    for row in rows {
        let row = row?;
        if predicate(&row) {
            matched.push(row);
        }
    }
    if let Some(compare) = order {
        matched.sort_by(|a, b| compare(a, b));
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: u32) -> impl Iterator<Item = Result<u32>> {
        (0..n).map(Ok)
    }

    #[test]
    fn last_partial_page_and_past_the_end() {
        let page = paginate(rows(45), |_| true, None, PageRequest::new(2, 20)).unwrap();
        assert_eq!(page.items, (40..45).collect::<Vec<_>>());
        assert_eq!(page.total, 45);
        assert!(!page.next_enabled());

        let page = paginate(rows(45), |_| true, None, PageRequest::new(3, 20)).unwrap();
        assert!(page.items.is_empty());
        assert!(page.prev_enabled());
        assert!(!page.next_enabled());
    }

    #[test]
    fn predicate_counts_only_matches() {
        let page = paginate(rows(100), |n| n % 2 == 0, None, PageRequest::new(1, 10)).unwrap();
        assert_eq!(page.total, 50);
        assert_eq!(page.items.first(), Some(&20));
        assert_eq!(page.items.len(), 10);
        assert!(page.prev_enabled());
        assert!(page.next_enabled());
    }

    #[test]
    fn ordering_applies_before_slicing() {
        let desc = |a: &u32, b: &u32| b.cmp(a);
        let page = paginate(rows(30), |_| true, Some(&desc), PageRequest::new(0, 5)).unwrap();
        assert_eq!(page.items, vec![29, 28, 27, 26, 25]);
    }

    #[test]
    fn repeated_calls_are_stable() {
        let first = paginate(rows(25), |n| n % 3 == 0, None, PageRequest::new(0, 4)).unwrap();
        let second = paginate(rows(25), |n| n % 3 == 0, None, PageRequest::new(0, 4)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn cursor_errors_propagate() {
        let failing = vec![Ok(1u32), Err(Error::FeedFetch("cursor broke".into())), Ok(3)];
        let result = paginate(failing, |_| true, None, PageRequest::new(0, 10));
        assert!(matches!(result, Err(Error::FeedFetch(_))));
    }

    #[test]
    fn page_index_far_past_the_end_is_empty() {
        let page = paginate(rows(45), |_| true, None, PageRequest::new(usize::MAX, 20)).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 45);
        assert!(!page.next_enabled());
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let result = paginate(rows(3), |_| true, None, PageRequest::new(0, 0));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
