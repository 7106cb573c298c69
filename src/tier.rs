//! Compression-quality tier routing.
//!
//! Callers name the pages that should get high-quality encoding as a
//! comma-separated list of 1-indexed page references; negative references
//! count from the end of the document.

use log::debug;

/// Resolve a high-quality page specification into per-page tier flags.
///
/// Positive references are 1-indexed from the start, negative references are
/// 1-indexed from the end. Out-of-range references are silently ignored so a
/// tier spec written for a longer edition still degrades gracefully on a
/// shorter one (e.g. `"1,2,3,4,-4,-3,-2,-1"` on a three-page document marks
/// all three pages and drops `4`/`-4` without complaint). Unparseable entries
/// are ignored the same way.
pub fn resolve_hq_pages(spec: &str, page_count: usize) -> Vec<bool> {
    let mut flags = vec![false; page_count];

    for entry in spec.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let reference: i64 = match entry.parse() {
            Ok(n) => n,
            Err(_) => {
                debug!("ignoring unparseable hq page reference {:?}", entry);
                continue;
            }
        };

        // 1-indexed from the front; negative stays 1-indexed from the back.
        let index = if reference > 0 { reference - 1 } else { reference };

        if index.unsigned_abs() as usize >= page_count {
            continue;
        }

        let resolved = if index >= 0 {
            index as usize
        } else {
            page_count - index.unsigned_abs() as usize
        };
        flags[resolved] = true;
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_and_negative_references() {
        assert_eq!(resolve_hq_pages("1,2,-1", 3), vec![true, true, true]);
    }

    #[test]
    fn test_out_of_range_silently_ignored() {
        assert_eq!(resolve_hq_pages("5", 3), vec![false, false, false]);
        assert_eq!(resolve_hq_pages("-5", 3), vec![false, false, false]);
    }

    #[test]
    fn test_oversized_spec_degrades_gracefully() {
        assert_eq!(
            resolve_hq_pages("1,2,3,4,-4,-3,-2,-1", 3),
            vec![true, true, true]
        );
    }

    #[test]
    fn test_negative_counts_from_end() {
        assert_eq!(resolve_hq_pages("-2", 5), vec![false, false, false, true, false]);
    }

    #[test]
    fn test_garbage_entries_ignored() {
        assert_eq!(resolve_hq_pages("x,,2", 3), vec![false, true, false]);
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(resolve_hq_pages("1", 0), Vec::<bool>::new());
    }
}
