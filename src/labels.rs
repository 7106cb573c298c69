//! Page-label number tree.
//!
//! Serializes a resolved page-number series into the catalog's `/PageLabels`
//! entry. A partially-parseable series is still written: readers get the
//! recovered labels, the caller gets a warning code.

use log::warn;
use lopdf::{Dictionary, Document, Object};

use crate::error::{Result, RunWarning, WarningSet};
use crate::scandata::PageNumberSeries;
use crate::store;

/// Write the page-label number tree for the given series.
///
/// Records [`RunWarning::InvalidPageNumbers`] when the series was only
/// partially parseable, but serializes whatever ranges were recovered.
pub fn write_page_labels(
    doc: &mut Document,
    series: &PageNumberSeries,
    warnings: &mut WarningSet,
) -> Result<()> {
    if !series.complete {
        warn!("page-number series only partially parsed; writing recovered labels");
        warnings.insert(RunWarning::InvalidPageNumbers);
    }

    let mut nums: Vec<Object> = Vec::with_capacity(series.ranges.len() * 2);
    for range in &series.ranges {
        let mut label = Dictionary::new();
        if let Some(name) = range.style.pdf_name() {
            label.set("S", Object::Name(name.to_vec()));
        }
        if let Some(prefix) = &range.prefix {
            label.set("P", Object::string_literal(prefix.as_str()));
        }
        if range.start_value != 1 {
            label.set("St", Object::Integer(range.start_value));
        }

        nums.push(Object::Integer(range.first_page_index as i64));
        nums.push(Object::Dictionary(label));
    }

    let mut tree = Dictionary::new();
    tree.set("Nums", Object::Array(nums));

    let catalog = store::catalog_mut(doc)?;
    catalog.set("PageLabels", Object::Dictionary(tree));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scandata::{LabelRange, LabelStyle};

    fn empty_doc() -> Document {
        let mut doc = Document::with_version("1.7");
        let catalog_id = doc.add_object(Object::Dictionary(Dictionary::new()));
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc
    }

    fn page_labels(doc: &Document) -> Vec<Object> {
        let catalog_id = store::catalog_id(doc).unwrap();
        doc.get_object(catalog_id)
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"PageLabels")
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"Nums")
            .unwrap()
            .as_array()
            .unwrap()
            .clone()
    }

    #[test]
    fn test_series_serialization() {
        let mut doc = empty_doc();
        let series = PageNumberSeries {
            ranges: vec![
                LabelRange {
                    first_page_index: 0,
                    style: LabelStyle::RomanLower,
                    prefix: None,
                    start_value: 1,
                },
                LabelRange {
                    first_page_index: 4,
                    style: LabelStyle::Decimal,
                    prefix: Some("p. ".into()),
                    start_value: 7,
                },
            ],
            complete: true,
        };
        let mut warnings = WarningSet::new();
        write_page_labels(&mut doc, &series, &mut warnings).unwrap();
        assert!(warnings.is_empty());

        let nums = page_labels(&doc);
        assert_eq!(nums.len(), 4);
        assert_eq!(nums[0].as_i64().unwrap(), 0);
        let roman = nums[1].as_dict().unwrap();
        assert_eq!(roman.get(b"S").unwrap().as_name().unwrap(), b"r");
        assert!(!roman.has(b"St"));

        assert_eq!(nums[2].as_i64().unwrap(), 4);
        let decimal = nums[3].as_dict().unwrap();
        assert_eq!(decimal.get(b"S").unwrap().as_name().unwrap(), b"D");
        assert_eq!(decimal.get(b"P").unwrap().as_str().unwrap(), b"p. ");
        assert_eq!(decimal.get(b"St").unwrap().as_i64().unwrap(), 7);
    }

    #[test]
    fn test_partial_series_still_written_with_warning() {
        let mut doc = empty_doc();
        let series = PageNumberSeries {
            ranges: vec![LabelRange::decimal(0, 1)],
            complete: false,
        };
        let mut warnings = WarningSet::new();
        write_page_labels(&mut doc, &series, &mut warnings).unwrap();

        assert!(warnings.contains(&RunWarning::InvalidPageNumbers));
        assert_eq!(page_labels(&doc).len(), 2);
    }

    #[test]
    fn test_unnumbered_range_has_no_style() {
        let mut doc = empty_doc();
        let series = PageNumberSeries {
            ranges: vec![LabelRange {
                first_page_index: 0,
                style: LabelStyle::None,
                prefix: Some("Cover".into()),
                start_value: 1,
            }],
            complete: true,
        };
        let mut warnings = WarningSet::new();
        write_page_labels(&mut doc, &series, &mut warnings).unwrap();

        let nums = page_labels(&doc);
        let label = nums[1].as_dict().unwrap();
        assert!(!label.has(b"S"));
        assert_eq!(label.get(b"P").unwrap().as_str().unwrap(), b"Cover");
    }
}
