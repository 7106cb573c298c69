//! Logical structure (accessibility) tree construction.
//!
//! Builds one `/Figure` structure element per page, a parent number-tree
//! chunked into bounded nodes, and the `StructTreeRoot`, then patches every
//! page dictionary and the catalog with the structural back-references.
//! Nothing here recovers from malformed indices; the chunk arithmetic is kept
//! in a pure function with its own tests because a single bad reference
//! produces a silently non-conformant document.

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::Result;
use crate::store;

/// Maximum number of `(key, value)` pairs per parent-tree chunk node.
pub const PARENT_TREE_CHUNK: usize = 32;

/// Page-index ranges `[start, end)` covered by each parent-tree chunk node.
///
/// The ranges partition `[0, page_count)`: every page appears in exactly one
/// chunk, and the last chunk may be short.
pub fn chunk_ranges(page_count: usize) -> Vec<(usize, usize)> {
    let chunk_count = page_count.div_ceil(PARENT_TREE_CHUNK);
    (0..chunk_count)
        .map(|c| {
            let start = c * PARENT_TREE_CHUNK;
            let end = ((c + 1) * PARENT_TREE_CHUNK).min(page_count);
            (start, end)
        })
        .collect()
}

/// Ids of the three per-page objects in the structure graph.
struct StructureEntry {
    /// The page's structure element
    element: ObjectId,
    /// The attribute object holding the bounding box and layout hints
    attribute: ObjectId,
    /// The single-element indirection array the parent tree points at
    parent_tree_indirect: ObjectId,
}

/// Build the structure tree for every page and wire it into the catalog.
///
/// Adds per-page `/Figure` structure elements with attribute objects, the
/// chunked parent number-tree, the `StructTreeRoot`, per-page
/// `/StructParents`, `/CropBox`, `/Rotate` and `/Tabs` entries, and the
/// catalog's viewer preferences, optional `/Lang`, `/MarkInfo` and
/// `/StructTreeRoot`.
pub fn write_structure_tree(doc: &mut Document, language: Option<&str>) -> Result<()> {
    let page_ids = store::page_ids(doc);
    let page_count = page_ids.len();

    let struct_root_id = doc.new_object_id();
    let parent_tree_id = doc.new_object_id();

    // Reserve every per-page identity up front; the graph is cyclic (elements
    // point at the root, the root lists the elements).
    let entries: Vec<StructureEntry> = (0..page_count)
        .map(|_| StructureEntry {
            element: doc.new_object_id(),
            attribute: doc.new_object_id(),
            parent_tree_indirect: doc.new_object_id(),
        })
        .collect();

    // Chunk nodes of the parent number tree. Each entry maps a page index to
    // a one-element array that resolves to the page's attribute object, the
    // same indirection a reader follows for a /StructParents key.
    let mut chunk_ids = Vec::new();
    for (start, end) in chunk_ranges(page_count) {
        let mut nums = Vec::with_capacity((end - start) * 2);
        for (page_index, entry) in entries.iter().enumerate().take(end).skip(start) {
            nums.push(Object::Integer(page_index as i64));
            nums.push(Object::Reference(entry.parent_tree_indirect));
        }

        let mut chunk = Dictionary::new();
        chunk.set(
            "Limits",
            Object::Array(vec![
                Object::Integer(start as i64),
                Object::Integer(end as i64 - 1),
            ]),
        );
        chunk.set("Nums", Object::Array(nums));
        chunk_ids.push(doc.add_object(Object::Dictionary(chunk)));
    }

    for (page_index, (page_id, entry)) in page_ids.iter().zip(&entries).enumerate() {
        let (width_pt, height_pt) = store::page_media_size(doc, *page_id)?;

        let mut attribute = Dictionary::new();
        attribute.set("O", Object::Name(b"Layout".to_vec()));
        attribute.set(
            "BBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(width_pt as i64),
                Object::Integer(height_pt as i64),
            ]),
        );
        attribute.set("Placement", Object::Name(b"Block".to_vec()));
        attribute.set("InlineAlign", Object::Name(b"Center".to_vec()));
        doc.objects
            .insert(entry.attribute, Object::Dictionary(attribute));

        let mut element = Dictionary::new();
        element.set("S", Object::Name(b"Figure".to_vec()));
        element.set("A", Object::Reference(entry.attribute));
        // The page's content is this element's sole kid.
        element.set("K", Object::Integer(0));
        element.set("P", Object::Reference(struct_root_id));
        element.set("Pg", Object::Reference(*page_id));
        doc.objects
            .insert(entry.element, Object::Dictionary(element));

        doc.objects.insert(
            entry.parent_tree_indirect,
            Object::Array(vec![Object::Reference(entry.attribute)]),
        );

        let page_dict = store::page_dict_mut(doc, *page_id)?;
        page_dict.set("StructParents", Object::Integer(page_index as i64));
        page_dict.set(
            "CropBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(width_pt as f32),
                Object::Real(height_pt as f32),
            ]),
        );
        page_dict.set("Rotate", Object::Integer(0));
        page_dict.set("Tabs", Object::Name(b"S".to_vec()));
    }

    let mut parent_tree = Dictionary::new();
    parent_tree.set(
        "Kids",
        Object::Array(chunk_ids.into_iter().map(Object::Reference).collect()),
    );
    doc.objects
        .insert(parent_tree_id, Object::Dictionary(parent_tree));

    let mut struct_root = Dictionary::new();
    struct_root.set("Type", Object::Name(b"StructTreeRoot".to_vec()));
    struct_root.set(
        "K",
        Object::Array(entries.iter().map(|e| Object::Reference(e.element)).collect()),
    );
    struct_root.set("ParentTree", Object::Reference(parent_tree_id));
    doc.objects
        .insert(struct_root_id, Object::Dictionary(struct_root));

    let catalog = store::catalog_mut(doc)?;
    let mut viewer_prefs = Dictionary::new();
    viewer_prefs.set("FitWindow", Object::Boolean(true));
    viewer_prefs.set("DisplayDocTitle", Object::Boolean(true));
    catalog.set("ViewerPreferences", Object::Dictionary(viewer_prefs));
    if let Some(language) = language {
        catalog.set("Lang", Object::string_literal(language));
    }
    let mut mark_info = Dictionary::new();
    mark_info.set("Marked", Object::Boolean(true));
    catalog.set("MarkInfo", Object::Dictionary(mark_info));
    catalog.set("StructTreeRoot", Object::Reference(struct_root_id));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn doc_with_pages(count: usize, width: i64, height: i64) -> Document {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let mut kids = Vec::new();
        for _ in 0..count {
            let mut page = Dictionary::new();
            page.set("Type", Object::Name(b"Page".to_vec()));
            page.set("Parent", Object::Reference(pages_id));
            page.set(
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(width),
                    Object::Integer(height),
                ]),
            );
            kids.push(Object::Reference(doc.add_object(Object::Dictionary(page))));
        }

        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Count", Object::Integer(count as i64));
        pages.set("Kids", Object::Array(kids));
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = doc.add_object(Object::Dictionary(catalog));
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc
    }

    /// Follow a page's /StructParents key through the parent tree the way a
    /// reader does and return the attribute object it lands on.
    fn attribute_via_parent_tree<'a>(doc: &'a Document, page_index: i64) -> &'a Dictionary {
        let catalog_id = store::catalog_id(doc).unwrap();
        let catalog = doc.get_object(catalog_id).unwrap().as_dict().unwrap();
        let root_id = catalog.get(b"StructTreeRoot").unwrap().as_reference().unwrap();
        let root = doc.get_object(root_id).unwrap().as_dict().unwrap();
        let tree_id = root.get(b"ParentTree").unwrap().as_reference().unwrap();
        let tree = doc.get_object(tree_id).unwrap().as_dict().unwrap();

        for kid in tree.get(b"Kids").unwrap().as_array().unwrap() {
            let chunk_id = kid.as_reference().unwrap();
            let chunk = doc.get_object(chunk_id).unwrap().as_dict().unwrap();
            let limits = chunk.get(b"Limits").unwrap().as_array().unwrap();
            let low = limits[0].as_i64().unwrap();
            let high = limits[1].as_i64().unwrap();
            if page_index < low || page_index > high {
                continue;
            }

            let nums = chunk.get(b"Nums").unwrap().as_array().unwrap();
            for pair in nums.chunks(2) {
                if pair[0].as_i64().unwrap() != page_index {
                    continue;
                }
                let indirect_id = pair[1].as_reference().unwrap();
                let indirect = doc.get_object(indirect_id).unwrap().as_array().unwrap();
                let attribute_id = indirect[0].as_reference().unwrap();
                return doc.get_object(attribute_id).unwrap().as_dict().unwrap();
            }
        }
        panic!("page {} not covered by any parent-tree chunk", page_index);
    }

    #[test]
    fn test_attribute_bbox_round_trips_through_parent_tree() {
        // 40 pages crosses a chunk boundary.
        let mut doc = doc_with_pages(40, 612, 792);
        write_structure_tree(&mut doc, Some("en")).unwrap();

        for page_index in [0i64, 31, 32, 39] {
            let attribute = attribute_via_parent_tree(&doc, page_index);
            let bbox: Vec<i64> = attribute
                .get(b"BBox")
                .unwrap()
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_i64().unwrap())
                .collect();
            assert_eq!(bbox, vec![0, 0, 612, 792], "page {}", page_index);
        }
    }

    #[test]
    fn test_pages_patched_and_catalog_wired() {
        let mut doc = doc_with_pages(3, 612, 792);
        write_structure_tree(&mut doc, Some("en")).unwrap();

        for (index, page_id) in store::page_ids(&doc).iter().enumerate() {
            let page = doc.get_object(*page_id).unwrap().as_dict().unwrap();
            assert_eq!(
                page.get(b"StructParents").unwrap().as_i64().unwrap(),
                index as i64
            );
            assert_eq!(page.get(b"Rotate").unwrap().as_i64().unwrap(), 0);
            assert_eq!(page.get(b"Tabs").unwrap().as_name().unwrap(), b"S");
            assert!(page.has(b"CropBox"));
        }

        let catalog_id = store::catalog_id(&doc).unwrap();
        let catalog = doc.get_object(catalog_id).unwrap().as_dict().unwrap();
        assert_eq!(catalog.get(b"Lang").unwrap().as_str().unwrap(), b"en");
        let mark_info = catalog.get(b"MarkInfo").unwrap().as_dict().unwrap();
        assert!(mark_info.get(b"Marked").unwrap().as_bool().unwrap());
        assert!(catalog.has(b"ViewerPreferences"));
    }

    #[test]
    fn test_chunk_count_is_ceil_of_pages_over_32() {
        assert_eq!(chunk_ranges(0).len(), 0);
        assert_eq!(chunk_ranges(1).len(), 1);
        assert_eq!(chunk_ranges(32).len(), 1);
        assert_eq!(chunk_ranges(33).len(), 2);
        assert_eq!(chunk_ranges(64).len(), 2);
        assert_eq!(chunk_ranges(65).len(), 3);
    }

    #[test]
    fn test_chunks_partition_the_page_range() {
        for pages in [1usize, 5, 31, 32, 33, 63, 64, 65, 100, 200] {
            let ranges = chunk_ranges(pages);
            let mut covered = Vec::new();
            for (start, end) in ranges {
                assert!(start < end);
                covered.extend(start..end);
            }
            let expected: Vec<usize> = (0..pages).collect();
            assert_eq!(covered, expected, "pages={}", pages);
        }
    }

    proptest! {
        #[test]
        fn prop_chunks_cover_without_gaps_or_overlap(pages in 0usize..2000) {
            let ranges = chunk_ranges(pages);
            prop_assert_eq!(ranges.len(), pages.div_ceil(PARENT_TREE_CHUNK));

            let mut next = 0usize;
            for (start, end) in ranges {
                prop_assert_eq!(start, next);
                prop_assert!(end - start <= PARENT_TREE_CHUNK);
                next = end;
            }
            prop_assert_eq!(next, pages);
        }
    }
}
