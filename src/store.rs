//! Thin helpers over the object-store collaborator.
//!
//! The pipeline treats `lopdf` as its object store: allocate object ids,
//! write object bodies, read and replace streams, enumerate pages. These
//! helpers cover the handful of graph lookups every structural pass needs.

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::{Error, Result};

/// Page object ids in document page order.
pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

/// Numeric value of an object that may be an integer or a real.
pub fn as_f64(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// A page's media box as `(width_pt, height_pt)`.
pub fn page_media_size(doc: &Document, page_id: ObjectId) -> Result<(f64, f64)> {
    let media_box = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .and_then(|dict| dict.get(b"MediaBox"))
        .and_then(Object::as_array)?;

    let coords: Vec<f64> = media_box.iter().filter_map(as_f64).collect();
    if coords.len() != 4 {
        return Err(Error::Malformed(format!(
            "MediaBox of page {:?} is not four numbers",
            page_id
        )));
    }
    Ok((coords[2] - coords[0], coords[3] - coords[1]))
}

/// Object id of the document catalog.
pub fn catalog_id(doc: &Document) -> Result<ObjectId> {
    Ok(doc.trailer.get(b"Root")?.as_reference()?)
}

/// Mutable access to the document catalog dictionary.
pub fn catalog_mut(doc: &mut Document) -> Result<&mut Dictionary> {
    let id = catalog_id(doc)?;
    Ok(doc.get_object_mut(id)?.as_dict_mut()?)
}

/// Mutable access to a page dictionary.
pub fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary> {
    Ok(doc.get_object_mut(page_id)?.as_dict_mut()?)
}

/// Object id of the document information dictionary, if the trailer has one.
pub fn info_id(doc: &Document) -> Option<ObjectId> {
    doc.trailer.get(b"Info").ok()?.as_reference().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_f64() {
        assert_eq!(as_f64(&Object::Integer(4)), Some(4.0));
        assert_eq!(as_f64(&Object::Real(2.5)), Some(2.5));
        assert_eq!(as_f64(&Object::Null), None);
    }
}
