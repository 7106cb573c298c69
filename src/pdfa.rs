//! PDF/A compliance and document metadata.
//!
//! Injects the ICC-based output intent, writes the document information
//! dictionary and the XMP metadata packet (forwarding a source document's
//! packet verbatim when one exists), and cleans up the `(none)` placeholders
//! a defective save primitive leaves in the info object.

use chrono::Utc;
use log::debug;
use lopdf::{Dictionary, Document, Object, Stream};
use quick_xml::escape::escape;

use crate::error::Result;
use crate::store;

/// Fixed producer identifier written into every output document.
pub const PRODUCER: &str = concat!("bindery ", env!("CARGO_PKG_VERSION"));

/// Embedded sRGB ICC profile for the output intent.
const SRGB_ICC: &[u8] = include_bytes!("../data/srgb.icc");

/// Placeholder the document-save primitive inserts for absent info fields.
const PLACEHOLDER: &[u8] = b"none";

/// Caller-supplied document metadata, merged into the info dictionary and
/// the XMP packet once per run.
#[derive(Debug, Clone, Default)]
pub struct DocumentMetadata {
    /// Item URL; stored as the keywords field
    pub url: Option<String>,
    /// Document title
    pub title: Option<String>,
    /// Document author
    pub author: Option<String>,
    /// Creating entity
    pub creator: Option<String>,
    /// Document subject
    pub subject: Option<String>,
    /// Languages, most significant first; the first entry becomes the
    /// document language
    pub language: Vec<String>,
    /// Creator tool recorded in the XMP packet
    pub creator_tool: Option<String>,
}

/// Write the sRGB ICC profile stream and the PDF/A output intent, and link
/// the intent from the catalog.
pub fn write_output_intent(doc: &mut Document) -> Result<()> {
    let mut icc_dict = Dictionary::new();
    icc_dict.set("N", Object::Integer(3));
    icc_dict.set("Alternate", Object::Name(b"DeviceRGB".to_vec()));
    let icc_id = doc.add_object(Stream::new(icc_dict, SRGB_ICC.to_vec()));

    let mut intent = Dictionary::new();
    intent.set("Type", Object::Name(b"OutputIntent".to_vec()));
    intent.set("S", Object::Name(b"GTS_PDFA1".to_vec()));
    intent.set("OutputConditionIdentifier", Object::string_literal("Custom"));
    intent.set("Info", Object::string_literal("sRGB IEC61966-2.1"));
    intent.set("DestOutputProfile", Object::Reference(icc_id));
    let intent_id = doc.add_object(Object::Dictionary(intent));

    let catalog = store::catalog_mut(doc)?;
    catalog.set(
        "OutputIntents",
        Object::Array(vec![Object::Reference(intent_id)]),
    );
    Ok(())
}

/// Merge metadata into the document info dictionary and write the XMP packet.
///
/// The producer field is always overwritten with the fixed tool identifier
/// and the modification date is always "now". A source document's embedded
/// XMP packet is copied verbatim, without validation; otherwise one is
/// synthesized from the merged fields, declaring PDF/A part 3 conformance B.
pub fn write_metadata(
    doc: &mut Document,
    source: Option<&Document>,
    metadata: &DocumentMetadata,
) -> Result<()> {
    let now_pdf = Utc::now().format("D:%Y%m%d%H%M%SZ").to_string();

    let mut info = match source.and_then(source_info_dict) {
        Some(dict) => dict,
        None => Dictionary::new(),
    };

    if let Some(url) = &metadata.url {
        info.set("Keywords", Object::string_literal(url.as_str()));
    }
    if let Some(title) = &metadata.title {
        info.set("Title", Object::string_literal(title.as_str()));
    }
    if let Some(author) = &metadata.author {
        info.set("Author", Object::string_literal(author.as_str()));
    }
    if let Some(creator) = &metadata.creator {
        info.set("Creator", Object::string_literal(creator.as_str()));
    }
    if let Some(subject) = &metadata.subject {
        info.set("Subject", Object::string_literal(subject.as_str()));
    }
    info.set("Producer", Object::string_literal(PRODUCER));
    if !info.has(b"CreationDate") {
        info.set("CreationDate", Object::string_literal(now_pdf.as_str()));
    }
    info.set("ModDate", Object::string_literal(now_pdf.as_str()));

    let info_id = doc.add_object(Object::Dictionary(info));
    doc.trailer.set("Info", Object::Reference(info_id));

    let packet = match source.and_then(source_xmp_packet) {
        Some(existing) => existing,
        None => build_xmp_packet(metadata).into_bytes(),
    };
    set_xmp_packet(doc, packet)?;

    Ok(())
}

fn source_info_dict(source: &Document) -> Option<Dictionary> {
    let id = store::info_id(source)?;
    let dict = source.get_object(id).ok()?.as_dict().ok()?.clone();
    Some(dict)
}

fn source_xmp_packet(source: &Document) -> Option<Vec<u8>> {
    let catalog_id = store::catalog_id(source).ok()?;
    let metadata_ref = source
        .get_object(catalog_id)
        .ok()?
        .as_dict()
        .ok()?
        .get(b"Metadata")
        .ok()?
        .as_reference()
        .ok()?;
    let stream = source.get_object(metadata_ref).ok()?.as_stream().ok()?;
    Some(stream.content.clone())
}

/// Replace the catalog's XMP metadata stream. The packet is stored
/// uncompressed so conformance checkers can read it without filters.
fn set_xmp_packet(doc: &mut Document, packet: Vec<u8>) -> Result<()> {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"Metadata".to_vec()));
    dict.set("Subtype", Object::Name(b"XML".to_vec()));
    let stream = Stream::new(dict, packet).with_compression(false);
    let stream_id = doc.add_object(stream);

    let catalog = store::catalog_mut(doc)?;
    catalog.set("Metadata", Object::Reference(stream_id));
    Ok(())
}

/// Synthesize an XMP packet from the merged metadata fields.
fn build_xmp_packet(metadata: &DocumentMetadata) -> String {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let creator_tool = metadata.creator_tool.as_deref().unwrap_or(PRODUCER);

    let mut packet = format!(
        r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?>
<x:xmpmeta xmlns:x="adobe:ns:meta/">
  <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
    <rdf:Description rdf:about="" xmlns:xmp="http://ns.adobe.com/xap/1.0/">
      <xmp:CreateDate>{now}</xmp:CreateDate>
      <xmp:MetadataDate>{now}</xmp:MetadataDate>
      <xmp:ModifyDate>{now}</xmp:ModifyDate>
      <xmp:CreatorTool>{tool}</xmp:CreatorTool>
    </rdf:Description>
    <rdf:Description rdf:about="" xmlns:dc="http://purl.org/dc/elements/1.1/">"#,
        now = now,
        tool = escape(creator_tool),
    );

    if let Some(title) = &metadata.title {
        packet.push_str(&format!(
            r#"
      <dc:title>
        <rdf:Alt>
          <rdf:li xml:lang="x-default">{}</rdf:li>
        </rdf:Alt>
      </dc:title>"#,
            escape(title.as_str())
        ));
    }

    // Dublin Core defines dc:creator as the entity responsible for making
    // the resource, which maps to the author field here.
    if let Some(author) = &metadata.author {
        packet.push_str(&format!(
            r#"
      <dc:creator>
        <rdf:Seq>
          <rdf:li>{}</rdf:li>
        </rdf:Seq>
      </dc:creator>"#,
            escape(author.as_str())
        ));
    }

    if !metadata.language.is_empty() {
        packet.push_str(
            r#"
      <dc:language>
        <rdf:Bag>"#,
        );
        for language in &metadata.language {
            packet.push_str(&format!(
                r#"
          <rdf:li>{}</rdf:li>"#,
                escape(language.as_str())
            ));
        }
        packet.push_str(
            r#"
        </rdf:Bag>
      </dc:language>"#,
        );
    }

    packet.push_str(
        r#"
    </rdf:Description>
    <rdf:Description rdf:about="" xmlns:pdfaid="http://www.aiim.org/pdfa/ns/id/">
      <pdfaid:part>3</pdfaid:part>
      <pdfaid:conformance>B</pdfaid:conformance>
    </rdf:Description>
  </rdf:RDF>
</x:xmpmeta>
<?xpacket end="r"?>"#,
    );

    packet
}

/// Remove info-dictionary entries holding the literal `(none)` placeholder.
///
/// Compensates for a save primitive that writes such placeholders for absent
/// fields. Running this twice produces the same object body as running it
/// once.
pub fn fixup_info_placeholders(doc: &mut Document) -> Result<()> {
    let Some(info_id) = store::info_id(doc) else {
        return Ok(());
    };

    let info = doc.get_object_mut(info_id)?.as_dict_mut()?;
    let placeholder_keys: Vec<Vec<u8>> = info
        .iter()
        .filter(|(_, value)| matches!(value, Object::String(s, _) if s.as_slice() == PLACEHOLDER))
        .map(|(key, _)| key.clone())
        .collect();

    for key in placeholder_keys {
        debug!("dropping placeholder info field {}", String::from_utf8_lossy(&key));
        info.remove(&key);
    }
    Ok(())
}
