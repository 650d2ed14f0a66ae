//! Shared fixtures: minimal in-memory DOCX packages.

use docaudit_docx::DocxPackage;

pub const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

pub fn wrap_body(inner: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><w:body>{inner}</w:body></w:document>"#
    )
}

/// A package with content types, a document body, and no media.
pub fn minimal_package(body_inner: &str) -> DocxPackage {
    DocxPackage::from_parts(vec![
        ("[Content_Types].xml".to_string(), CONTENT_TYPES.as_bytes().to_vec()),
        (
            "word/document.xml".to_string(),
            wrap_body(body_inner).into_bytes(),
        ),
    ])
}

/// A package whose body embeds images through the given relationship ids.
/// `present` controls which of them actually have a media part, so broken
/// relationships can be simulated.
pub fn package_with_images(body_inner: &str, rels: &[(&str, &str, bool)]) -> DocxPackage {
    let mut rels_xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for (id, target, _) in rels {
        rels_xml.push_str(&format!(
            r#"<Relationship Id="{id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="{target}"/>"#
        ));
    }
    rels_xml.push_str("</Relationships>");

    let mut parts = vec![
        ("[Content_Types].xml".to_string(), CONTENT_TYPES.as_bytes().to_vec()),
        (
            "word/document.xml".to_string(),
            wrap_body(body_inner).into_bytes(),
        ),
        ("word/_rels/document.xml.rels".to_string(), rels_xml.into_bytes()),
    ];
    for (i, (_, target, present)) in rels.iter().enumerate() {
        if *present {
            parts.push((format!("word/{target}"), vec![0x89, 0x50, 0x4e, 0x47, i as u8]));
        }
    }
    DocxPackage::from_parts(parts)
}

/// The reference scenario: one paragraph (unit 0) and one table (unit 1).
pub const SCENARIO_BODY: &str = "<w:p><w:r><w:t>R² value reported as 0.87</w:t></w:r></w:p>\
<w:tbl><w:tr><w:tc><w:p><w:r><w:t>Table 1: Summary</w:t></w:r></w:p></w:tc></w:tr></w:tbl>";
