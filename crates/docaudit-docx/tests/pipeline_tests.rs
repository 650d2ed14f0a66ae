//! End-to-end properties of the extraction and annotation pipeline.

mod common;

use common::{minimal_package, package_with_images, SCENARIO_BODY};
use docaudit_core::{ContentKind, Issue, Severity, UNRESOLVED_ELEMENT};
use docaudit_docx::{
    inject_markers, marker_id, CommentAuthor, CommentWriter, ContentWalker, DocxPackage,
};

fn make_issue(element_id: i64, category: ContentKind, original_text: &str) -> Issue {
    Issue {
        element_id,
        category,
        original_text: original_text.to_string(),
        severity: Severity::Major,
        description: "reported value disagrees with the regression output".to_string(),
        suggestion: "recompute the fit and update the text".to_string(),
    }
}

fn walk(pkg: &DocxPackage) -> docaudit_docx::Extraction {
    let dir = tempfile::tempdir().unwrap();
    let mut walker = ContentWalker::new(dir.path().join("images")).unwrap();
    walker.walk(pkg).unwrap()
}

fn marker_sequence(xml: &str) -> Vec<u32> {
    // Recover the injected sentinel ids in document order.
    xml.split("MARKER_ID_")
        .skip(1)
        .map(|rest| {
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().unwrap()
        })
        .collect()
}

#[test]
fn identifier_agreement_between_walker_and_injector() {
    let pkg = package_with_images(
        "<w:p><w:r><w:drawing><a:blip r:embed=\"rId5\"/></w:drawing></w:r>\
         <w:r><w:t>Figure 1 shows the dose response</w:t></w:r></w:p>\
         <w:tbl><w:tr><w:tc><w:p><w:r><w:t>Dose</w:t></w:r></w:p></w:tc></w:tr></w:tbl>\
         <w:p><w:r><w:t>Closing remarks</w:t></w:r></w:p>",
        &[("rId5", "media/image1.png", true)],
    );
    let extraction = walk(&pkg);

    // Walker: image 0, text 1, table 2, text 3.
    let unit_ids: Vec<u32> = extraction.units.iter().map(|u| u.id).collect();
    assert_eq!(unit_ids, vec![0, 1, 2, 3]);

    let marked = inject_markers(&pkg.document_xml().unwrap(), &extraction.plan).unwrap();
    // Injector: one marker per text/table unit, in the same order, with the
    // image id consumed invisibly.
    assert_eq!(marker_sequence(&marked), vec![1, 2, 3]);
}

#[test]
fn walker_roundtrip_stability() {
    let dir = tempfile::tempdir().unwrap();
    let pkg = package_with_images(
        "<w:p><w:r><w:drawing><a:blip r:embed=\"rId5\"/></w:drawing></w:r>\
         <w:r><w:t>caption</w:t></w:r></w:p>",
        &[("rId5", "media/image1.png", true)],
    );

    let first = ContentWalker::new(dir.path().join("img"))
        .unwrap()
        .walk(&pkg)
        .unwrap();
    let second = ContentWalker::new(dir.path().join("img"))
        .unwrap()
        .walk(&pkg)
        .unwrap();

    assert_eq!(first.units, second.units);
    assert_eq!(first.plan, second.plan);
}

#[test]
fn broken_image_relationship_skipped_not_counted() {
    let pkg = package_with_images(
        "<w:p>\
         <w:r><w:drawing><a:blip r:embed=\"rId5\"/></w:drawing></w:r>\
         <w:r><w:drawing><a:blip r:embed=\"rId6\"/></w:drawing></w:r>\
         <w:r><w:t>caption</w:t></w:r>\
         </w:p>",
        &[
            ("rId5", "media/missing.png", false),
            ("rId6", "media/image2.png", true),
        ],
    );
    let extraction = walk(&pkg);

    // The broken image is omitted; ids stay contiguous.
    assert_eq!(extraction.units.len(), 2);
    assert_eq!(extraction.units[0].kind, ContentKind::Image);
    assert_eq!(extraction.units[0].id, 0);
    assert_eq!(extraction.units[1].kind, ContentKind::Text);
    assert_eq!(extraction.units[1].id, 1);
}

#[test]
fn empty_document_yields_empty_list() {
    let pkg = minimal_package("");
    let extraction = walk(&pkg);
    assert!(extraction.units.is_empty());
    assert_eq!(extraction.plan.unit_count, 0);
}

#[test]
fn scenario_comment_anchors_via_text_match() {
    let pkg = minimal_package(SCENARIO_BODY);
    let issue = make_issue(0, ContentKind::Text, "0.87");

    let writer = CommentWriter::new();
    let commented = writer.annotate(&pkg, &[issue]).unwrap();
    let document = commented.document_xml().unwrap();

    // The range wraps the id-0 paragraph, not the table.
    let range_start = document.find("<w:commentRangeStart w:id=\"0\"/>").unwrap();
    let paragraph_text = document.find("R² value reported as 0.87").unwrap();
    let table = document.find("<w:tbl>").unwrap();
    assert!(range_start < paragraph_text);
    assert!(paragraph_text < table);
    assert!(document.contains("<w:commentReference w:id=\"0\"/>"));

    let comments = commented.part_str("word/comments.xml").unwrap();
    assert!(comments.contains("w:id=\"0\""));
    assert!(comments.contains("[Major] reported value disagrees"));
    assert!(comments.contains("Suggestion: recompute the fit"));
}

#[test]
fn comment_count_invariant_with_distinct_increasing_ids() {
    let pkg = minimal_package(
        "<w:p><w:r><w:t>first paragraph</w:t></w:r></w:p>\
         <w:p><w:r><w:t>second paragraph</w:t></w:r></w:p>\
         <w:p><w:r><w:t>third paragraph</w:t></w:r></w:p>",
    );
    let issues = vec![
        make_issue(0, ContentKind::Text, "first paragraph"),
        make_issue(1, ContentKind::Text, "second paragraph"),
        make_issue(2, ContentKind::Text, "third paragraph"),
    ];

    let commented = CommentWriter::new().annotate(&pkg, &issues).unwrap();
    let comments = commented.part_str("word/comments.xml").unwrap();
    for id in 0..3 {
        assert!(
            comments.contains(&format!("<w:comment w:id=\"{id}\"")),
            "missing comment id {id}"
        );
    }
    assert_eq!(comments.matches("<w:comment ").count(), 3);
}

#[test]
fn repeated_annotation_continues_id_sequence() {
    let pkg = minimal_package("<w:p><w:r><w:t>alpha beta gamma</w:t></w:r></w:p>");

    let first = CommentWriter::new()
        .annotate(&pkg, &[make_issue(0, ContentKind::Text, "alpha")])
        .unwrap();
    let second = CommentWriter::new()
        .annotate(&first, &[make_issue(0, ContentKind::Text, "beta")])
        .unwrap();

    let comments = second.part_str("word/comments.xml").unwrap();
    assert!(comments.contains("<w:comment w:id=\"0\""));
    assert!(comments.contains("<w:comment w:id=\"1\""));
    // The comments part is found, never duplicated.
    assert_eq!(
        second
            .part_str("[Content_Types].xml")
            .unwrap()
            .matches("/word/comments.xml")
            .count(),
        1
    );
}

#[test]
fn partial_failure_isolation() {
    let pkg = minimal_package(
        "<w:p><w:r><w:t>first paragraph</w:t></w:r></w:p>\
         <w:p><w:r><w:t>second paragraph</w:t></w:r></w:p>",
    );
    let issues = vec![
        make_issue(0, ContentKind::Text, "first paragraph"),
        make_issue(UNRESOLVED_ELEMENT, ContentKind::Text, ""),
        make_issue(1, ContentKind::Text, "second paragraph"),
    ];

    let commented = CommentWriter::new().annotate(&pkg, &issues).unwrap();
    let comments = commented.part_str("word/comments.xml").unwrap();

    // The unresolvable issue is skipped; the others land with ids 0 and 1.
    assert_eq!(comments.matches("<w:comment ").count(), 2);
    assert!(comments.contains("<w:comment w:id=\"0\""));
    assert!(comments.contains("<w:comment w:id=\"1\""));

    let document = commented.document_xml().unwrap();
    assert!(document.contains("<w:commentRangeStart w:id=\"0\"/>"));
    assert!(document.contains("<w:commentRangeStart w:id=\"1\"/>"));
}

#[test]
fn annotation_wires_content_type_and_relationship() {
    let pkg = minimal_package("<w:p><w:r><w:t>alpha</w:t></w:r></w:p>");
    let commented = CommentWriter::new()
        .annotate(&pkg, &[make_issue(0, ContentKind::Text, "alpha")])
        .unwrap();

    let content_types = commented.part_str("[Content_Types].xml").unwrap();
    assert!(content_types.contains("PartName=\"/word/comments.xml\""));
    assert!(content_types
        .contains("application/vnd.openxmlformats-officedocument.wordprocessingml.comments+xml"));

    let rels = commented
        .part_str("word/_rels/document.xml.rels")
        .unwrap();
    assert!(rels.contains("relationships/comments"));
    assert!(rels.contains("Target=\"comments.xml\""));
}

#[test]
fn zero_resolvable_issues_still_produces_document() {
    let pkg = minimal_package("<w:p><w:r><w:t>alpha</w:t></w:r></w:p>");
    let issues = vec![make_issue(UNRESOLVED_ELEMENT, ContentKind::Text, "")];

    let commented = CommentWriter::new().annotate(&pkg, &issues).unwrap();
    assert!(!commented.has_part("word/comments.xml"));
    assert_eq!(
        commented.document_xml().unwrap(),
        pkg.document_xml().unwrap()
    );
}

#[test]
fn image_issue_wraps_the_image_run() {
    let pkg = package_with_images(
        "<w:p>\
         <w:r><w:drawing><a:blip r:embed=\"rId5\"/></w:drawing></w:r>\
         <w:r><w:t>Figure 1</w:t></w:r>\
         </w:p>",
        &[("rId5", "media/image1.png", true)],
    );
    let issue = make_issue(0, ContentKind::Image, "");

    let commented = CommentWriter::new().annotate(&pkg, &[issue]).unwrap();
    let document = commented.document_xml().unwrap();

    let start = document.find("<w:commentRangeStart w:id=\"0\"/>").unwrap();
    let drawing = document.find("<w:drawing>").unwrap();
    let end = document.find("<w:commentRangeEnd w:id=\"0\"/>").unwrap();
    let caption = document.find("Figure 1").unwrap();
    assert!(start < drawing);
    assert!(drawing < end);
    assert!(end < caption, "range must close before the caption run");
}

#[test]
fn custom_author_metadata_lands_in_comment() {
    let pkg = minimal_package("<w:p><w:r><w:t>alpha</w:t></w:r></w:p>");
    let writer = CommentWriter::with_author(CommentAuthor {
        name: "QA Reviewer".to_string(),
        initials: "QA".to_string(),
    });
    let commented = writer
        .annotate(&pkg, &[make_issue(0, ContentKind::Text, "alpha")])
        .unwrap();
    let comments = commented.part_str("word/comments.xml").unwrap();
    assert!(comments.contains("w:author=\"QA Reviewer\""));
    assert!(comments.contains("w:initials=\"QA\""));
}

#[test]
fn annotated_package_survives_zip_roundtrip() {
    let pkg = minimal_package(SCENARIO_BODY);
    let commented = CommentWriter::new()
        .annotate(&pkg, &[make_issue(0, ContentKind::Text, "0.87")])
        .unwrap();

    let bytes = commented.to_bytes().unwrap();
    let reopened = DocxPackage::from_bytes(&bytes).unwrap();
    assert_eq!(
        reopened.document_xml().unwrap(),
        commented.document_xml().unwrap()
    );
    assert!(reopened.has_part("word/comments.xml"));
}

#[test]
fn marker_token_parses_back() {
    assert_eq!(marker_id("MARKER_ID_7"), Some(7));
}
