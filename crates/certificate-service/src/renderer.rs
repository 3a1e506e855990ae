//! Certificate renderer
//!
//! Lays out a single landscape page and returns the PDF bytes. The output is
//! a pure function of the input: no timestamps or random identifiers are
//! written, and the content stream is left uncompressed.

use ceu_common::CertificateTemplate;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

/// Page size in points (A4 landscape)
pub const PAGE_WIDTH: i64 = 842;
pub const PAGE_HEIGHT: i64 = 595;

pub const FALLBACK_TITLE: &str = "Continuing Education Certificate";
pub const FALLBACK_ISSUER: &str = "Issuer Organization";
pub const FOOTER: &str = "Generated by CEU Monster";

const LEFT_MARGIN: i64 = 60;
const FACTS_TOP: i64 = 360;
const FACTS_STEP: i64 = 22;

/// Renderer errors
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Failed to encode page content: {0}")]
    Content(String),

    #[error("Failed to write PDF: {0}")]
    Write(String),
}

/// Everything printed on a certificate
#[derive(Debug, Clone, Copy)]
pub struct CertificateInput<'a> {
    pub learner_name: &'a str,
    pub learner_email: &'a str,
    pub class_id: &'a str,
    pub redemption_id: &'a str,
    pub template: Option<&'a CertificateTemplate>,
    pub license_number: Option<&'a str>,
}

impl CertificateInput<'_> {
    pub fn title(&self) -> &str {
        self.template
            .map(|t| t.title.trim())
            .filter(|title| !title.is_empty())
            .unwrap_or(FALLBACK_TITLE)
    }

    fn issuer(&self) -> &str {
        self.template
            .map(|t| t.issuer_org_name.trim())
            .filter(|org| !org.is_empty())
            .unwrap_or(FALLBACK_ISSUER)
    }

    fn recipient(&self) -> &str {
        let name = self.learner_name.trim();
        if name.is_empty() {
            self.learner_email
        } else {
            name
        }
    }

    /// The key-facts block, top to bottom
    pub fn fact_lines(&self) -> Vec<String> {
        let hours = self.template.map(|t| t.ceu_hours).unwrap_or(0.0);
        let mode = self.template.map(|t| t.mode()).unwrap_or_default();

        let mut lines = vec![
            format!("CEU Hours: {hours}"),
            format!("Class ID: {}", self.class_id),
            format!("Certificate ID: {}", self.redemption_id),
            format!("Mode: {}", mode.as_str()),
        ];
        if let Some(license) = self
            .license_number
            .map(str::trim)
            .filter(|license| !license.is_empty())
        {
            lines.push(format!("License Number: {license}"));
        }
        lines
    }
}

#[derive(Clone, Copy)]
enum Face {
    Regular,
    Bold,
}

impl Face {
    fn resource(self) -> &'static str {
        match self {
            Face::Regular => "F1",
            Face::Bold => "F2",
        }
    }
}

/// Accumulates drawing operations for one page
struct Page {
    operations: Vec<Operation>,
}

impl Page {
    fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    fn fill_background(&mut self) {
        self.set_color(1.0, 1.0, 1.0);
        self.operations.push(Operation::new(
            "re",
            vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        ));
        self.operations.push(Operation::new("f", vec![]));
    }

    fn set_color(&mut self, r: f32, g: f32, b: f32) {
        self.operations.push(Operation::new(
            "rg",
            vec![Object::Real(r.into()), Object::Real(g.into()), Object::Real(b.into())],
        ));
    }

    fn text(&mut self, text: &str, y: i64, size: i64, face: Face, gray: f32) {
        self.set_color(gray, gray, gray);
        self.operations.push(Operation::new("BT", vec![]));
        self.operations.push(Operation::new(
            "Tf",
            vec![face.resource().into(), size.into()],
        ));
        self.operations
            .push(Operation::new("Td", vec![LEFT_MARGIN.into(), y.into()]));
        self.operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(win_ansi(text))],
        ));
        self.operations.push(Operation::new("ET", vec![]));
    }

    fn encode(self) -> Result<Vec<u8>, RenderError> {
        Content {
            operations: self.operations,
        }
        .encode()
        .map_err(|e| RenderError::Content(e.to_string()))
    }
}

/// Render a certificate to PDF bytes
pub fn render_certificate(input: &CertificateInput<'_>) -> Result<Vec<u8>, RenderError> {
    let mut page = Page::new();
    page.fill_background();

    page.text(input.title(), 515, 28, Face::Bold, 0.1);
    page.text(&format!("Issued by: {}", input.issuer()), 485, 14, Face::Regular, 0.2);
    if let Some(instructor) = input.template.and_then(CertificateTemplate::instructor) {
        page.text(&format!("Instructor: {instructor}"), 465, 14, Face::Regular, 0.2);
    }

    page.text("Awarded to:", 430, 14, Face::Bold, 0.15);
    page.text(input.recipient(), 405, 22, Face::Bold, 0.0);

    let mut y = FACTS_TOP;
    for line in input.fact_lines() {
        page.text(&line, y, 14, Face::Regular, 0.2);
        y -= FACTS_STEP;
    }

    page.text(FOOTER, 60, 10, Face::Regular, 0.5);

    build_document(page.encode()?)
}

fn build_document(content: Vec<u8>) -> Result<Vec<u8>, RenderError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| RenderError::Write(e.to_string()))?;
    Ok(bytes)
}

/// Standard fonts use WinAnsi (CP1252); characters it cannot draw become `?`
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(|c| win_ansi_byte(c).unwrap_or(b'?')).collect()
}

fn win_ansi_byte(c: char) -> Option<u8> {
    let byte = match c {
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        // C1 controls have no glyph in CP1252
        '\u{0080}'..='\u{009F}' => return None,
        _ => return u8::try_from(u32::from(c)).ok(),
    };
    Some(byte)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contains(haystack: &[u8], needle: &str) -> bool {
        haystack
            .windows(needle.len())
            .any(|window| window == needle.as_bytes())
    }

    fn template() -> CertificateTemplate {
        serde_json::from_value(json!({
            "title": "HVAC 101",
            "ceuHours": 3,
            "issuerOrgName": "Acme",
            "instructorName": "  Grace Hopper ",
            "qrMode": "test"
        }))
        .unwrap()
    }

    fn input<'a>(template: Option<&'a CertificateTemplate>) -> CertificateInput<'a> {
        CertificateInput {
            learner_name: "Ada Lovelace",
            learner_email: "ada@example.com",
            class_id: "C1",
            redemption_id: "R1",
            template,
            license_number: None,
        }
    }

    #[test]
    fn test_renders_pdf_document() {
        let template = template();
        let bytes = render_certificate(&input(Some(&template))).unwrap();

        assert!(bytes.starts_with(b"%PDF-1.5"));
        assert!(contains(&bytes, "(HVAC 101) Tj"));
        assert!(contains(&bytes, "(Issued by: Acme) Tj"));
        assert!(contains(&bytes, "(Instructor: Grace Hopper) Tj"));
        assert!(contains(&bytes, "(Ada Lovelace) Tj"));
        assert!(contains(&bytes, "(CEU Hours: 3) Tj"));
        assert!(contains(&bytes, "(Mode: test) Tj"));
        assert!(contains(&bytes, "Generated by CEU Monster"));
        assert!(contains(&bytes, "/Helvetica-Bold"));
    }

    #[test]
    fn test_missing_template_uses_fallbacks() {
        let bytes = render_certificate(&input(None)).unwrap();

        assert!(contains(&bytes, "(Continuing Education Certificate) Tj"));
        assert!(contains(&bytes, "(Issued by: Issuer Organization) Tj"));
        assert!(contains(&bytes, "(CEU Hours: 0) Tj"));
        assert!(contains(&bytes, "(Mode: live) Tj"));
        assert!(!contains(&bytes, "Instructor:"));
    }

    #[test]
    fn test_license_line_only_when_supplied() {
        let mut with_license = input(None);
        with_license.license_number = Some("LIC-42");
        assert!(contains(
            &render_certificate(&with_license).unwrap(),
            "(License Number: LIC-42) Tj"
        ));

        with_license.license_number = Some("   ");
        assert_eq!(with_license.fact_lines().len(), 4);
        assert!(!contains(
            &render_certificate(&input(None)).unwrap(),
            "License Number"
        ));
    }

    #[test]
    fn test_blank_name_falls_back_to_email() {
        let mut anonymous = input(None);
        anonymous.learner_name = "";
        let bytes = render_certificate(&anonymous).unwrap();
        assert!(contains(&bytes, "(ada@example.com) Tj"));
    }

    #[test]
    fn test_fractional_hours() {
        let mut template = template();
        template.ceu_hours = 1.5;
        assert_eq!(input(Some(&template)).fact_lines()[0], "CEU Hours: 1.5");
    }

    #[test]
    fn test_output_is_deterministic() {
        let template = template();
        let first = render_certificate(&input(Some(&template))).unwrap();
        let second = render_certificate(&input(Some(&template))).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_non_latin_text_is_replaced() {
        assert_eq!(win_ansi("Zoë 李"), b"Zo\xeb ?".to_vec());
    }

    #[test]
    fn test_typographic_punctuation_uses_win_ansi_codes() {
        assert_eq!(win_ansi("O\u{2019}Brien"), b"O\x92Brien".to_vec());
        assert_eq!(
            win_ansi("A \u{2014} B \u{2013} \u{201C}Zo\u{EB}\u{201D} \u{20AC}5\u{2026}"),
            b"A \x97 B \x96 \x93Zo\xEB\x94 \x805\x85".to_vec()
        );
    }

    #[test]
    fn test_unmappable_characters_become_question_marks() {
        assert_eq!(win_ansi("\u{0081}\u{4E2D}\u{1F600}"), b"???".to_vec());
    }
}
