//! Turns one submitted file into plain text plus any images it carries.
//!
//! Dispatch is by extension first and falls back to magic-byte sniffing.
//! Nothing here returns an error to the caller: every failure becomes a
//! bracketed placeholder in the text so a single bad upload never stops a
//! batch.

use std::io::{Cursor, Read};
use std::panic::{self, AssertUnwindSafe};

use docx_rs::{
    read_docx, DocumentChild, Insert, InsertChild, Paragraph, ParagraphChild, Run, RunChild,
    StructuredDataTag, StructuredDataTagChild, Table, TableCellContent, TableChild, TableRowChild,
};
use encoding_rs::UTF_16LE;
use image::GenericImageView;
use pdf_extract::extract_text_from_mem_by_pages;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::config::GraderConfig;
use crate::error::DecodeError;
use crate::submission::SubmissionImage;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"];
pub const UNSUPPORTED_BINARY_TEXT: &str = "Binary data of unsupported file type";
pub const PDF_IMAGE_NOTE: &str = "[Note: Images in PDF files are not automatically extracted]";

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const DOC_MIME: &str = "application/msword";
const DOCX_MEDIA_PREFIX: &str = "word/media/";

/// Text and images recovered from one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedFile {
    pub text: String,
    pub images: Vec<SubmissionImage>,
}

impl DecodedFile {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            images: Vec::new(),
        }
    }
}

/// Width, height and detected format of a successfully decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: Option<image::ImageFormat>,
}

#[derive(Debug, Clone)]
pub struct FormatDecoder {
    html_wrap_width: usize,
}

impl Default for FormatDecoder {
    fn default() -> Self {
        Self::new(&GraderConfig::default())
    }
}

impl FormatDecoder {
    pub fn new(config: &GraderConfig) -> Self {
        Self {
            html_wrap_width: config.html_wrap_width.max(1),
        }
    }

    /// Decodes `data`, using `filename` (which may include directories) for
    /// dispatch and for the names shown in placeholders.
    pub fn decode(&self, data: &[u8], filename: &str) -> DecodedFile {
        let display_name = base_name(filename);
        let extension = extension_of(display_name);
        debug!(file = filename, extension = ?extension, "Decoding submission file");

        match extension.as_deref() {
            Some("txt") => DecodedFile::text(decode_text_bytes(data)),
            Some("docx") => self.decode_docx(data, display_name),
            Some("pdf") => self.decode_pdf(data, display_name),
            Some("html") | Some("htm") => self.decode_html(data),
            Some("reg") => DecodedFile::text(decode_utf16(data)),
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => image_file(data, display_name, ext),
            _ => self.decode_by_content(data, display_name),
        }
    }

    fn decode_by_content(&self, data: &[u8], display_name: &str) -> DecodedFile {
        let Some(kind) = infer::get(data) else {
            return match std::str::from_utf8(data) {
                Ok(text) => DecodedFile::text(text.trim()),
                Err(_) => DecodedFile::text(UNSUPPORTED_BINARY_TEXT),
            };
        };

        let mime = kind.mime_type();
        if let Some(subtype) = mime.strip_prefix("image/") {
            return image_file(data, display_name, subtype);
        }

        match mime {
            DOCX_MIME | DOC_MIME => self.decode_docx(data, display_name),
            "application/pdf" => self.decode_pdf(data, display_name),
            _ => {
                warn!(file = display_name, mime, "Unsupported file type");
                DecodedFile::text(format!("[Unsupported file type: {mime}]"))
            }
        }
    }

    fn decode_docx(&self, data: &[u8], display_name: &str) -> DecodedFile {
        let text = match extract_docx_text(data) {
            Ok(text) => normalize_document_text(&text),
            Err(err) => return file_error(display_name, &err),
        };

        let description = format!("Image from document: {display_name}");
        let images: Vec<SubmissionImage> = match extract_docx_media(data) {
            Ok(media) => media
                .into_iter()
                .filter_map(|(media_name, bytes)| match decode_image(&bytes) {
                    Ok(info) => Some(SubmissionImage::new(
                        bytes,
                        image_format_tag(&media_name, info.format),
                        description.clone(),
                        info.width,
                        info.height,
                    )),
                    Err(err) => {
                        warn!(file = display_name, media = %media_name, "Skipping embedded image: {err}");
                        None
                    }
                })
                .collect(),
            Err(err) => {
                warn!(file = display_name, "Unable to scan embedded media: {err}");
                Vec::new()
            }
        };

        let mut text = text;
        if !images.is_empty() {
            text.push_str(&format!(
                "\n\n[This document contains {} image(s)]",
                images.len()
            ));
        }

        DecodedFile {
            text: text.trim().to_string(),
            images,
        }
    }

    fn decode_pdf(&self, data: &[u8], display_name: &str) -> DecodedFile {
        match extract_pdf_pages(data) {
            Ok(pages) => {
                let mut content = String::new();
                for page in pages {
                    content.push_str(&page);
                    content.push('\n');
                }
                let mut text = normalize_document_text(&content);
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(PDF_IMAGE_NOTE);
                DecodedFile::text(text)
            }
            Err(err) => file_error(display_name, &err),
        }
    }

    fn decode_html(&self, data: &[u8]) -> DecodedFile {
        let text = html2text::from_read(Cursor::new(data), self.html_wrap_width);
        DecodedFile::text(text.trim())
    }
}

/// Validates image bytes and reports their dimensions.
pub fn decode_image(data: &[u8]) -> Result<ImageInfo, DecodeError> {
    let format = image::guess_format(data).ok();
    let (width, height) = image::load_from_memory(data)?.dimensions();
    Ok(ImageInfo {
        width,
        height,
        format,
    })
}

/// Plain text: UTF-8, then UTF-16, then Latin-1. Always yields a string.
pub fn decode_text_bytes(data: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(data) {
        return text.trim_start_matches('\u{FEFF}').trim().to_string();
    }

    let (text, _, had_errors) = UTF_16LE.decode(data);
    if !had_errors {
        return text.trim().to_string();
    }

    let latin1: String = data.iter().map(|&byte| char::from(byte)).collect();
    latin1.trim().to_string()
}

fn decode_utf16(data: &[u8]) -> String {
    let (text, _, had_errors) = UTF_16LE.decode(data);
    if had_errors {
        warn!("UTF-16 registry text contained invalid sequences");
    }
    text.trim().to_string()
}

pub fn is_image_file(filename: &str) -> bool {
    extension_of(filename).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Final path component, accepting both separators.
pub fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn extension_of(filename: &str) -> Option<String> {
    let name = base_name(filename);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn image_file(data: &[u8], display_name: &str, format_tag: &str) -> DecodedFile {
    match decode_image(data) {
        Ok(info) => DecodedFile {
            text: format!("[Image file: {display_name}]"),
            images: vec![SubmissionImage::new(
                data.to_vec(),
                format_tag.to_string(),
                format!("Image from file: {display_name}"),
                info.width,
                info.height,
            )],
        },
        Err(err) => {
            warn!(file = display_name, "Error processing image file: {err}");
            DecodedFile::text(format!("[Error processing image file: {display_name}]"))
        }
    }
}

fn image_format_tag(media_name: &str, format: Option<image::ImageFormat>) -> String {
    extension_of(media_name)
        .or_else(|| {
            format
                .and_then(|format| format.extensions_str().first().copied())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

fn file_error(display_name: &str, err: &DecodeError) -> DecodedFile {
    warn!(file = display_name, "Error processing file: {err}");
    DecodedFile::text(format!("[Error processing file: {display_name}]"))
}

fn extract_pdf_pages(data: &[u8]) -> Result<Vec<String>, DecodeError> {
    // pdf-extract panics on some malformed input.
    panic::catch_unwind(AssertUnwindSafe(|| extract_text_from_mem_by_pages(data)))
        .map_err(|_| DecodeError::Pdf("the PDF parser aborted".into()))?
        .map_err(|err| DecodeError::Pdf(err.to_string()))
}

/// Raw payloads under `word/media/` that look like images, in archive order.
fn extract_docx_media(data: &[u8]) -> Result<Vec<(String, Vec<u8>)>, DecodeError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut media = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        if entry.is_dir() || !name.starts_with(DOCX_MEDIA_PREFIX) || !is_image_file(&name) {
            continue;
        }

        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        media.push((name, bytes));
    }

    Ok(media)
}

fn extract_docx_text(data: &[u8]) -> Result<String, DecodeError> {
    let package = read_docx(data).map_err(|err| DecodeError::Docx(err.to_string()))?;
    let mut segments = Vec::new();

    for child in &package.document.children {
        collect_docx_child_text(child, &mut segments);
    }

    Ok(segments.join("\n"))
}

fn normalize_document_text(text: &str) -> String {
    let normalized = text
        .replace('\u{0000}', "")
        .trim_start_matches('\u{FEFF}')
        .replace("\r\n", "\n")
        .replace('\r', "\n");

    let lines: Vec<&str> = normalized.lines().map(str::trim_end).collect();
    lines.join("\n").trim().to_string()
}

fn collect_docx_child_text(child: &DocumentChild, segments: &mut Vec<String>) {
    match child {
        DocumentChild::Paragraph(paragraph) => {
            if let Some(text) = collect_docx_paragraph_text(paragraph.as_ref(), segments) {
                segments.push(text);
            }
        }
        DocumentChild::Table(table) => collect_docx_table_text(table.as_ref(), segments),
        DocumentChild::StructuredDataTag(tag) => {
            collect_docx_structured_data_tag(tag.as_ref(), segments)
        }
        _ => {}
    }
}

fn collect_docx_paragraph_text(
    paragraph: &Paragraph,
    segments: &mut Vec<String>,
) -> Option<String> {
    let mut buffer = String::new();
    for child in &paragraph.children {
        append_paragraph_child_text(child, &mut buffer, segments);
    }

    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn collect_docx_table_text(table: &Table, segments: &mut Vec<String>) {
    for row in &table.rows {
        let TableChild::TableRow(row) = row;

        for cell in &row.cells {
            let TableRowChild::TableCell(cell) = cell;

            for content in &cell.children {
                match content {
                    TableCellContent::Paragraph(paragraph) => {
                        if let Some(text) = collect_docx_paragraph_text(paragraph, segments) {
                            segments.push(text);
                        }
                    }
                    TableCellContent::Table(inner) => collect_docx_table_text(inner, segments),
                    TableCellContent::StructuredDataTag(tag) => {
                        collect_docx_structured_data_tag(tag.as_ref(), segments);
                    }
                    TableCellContent::TableOfContents(_) => {}
                }
            }
        }
    }
}

fn collect_docx_structured_data_tag(tag: &StructuredDataTag, segments: &mut Vec<String>) {
    let mut buffer = String::new();
    append_structured_data_tag_text(tag, &mut buffer, segments);
    let trimmed = buffer.trim();
    if !trimmed.is_empty() {
        segments.push(trimmed.to_string());
    }
}

fn append_paragraph_child_text(
    child: &ParagraphChild,
    buffer: &mut String,
    segments: &mut Vec<String>,
) {
    match child {
        ParagraphChild::Run(run) => append_run_text(run.as_ref(), buffer),
        ParagraphChild::Insert(insert) => append_insert_text(insert, buffer),
        ParagraphChild::Hyperlink(hyperlink) => {
            for inner in &hyperlink.children {
                append_paragraph_child_text(inner, buffer, segments);
            }
        }
        ParagraphChild::StructuredDataTag(tag) => {
            append_structured_data_tag_text(tag.as_ref(), buffer, segments);
        }
        ParagraphChild::BookmarkStart(_) | ParagraphChild::BookmarkEnd(_) => {}
        ParagraphChild::CommentStart(_) | ParagraphChild::CommentEnd(_) => {}
        ParagraphChild::Delete(_) => {}
        ParagraphChild::PageNum(_) | ParagraphChild::NumPages(_) => {}
    }
}

fn append_insert_text(insert: &Insert, buffer: &mut String) {
    for child in &insert.children {
        match child {
            InsertChild::Run(run) => append_run_text(run.as_ref(), buffer),
            InsertChild::Delete(_) => {}
            InsertChild::CommentStart(_) | InsertChild::CommentEnd(_) => {}
        }
    }
}

fn append_structured_data_tag_text(
    tag: &StructuredDataTag,
    buffer: &mut String,
    segments: &mut Vec<String>,
) {
    for child in &tag.children {
        match child {
            StructuredDataTagChild::Run(run) => append_run_text(run.as_ref(), buffer),
            StructuredDataTagChild::Paragraph(paragraph) => {
                if let Some(text) = collect_docx_paragraph_text(paragraph.as_ref(), segments) {
                    if !buffer.is_empty() && !buffer.ends_with('\n') && !buffer.ends_with(' ') {
                        buffer.push(' ');
                    }
                    buffer.push_str(&text);
                }
            }
            StructuredDataTagChild::Table(table) => {
                collect_docx_table_text(table.as_ref(), segments)
            }
            StructuredDataTagChild::StructuredDataTag(inner) => {
                append_structured_data_tag_text(inner.as_ref(), buffer, segments);
            }
            StructuredDataTagChild::BookmarkStart(_) | StructuredDataTagChild::BookmarkEnd(_) => {}
            StructuredDataTagChild::CommentStart(_) | StructuredDataTagChild::CommentEnd(_) => {}
        }
    }
}

fn append_run_text(run: &Run, buffer: &mut String) {
    for child in &run.children {
        match child {
            RunChild::Text(text) => buffer.push_str(&text.text),
            RunChild::Break(_) => buffer.push('\n'),
            RunChild::Tab(_) | RunChild::PTab(_) => buffer.push('\t'),
            RunChild::Sym(sym) => {
                if let Some(ch) = u32::from_str_radix(&sym.char, 16)
                    .ok()
                    .and_then(char::from_u32)
                {
                    buffer.push(ch);
                }
            }
            RunChild::InstrTextString(value) => buffer.push_str(value),
            RunChild::DeleteText(_) => {}
            RunChild::FieldChar(_) => {}
            RunChild::Drawing(_) => {}
            RunChild::Shape(_) => {}
            RunChild::CommentStart(_) | RunChild::CommentEnd(_) => {}
            RunChild::FootnoteReference(_) => {}
            RunChild::Shading(_) => {}
            RunChild::InstrText(_) => {}
            RunChild::DeleteInstrText(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(2, 3, Rgb([200u8, 10, 10])));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn plain_text_is_trimmed_utf8() {
        let decoder = FormatDecoder::default();
        let decoded = decoder.decode(b"  print('hi')\n", "answer.txt");
        assert_eq!(decoded.text, "print('hi')");
        assert!(decoded.images.is_empty());
    }

    #[test]
    fn invalid_utf8_falls_back_to_utf16() {
        let mut data = vec![0xFF, 0xFE];
        for unit in "héllo".encode_utf16() {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        assert!(std::str::from_utf8(&data).is_err());
        assert_eq!(decode_text_bytes(&data), "héllo");
    }

    #[test]
    fn invalid_everywhere_falls_back_to_latin1() {
        let data = [0xC3, 0x28, 0x41];
        assert_eq!(decode_text_bytes(&data), "Ã(A");
    }

    #[test]
    fn registry_files_decode_as_utf16() {
        let mut data = vec![0xFF, 0xFE];
        for unit in "Windows Registry Editor\r\n".encode_utf16() {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        let decoded = FormatDecoder::default().decode(&data, "settings.REG");
        assert_eq!(decoded.text, "Windows Registry Editor");
    }

    #[test]
    fn image_extension_attaches_image() {
        let decoded = FormatDecoder::default().decode(&png_bytes(), "folder/diagram.PNG");
        assert_eq!(decoded.text, "[Image file: diagram.PNG]");
        assert_eq!(decoded.images.len(), 1);
        let image = &decoded.images[0];
        assert_eq!(image.format, "png");
        assert_eq!(image.description, "Image from file: diagram.PNG");
        assert_eq!((image.width, image.height), (2, 3));
    }

    #[test]
    fn corrupt_image_yields_placeholder() {
        let decoded = FormatDecoder::default().decode(b"not really a jpeg", "photo.jpg");
        assert_eq!(decoded.text, "[Error processing image file: photo.jpg]");
        assert!(decoded.images.is_empty());
    }

    #[test]
    fn sniffed_image_without_extension() {
        let decoded = FormatDecoder::default().decode(&png_bytes(), "upload");
        assert_eq!(decoded.text, "[Image file: upload]");
        assert_eq!(decoded.images[0].format, "png");
    }

    #[test]
    fn unknown_binary_gets_fixed_text() {
        let decoded = FormatDecoder::default().decode(&[0x80, 0x81, 0x82, 0x83], "blob.bin");
        assert_eq!(decoded.text, UNSUPPORTED_BINARY_TEXT);
    }

    #[test]
    fn unknown_extension_with_utf8_content() {
        let decoded = FormatDecoder::default().decode(b"fn main() {}\n", "main.rs");
        assert_eq!(decoded.text, "fn main() {}");
    }

    #[test]
    fn identified_but_unsupported_mime() {
        let mut data = b"\x1F\x8B\x08\x00".to_vec();
        data.extend_from_slice(&[0u8; 16]);
        let decoded = FormatDecoder::default().decode(&data, "archive.bin");
        assert_eq!(decoded.text, "[Unsupported file type: application/gzip]");
        assert!(decoded.images.is_empty());
    }

    #[test]
    fn sniffed_rtf_is_unsupported() {
        let data = b"{\\rtf1\\ansi\\deff0 {\\fonttbl {\\f0 Times;}}\\pard Hello RTF\\par}";
        let decoded = FormatDecoder::default().decode(data, "upload");
        assert_eq!(decoded.text, "[Unsupported file type: application/rtf]");
        assert!(decoded.images.is_empty());
    }

    /// Single-page PDF with one line of Helvetica text and a valid xref table.
    fn one_page_pdf(text: &str) -> Vec<u8> {
        let content = format!("BT /F1 24 Tf 72 720 Td ({text}) Tj ET");
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
/Resources << /Font << /F1 5 0 R >> >> >>"
                .to_string(),
            format!(
                "<< /Length {} >>\nstream\n{content}\nendstream",
                content.len()
            ),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (index, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", index + 1).as_bytes());
        }

        let xref_offset = pdf.len();
        pdf.extend_from_slice(
            format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes(),
        );
        for offset in offsets {
            pdf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        pdf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
                objects.len() + 1
            )
            .as_bytes(),
        );
        pdf
    }

    #[test]
    fn pdf_text_is_followed_by_image_note() {
        let decoded = FormatDecoder::default().decode(&one_page_pdf("Hello PDF"), "essay.pdf");
        assert_eq!(
            decoded.text,
            format!("Hello PDF\n\n{PDF_IMAGE_NOTE}")
        );
        assert!(decoded.images.is_empty());
    }

    #[test]
    fn sniffed_pdf_without_extension() {
        let decoded = FormatDecoder::default().decode(&one_page_pdf("Sniffed"), "upload");
        assert!(decoded.text.starts_with("Sniffed"));
        assert!(decoded.text.ends_with(PDF_IMAGE_NOTE));
    }

    #[test]
    fn html_tags_are_stripped() {
        let decoded =
            FormatDecoder::default().decode(b"<html><body><p>Hello <b>there</b></p>", "a.html");
        assert!(decoded.text.contains("Hello"));
        assert!(decoded.text.contains("there"));
        assert!(!decoded.text.contains("<p>"));
    }

    #[test]
    fn malformed_html_does_not_fail() {
        let decoded = FormatDecoder::default().decode(b"<div><p>open <<>> </span", "broken.html");
        assert!(decoded.text.contains("open"));
    }

    #[test]
    fn corrupt_documents_become_placeholders() {
        let decoder = FormatDecoder::default();
        assert_eq!(
            decoder.decode(b"not a zip", "essay.docx").text,
            "[Error processing file: essay.docx]"
        );
        assert_eq!(
            decoder.decode(b"not a pdf", "essay.pdf").text,
            "[Error processing file: essay.pdf]"
        );
    }

    #[test]
    fn decoding_is_idempotent() {
        let decoder = FormatDecoder::default();
        let data = png_bytes();
        assert_eq!(decoder.decode(&data, "a.png"), decoder.decode(&data, "a.png"));
        assert_eq!(decoder.decode(b"abc", "a.txt"), decoder.decode(b"abc", "a.txt"));
    }

    #[test]
    fn base_name_handles_both_separators() {
        assert_eq!(base_name("a/b/c.txt"), "c.txt");
        assert_eq!(base_name("a\\b\\c.txt"), "c.txt");
        assert_eq!(base_name("c.txt"), "c.txt");
    }
}
