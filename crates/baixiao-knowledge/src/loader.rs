//! Source loaders: local documents (text, markdown, PDF, DOCX) and web pages.

use baixiao_core::error::{BaixiaoError, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::Read;
use std::path::Path;

/// Raw text extracted from one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source: String,
    pub content: String,
}

/// File extensions read as plain UTF-8 text.
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

pub fn is_web_source(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn ingestion(message: String) -> BaixiaoError {
    BaixiaoError::Ingestion(message)
}

/// Load a local file by extension.
pub fn load_file(path: &Path) -> Result<Document> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let content = match ext.as_str() {
        e if TEXT_EXTENSIONS.contains(&e) => std::fs::read_to_string(path)
            .map_err(|e| ingestion(format!("Failed to read {}: {e}", path.display())))?,
        "pdf" => read_pdf(path)?,
        "docx" => read_docx(path)?,
        _ => return Err(ingestion(format!("Unsupported file format: .{ext}"))),
    };
    Ok(Document {
        source: path.display().to_string(),
        content,
    })
}

/// Text of every page, in page order.
fn read_pdf(path: &Path) -> Result<String> {
    let doc = lopdf::Document::load(path)
        .map_err(|e| ingestion(format!("Failed to load PDF {}: {e}", path.display())))?;

    let mut text = String::new();
    for page_num in doc.get_pages().keys() {
        let content = doc
            .extract_text(&[*page_num])
            .map_err(|e| ingestion(format!("Failed to extract page {page_num} of {}: {e}", path.display())))?;
        text.push_str(&content);
        text.push('\n');
    }
    Ok(text)
}

/// DOCX files are ZIP archives; the body lives in `word/document.xml`.
fn read_docx(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)
        .map_err(|e| ingestion(format!("Failed to open {}: {e}", path.display())))?;
    let mut archive = zip::ZipArchive::new(std::io::BufReader::new(file))
        .map_err(|e| ingestion(format!("Not a DOCX archive {}: {e}", path.display())))?;
    let mut entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ingestion(format!("Cannot find word/document.xml: {e}")))?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    docx_paragraphs(&xml).map(|paragraphs| paragraphs.join("\n\n"))
}

/// Non-empty `w:p` paragraphs of a WordprocessingML body.
fn docx_paragraphs(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:t" => in_text = true,
                b"w:p" => current.clear(),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:br" => current.push('\n'),
                b"w:tab" => current.push('\t'),
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    let para = current.trim();
                    if !para.is_empty() {
                        paragraphs.push(para.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let text = e
                    .unescape()
                    .map_err(|e| ingestion(format!("Invalid DOCX text: {e}")))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ingestion(format!(
                    "DOCX XML error at position {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }
    Ok(paragraphs)
}

/// Fetch a web page and reduce it to text.
pub async fn load_web(client: &reqwest::Client, url: &str) -> Result<Document> {
    let resp = client
        .get(url)
        .header("User-Agent", concat!("baixiao/", env!("CARGO_PKG_VERSION")))
        .send()
        .await
        .map_err(|e| BaixiaoError::Http(format!("Fetch failed ({url}): {e}")))?;
    if !resp.status().is_success() {
        return Err(ingestion(format!("Fetch {url} returned {}", resp.status())));
    }
    let is_html = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_none_or(|ct| ct.contains("html"));
    let body = resp
        .text()
        .await
        .map_err(|e| BaixiaoError::Http(e.to_string()))?;
    let content = if is_html { html_to_text(&body).await? } else { body };
    Ok(Document {
        source: url.to_string(),
        content,
    })
}

/// Readable text of an HTML page (scripts, styles and markup dropped).
pub async fn html_to_text(html: &str) -> Result<String> {
    let config = kreuzberg::ExtractionConfig::default();
    let result = kreuzberg::extract_bytes(html.as_bytes(), "text/html", &config)
        .await
        .map_err(|e| ingestion(format!("HTML extraction failed: {e}")))?;
    Ok(result.content)
}
