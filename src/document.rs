//! Decodificación de documentos subidos a texto plano.
//!
//! Formatos soportados: txt/md (con varias codificaciones), PDF, DOCX
//! (párrafos y después filas de tablas) y CSV (filas unidas con ` | `).

use std::io::Read;

use encoding_rs::{Encoding, ISO_8859_2, WINDOWS_1250};
use quick_xml::events::Event;
use thiserror::Error;

use crate::models::FileType;

/// Máximo de bytes descomprimidos que se leen de `word/document.xml`.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("nieobsługiwany typ pliku: .{0}")]
    Unsupported(String),

    #[error("błąd PDF: {0}")]
    Pdf(String),

    #[error("błąd DOCX: {0}")]
    Docx(String),

    #[error("błąd CSV: {0}")]
    Csv(String),
}

/// Extensión en minúsculas tal y como se muestra en los mensajes de error.
pub fn extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

/// Convierte los bytes de un fichero en texto según su extensión.
pub fn decode(filename: &str, bytes: &[u8]) -> Result<String, DecodeError> {
    match FileType::from_filename(filename) {
        FileType::Txt | FileType::Md => Ok(decode_plain_text(bytes)),
        FileType::Pdf => pdf_extract::extract_text_from_mem(bytes).map_err(|e| DecodeError::Pdf(e.to_string())),
        FileType::Docx => decode_docx(bytes),
        FileType::Csv => decode_csv(bytes),
        FileType::Cms | FileType::Unknown => Err(DecodeError::Unsupported(extension(filename))),
    }
}

/// Orden de intento: BOM (UTF-8/UTF-16), UTF-8, Windows-1250, ISO-8859-2 y,
/// como último recurso, UTF-8 con sustitución.
fn decode_plain_text(bytes: &[u8]) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }
    for encoding in [WINDOWS_1250, ISO_8859_2] {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return text.into_owned();
        }
    }
    String::from_utf8_lossy(bytes).into_owned()
}

fn decode_csv(bytes: &[u8]) -> Result<String, DecodeError> {
    let text = String::from_utf8_lossy(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| DecodeError::Csv(e.to_string()))?;
        rows.push(record.iter().collect::<Vec<_>>().join(" | "));
    }
    Ok(rows.join("\n"))
}

fn decode_docx(bytes: &[u8]) -> Result<String, DecodeError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| DecodeError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| DecodeError::Docx("word/document.xml not found".to_string()))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| DecodeError::Docx(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(DecodeError::Docx("word/document.xml exceeds size limit".to_string()));
    }

    flatten_document_xml(&xml)
}

/// Recorre `word/document.xml`: los párrafos de primer nivel van primero y
/// después cada fila de tabla como celdas unidas por ` | `.
fn flatten_document_xml(xml: &[u8]) -> Result<String, DecodeError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut paragraphs: Vec<String> = Vec::new();
    let mut table_rows: Vec<String> = Vec::new();
    let mut table_depth = 0usize;
    let mut in_text = false;
    let mut paragraph = String::new();
    let mut cell = String::new();
    let mut row: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"tbl" => table_depth += 1,
                b"tr" if table_depth == 1 => row.clear(),
                b"tc" if table_depth == 1 => cell.clear(),
                b"p" => paragraph.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => paragraph.push('\t'),
                b"br" | b"cr" => paragraph.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| DecodeError::Docx(e.to_string()))?;
                paragraph.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if table_depth == 0 => {
                    if !paragraph.is_empty() {
                        paragraphs.push(std::mem::take(&mut paragraph));
                    }
                }
                b"p" => {
                    if !cell.is_empty() {
                        cell.push('\n');
                    }
                    cell.push_str(&std::mem::take(&mut paragraph));
                }
                b"tc" if table_depth == 1 => row.push(std::mem::take(&mut cell)),
                b"tr" if table_depth == 1 => table_rows.push(row.join(" | ")),
                b"tbl" => table_depth = table_depth.saturating_sub(1),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(DecodeError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    paragraphs.extend(table_rows);
    Ok(paragraphs.join("\n"))
}
