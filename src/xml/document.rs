use std::collections::HashSet;
use std::path::Path;

use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::bytes::Regex as BytesRegex;
use sha2::{Digest, Sha256};

use crate::error::{FileError, XmlError};

static DECLARED_ENCODING_RE: Lazy<BytesRegex> = Lazy::new(|| {
    BytesRegex::new(r#"^\s*<\?xml[^>]*?encoding\s*=\s*["']([A-Za-z0-9._\-]+)["']"#)
        .expect("declared encoding regex")
});

/// One lexical item of the source document, kept close enough to the input to write it back
/// unchanged.
#[derive(Clone, Debug)]
pub enum XmlEvent {
    Decl {
        version: String,
        standalone: Option<String>,
    },
    Start {
        name: String,
        raw: String,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        raw: String,
    },
    /// `raw` holds the escaped source form until the text is replaced.
    Text {
        text: String,
        raw: Option<String>,
    },
    CData {
        text: String,
    },
    Comment {
        text: String,
    },
    PI {
        content: String,
    },
    DocType {
        text: String,
    },
}

#[derive(Clone, Debug)]
pub struct Element {
    pub tag: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub start_event: usize,
    /// Text/CDATA events between the start tag and the first child (the element's own text).
    pub text_events: Vec<usize>,
}

/// A parsed document: the event stream plus an element arena in document order.
/// `elements[0]` is the root.
#[derive(Clone, Debug)]
pub struct XmlDocument {
    pub name: String,
    pub events: Vec<XmlEvent>,
    pub elements: Vec<Element>,
    pub baseline_hash: String,
}

impl XmlDocument {
    pub fn root(&self) -> usize {
        0
    }

    pub fn element(&self, id: usize) -> &Element {
        &self.elements[id]
    }

    pub fn tag(&self, id: usize) -> &str {
        &self.elements[id].tag
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The element's own text, untrimmed.
    pub fn text_of(&self, id: usize) -> String {
        let mut out = String::new();
        for &idx in &self.elements[id].text_events {
            match &self.events[idx] {
                XmlEvent::Text { text, .. } | XmlEvent::CData { text } => out.push_str(text),
                _ => {}
            }
        }
        out
    }

    /// Replaces the element's own text. Returns false when the element has no text to replace.
    pub fn set_text(&mut self, id: usize, value: &str) -> bool {
        let Some((&first, rest)) = self.elements[id].text_events.split_first() else {
            return false;
        };
        let rest = rest.to_vec();
        self.events[first] = XmlEvent::Text {
            text: value.to_string(),
            raw: None,
        };
        for idx in rest {
            self.events[idx] = XmlEvent::Text {
                text: String::new(),
                raw: None,
            };
        }
        true
    }

    pub fn structure_hash(&self) -> String {
        structure_hash(&self.events, &self.elements)
    }

    pub fn verify_structure_unchanged(&self) -> Result<(), XmlError> {
        let cur = self.structure_hash();
        if cur != self.baseline_hash {
            return Err(XmlError::StructureChanged {
                file: self.name.clone(),
                before: self.baseline_hash.clone(),
                after: cur,
            });
        }
        Ok(())
    }
}

pub fn read_document(path: &Path) -> Result<XmlDocument, XmlError> {
    let bytes = std::fs::read(path).map_err(|e| FileError::new("read", path, e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    parse_document(&name, &bytes)
}

pub fn parse_document(name: &str, bytes: &[u8]) -> Result<XmlDocument, XmlError> {
    let source = decode_input(name, bytes)?;
    let not_well_formed = |pos: usize, detail: String| {
        let (line, column) = line_column(&source, pos);
        XmlError::NotWellFormed {
            file: name.to_string(),
            line,
            column,
            detail,
        }
    };

    let mut reader = Reader::from_str(&source);
    reader.config_mut().trim_text(false);

    let mut events: Vec<XmlEvent> = Vec::new();
    let mut elements: Vec<Element> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();
    let mut open_text: Option<usize> = None;
    let mut root_closed = false;

    loop {
        let ev = match reader.read_event() {
            Ok(ev) => ev,
            Err(e) => {
                return Err(not_well_formed(reader.error_position() as usize, e.to_string()));
            }
        };
        let idx = events.len();
        match ev {
            Event::Eof => break,
            Event::Decl(d) => {
                let version = d
                    .version()
                    .map(|v| bytes_to_string(v))
                    .map_err(|e| not_well_formed(reader.buffer_position() as usize, e.to_string()))?;
                let standalone = d
                    .standalone()
                    .transpose()
                    .map_err(|e| not_well_formed(reader.buffer_position() as usize, e.to_string()))?
                    .map(bytes_to_string);
                events.push(XmlEvent::Decl {
                    version,
                    standalone,
                });
            }
            Event::Start(s) | Event::Empty(s) if stack.is_empty() && root_closed => {
                let tag = bytes_to_string(s.name().as_ref());
                return Err(not_well_formed(
                    reader.buffer_position() as usize,
                    format!("more than one root element (found <{tag}> after the root)"),
                ));
            }
            Event::Start(s) => {
                let name = bytes_to_string(s.name().as_ref());
                let id = push_element(&mut elements, &stack, name.clone(), idx);
                stack.push(id);
                open_text = Some(id);
                events.push(XmlEvent::Start {
                    name,
                    raw: bytes_to_string(&*s),
                });
            }
            Event::Empty(s) => {
                let name = bytes_to_string(s.name().as_ref());
                push_element(&mut elements, &stack, name.clone(), idx);
                if stack.is_empty() {
                    root_closed = true;
                }
                open_text = None;
                events.push(XmlEvent::Empty {
                    name,
                    raw: bytes_to_string(&*s),
                });
            }
            Event::End(e) => {
                stack.pop();
                if stack.is_empty() {
                    root_closed = true;
                }
                open_text = None;
                events.push(XmlEvent::End {
                    name: bytes_to_string(e.name().as_ref()),
                });
            }
            Event::Text(t) => {
                let raw = bytes_to_string(&*t);
                let text = t
                    .unescape()
                    .map_err(|e| not_well_formed(reader.buffer_position() as usize, e.to_string()))?
                    .into_owned();
                if stack.is_empty() && !text.trim().is_empty() {
                    return Err(not_well_formed(
                        reader.buffer_position() as usize,
                        "text outside the root element".to_string(),
                    ));
                }
                if let Some(id) = open_text {
                    elements[id].text_events.push(idx);
                }
                events.push(XmlEvent::Text {
                    text,
                    raw: Some(raw),
                });
            }
            Event::CData(t) => {
                if stack.is_empty() {
                    return Err(not_well_formed(
                        reader.buffer_position() as usize,
                        "CDATA outside the root element".to_string(),
                    ));
                }
                if let Some(id) = open_text {
                    elements[id].text_events.push(idx);
                }
                events.push(XmlEvent::CData {
                    text: bytes_to_string(t.into_inner()),
                });
            }
            Event::Comment(t) => {
                events.push(XmlEvent::Comment {
                    text: bytes_to_string(t.into_inner()),
                });
            }
            Event::PI(t) => {
                let target = bytes_to_string(t.target());
                let content = bytes_to_string(t.content());
                events.push(XmlEvent::PI {
                    content: format!("{target}{content}"),
                });
            }
            Event::DocType(t) => {
                events.push(XmlEvent::DocType {
                    text: bytes_to_string(t.into_inner()),
                });
            }
        }
    }

    if let Some(&open) = stack.last() {
        return Err(not_well_formed(
            source.len(),
            format!("unclosed element <{}>", elements[open].tag),
        ));
    }
    if elements.is_empty() {
        return Err(not_well_formed(source.len(), "no root element".to_string()));
    }

    let baseline_hash = structure_hash(&events, &elements);
    Ok(XmlDocument {
        name: name.to_string(),
        events,
        elements,
        baseline_hash,
    })
}

fn push_element(elements: &mut Vec<Element>, stack: &[usize], tag: String, start_event: usize) -> usize {
    let id = elements.len();
    let parent = stack.last().copied();
    elements.push(Element {
        tag,
        parent,
        children: Vec::new(),
        start_event,
        text_events: Vec::new(),
    });
    if let Some(p) = parent {
        elements[p].children.push(id);
    }
    id
}

fn decode_input(name: &str, bytes: &[u8]) -> Result<String, XmlError> {
    let (encoding, bom_len) = Encoding::for_bom(bytes).unwrap_or_else(|| {
        let declared = DECLARED_ENCODING_RE
            .captures(&bytes[..bytes.len().min(1024)])
            .and_then(|c| c.get(1))
            .and_then(|m| Encoding::for_label(m.as_bytes()));
        (declared.unwrap_or(UTF_8), 0)
    });
    let body = &bytes[bom_len..];
    let (text, had_errors) = encoding.decode_without_bom_handling(body);
    if had_errors {
        let valid = if encoding == UTF_8 {
            std::str::from_utf8(body).err().map(|e| e.valid_up_to()).unwrap_or(0)
        } else {
            0
        };
        let prefix = String::from_utf8_lossy(&body[..valid]);
        let (line, column) = line_column(&prefix, prefix.len());
        return Err(XmlError::NotWellFormed {
            file: name.to_string(),
            line,
            column,
            detail: format!("invalid {} byte sequence", encoding.name()),
        });
    }
    Ok(text.into_owned())
}

fn line_column(source: &str, pos: usize) -> (usize, usize) {
    let mut pos = pos.min(source.len());
    while !source.is_char_boundary(pos) {
        pos -= 1;
    }
    let before = &source[..pos];
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(i) => before[i + 1..].chars().count() + 1,
        None => before.chars().count() + 1,
    };
    (line, column)
}

fn bytes_to_string(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

/// Serializes the document as UTF-8 with an XML declaration.
pub fn write_document(doc: &XmlDocument) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();

    fn escape_text_into(out: &mut Vec<u8>, text: &str) {
        for ch in text.chars() {
            match ch {
                '&' => out.extend_from_slice(b"&amp;"),
                '<' => out.extend_from_slice(b"&lt;"),
                '>' => out.extend_from_slice(b"&gt;"),
                _ => {
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
    }

    fn write_decl(out: &mut Vec<u8>, version: &str, standalone: Option<&str>) {
        out.extend_from_slice(b"<?xml version=\"");
        out.extend_from_slice(version.as_bytes());
        out.extend_from_slice(b"\" encoding=\"UTF-8\"");
        if let Some(s) = standalone {
            out.extend_from_slice(b" standalone=\"");
            out.extend_from_slice(s.as_bytes());
            out.extend_from_slice(b"\"");
        }
        out.extend_from_slice(b"?>");
    }

    if !matches!(doc.events.first(), Some(XmlEvent::Decl { .. })) {
        write_decl(&mut out, "1.0", None);
        out.push(b'\n');
    }

    for ev in &doc.events {
        match ev {
            XmlEvent::Decl {
                version,
                standalone,
            } => write_decl(&mut out, version, standalone.as_deref()),
            XmlEvent::Start { raw, .. } => {
                out.push(b'<');
                out.extend_from_slice(raw.as_bytes());
                out.push(b'>');
            }
            XmlEvent::End { name } => {
                out.extend_from_slice(b"</");
                out.extend_from_slice(name.as_bytes());
                out.push(b'>');
            }
            XmlEvent::Empty { raw, .. } => {
                out.push(b'<');
                out.extend_from_slice(raw.as_bytes());
                out.extend_from_slice(b"/>");
            }
            XmlEvent::Text { text, raw } => match raw {
                Some(raw) => out.extend_from_slice(raw.as_bytes()),
                None => escape_text_into(&mut out, text),
            },
            XmlEvent::CData { text } => {
                out.extend_from_slice(b"<![CDATA[");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"]]>");
            }
            XmlEvent::Comment { text } => {
                out.extend_from_slice(b"<!--");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"-->");
            }
            XmlEvent::PI { content } => {
                out.extend_from_slice(b"<?");
                out.extend_from_slice(content.as_bytes());
                out.extend_from_slice(b"?>");
            }
            XmlEvent::DocType { text } => {
                out.extend_from_slice(b"<!DOCTYPE ");
                out.extend_from_slice(text.as_bytes());
                out.push(b'>');
            }
        }
    }

    out
}

fn structure_hash(events: &[XmlEvent], elements: &[Element]) -> String {
    let own_text: HashSet<usize> = elements
        .iter()
        .flat_map(|e| e.text_events.iter().copied())
        .collect();
    let mut hasher = Sha256::new();

    for (idx, ev) in events.iter().enumerate() {
        match ev {
            XmlEvent::Decl {
                version,
                standalone,
            } => {
                hasher.update(b"D:");
                hasher.update(version.as_bytes());
                hasher.update(b"|");
                if let Some(s) = standalone.as_ref() {
                    hasher.update(s.as_bytes());
                }
            }
            XmlEvent::Start { raw, .. } => {
                hasher.update(b"S:");
                hasher.update(raw.as_bytes());
            }
            XmlEvent::Empty { raw, .. } => {
                hasher.update(b"Z:");
                hasher.update(raw.as_bytes());
            }
            XmlEvent::End { name } => {
                hasher.update(b"E:");
                hasher.update(name.as_bytes());
            }
            XmlEvent::Text { text, raw } => {
                if own_text.contains(&idx) {
                    continue;
                }
                hasher.update(b"T:");
                hasher.update(raw.as_deref().unwrap_or(text).as_bytes());
            }
            XmlEvent::CData { text } => {
                if own_text.contains(&idx) {
                    continue;
                }
                hasher.update(b"C:");
                hasher.update(text.as_bytes());
            }
            XmlEvent::Comment { text } => {
                hasher.update(b"M:");
                hasher.update(text.as_bytes());
            }
            XmlEvent::PI { content } => {
                hasher.update(b"P:");
                hasher.update(content.as_bytes());
            }
            XmlEvent::DocType { text } => {
                hasher.update(b"Y:");
                hasher.update(text.as_bytes());
            }
        }
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
