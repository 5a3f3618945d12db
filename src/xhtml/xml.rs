//! Strict XML parsing for XHTML artifacts written by earlier pipeline stages.

use html5ever::{LocalName, Namespace, Prefix, QualName, ns};
use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};

use super::dom::{Attribute, Document, NodeId, attr_name};
use crate::core::QuireError;

/// Parse well-formed XHTML. `origin` names the input in error messages.
pub fn parse_xhtml(text: &str, origin: &str) -> Result<Document, QuireError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(false);

    let mut doc = Document::new();
    let mut stack: Vec<NodeId> = vec![doc.root()];
    let mut scopes: Vec<Vec<(String, String)>> = Vec::new();

    let invalid = |reader: &Reader<&[u8]>, reason: String| QuireError::InvalidDocument {
        path: origin.to_string(),
        reason: format!("{reason} at byte {}", reader.buffer_position()),
    };

    loop {
        let event = reader.read_event().map_err(|e| invalid(&reader, e.to_string()))?;
        let parent = stack.last().copied().unwrap_or_else(|| doc.root());
        match event {
            Event::Start(e) => {
                let element = open_element(&mut doc, &e, &mut scopes)
                    .map_err(|reason| invalid(&reader, reason))?;
                doc.append(parent, element);
                stack.push(element);
            }
            Event::Empty(e) => {
                let element = open_element(&mut doc, &e, &mut scopes)
                    .map_err(|reason| invalid(&reader, reason))?;
                scopes.pop();
                doc.append(parent, element);
            }
            Event::End(_) => {
                scopes.pop();
                if stack.len() > 1 {
                    stack.pop();
                }
            }
            Event::Text(e) => {
                if parent != doc.root() {
                    doc.append_text(parent, &String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::CData(e) => {
                doc.append_text(parent, &String::from_utf8_lossy(e.as_ref()));
            }
            Event::GeneralRef(e) => {
                let entity = String::from_utf8_lossy(e.as_ref());
                match resolve_entity(&entity) {
                    Some(resolved) => doc.append_text(parent, &resolved),
                    None => doc.append_text(parent, &format!("&{entity};")),
                }
            }
            Event::Comment(e) => {
                let comment = doc.create_comment(String::from_utf8_lossy(e.as_ref()).into_owned());
                doc.append(parent, comment);
            }
            Event::DocType(e) => {
                let raw = String::from_utf8_lossy(e.as_ref());
                let name = raw.split_whitespace().next().unwrap_or("html").to_string();
                let doctype = doc.create_doctype(&name);
                doc.append(parent, doctype);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() > 1 {
        return Err(QuireError::InvalidDocument {
            path: origin.to_string(),
            reason: "unexpected end of document inside an open element".to_string(),
        });
    }
    if doc.document_element().is_none() {
        return Err(QuireError::InvalidDocument {
            path: origin.to_string(),
            reason: "no root element".to_string(),
        });
    }

    Ok(doc)
}

fn open_element(
    doc: &mut Document,
    start: &BytesStart<'_>,
    scopes: &mut Vec<Vec<(String, String)>>,
) -> Result<NodeId, String> {
    let mut attrs = Vec::new();
    let mut declared = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value).into_owned();
        let value = unescape(&raw).map_err(|e| e.to_string())?.into_owned();

        if key == "xmlns" {
            declared.push((String::new(), value.clone()));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            declared.push((prefix.to_string(), value.clone()));
        }
        attrs.push(Attribute {
            name: attr_name(&key),
            value,
        });
    }
    scopes.push(declared);

    let raw_name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let (prefix, local) = match raw_name.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, raw_name),
    };
    let namespace = lookup_namespace(scopes, prefix.as_deref().unwrap_or(""));
    let ns = match namespace {
        Some(uri) => Namespace::from(uri.as_str()),
        None if prefix.is_none() => ns!(html),
        None => ns!(),
    };
    let name = QualName::new(prefix.map(|p| Prefix::from(p.as_str())), ns, LocalName::from(local.as_str()));
    Ok(doc.create_element_qualified(name, attrs))
}

fn lookup_namespace(scopes: &[Vec<(String, String)>], prefix: &str) -> Option<String> {
    scopes
        .iter()
        .rev()
        .flat_map(|scope| scope.iter())
        .find(|(p, _)| p == prefix)
        .map(|(_, uri)| uri.clone())
}

fn resolve_entity(entity: &str) -> Option<String> {
    if let Some(code) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        return u32::from_str_radix(code, 16).ok().and_then(char::from_u32).map(String::from);
    }
    if let Some(code) = entity.strip_prefix('#') {
        return code.parse::<u32>().ok().and_then(char::from_u32).map(String::from);
    }
    let resolved = match entity {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => "\u{a0}",
        _ => return None,
    };
    Some(resolved.to_string())
}
