//! A reader for Apple XML property lists.
//!
//! Installer metadata (`SystemVersion.plist`) and the per-board updater
//! configs (`Config.plist`) are XML plists. This module parses them into a
//! [`Value`] tree; only reading is supported, and only the XML flavor, which
//! is what those files use in practice.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use quick_xml::events::{BytesText, Event};
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlistError {
    #[error("cannot read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("malformed property list: {0}")]
    Malformed(String),
}

/// One node of a property list.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(String),
    /// Dates are kept verbatim; nothing here needs calendar arithmetic.
    Date(String),
    Data(Vec<u8>),
    Array(Vec<Value>),
    Dict(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_dict(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Dict(dict) => Some(dict),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(number) => Some(*number),
            _ => None,
        }
    }

    /// Real value, widening `<integer>` nodes since plists written by hand
    /// use them interchangeably.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(number) => Some(*number),
            Value::Integer(number) => Some(*number as f64),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(flag) => Some(*flag),
            _ => None,
        }
    }

    /// Dictionary lookup; `None` when `self` is not a dictionary.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_dict().and_then(|dict| dict.get(key))
    }
}

/// Parse the plist file at `path`.
pub fn parse_file(path: &Path) -> Result<Value, PlistError> {
    let text = fs::read_to_string(path).map_err(|source| PlistError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&text)
}

/// Parse a plist document. The usual `<plist version="1.0">` wrapper is
/// accepted but not required.
pub fn parse_str(xml: &str) -> Result<Value, PlistError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match read(&mut reader)? {
            Event::Decl(_) | Event::DocType(_) | Event::Comment(_) | Event::PI(_) => {}
            Event::Text(text) => require_whitespace(&text)?,
            Event::Start(event) => {
                let name = event.name().as_ref().to_vec();
                return match name.as_slice() {
                    b"plist" => next_value(&mut reader, b"plist")?
                        .ok_or_else(|| PlistError::Malformed("empty <plist> document".into())),
                    other => parse_value(&mut reader, other),
                };
            }
            Event::Empty(event) => {
                let name = event.name().as_ref().to_vec();
                return match name.as_slice() {
                    b"plist" => Err(PlistError::Malformed("empty <plist> document".into())),
                    other => empty_value(other),
                };
            }
            Event::Eof => return Err(PlistError::Malformed("document contains no value".into())),
            _ => return Err(PlistError::Malformed("unexpected XML content".into())),
        }
    }
}

fn read<'a>(reader: &mut Reader<&'a [u8]>) -> Result<Event<'a>, PlistError> {
    reader
        .read_event()
        .map_err(|error| PlistError::Malformed(error.to_string()))
}

fn require_whitespace(text: &BytesText) -> Result<(), PlistError> {
    if text.iter().all(u8::is_ascii_whitespace) {
        Ok(())
    } else {
        Err(PlistError::Malformed("stray text outside a value".into()))
    }
}

/// Read events until the next value element, or `None` at the closing tag of
/// `container`.
fn next_value(
    reader: &mut Reader<&[u8]>,
    container: &[u8],
) -> Result<Option<Value>, PlistError> {
    loop {
        match read(reader)? {
            Event::Comment(_) | Event::PI(_) => {}
            Event::Text(text) => require_whitespace(&text)?,
            Event::Start(event) => {
                let name = event.name().as_ref().to_vec();
                return parse_value(reader, &name).map(Some);
            }
            Event::Empty(event) => {
                let name = event.name().as_ref().to_vec();
                return empty_value(&name).map(Some);
            }
            Event::End(event) if event.name().as_ref() == container => return Ok(None),
            Event::End(_) => return Err(PlistError::Malformed("mismatched closing tag".into())),
            Event::Eof => {
                return Err(PlistError::Malformed("unexpected end of document".into()))
            }
            _ => return Err(PlistError::Malformed("unexpected XML content".into())),
        }
    }
}

/// Parse the value whose opening tag `name` was just consumed.
fn parse_value(reader: &mut Reader<&[u8]>, name: &[u8]) -> Result<Value, PlistError> {
    match name {
        b"dict" => parse_dict(reader),
        b"array" => parse_array(reader),
        b"string" => Ok(Value::String(text_content(reader, b"string")?)),
        b"integer" => {
            let text = text_content(reader, b"integer")?;
            let text = text.trim();
            text.parse()
                .map(Value::Integer)
                .map_err(|_| PlistError::Malformed(format!("invalid <integer> value '{text}'")))
        }
        b"real" => {
            let text = text_content(reader, b"real")?;
            let text = text.trim();
            text.parse()
                .map(Value::Real)
                .map_err(|_| PlistError::Malformed(format!("invalid <real> value '{text}'")))
        }
        b"true" => {
            require_empty_content(reader, b"true")?;
            Ok(Value::Boolean(true))
        }
        b"false" => {
            require_empty_content(reader, b"false")?;
            Ok(Value::Boolean(false))
        }
        b"date" => Ok(Value::Date(text_content(reader, b"date")?.trim().to_string())),
        b"data" => {
            let text = text_content(reader, b"data")?;
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = STANDARD
                .decode(compact.as_bytes())
                .map_err(|error| PlistError::Malformed(format!("invalid <data> payload: {error}")))?;
            Ok(Value::Data(bytes))
        }
        b"key" => Err(PlistError::Malformed("<key> outside a dictionary".into())),
        other => Err(PlistError::Malformed(format!(
            "unsupported element <{}>",
            String::from_utf8_lossy(other)
        ))),
    }
}

/// The value a self-closing tag stands for, e.g. `<true/>` or `<dict/>`.
fn empty_value(name: &[u8]) -> Result<Value, PlistError> {
    match name {
        b"true" => Ok(Value::Boolean(true)),
        b"false" => Ok(Value::Boolean(false)),
        b"dict" => Ok(Value::Dict(BTreeMap::new())),
        b"array" => Ok(Value::Array(Vec::new())),
        b"string" => Ok(Value::String(String::new())),
        b"data" => Ok(Value::Data(Vec::new())),
        b"date" => Ok(Value::Date(String::new())),
        b"integer" | b"real" => Err(PlistError::Malformed(format!(
            "empty <{}> element",
            String::from_utf8_lossy(name)
        ))),
        other => Err(PlistError::Malformed(format!(
            "unsupported element <{}>",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn parse_dict(reader: &mut Reader<&[u8]>) -> Result<Value, PlistError> {
    let mut dict = BTreeMap::new();
    loop {
        match read(reader)? {
            Event::Comment(_) | Event::PI(_) => {}
            Event::Text(text) => require_whitespace(&text)?,
            Event::End(event) if event.name().as_ref() == b"dict" => {
                return Ok(Value::Dict(dict))
            }
            Event::End(_) => return Err(PlistError::Malformed("mismatched closing tag".into())),
            Event::Start(event) if event.name().as_ref() == b"key" => {
                let key = text_content(reader, b"key")?;
                let value = next_value(reader, b"dict")?.ok_or_else(|| {
                    PlistError::Malformed(format!("key '{key}' has no value"))
                })?;
                dict.insert(key, value);
            }
            Event::Empty(event) if event.name().as_ref() == b"key" => {
                let value = next_value(reader, b"dict")?.ok_or_else(|| {
                    PlistError::Malformed("key '' has no value".into())
                })?;
                dict.insert(String::new(), value);
            }
            Event::Start(_) | Event::Empty(_) => {
                return Err(PlistError::Malformed("expected <key> inside <dict>".into()))
            }
            Event::Eof => {
                return Err(PlistError::Malformed("unexpected end of document".into()))
            }
            _ => return Err(PlistError::Malformed("unexpected XML content".into())),
        }
    }
}

fn parse_array(reader: &mut Reader<&[u8]>) -> Result<Value, PlistError> {
    let mut items = Vec::new();
    while let Some(value) = next_value(reader, b"array")? {
        items.push(value);
    }
    Ok(Value::Array(items))
}

/// Collect the character data of the element closed by `end`.
fn text_content(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<String, PlistError> {
    let mut text = String::new();
    loop {
        match read(reader)? {
            Event::Text(chunk) => {
                let chunk = chunk
                    .unescape()
                    .map_err(|error| PlistError::Malformed(error.to_string()))?;
                text.push_str(&chunk);
            }
            Event::CData(chunk) => {
                let chunk = String::from_utf8(chunk.to_vec()).map_err(|_| {
                    PlistError::Malformed("element content is not valid UTF-8".into())
                })?;
                text.push_str(&chunk);
            }
            Event::Comment(_) => {}
            Event::End(event) if event.name().as_ref() == end => return Ok(text),
            Event::End(_) => return Err(PlistError::Malformed("mismatched closing tag".into())),
            Event::Eof => {
                return Err(PlistError::Malformed("unexpected end of document".into()))
            }
            _ => {
                return Err(PlistError::Malformed(format!(
                    "unexpected markup inside <{}>",
                    String::from_utf8_lossy(end)
                )))
            }
        }
    }
}

fn require_empty_content(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<(), PlistError> {
    let text = text_content(reader, end)?;
    if text.trim().is_empty() {
        Ok(())
    } else {
        Err(PlistError::Malformed(format!(
            "unexpected content inside <{}>",
            String::from_utf8_lossy(end)
        )))
    }
}
