//! XML <-> JSON conversion.
//!
//! Mapping used in both directions:
//!
//! ```text
//! <book id="7">                 {"book": {
//!   <title>Dune</title>           "@id": "7",
//!   <tag>sf</tag>                 "title": "Dune",
//!   <tag>classic</tag>            "tag": ["sf", "classic"],
//!   <empty/>                      "empty": null
//! </book>                       }}
//! ```
//!
//! Mixed content keeps its text under `"#text"`.

use once_cell::sync::Lazy;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ConvertError, ConvertResult};

const ATTR_PREFIX: char = '@';
const TEXT_KEY: &str = "#text";
const ITEM_NAME: &str = "item";

static XML_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9._:-]*$").expect("xml name pattern is valid")
});

/// Options for [`json_to_xml`].
#[derive(Debug, Clone)]
pub struct XmlOptions {
    /// Wrapper element used when the JSON has no single root key
    pub root: String,
    /// Indent output by two spaces
    pub pretty: bool,
}

impl Default for XmlOptions {
    fn default() -> Self {
        Self {
            root: "root".to_string(),
            pretty: true,
        }
    }
}

// =============================================================================
// XML -> JSON
// =============================================================================

/// Element being built while reading.
struct Frame {
    name: String,
    attrs: Vec<(String, String)>,
    children: Map<String, Value>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> ConvertResult<Self> {
        let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(xml_err)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr
                .unescape_value()
                .map_err(xml_err)?
                .to_string();
            attrs.push((key, value));
        }
        Ok(Self {
            name,
            attrs,
            children: Map::new(),
            text: String::new(),
        })
    }

    fn close(self) -> (String, Value) {
        let text = self.text.trim().to_string();
        if self.attrs.is_empty() && self.children.is_empty() {
            let value = if text.is_empty() { Value::Null } else { Value::String(text) };
            return (self.name, value);
        }

        let mut object = Map::new();
        for (key, value) in self.attrs {
            object.insert(format!("{}{}", ATTR_PREFIX, key), Value::String(value));
        }
        for (key, value) in self.children {
            object.insert(key, value);
        }
        if !text.is_empty() {
            object.insert(TEXT_KEY.to_string(), Value::String(text));
        }
        (self.name, Value::Object(object))
    }
}

fn add_child(children: &mut Map<String, Value>, name: String, value: Value) {
    match children.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            children.insert(name, value);
        }
    }
}

/// Convert an XML document to JSON.
pub fn xml_to_json(xml: &str) -> ConvertResult<Value> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ConvertError::Xml(format!("at byte {}: {}", reader.buffer_position(), e)))?;

        match event {
            Event::Start(start) => {
                if root.is_some() && stack.is_empty() {
                    return Err(ConvertError::Xml("content after root element".to_string()));
                }
                stack.push(Frame::open(&start)?);
            }
            Event::Empty(start) => {
                let (name, value) = Frame::open(&start)?.close();
                match stack.last_mut() {
                    Some(parent) => add_child(&mut parent.children, name, value),
                    None if root.is_none() => root = Some((name, value)),
                    None => return Err(ConvertError::Xml("content after root element".to_string())),
                }
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| ConvertError::Xml("unexpected closing tag".to_string()))?;
                let (name, value) = frame.close();
                match stack.last_mut() {
                    Some(parent) => add_child(&mut parent.children, name, value),
                    None => root = Some((name, value)),
                }
            }
            Event::Text(text) => {
                if let Some(frame) = stack.last_mut() {
                    let unescaped = text.unescape().map_err(xml_err)?;
                    frame.text.push_str(&unescaped);
                }
            }
            Event::CData(cdata) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&cdata.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ConvertError::Xml("unclosed element at end of document".to_string()));
    }

    let (name, value) = root.ok_or(ConvertError::NoRoot)?;
    let mut document = Map::new();
    document.insert(name, value);
    Ok(Value::Object(document))
}

// =============================================================================
// JSON -> XML
// =============================================================================

/// Convert a JSON value to an XML document.
pub fn json_to_xml(value: &Value, options: &XmlOptions) -> ConvertResult<String> {
    let mut writer = if options.pretty {
        Writer::new_with_indent(Vec::new(), b' ', 2)
    } else {
        Writer::new(Vec::new())
    };

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;

    match value {
        Value::Object(map) if map.len() == 1 => {
            let (name, inner) = map.iter().next().ok_or(ConvertError::NoRoot)?;
            if inner.is_array() || name.starts_with(ATTR_PREFIX) || name == TEXT_KEY {
                write_element(&mut writer, &options.root, value)?;
            } else {
                write_element(&mut writer, name, inner)?;
            }
        }
        Value::Array(items) => {
            check_name(&options.root)?;
            writer
                .write_event(Event::Start(BytesStart::new(options.root.as_str())))
                .map_err(xml_err)?;
            for item in items {
                write_element(&mut writer, ITEM_NAME, item)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(options.root.as_str())))
                .map_err(xml_err)?;
        }
        _ => write_element(&mut writer, &options.root, value)?,
    }

    let mut xml = String::from_utf8(writer.into_inner()).map_err(xml_err)?;
    xml.push('\n');
    Ok(xml)
}

/// Whether `name` can be used as an element, attribute or parameter name.
pub fn is_xml_name(name: &str) -> bool {
    XML_NAME.is_match(name)
}

/// Serialize JSON with `indent` spaces per level.
pub fn pretty_json(value: &Value, indent: usize) -> ConvertResult<String> {
    let indent = " ".repeat(indent);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    out.push(b'\n');
    String::from_utf8(out).map_err(xml_err)
}

fn check_name(name: &str) -> ConvertResult<()> {
    if is_xml_name(name) {
        Ok(())
    } else {
        Err(ConvertError::InvalidName(name.to_string()))
    }
}

fn xml_err<E: std::fmt::Display>(e: E) -> ConvertError {
    ConvertError::Xml(e.to_string())
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) -> ConvertResult<()> {
    check_name(name)?;
    match value {
        Value::Array(items) => {
            for item in items {
                write_element(writer, name, item)?;
            }
        }
        Value::Null => {
            writer
                .write_event(Event::Empty(BytesStart::new(name)))
                .map_err(xml_err)?;
        }
        Value::Object(map) => {
            let mut start = BytesStart::new(name);
            let mut attr_values = Vec::new();
            for (key, attr) in map {
                if let Some(attr_name) = key.strip_prefix(ATTR_PREFIX) {
                    check_name(attr_name)?;
                    attr_values.push((attr_name, scalar_text(attr)));
                }
            }
            for (attr_name, attr_value) in &attr_values {
                start.push_attribute((*attr_name, attr_value.as_str()));
            }

            let has_body = map.keys().any(|k| !k.starts_with(ATTR_PREFIX));
            if !has_body {
                writer.write_event(Event::Empty(start)).map_err(xml_err)?;
                return Ok(());
            }

            writer.write_event(Event::Start(start)).map_err(xml_err)?;
            if let Some(text) = map.get(TEXT_KEY) {
                writer
                    .write_event(Event::Text(BytesText::new(&scalar_text(text))))
                    .map_err(xml_err)?;
            }
            for (key, child) in map {
                if key.starts_with(ATTR_PREFIX) || key == TEXT_KEY {
                    continue;
                }
                write_element(writer, key, child)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(xml_err)?;
        }
        scalar => {
            writer
                .write_event(Event::Start(BytesStart::new(name)))
                .map_err(xml_err)?;
            writer
                .write_event(Event::Text(BytesText::new(&scalar_text(scalar))))
                .map_err(xml_err)?;
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(xml_err)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_xml_to_json_shapes() {
        let xml = r#"<?xml version="1.0"?>
<!-- catalog -->
<book id="7">
  <title>Dune &amp; more</title>
  <tag>sf</tag>
  <tag>classic</tag>
  <empty/>
  <note><![CDATA[<raw>]]></note>
</book>"#;

        let value = xml_to_json(xml).unwrap();
        assert_eq!(
            value,
            json!({
                "book": {
                    "@id": "7",
                    "title": "Dune & more",
                    "tag": ["sf", "classic"],
                    "empty": null,
                    "note": "<raw>"
                }
            })
        );
    }

    #[test]
    fn test_mixed_content_keeps_text() {
        let value = xml_to_json(r#"<p lang="en">hello <b>world</b></p>"#).unwrap();
        assert_eq!(value["p"]["#text"], "hello");
        assert_eq!(value["p"]["b"], "world");
        assert_eq!(value["p"]["@lang"], "en");
    }

    #[test]
    fn test_xml_errors() {
        assert!(matches!(xml_to_json("   "), Err(ConvertError::NoRoot)));
        assert!(matches!(xml_to_json("<a><b></a>"), Err(ConvertError::Xml(_))));
        assert!(matches!(xml_to_json("<a>"), Err(ConvertError::Xml(_))));
    }

    #[test]
    fn test_json_to_xml_single_root() {
        let value = json!({
            "book": {
                "@id": 7,
                "title": "Dune & more",
                "tag": ["sf", "classic"],
                "empty": null
            }
        });
        let xml = json_to_xml(&value, &XmlOptions { pretty: false, ..Default::default() }).unwrap();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"<book id="7">"#));
        assert!(xml.contains("<title>Dune &amp; more</title>"));
        assert!(xml.contains("<tag>sf</tag><tag>classic</tag>"));
        assert!(xml.contains("<empty/>"));
    }

    #[test]
    fn test_json_to_xml_wraps_in_root() {
        let value = json!({ "a": 1, "b": true });
        let xml = json_to_xml(&value, &XmlOptions { root: "doc".into(), pretty: false }).unwrap();
        assert!(xml.contains("<doc><a>1</a><b>true</b></doc>"));

        let list = json!([1, 2]);
        let xml = json_to_xml(&list, &XmlOptions { root: "n".into(), pretty: false }).unwrap();
        assert!(xml.contains("<n><item>1</item><item>2</item></n>"));
        assert_eq!(xml_to_json(&xml).unwrap(), json!({ "n": { "item": ["1", "2"] } }));
    }

    #[test]
    fn test_top_level_array_is_single_document() {
        let list = json!([{ "id": 1 }, null]);
        let xml = json_to_xml(&list, &XmlOptions::default()).unwrap();
        let value = xml_to_json(&xml).unwrap();
        assert_eq!(value["root"]["item"][0]["id"], "1");
        assert!(value["root"]["item"][1].is_null());
    }

    #[test]
    fn test_invalid_names() {
        let value = json!({ "doc": { "1st": "x" } });
        let err = json_to_xml(&value, &XmlOptions::default()).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidName(ref n) if n == "1st"));

        let value = json!({ "has space": 1 });
        assert!(json_to_xml(&value, &XmlOptions::default()).is_err());
    }

    #[test]
    fn test_pretty_json_indent() {
        let text = pretty_json(&json!({ "a": [1] }), 4).unwrap();
        assert_eq!(text, "{\n    \"a\": [\n        1\n    ]\n}\n");
    }

    #[test]
    fn test_conversion_preserves_structure() {
        let xml = r#"<feed version="2"><entry><id>1</id></entry><entry><id>2</id></entry></feed>"#;
        let json = xml_to_json(xml).unwrap();
        let back = json_to_xml(&json, &XmlOptions::default()).unwrap();
        assert_eq!(xml_to_json(&back).unwrap(), json);
    }
}
