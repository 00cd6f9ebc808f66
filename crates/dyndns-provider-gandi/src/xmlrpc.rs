//! Minimal XML-RPC codec
//!
//! Covers what the Gandi API exchanges: scalars, structs, arrays, nil and
//! faults. Requests are written by hand; responses are read with quick-xml's
//! pull parser into a small element tree and then interpreted.

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// XML-RPC codec errors
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum XmlRpcError {
    /// The document is not well-formed XML
    #[error("invalid XML: {0}")]
    Xml(String),

    /// Well-formed XML that is not a valid XML-RPC response
    #[error("malformed XML-RPC response: {0}")]
    Malformed(String),

    /// The server answered with a `<fault>`
    #[error("fault {code}: {message}")]
    Fault { code: i64, message: String },
}

/// An XML-RPC value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    Double(f64),
    Struct(BTreeMap<String, Value>),
    Array(Vec<Value>),
    Nil,
}

impl Value {
    /// Build a struct value from `(name, value)` pairs
    pub fn structure<I, K>(members: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Struct(members.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a struct member
    pub fn get(&self, member: &str) -> Option<&Value> {
        match self {
            Value::Struct(members) => members.get(member),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// Serialise a `methodCall` document
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    xml.push_str(&escape(method));
    xml.push_str("</methodName><params>");
    for param in params {
        xml.push_str("<param>");
        encode_value(&mut xml, param);
        xml.push_str("</param>");
    }
    xml.push_str("</params></methodCall>\n");
    xml
}

fn encode_value(xml: &mut String, value: &Value) {
    xml.push_str("<value>");
    match value {
        Value::Int(i) => {
            let _ = write!(xml, "<int>{}</int>", i);
        }
        Value::Bool(b) => {
            let _ = write!(xml, "<boolean>{}</boolean>", u8::from(*b));
        }
        Value::Str(s) => {
            let _ = write!(xml, "<string>{}</string>", escape(s.as_str()));
        }
        Value::Double(d) => {
            let _ = write!(xml, "<double>{}</double>", d);
        }
        Value::Struct(members) => {
            xml.push_str("<struct>");
            for (name, member) in members {
                let _ = write!(xml, "<member><name>{}</name>", escape(name.as_str()));
                encode_value(xml, member);
                xml.push_str("</member>");
            }
            xml.push_str("</struct>");
        }
        Value::Array(items) => {
            xml.push_str("<array><data>");
            for item in items {
                encode_value(xml, item);
            }
            xml.push_str("</data></array>");
        }
        Value::Nil => xml.push_str("<nil/>"),
    }
    xml.push_str("</value>");
}

/// Element tree node
#[derive(Debug, Default)]
struct Node {
    name: String,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    fn require(&self, name: &str) -> Result<&Node, XmlRpcError> {
        self.child(name).ok_or_else(|| {
            XmlRpcError::Malformed(format!("<{}> has no <{}>", self.name, name))
        })
    }
}

fn parse_tree(xml: &str) -> Result<Node, XmlRpcError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| XmlRpcError::Xml(format!("at {}: {}", reader.buffer_position(), e)))?;

        match event {
            Event::Start(start) => {
                stack.push(Node {
                    name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
                    ..Node::default()
                });
            }
            Event::Empty(empty) => {
                let node = Node {
                    name: String::from_utf8_lossy(empty.name().as_ref()).into_owned(),
                    ..Node::default()
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| XmlRpcError::Xml(e.to_string()))?;
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| XmlRpcError::Xml("unbalanced end tag".to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlRpcError::Xml("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| XmlRpcError::Xml("empty document".to_string()))
}

fn decode_value(node: &Node) -> Result<Value, XmlRpcError> {
    // <value>bare text</value> is a string
    let Some(typed) = node.children.first() else {
        return Ok(Value::Str(node.text.clone()));
    };

    let text = typed.text.trim();
    match typed.name.as_str() {
        "int" | "i4" | "i8" => text
            .parse()
            .map(Value::Int)
            .map_err(|_| XmlRpcError::Malformed(format!("bad integer '{}'", text))),
        "boolean" => match text {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            other => Err(XmlRpcError::Malformed(format!("bad boolean '{}'", other))),
        },
        "double" => text
            .parse()
            .map(Value::Double)
            .map_err(|_| XmlRpcError::Malformed(format!("bad double '{}'", text))),
        "string" => Ok(Value::Str(typed.text.clone())),
        "dateTime.iso8601" | "base64" => Ok(Value::Str(text.to_string())),
        "nil" => Ok(Value::Nil),
        "struct" => {
            let mut members = BTreeMap::new();
            for member in typed.children.iter().filter(|c| c.name == "member") {
                let name = member.require("name")?.text.clone();
                let value = decode_value(member.require("value")?)?;
                members.insert(name, value);
            }
            Ok(Value::Struct(members))
        }
        "array" => {
            let data = typed.require("data")?;
            data.children
                .iter()
                .filter(|c| c.name == "value")
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        other => Err(XmlRpcError::Malformed(format!("unknown type <{}>", other))),
    }
}

/// Parse a `methodResponse` document
///
/// A `<fault>` is returned as [`XmlRpcError::Fault`].
pub fn decode_response(xml: &str) -> Result<Value, XmlRpcError> {
    let root = parse_tree(xml)?;
    if root.name != "methodResponse" {
        return Err(XmlRpcError::Malformed(format!(
            "expected <methodResponse>, got <{}>",
            root.name
        )));
    }

    if let Some(fault) = root.child("fault") {
        let fault = decode_value(fault.require("value")?)?;
        let code = fault
            .get("faultCode")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        let message = fault
            .get("faultString")
            .and_then(Value::as_str)
            .unwrap_or("unknown fault")
            .to_string();
        return Err(XmlRpcError::Fault { code, message });
    }

    let param = root.require("params")?.require("param")?;
    decode_value(param.require("value")?)
}
