//! Generic XML marshaling of object contents.
//!
//! Every stored attribute becomes an element carrying a `type` attribute, a
//! `<value>` child with the Python literal form of the value, and, whenever the
//! value holds floating point numbers, an `<ieee_754_byte_array>` child with
//! the little endian bytes of each float. Reading prefers the byte arrays so
//! that floats survive a save/restore cycle bit for bit.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::io::{self, BufRead, Write};
use thiserror::Error;

pub const IEEE_754_ELEMENT: &str = "ieee_754_byte_array";
pub const VALUE_ELEMENT: &str = "value";

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("XML syntax error: {0}")]
    Syntax(#[from] quick_xml::Error),
    #[error("XML attribute error: {0}")]
    Attribute(#[from] AttrError),
    #[error("Invalid literal '{text}': {reason}")]
    Literal { text: String, reason: String },
    #[error("The element <{element}> has no <{child}> child")]
    MissingElement { element: String, child: String },
    #[error("The element <{element}> has no '{attribute}' attribute")]
    MissingAttribute { element: String, attribute: String },
    #[error("The value of '{name}' is not of the type {expected}")]
    Type { name: String, expected: &'static str },
    #[error("The document contains no root element")]
    NoRoot,
    #[error("Unbalanced closing tag </{0}>")]
    Unbalanced(String),
}

/// A dynamically typed value in the Python literal data model used by the
/// relax XML format.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PyValue {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<PyValue>),
    Dict(BTreeMap<String, PyValue>),
}

impl PyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PyValue::None => "None",
            PyValue::Bool(_) => "bool",
            PyValue::Int(_) => "int",
            PyValue::Float(_) => "float",
            PyValue::Str(_) => "str",
            PyValue::List(_) => "list",
            PyValue::Dict(_) => "dict",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, PyValue::None)
    }

    pub fn float_list(values: &[f64]) -> Self {
        PyValue::List(values.iter().map(|&v| PyValue::Float(v)).collect())
    }

    pub fn opt_float_list(values: &[Option<f64>]) -> Self {
        PyValue::List(values.iter().map(|&v| v.into()).collect())
    }

    pub fn str_list<S: AsRef<str>>(values: &[S]) -> Self {
        PyValue::List(
            values
                .iter()
                .map(|v| PyValue::Str(v.as_ref().to_string()))
                .collect(),
        )
    }

    /// The Python literal representation.
    pub fn repr(&self) -> String {
        self.to_string()
    }

    /// Parses a Python literal.
    pub fn parse(text: &str) -> Result<Self, XmlError> {
        let mut parser = LiteralParser::new(text);
        let value = parser.value()?;
        parser.skip_whitespace();
        if !parser.at_end() {
            return Err(parser.error("trailing characters"));
        }
        Ok(value)
    }

    pub fn to_f64(&self, name: &str) -> Result<f64, XmlError> {
        match self {
            PyValue::Float(v) => Ok(*v),
            PyValue::Int(v) => Ok(*v as f64),
            _ => Err(type_error(name, "float")),
        }
    }

    pub fn to_opt_f64(&self, name: &str) -> Result<Option<f64>, XmlError> {
        match self {
            PyValue::None => Ok(None),
            other => other.to_f64(name).map(Some),
        }
    }

    pub fn to_i64(&self, name: &str) -> Result<i64, XmlError> {
        match self {
            PyValue::Int(v) => Ok(*v),
            _ => Err(type_error(name, "int")),
        }
    }

    pub fn to_opt_i64(&self, name: &str) -> Result<Option<i64>, XmlError> {
        match self {
            PyValue::None => Ok(None),
            other => other.to_i64(name).map(Some),
        }
    }

    pub fn to_bool(&self, name: &str) -> Result<bool, XmlError> {
        match self {
            PyValue::Bool(v) => Ok(*v),
            _ => Err(type_error(name, "bool")),
        }
    }

    pub fn to_opt_string(&self, name: &str) -> Result<Option<String>, XmlError> {
        match self {
            PyValue::None => Ok(None),
            PyValue::Str(s) => Ok(Some(s.clone())),
            _ => Err(type_error(name, "str")),
        }
    }

    pub fn to_list(&self, name: &str) -> Result<&[PyValue], XmlError> {
        match self {
            PyValue::List(items) => Ok(items.as_slice()),
            _ => Err(type_error(name, "list")),
        }
    }

    pub fn to_dict(&self, name: &str) -> Result<&BTreeMap<String, PyValue>, XmlError> {
        match self {
            PyValue::Dict(map) => Ok(map),
            _ => Err(type_error(name, "dict")),
        }
    }

    pub fn to_f64_list(&self, name: &str) -> Result<Vec<f64>, XmlError> {
        self.to_list(name)?.iter().map(|v| v.to_f64(name)).collect()
    }

    pub fn to_opt_f64_list(&self, name: &str) -> Result<Vec<Option<f64>>, XmlError> {
        self.to_list(name)?
            .iter()
            .map(|v| v.to_opt_f64(name))
            .collect()
    }

    pub fn to_opt_string_list(&self, name: &str) -> Result<Vec<Option<String>>, XmlError> {
        self.to_list(name)?
            .iter()
            .map(|v| v.to_opt_string(name))
            .collect()
    }

    pub fn to_opt_i64_list(&self, name: &str) -> Result<Vec<Option<i64>>, XmlError> {
        self.to_list(name)?
            .iter()
            .map(|v| v.to_opt_i64(name))
            .collect()
    }

    fn contains_float(&self) -> bool {
        match self {
            PyValue::Float(_) => true,
            PyValue::List(items) => items.iter().any(PyValue::contains_float),
            PyValue::Dict(map) => map.values().any(PyValue::contains_float),
            _ => false,
        }
    }
}

fn type_error(name: &str, expected: &'static str) -> XmlError {
    XmlError::Type {
        name: name.to_string(),
        expected,
    }
}

impl From<f64> for PyValue {
    fn from(v: f64) -> Self {
        PyValue::Float(v)
    }
}

impl From<i64> for PyValue {
    fn from(v: i64) -> Self {
        PyValue::Int(v)
    }
}

impl From<bool> for PyValue {
    fn from(v: bool) -> Self {
        PyValue::Bool(v)
    }
}

impl From<&str> for PyValue {
    fn from(v: &str) -> Self {
        PyValue::Str(v.to_string())
    }
}

impl From<String> for PyValue {
    fn from(v: String) -> Self {
        PyValue::Str(v)
    }
}

impl<T: Into<PyValue>> From<Option<T>> for PyValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(PyValue::None, Into::into)
    }
}

impl fmt::Display for PyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PyValue::None => f.write_str("None"),
            PyValue::Bool(true) => f.write_str("True"),
            PyValue::Bool(false) => f.write_str("False"),
            PyValue::Int(v) => write!(f, "{v}"),
            PyValue::Float(v) => f.write_str(&float_repr(*v)),
            PyValue::Str(s) => f.write_str(&str_repr(s)),
            PyValue::List(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_char(']')
            }
            PyValue::Dict(map) => {
                f.write_char('{')?;
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {item}", str_repr(key))?;
                }
                f.write_char('}')
            }
        }
    }
}

/// Shortest round trip float text in Python's `repr` layout: positional
/// notation for decimal exponents in `[-4, 16)`, otherwise scientific with a
/// signed, at least two digit exponent.
pub fn float_repr(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let sci = format!("{:e}", value.abs());
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let sign = if value.is_sign_negative() { "-" } else { "" };

    if (-4..16).contains(&exponent) {
        let point = exponent + 1;
        let body = if point <= 0 {
            format!("0.{}{}", "0".repeat((-point) as usize), digits)
        } else if point as usize >= digits.len() {
            format!(
                "{}{}.0",
                digits,
                "0".repeat(point as usize - digits.len())
            )
        } else {
            let (int_part, frac_part) = digits.split_at(point as usize);
            format!("{int_part}.{frac_part}")
        };
        format!("{sign}{body}")
    } else {
        let mantissa = if digits.len() > 1 {
            format!("{}.{}", &digits[..1], &digits[1..])
        } else {
            digits
        };
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        format!("{sign}{mantissa}e{exp_sign}{:02}", exponent.abs())
    }
}

fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

struct LiteralParser<'a> {
    text: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> LiteralParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: &str) -> XmlError {
        XmlError::Literal {
            text: self.text.to_string(),
            reason: format!("{reason} at position {}", self.pos),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: char) -> Result<(), XmlError> {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{c}'")))
        }
    }

    fn value(&mut self) -> Result<PyValue, XmlError> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some('[') => self.sequence('[', ']'),
            Some('(') => self.sequence('(', ')'),
            Some('{') => self.dict(),
            Some(q @ ('\'' | '"')) => self.string(q).map(PyValue::Str),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.word(),
            Some(_) => Err(self.error("unexpected character")),
        }
    }

    fn sequence(&mut self, open: char, close: char) -> Result<PyValue, XmlError> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(PyValue::List(items));
            }
            items.push(self.value()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(c) if c == close => {}
                _ => return Err(self.error(&format!("expected ',' or '{close}'"))),
            }
        }
    }

    fn dict(&mut self) -> Result<PyValue, XmlError> {
        self.expect('{')?;
        let mut map = BTreeMap::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(PyValue::Dict(map));
            }
            let key = match self.value()? {
                PyValue::Str(s) => s,
                PyValue::Int(i) => i.to_string(),
                PyValue::Float(f) => float_repr(f),
                _ => return Err(self.error("unsupported dictionary key")),
            };
            self.expect(':')?;
            let item = self.value()?;
            map.insert(key, item);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {}
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<String, XmlError> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some('\\') => {
                    self.pos += 1;
                    let escaped = self
                        .peek()
                        .ok_or_else(|| self.error("unterminated escape"))?;
                    out.push(match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        other => other,
                    });
                    self.pos += 1;
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn number(&mut self) -> Result<PyValue, XmlError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.pos += 1;
        }
        if self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            let word = self.identifier();
            let negative = self.chars[start] == '-';
            return match word.as_str() {
                "inf" if negative => Ok(PyValue::Float(f64::NEG_INFINITY)),
                "inf" => Ok(PyValue::Float(f64::INFINITY)),
                "nan" => Ok(PyValue::Float(f64::NAN)),
                _ => Err(self.error("invalid number")),
            };
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    if matches!(self.chars.get(self.pos + 1), Some('-' | '+')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
            self.pos += 1;
        }
        if self.peek() == Some('L') {
            self.pos += 1;
        }
        let token: String = self.chars[start..self.pos]
            .iter()
            .filter(|&&c| c != 'L')
            .collect();
        if !is_float {
            if let Ok(int) = token.parse::<i64>() {
                return Ok(PyValue::Int(int));
            }
        }
        token
            .parse::<f64>()
            .map(PyValue::Float)
            .map_err(|_| self.error("invalid number"))
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn word(&mut self) -> Result<PyValue, XmlError> {
        let word = self.identifier();
        match word.as_str() {
            "None" => Ok(PyValue::None),
            "True" => Ok(PyValue::Bool(true)),
            "False" => Ok(PyValue::Bool(false)),
            "nan" => Ok(PyValue::Float(f64::NAN)),
            "inf" => Ok(PyValue::Float(f64::INFINITY)),
            "array" | "float" | "float64" => {
                self.expect('(')?;
                let inner = self.value()?;
                self.expect(')')?;
                Ok(match (word.as_str(), inner) {
                    ("float", PyValue::Str(s)) => {
                        PyValue::Float(s.parse().map_err(|_| self.error("invalid float"))?)
                    }
                    (_, other) => other,
                })
            }
            _ => Err(self.error(&format!("unknown identifier '{word}'"))),
        }
    }
}

/// A minimal DOM element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    pub fn set_attribute(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn require_attribute(&self, key: &str) -> Result<&str, XmlError> {
        self.attribute(key).ok_or_else(|| XmlError::MissingAttribute {
            element: self.name.clone(),
            attribute: key.to_string(),
        })
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn require_child(&self, name: &str) -> Result<&XmlElement, XmlError> {
        self.child(name).ok_or_else(|| XmlError::MissingElement {
            element: self.name.clone(),
            child: name.to_string(),
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn push(&mut self, child: XmlElement) -> &mut XmlElement {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Parses a document and returns its root element.
    pub fn read_from(reader: impl BufRead) -> Result<XmlElement, XmlError> {
        let mut reader = Reader::from_reader(reader);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(start) => stack.push(element_from_start(&start)?),
                Event::Empty(start) => {
                    let element = element_from_start(&start)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text.unescape()?);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::End(end) => {
                    let element = stack.pop().ok_or_else(|| {
                        XmlError::Unbalanced(String::from_utf8_lossy(end.name().as_ref()).into())
                    })?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        root.ok_or(XmlError::NoRoot)
    }

    /// Writes the element as a complete document with a 4 space indent.
    pub fn write_to(&self, writer: impl Write) -> Result<(), XmlError> {
        let mut writer = Writer::new_with_indent(writer, b' ', 4);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        write_element(&mut writer, self)?;
        writer.into_inner().write_all(b"\n")?;
        Ok(())
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn write_element<W: Write>(writer: &mut Writer<W>, element: &XmlElement) -> Result<(), XmlError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() && element.text.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    if !element.text.is_empty() {
        writer.write_event(Event::Text(BytesText::new(&element.text)))?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

/// The little endian bytes of a float as a list of integers.
pub fn float_to_bytes(value: f64) -> PyValue {
    PyValue::List(
        value
            .to_le_bytes()
            .iter()
            .map(|&b| PyValue::Int(i64::from(b)))
            .collect(),
    )
}

/// Inverse of [`float_to_bytes`]; `None` unless the value is a list of eight
/// integers in the byte range.
pub fn bytes_to_float(value: &PyValue) -> Option<f64> {
    let PyValue::List(items) = value else {
        return None;
    };
    if items.len() != 8 {
        return None;
    }
    let mut bytes = [0u8; 8];
    for (slot, item) in bytes.iter_mut().zip(items) {
        match item {
            PyValue::Int(b) => *slot = u8::try_from(*b).ok()?,
            _ => return None,
        }
    }
    Some(f64::from_le_bytes(bytes))
}

/// The byte array mirror of a value: floats become byte lists, containers keep
/// their shape with `None` for entries without floats.
fn ieee_754_form(value: &PyValue) -> Option<PyValue> {
    match value {
        PyValue::Float(v) => Some(float_to_bytes(*v)),
        PyValue::List(items) if value.contains_float() => Some(PyValue::List(
            items
                .iter()
                .map(|item| ieee_754_form(item).unwrap_or(PyValue::None))
                .collect(),
        )),
        PyValue::Dict(map) if value.contains_float() => Some(PyValue::Dict(
            map.iter()
                .filter_map(|(key, item)| ieee_754_form(item).map(|form| (key.clone(), form)))
                .collect(),
        )),
        _ => None,
    }
}

fn restore_floats(value: PyValue, ieee: &PyValue) -> PyValue {
    match value {
        PyValue::Float(_) => bytes_to_float(ieee).map_or(value, PyValue::Float),
        PyValue::List(items) => match ieee {
            PyValue::List(forms) if forms.len() == items.len() => PyValue::List(
                items
                    .into_iter()
                    .zip(forms)
                    .map(|(item, form)| restore_floats(item, form))
                    .collect(),
            ),
            _ => PyValue::List(items),
        },
        PyValue::Dict(map) => match ieee {
            PyValue::Dict(forms) => PyValue::Dict(
                map.into_iter()
                    .map(|(key, item)| {
                        let item = match forms.get(&key) {
                            Some(form) => restore_floats(item, form),
                            None => item,
                        };
                        (key, item)
                    })
                    .collect(),
            ),
            _ => PyValue::Dict(map),
        },
        other => other,
    }
}

/// Appends the element `<name type=...>` describing `value` to `parent`.
pub fn object_to_xml(parent: &mut XmlElement, name: &str, value: &PyValue) {
    let mut element = XmlElement::new(name).with_attribute("type", value.type_name());

    let mut text = XmlElement::new(VALUE_ELEMENT);
    text.text = value.repr();
    element.children.push(text);

    if let Some(ieee) = ieee_754_form(value) {
        let mut bytes = XmlElement::new(IEEE_754_ELEMENT);
        bytes.text = ieee.repr();
        element.children.push(bytes);
    }

    parent.children.push(element);
}

/// Decodes an element written by [`object_to_xml`], preferring the byte
/// arrays for every float they cover.
pub fn read_value(element: &XmlElement) -> Result<PyValue, XmlError> {
    let value = PyValue::parse(&element.require_child(VALUE_ELEMENT)?.text)?;
    match element.child(IEEE_754_ELEMENT) {
        Some(bytes) => {
            let ieee = PyValue::parse(&bytes.text)?;
            Ok(restore_floats(value, &ieee))
        }
        None => Ok(value),
    }
}

/// An object whose attributes can be stored as XML elements.
pub trait XmlObject {
    type Error: From<XmlError>;

    /// Every attribute name with its current value.
    fn xml_fields(&self) -> Vec<(String, PyValue)>;

    /// Restores one attribute.
    fn set_xml_field(&mut self, name: &str, value: PyValue) -> Result<(), Self::Error>;
}

fn skipped(name: &str, blacklist: &[&str]) -> bool {
    name.starts_with('_') || blacklist.contains(&name)
}

/// Writes all non blacklisted, non private fields of `object` into `parent`.
pub fn fill_object_contents<O: XmlObject + ?Sized>(
    parent: &mut XmlElement,
    object: &O,
    blacklist: &[&str],
) {
    for (name, value) in object.xml_fields() {
        if skipped(&name, blacklist) {
            continue;
        }
        object_to_xml(parent, &name, &value);
    }
}

/// Restores every child element of `parent` that carries a value into
/// `object`. Children without a `<value>` are structural and left to the
/// caller.
pub fn xml_to_object<O: XmlObject + ?Sized>(
    parent: &XmlElement,
    object: &mut O,
    blacklist: &[&str],
) -> Result<(), O::Error> {
    for child in &parent.children {
        if skipped(&child.name, blacklist) || child.child(VALUE_ELEMENT).is_none() {
            continue;
        }
        let value = read_value(child)?;
        object.set_xml_field(&child.name, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    mod literals {
        use super::*;

        #[test]
        fn float_repr_matches_python_layout() {
            assert_eq!(float_repr(1.0), "1.0");
            assert_eq!(float_repr(100.0), "100.0");
            assert_eq!(float_repr(0.5), "0.5");
            assert_eq!(float_repr(0.0001), "0.0001");
            assert_eq!(float_repr(1e-05), "1e-05");
            assert_eq!(float_repr(1.02e-10), "1.02e-10");
            assert_eq!(float_repr(-172e-6), "-0.000172");
            assert_eq!(float_repr(1e16), "1e+16");
            assert_eq!(float_repr(600e6), "600000000.0");
            assert_eq!(float_repr(-0.0), "-0.0");
            assert_eq!(float_repr(f64::NAN), "nan");
            assert_eq!(float_repr(f64::NEG_INFINITY), "-inf");
        }

        #[test]
        fn repr_of_containers_and_strings() {
            let mut map = BTreeMap::new();
            map.insert("R1_600".to_string(), PyValue::Float(1.5));
            map.insert("NOE".to_string(), PyValue::None);
            let value = PyValue::List(vec![
                PyValue::Int(3),
                PyValue::Str("it's".into()),
                PyValue::Bool(true),
                PyValue::Dict(map),
            ]);
            assert_eq!(
                value.repr(),
                "[3, \"it's\", True, {'NOE': None, 'R1_600': 1.5}]"
            );
        }

        #[test]
        fn parse_reads_back_every_repr() {
            let text = "[None, True, -3, 2.5e-10, 'a\\'b', (1, 2), {'x': [nan, -inf]}]";
            let value = PyValue::parse(text).unwrap();
            let PyValue::List(items) = &value else {
                panic!("Expected a list");
            };
            assert_eq!(items[0], PyValue::None);
            assert_eq!(items[2], PyValue::Int(-3));
            assert_eq!(items[3], PyValue::Float(2.5e-10));
            assert_eq!(items[4], PyValue::Str("a'b".into()));
            assert_eq!(
                items[5],
                PyValue::List(vec![PyValue::Int(1), PyValue::Int(2)])
            );
            let PyValue::Dict(map) = &items[6] else {
                panic!("Expected a dict");
            };
            let inner = map["x"].to_f64_list("x").unwrap();
            assert!(inner[0].is_nan());
            assert_eq!(inner[1], f64::NEG_INFINITY);
        }

        #[test]
        fn parse_rejects_garbage() {
            assert!(PyValue::parse("[1, 2").is_err());
            assert!(PyValue::parse("banana").is_err());
            assert!(PyValue::parse("1 2").is_err());
        }
    }

    mod marshaling {
        use super::*;

        fn round_trip(value: &PyValue) -> PyValue {
            let mut parent = XmlElement::new("parent");
            object_to_xml(&mut parent, "x", value);
            read_value(&parent.children[0]).unwrap()
        }

        #[test]
        fn floats_are_bit_exact_through_the_byte_array() {
            for v in [
                0.1 + 0.2,
                std::f64::consts::PI,
                -1.0e-300,
                f64::MIN_POSITIVE / 3.0,
                f64::MAX,
                f64::INFINITY,
            ] {
                let PyValue::Float(back) = round_trip(&PyValue::Float(v)) else {
                    panic!("Expected a float");
                };
                assert_eq!(back.to_bits(), v.to_bits());
            }
        }

        #[test]
        fn lists_keep_none_holes() {
            let value = PyValue::opt_float_list(&[Some(1.0 / 3.0), None, Some(2.0)]);
            assert_eq!(round_trip(&value), value);
        }

        #[test]
        fn byte_array_is_written_only_for_floats() {
            let mut parent = XmlElement::new("parent");
            object_to_xml(&mut parent, "a", &PyValue::Float(1.0));
            object_to_xml(&mut parent, "b", &PyValue::Int(1));
            object_to_xml(&mut parent, "c", &PyValue::str_list(&["x"]));
            assert!(parent.children[0].child(IEEE_754_ELEMENT).is_some());
            assert!(parent.children[1].child(IEEE_754_ELEMENT).is_none());
            assert!(parent.children[2].child(IEEE_754_ELEMENT).is_none());
            assert_eq!(parent.children[0].attribute("type"), Some("float"));
            assert_eq!(
                parent.children[0].child(IEEE_754_ELEMENT).unwrap().text,
                "[0, 0, 0, 0, 0, 0, 240, 63]"
            );
        }

        #[test]
        fn byte_array_wins_over_the_literal() {
            let mut element = XmlElement::new("x").with_attribute("type", "float");
            let mut value = XmlElement::new(VALUE_ELEMENT);
            value.text = "0.3".into();
            let mut bytes = XmlElement::new(IEEE_754_ELEMENT);
            bytes.text = float_to_bytes(0.1 + 0.2).repr();
            element.children.push(value);
            element.children.push(bytes);
            assert_eq!(read_value(&element).unwrap(), PyValue::Float(0.1 + 0.2));
        }

        #[test]
        fn float_matrices_round_trip() {
            let value = PyValue::List(vec![
                PyValue::float_list(&[1.0 / 7.0, 2.0]),
                PyValue::None,
                PyValue::float_list(&[3.0, 1e-20]),
            ]);
            assert_eq!(round_trip(&value), value);
        }
    }

    mod objects {
        use super::*;

        #[derive(Default)]
        struct Sample {
            alpha: f64,
            label: Option<String>,
            hidden: i64,
        }

        impl XmlObject for Sample {
            type Error = XmlError;

            fn xml_fields(&self) -> Vec<(String, PyValue)> {
                vec![
                    ("alpha".into(), self.alpha.into()),
                    ("label".into(), self.label.clone().into()),
                    ("hidden".into(), self.hidden.into()),
                    ("_private".into(), PyValue::Int(1)),
                ]
            }

            fn set_xml_field(&mut self, name: &str, value: PyValue) -> Result<(), XmlError> {
                match name {
                    "alpha" => self.alpha = value.to_f64(name)?,
                    "label" => self.label = value.to_opt_string(name)?,
                    "hidden" => self.hidden = value.to_i64(name)?,
                    _ => {}
                }
                Ok(())
            }
        }

        #[test]
        fn blacklisted_and_private_fields_are_skipped() {
            let sample = Sample {
                alpha: 0.7,
                label: Some("N".into()),
                hidden: 5,
            };
            let mut parent = XmlElement::new("sample");
            fill_object_contents(&mut parent, &sample, &["hidden"]);
            let names: Vec<_> = parent.children.iter().map(|c| c.name.as_str()).collect();
            assert_eq!(names, vec!["alpha", "label"]);

            let mut restored = Sample::default();
            xml_to_object(&parent, &mut restored, &[]).unwrap();
            assert_eq!(restored.alpha, 0.7);
            assert_eq!(restored.label.as_deref(), Some("N"));
            assert_eq!(restored.hidden, 0);
        }

        #[test]
        fn documents_round_trip_through_text() {
            let mut root = XmlElement::new("relax").with_attribute("version", "1 & 2");
            object_to_xml(&mut root, "x", &PyValue::Str("<a>".into()));
            let mut out = Vec::new();
            root.write_to(&mut out).unwrap();
            let text = String::from_utf8(out.clone()).unwrap();
            assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));

            let parsed = XmlElement::read_from(out.as_slice()).unwrap();
            assert_eq!(parsed.attribute("version"), Some("1 & 2"));
            assert_eq!(
                read_value(parsed.require_child("x").unwrap()).unwrap(),
                PyValue::Str("<a>".into())
            );
        }
    }
}
