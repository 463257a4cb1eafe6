//! XML codec
//!
//! ```text
//! <ConsoleMessage>
//!   <window_id>3</window_id>
//!   <description>a &lt; b</description>
//! </ConsoleMessage>
//! ```
//!
//! The root element carries the message name and each present field becomes
//! one child element named after the field. Repeated fields repeat the
//! element, submessages nest their own fields inside it and bytes are base64.
//! The reader accepts a leading declaration, comments, CDATA sections,
//! whitespace between elements and self-closing empty elements.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::num::IntErrorKind;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::bitmap::PresenceBitmap;
use crate::codec::{DecodeOptions, UnknownFields};
use crate::error::{Error, Result};
use crate::proxy::{mismatch, FieldMut, FieldRef, Message, MessageRef};
use crate::schema::{FieldDescriptor, FieldKind, Quantifier};

/// Encode `message` as an XML document
pub fn encode(message: &dyn Message) -> Result<Vec<u8>> {
    let msg = MessageRef::new(message);
    let name = msg.descriptor().name();
    let mut out = String::new();
    out.push('<');
    out.push_str(name);
    out.push('>');
    write_fields(&mut out, msg)?;
    out.push_str("</");
    out.push_str(name);
    out.push('>');
    Ok(out.into_bytes())
}

/// Decode an XML document into `message` with default options
pub fn decode(message: &mut dyn Message, data: &[u8]) -> Result<()> {
    decode_with(message, data, &DecodeOptions::default())
}

/// Decode an XML document into `message`
pub fn decode_with(message: &mut dyn Message, data: &[u8], options: &DecodeOptions) -> Result<()> {
    let text = std::str::from_utf8(data)?;
    let mut reader = XmlReader::new(text);
    let root = message.descriptor().name();

    loop {
        match reader.next_token()? {
            Token::Text(t) if is_blank(&t) => continue,
            Token::Start { name, empty } if name == root => {
                read_body(&mut reader, message, name, empty, options, 0)?;
                break;
            }
            Token::Start { name, .. } => {
                return Err(reader.error(format!("expected <{root}>, found <{name}>")))
            }
            _ => return Err(reader.error(format!("expected <{root}>"))),
        }
    }

    loop {
        match reader.next_token()? {
            Token::Eof => return Ok(()),
            Token::Text(t) if is_blank(&t) => {}
            _ => return Err(reader.error("content after root element")),
        }
    }
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
}

fn write_float(out: &mut String, value: f64) {
    if value.is_nan() {
        out.push_str("NaN");
    } else if value == f64::INFINITY {
        out.push_str("Infinity");
    } else if value == f64::NEG_INFINITY {
        out.push_str("-Infinity");
    } else {
        let _ = write!(out, "{value}");
    }
}

fn write_value(out: &mut String, field: &FieldDescriptor, value: FieldRef<'_>) -> Result<()> {
    out.push('<');
    out.push_str(field.name);
    out.push('>');
    match value {
        FieldRef::I32(v) => {
            let _ = write!(out, "{v}");
        }
        FieldRef::I64(v) => {
            let _ = write!(out, "{v}");
        }
        FieldRef::U32(v) => {
            let _ = write!(out, "{v}");
        }
        FieldRef::U64(v) => {
            let _ = write!(out, "{v}");
        }
        FieldRef::Bool(v) => out.push_str(if v { "true" } else { "false" }),
        FieldRef::F32(v) => {
            if v.is_finite() {
                let _ = write!(out, "{v}");
            } else {
                write_float(out, f64::from(v));
            }
        }
        FieldRef::F64(v) => write_float(out, v),
        FieldRef::Str(s) => escape_into(out, s),
        FieldRef::Bytes(b) => out.push_str(&STANDARD.encode(b)),
        FieldRef::Buffer(b) => out.push_str(&STANDARD.encode(b.to_vec())),
        FieldRef::Message(sub) => write_fields(out, MessageRef::new(sub))?,
        FieldRef::Repeated(_) => return Err(mismatch(field)),
    }
    out.push_str("</");
    out.push_str(field.name);
    out.push('>');
    Ok(())
}

fn write_fields(out: &mut String, msg: MessageRef<'_>) -> Result<()> {
    let desc = msg.descriptor();
    for (index, field) in desc.fields().iter().enumerate() {
        match field.quantifier {
            Quantifier::Required => write_value(out, field, msg.get(index)?)?,
            Quantifier::Optional => {
                if msg.is_present(index)? {
                    write_value(out, field, msg.get(index)?)?;
                }
            }
            Quantifier::Repeated => {
                let list = msg.repeated(index)?;
                for i in 0..list.len() {
                    let item = list.get(i).ok_or_else(|| mismatch(field))?;
                    write_value(out, field, item)?;
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug)]
enum Token<'a> {
    Start { name: &'a str, empty: bool },
    End(&'a str),
    Text(Cow<'a, str>),
    Eof,
}

fn is_blank(text: &str) -> bool {
    text.chars().all(|c| c.is_ascii_whitespace())
}

/// Pull tokenizer over a complete document
struct XmlReader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> XmlReader<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        Error::malformed(self.pos, reason)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// Advance past `terminator`, returning the text before it
    fn take_until(&mut self, terminator: &str) -> Result<&'a str> {
        let rest = self.rest();
        let Some(end) = rest.find(terminator) else {
            return Err(self.error(format!("missing `{terminator}`")));
        };
        self.pos += end + terminator.len();
        Ok(&rest[..end])
    }

    fn next_token(&mut self) -> Result<Token<'a>> {
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Ok(Token::Eof);
            }

            if rest.starts_with("<?") {
                self.take_until("?>")?;
                continue;
            }
            if rest.starts_with("<!--") {
                self.take_until("-->")?;
                continue;
            }
            if let Some(cdata) = rest.strip_prefix("<![CDATA[") {
                let Some(end) = cdata.find("]]>") else {
                    return Err(self.error("unterminated CDATA"));
                };
                self.pos += "<![CDATA[".len() + end + "]]>".len();
                return Ok(Token::Text(Cow::Borrowed(&cdata[..end])));
            }
            if rest.starts_with("</") {
                self.pos += 2;
                let name = self.take_until(">")?.trim();
                return Ok(Token::End(name));
            }
            if rest.starts_with('<') {
                return self.start_tag();
            }

            let end = rest.find('<').unwrap_or(rest.len());
            let start = self.pos;
            self.pos += end;
            return unescape(&rest[..end], start).map(Token::Text);
        }
    }

    fn start_tag(&mut self) -> Result<Token<'a>> {
        let rest = &self.rest()[1..];
        let name_len = rest
            .find(|c: char| c.is_ascii_whitespace() || c == '/' || c == '>')
            .unwrap_or(rest.len());
        if name_len == 0 {
            return Err(self.error("empty element name"));
        }
        let name = &rest[..name_len];

        // attributes are skipped, quoted values may contain '>'
        let mut quote = None;
        for (i, c) in rest[name_len..].char_indices() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"' | '\'') => quote = Some(c),
                (None, '>') => {
                    let end = name_len + i;
                    let empty = rest[..end].ends_with('/');
                    self.pos += 1 + end + 1;
                    return Ok(Token::Start { name, empty });
                }
                (None, _) => {}
            }
        }
        Err(self.error(format!("unterminated <{name}>")))
    }

    /// Text content up to `</name>`
    fn element_text(&mut self, name: &str) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.next_token()? {
                Token::Text(t) => text.push_str(&t),
                Token::End(end) if end == name => return Ok(text),
                Token::End(end) => return Err(self.error(format!("mismatched </{end}>"))),
                Token::Start { name: child, .. } => {
                    return Err(self.error(format!("unexpected <{child}> inside <{name}>")))
                }
                Token::Eof => return Err(self.error(format!("unterminated <{name}>"))),
            }
        }
    }

    /// Skip an element whose start tag was just read
    fn skip_element(&mut self, name: &str, empty: bool) -> Result<()> {
        if empty {
            return Ok(());
        }
        let mut depth = 1usize;
        loop {
            match self.next_token()? {
                Token::Start { empty: false, .. } => depth += 1,
                Token::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Token::Eof => return Err(self.error(format!("unterminated <{name}>"))),
                _ => {}
            }
        }
    }
}

fn unescape(raw: &str, offset: usize) -> Result<Cow<'_, str>> {
    if !raw.contains('&') {
        return Ok(Cow::Borrowed(raw));
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let Some(semi) = after.find(';') else {
            return Err(Error::malformed(offset, "unterminated entity"));
        };
        let entity = &after[..semi];
        let c = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32).ok_or_else(|| {
                    Error::malformed(offset, format!("unknown entity `&{entity};`"))
                })?
            }
        };
        out.push(c);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(Cow::Owned(out))
}

fn parse_int<T: std::str::FromStr<Err = std::num::ParseIntError>>(
    field: &FieldDescriptor,
    text: &str,
) -> Result<T> {
    text.trim().parse::<T>().map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => Error::Overflow,
        _ => mismatch(field),
    })
}

fn parse_float(field: &FieldDescriptor, text: &str) -> Result<f64> {
    text.trim().parse::<f64>().map_err(|_| mismatch(field))
}

fn store_text(field: &FieldDescriptor, text: &str, slot: FieldMut<'_>) -> Result<()> {
    match slot {
        FieldMut::I32(s) => *s = parse_int(field, text)?,
        FieldMut::I64(s) => *s = parse_int(field, text)?,
        FieldMut::U32(s) => *s = parse_int(field, text)?,
        FieldMut::U64(s) => *s = parse_int(field, text)?,
        FieldMut::Bool(s) => {
            *s = match text.trim() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return Err(mismatch(field)),
            }
        }
        FieldMut::F32(s) => {
            let wide = parse_float(field, text)?;
            let narrow = wide as f32;
            if wide.is_finite() && !narrow.is_finite() {
                return Err(Error::Overflow);
            }
            *s = narrow;
        }
        FieldMut::F64(s) => *s = parse_float(field, text)?,
        FieldMut::Str(s) => {
            s.clear();
            s.try_reserve(text.len())?;
            s.push_str(text);
        }
        FieldMut::Bytes(b) => *b = STANDARD.decode(text.trim())?,
        FieldMut::Buffer(b) => {
            let decoded = STANDARD.decode(text.trim())?;
            b.clear();
            b.append(&decoded)?;
        }
        FieldMut::Message(_) | FieldMut::Repeated(_) => return Err(mismatch(field)),
    }
    Ok(())
}

/// Fill one field from the element whose start tag was just read
fn read_field(
    reader: &mut XmlReader<'_>,
    field: &FieldDescriptor,
    slot: FieldMut<'_>,
    empty: bool,
    options: &DecodeOptions,
    depth: usize,
) -> Result<()> {
    if field.kind == FieldKind::Message {
        let FieldMut::Message(sub) = slot else {
            return Err(mismatch(field));
        };
        return read_body(reader, sub, field.name, empty, options, depth + 1);
    }
    let text = if empty {
        String::new()
    } else {
        reader.element_text(field.name)?
    };
    store_text(field, &text, slot)
}

/// Read child elements into `message` up to `</closing>`
fn read_body(
    reader: &mut XmlReader<'_>,
    message: &mut dyn Message,
    closing: &str,
    empty: bool,
    options: &DecodeOptions,
    depth: usize,
) -> Result<()> {
    options.check_depth(depth)?;
    let desc = message.descriptor();
    let mut seen = PresenceBitmap::new(desc.len());
    if let Some(bits) = message.presence_mut() {
        bits.clear_all();
    }

    while !empty {
        match reader.next_token()? {
            Token::Text(t) if is_blank(&t) => {}
            Token::Text(_) => return Err(reader.error("unexpected text between elements")),
            Token::End(name) if name == closing => break,
            Token::End(name) => return Err(reader.error(format!("mismatched </{name}>"))),
            Token::Eof => return Err(reader.error(format!("unterminated <{closing}>"))),
            Token::Start { name, empty: child_empty } => {
                let Some(index) = desc.index_of_name(name) else {
                    if options.unknown_fields == UnknownFields::Reject {
                        return Err(reader.error(format!(
                            "unknown element <{name}> in `{}`",
                            desc.name()
                        )));
                    }
                    reader.skip_element(name, child_empty)?;
                    continue;
                };
                let field = &desc.fields()[index];
                let storage = message.field_mut(index).ok_or(Error::FieldIndexOutOfRange {
                    message: desc.name(),
                    index,
                })?;

                if field.is_repeated() {
                    let FieldMut::Repeated(list) = storage else {
                        return Err(mismatch(field));
                    };
                    if !seen.is_set(index) {
                        list.clear();
                    }
                    read_field(reader, field, list.push_default(), child_empty, options, depth)?;
                } else {
                    read_field(reader, field, storage, child_empty, options, depth)?;
                    if field.is_optional() {
                        let bits = message.presence_mut().ok_or(Error::TypeMismatch {
                            field: field.name,
                            expected: "presence bitmap",
                        })?;
                        bits.set(index)?;
                    }
                }
                seen.set(index)?;
            }
        }
    }

    for (index, field) in desc.fields().iter().enumerate() {
        if seen.is_set(index) {
            continue;
        }
        if field.is_required() {
            return Err(Error::MissingRequiredField {
                message: desc.name(),
                field: field.name,
            });
        }
        if let Some(FieldMut::Repeated(list)) = message.field_mut(index) {
            list.clear();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::DynamicMessage;
    use crate::messages::{ConsoleMessage, Severity, WindowInfo, WindowList};
    use crate::proxy::MessageMut;

    #[test]
    fn test_encode_layout() {
        let mut msg = ConsoleMessage::new(3, 10, "a < b & \"c\"");
        msg.set_severity(Severity::Debug);
        let text = String::from_utf8(encode(&msg).unwrap()).unwrap();
        assert_eq!(
            text,
            "<ConsoleMessage><window_id>3</window_id><time>10</time>\
             <description>a &lt; b &amp; &quot;c&quot;</description>\
             <severity>0</severity></ConsoleMessage>"
        );

        let mut back = ConsoleMessage::default();
        decode(&mut back, text.as_bytes()).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_lenient_input() {
        let doc = r#"<?xml version="1.0" encoding="UTF-8"?>
            <!-- captured from a live session -->
            <ConsoleMessage kind="log">
                <window_id> 3 </window_id>
                <time>10</time>
                <description><![CDATA[x < y]]> &#65;&#x42;</description>
                <context/>
            </ConsoleMessage>
        "#;
        let mut msg = ConsoleMessage::default();
        decode(&mut msg, doc.as_bytes()).unwrap();
        assert_eq!(msg.window_id, 3);
        assert_eq!(msg.description, "x < y AB");
        assert_eq!(msg.context(), Some(""));
        assert_eq!(msg.uri(), None);
    }

    #[test]
    fn test_nested_repeated() {
        let mut list = WindowList::default();
        let mut first = WindowInfo::new(1, "Start");
        first.set_opener_id(0);
        list.windows.push(first);
        list.windows.push(WindowInfo::new(2, ""));
        list.set_active(WindowInfo::new(2, ""));

        let bytes = encode(&list).unwrap();
        let mut back = WindowList::default();
        decode(&mut back, &bytes).unwrap();
        assert_eq!(back, list);
    }

    #[test]
    fn test_decode_replaces_previous() {
        let mut msg = ConsoleMessage::default();
        let first = b"<ConsoleMessage><window_id>1</window_id><time>2</time>\
                      <description>first</description><uri>a.js</uri>\
                      <line>7</line></ConsoleMessage>";
        decode(&mut msg, first).unwrap();
        assert_eq!(msg.uri(), Some("a.js"));

        let second = b"<ConsoleMessage><window_id>1</window_id><time>2</time>\
                       <description>second</description></ConsoleMessage>";
        decode(&mut msg, second).unwrap();
        assert_eq!(msg.description, "second");
        assert_eq!(msg.uri(), None);
        assert_eq!(msg.line(), None);

        let mut list = WindowList::default();
        list.windows.push(WindowInfo::new(1, "a"));
        decode(&mut list, b"<WindowList/>").unwrap();
        assert!(list.windows.is_empty());
    }

    #[test]
    fn test_unknown_elements() {
        let doc = b"<WindowInfo><window_id>1</window_id><extra><a>1</a></extra>\
                    <title>t</title></WindowInfo>";
        let mut info = WindowInfo::default();
        decode(&mut info, doc).unwrap();
        assert_eq!(info, WindowInfo::new(1, "t"));

        let strict = DecodeOptions::default().with_unknown_fields(UnknownFields::Reject);
        assert!(matches!(
            decode_with(&mut WindowInfo::default(), doc, &strict),
            Err(Error::MalformedToken { .. })
        ));
    }

    #[test]
    fn test_errors() {
        let mut info = WindowInfo::default();
        assert_eq!(
            decode(&mut info, b"<WindowInfo><window_id>1</window_id></WindowInfo>"),
            Err(Error::MissingRequiredField {
                message: "WindowInfo",
                field: "title",
            })
        );
        assert_eq!(
            decode(
                &mut info,
                b"<WindowInfo><window_id>4294967296</window_id><title/></WindowInfo>"
            ),
            Err(Error::Overflow)
        );
        assert!(matches!(
            decode(&mut info, b"<WindowInfo><window_id>1</title></WindowInfo>"),
            Err(Error::MalformedToken { .. })
        ));
        assert!(matches!(
            decode(&mut info, b"<Other/>"),
            Err(Error::MalformedToken { .. })
        ));
        assert!(matches!(
            decode(&mut info, b"<WindowInfo><title>&bogus;</title>"),
            Err(Error::MalformedToken { .. })
        ));
    }

    #[test]
    fn test_float_specials() {
        use std::sync::OnceLock;

        use crate::schema::MessageDescriptor;

        fn descriptor() -> &'static MessageDescriptor {
            static DESCRIPTOR: OnceLock<MessageDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                MessageDescriptor::new(
                    "Sample",
                    vec![
                        FieldDescriptor::repeated("f", 1, FieldKind::Float),
                        FieldDescriptor::required("ok", 2, FieldKind::Bool),
                        FieldDescriptor::required("raw", 3, FieldKind::Bytes),
                    ],
                )
            })
        }

        let mut msg = DynamicMessage::new(descriptor());
        {
            let mut proxy = MessageMut::new(&mut msg);
            let list = proxy.repeated_mut(0).unwrap();
            for v in [0.1f32, f32::NEG_INFINITY] {
                if let FieldMut::F32(slot) = list.push_default() {
                    *slot = v;
                }
            }
            proxy.set_bool(1, true).unwrap();
            proxy.set_bytes(2, b"xml").unwrap();
        }

        let bytes = encode(&msg).unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            "<Sample><f>0.1</f><f>-Infinity</f><ok>true</ok><raw>eG1s</raw></Sample>"
        );
        let mut back = DynamicMessage::new(descriptor());
        decode(&mut back, &bytes).unwrap();
        assert_eq!(back, msg);
    }
}
