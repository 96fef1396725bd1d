//! Minimal XML tree for WordprocessingML parts.
//!
//! Text and attribute values are kept in their escaped source form, and
//! markup the editor never touches (declarations, comments, processing
//! instructions, CDATA) is carried through verbatim, so an untouched subtree
//! serializes back to the bytes it was parsed from.
use anyhow::{anyhow, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Character data, still escaped.
    Text(String),
    /// Declarations, comments, processing instructions and CDATA, verbatim.
    Markup(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Attribute name and escaped value, in source order.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter; `value` is escaped here.
    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.children.push(Node::Text(escape_text(text)));
        self
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| unescape(value))
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        let escaped = escape_attribute(value);
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = escaped,
            None => self.attributes.push((name.to_string(), escaped)),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn find_child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|child| child.is(name))
    }

    /// Unescaped concatenation of this element's direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(raw) => Some(unescape(raw)),
                _ => None,
            })
            .collect()
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: &str) {
        self.children = vec![Node::Text(escape_text(text))];
    }

    /// Element child at `index` of `children`, if that node is an element.
    pub fn element_at(&self, index: usize) -> Option<&Element> {
        match self.children.get(index) {
            Some(Node::Element(element)) => Some(element),
            _ => None,
        }
    }

    pub fn element_at_mut(&mut self, index: usize) -> Option<&mut Element> {
        match self.children.get_mut(index) {
            Some(Node::Element(element)) => Some(element),
            _ => None,
        }
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(value);
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            child.write_to(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

impl Node {
    fn write_to(&self, out: &mut String) {
        match self {
            Node::Element(element) => element.write_to(out),
            Node::Text(raw) | Node::Markup(raw) => out.push_str(raw),
        }
    }
}

/// A parsed XML part: top-level nodes around exactly one root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub nodes: Vec<Node>,
}

impl XmlDocument {
    #[cfg(test)]
    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn root_mut(&mut self) -> Option<&mut Element> {
        self.nodes.iter_mut().find_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            node.write_to(&mut out);
        }
        out
    }
}

pub fn parse(text: &str) -> Result<XmlDocument> {
    let mut stack: Vec<Element> = Vec::new();
    let mut top: Vec<Node> = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        let rest = &text[pos..];
        if !rest.starts_with('<') {
            let end = rest.find('<').unwrap_or(rest.len());
            append(&mut stack, &mut top, Node::Text(rest[..end].to_string()));
            pos += end;
            continue;
        }

        let verbatim_end = if rest.starts_with("<?") {
            Some(find_end(rest, "?>", pos)?)
        } else if rest.starts_with("<!--") {
            Some(find_end(rest, "-->", pos)?)
        } else if rest.starts_with("<![CDATA[") {
            Some(find_end(rest, "]]>", pos)?)
        } else if rest.starts_with("<!") {
            Some(find_end(rest, ">", pos)?)
        } else {
            None
        };
        if let Some(end) = verbatim_end {
            append(&mut stack, &mut top, Node::Markup(rest[..end].to_string()));
            pos += end;
            continue;
        }

        if let Some(closing) = rest.strip_prefix("</") {
            let end = closing
                .find('>')
                .ok_or_else(|| anyhow!("unterminated end tag at byte {pos}"))?;
            let name = closing[..end].trim();
            let element = stack
                .pop()
                .ok_or_else(|| anyhow!("unexpected end tag </{name}> at byte {pos}"))?;
            if element.name != name {
                return Err(anyhow!(
                    "end tag </{name}> at byte {pos} does not close <{}>",
                    element.name
                ));
            }
            append(&mut stack, &mut top, Node::Element(element));
            pos += 2 + end + 1;
            continue;
        }

        let end = find_tag_end(rest).ok_or_else(|| anyhow!("unterminated tag at byte {pos}"))?;
        let inner = &rest[1..end];
        let (inner, self_closing) = match inner.strip_suffix('/') {
            Some(stripped) => (stripped, true),
            None => (inner, false),
        };
        let element = parse_start_tag(inner).map_err(|err| anyhow!("{err} at byte {pos}"))?;
        if self_closing {
            append(&mut stack, &mut top, Node::Element(element));
        } else {
            stack.push(element);
        }
        pos += end + 1;
    }

    if let Some(open) = stack.last() {
        return Err(anyhow!("element <{}> is never closed", open.name));
    }
    if !top.iter().any(|node| matches!(node, Node::Element(_))) {
        return Err(anyhow!("document has no root element"));
    }
    Ok(XmlDocument { nodes: top })
}

fn append(stack: &mut [Element], top: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => top.push(node),
    }
}

/// Length up to and including `terminator`.
fn find_end(rest: &str, terminator: &str, pos: usize) -> Result<usize> {
    rest.find(terminator)
        .map(|idx| idx + terminator.len())
        .ok_or_else(|| anyhow!("unterminated markup at byte {pos}"))
}

/// Index of the `>` closing the tag that starts `rest`, skipping quoted values.
fn find_tag_end(rest: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (idx, ch) in rest.char_indices().skip(1) {
        match (quote, ch) {
            (Some(open), _) if ch == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '>') => return Some(idx),
            (None, _) => {}
        }
    }
    None
}

fn parse_start_tag(inner: &str) -> Result<Element> {
    let inner = inner.trim_end();
    let name_end = inner
        .find(|ch: char| ch.is_whitespace())
        .unwrap_or(inner.len());
    let name = &inner[..name_end];
    if name.is_empty() {
        return Err(anyhow!("empty tag name"));
    }
    let mut element = Element::new(name);
    let mut rest = inner[name_end..].trim_start();
    while !rest.is_empty() {
        let eq = rest
            .find('=')
            .ok_or_else(|| anyhow!("attribute without value in <{name}>"))?;
        let key = rest[..eq].trim();
        let after = rest[eq + 1..].trim_start();
        let quote = after
            .chars()
            .next()
            .filter(|ch| *ch == '"' || *ch == '\'')
            .ok_or_else(|| anyhow!("unquoted attribute {key} in <{name}>"))?;
        let value_end = after[1..]
            .find(quote)
            .ok_or_else(|| anyhow!("unterminated attribute {key} in <{name}>"))?;
        let raw = &after[1..1 + value_end];
        let value = if quote == '\'' {
            raw.replace('"', "&quot;")
        } else {
            raw.to_string()
        };
        element.attributes.push((key.to_string(), value));
        rest = after[1 + value_end + 1..].trim_start();
    }
    Ok(element)
}

pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attribute(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}

pub fn unescape(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').and_then(|semi| {
            let entity = &tail[1..semi];
            decode_entity(entity).map(|ch| (ch, semi + 1))
        });
        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let hex = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"));
            let code = if let Some(hex) = hex {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
#[path = "xml_tests.rs"]
mod tests;
