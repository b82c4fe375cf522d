use anyhow::{anyhow, bail, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use quick_xml::Writer;
use serde::Serialize;

pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attr {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ns: Option<String>,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ns: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attrs: Vec<Attr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(ns: &str, name: &str) -> Self {
        Self {
            ns: Some(ns.to_string()),
            name: name.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn unqualified(name: &str) -> Self {
        Self {
            ns: None,
            name: name.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn with_attr(mut self, ns: Option<&str>, name: &str, value: &str) -> Self {
        self.attrs.push(Attr {
            ns: ns.map(str::to_string),
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn element_count(&self) -> usize {
        self.elements().count()
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|n| match n {
            Node::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.name == name)
    }

    pub fn find_path(&self, path: &[&str]) -> Option<&Element> {
        path.iter().try_fold(self, |cur, step| cur.child(step))
    }

    pub fn find_path_mut(&mut self, path: &[&str]) -> Option<&mut Element> {
        let mut cur = self;
        for step in path {
            cur = cur.child_mut(step)?;
        }
        Some(cur)
    }

    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out.trim().to_string()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn is_nil(&self) -> bool {
        self.attrs.iter().any(|a| {
            a.name == "nil"
                && a.ns.as_deref() == Some(XSI_NS)
                && matches!(a.value.as_str(), "true" | "1")
        })
    }

    pub fn insert_element(&mut self, index: usize, child: Element) -> Result<()> {
        let count = self.element_count();
        if index > count {
            bail!(
                "index {index} is out of range for <{}> with {count} child elements",
                self.name
            );
        }
        if index == count {
            self.children.push(Node::Element(child));
            return Ok(());
        }
        let pos = self
            .children
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n, Node::Element(_)))
            .nth(index)
            .map(|(i, _)| i)
            .ok_or_else(|| anyhow!("element child {index} not found"))?;
        self.children.insert(pos, Node::Element(child));
        Ok(())
    }
}

fn collect_text(el: &Element, out: &mut String) {
    for node in &el.children {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(e, out),
        }
    }
}

pub fn parse(xml: &str) -> Result<Element> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let (resolved, event) = reader.read_resolved_event()?;
        let ns = owned_namespace(resolved)?;
        match event {
            Event::Start(start) => {
                let el = open_element(&reader, ns, &start)?;
                stack.push(el);
            }
            Event::Empty(start) => {
                let el = open_element(&reader, ns, &start)?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| anyhow!("unbalanced closing tag"))?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::Text(text) => {
                let text = text.unescape()?.into_owned();
                if let Some(parent) = stack.last_mut() {
                    if !text.is_empty() {
                        parent.children.push(Node::Text(text));
                    }
                }
            }
            Event::CData(data) => {
                let text = String::from_utf8(data.into_inner().into_owned())?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(text));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        bail!("unexpected end of document inside <{}>", stack[stack.len() - 1].name);
    }
    root.ok_or_else(|| anyhow!("document has no root element"))
}

fn owned_namespace(resolved: ResolveResult) -> Result<Option<String>> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(Some(std::str::from_utf8(ns.0)?.to_string())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => bail!(
            "undeclared namespace prefix: {}",
            String::from_utf8_lossy(&prefix)
        ),
    }
}

fn open_element(reader: &NsReader<&[u8]>, ns: Option<String>, start: &BytesStart) -> Result<Element> {
    let name = std::str::from_utf8(start.local_name().as_ref())?.to_string();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let (resolved, local) = reader.resolve_attribute(attr.key);
        attrs.push(Attr {
            ns: owned_namespace(resolved)?,
            name: std::str::from_utf8(local.as_ref())?.to_string(),
            value: attr.unescape_value()?.into_owned(),
        });
    }
    Ok(Element {
        ns,
        name,
        attrs,
        children: Vec::new(),
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.push(el),
        None => {
            if root.is_some() {
                bail!("document has more than one root element");
            }
            *root = Some(el);
        }
    }
    Ok(())
}

pub fn to_string(root: &Element, prefixes: &[(&str, &str)]) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    write_element(&mut writer, root, prefixes, true)?;
    Ok(String::from_utf8(writer.into_inner())?)
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    el: &Element,
    prefixes: &[(&str, &str)],
    is_root: bool,
) -> Result<()> {
    let mut local_decls: Vec<(String, String)> = Vec::new();
    let qname = qualify(el.ns.as_deref(), &el.name, prefixes, &mut local_decls);
    let attrs: Vec<(String, &str)> = el
        .attrs
        .iter()
        .map(|a| {
            (
                qualify(a.ns.as_deref(), &a.name, prefixes, &mut local_decls),
                a.value.as_str(),
            )
        })
        .collect();

    let mut start = BytesStart::new(qname.as_str());
    if is_root {
        for (prefix, uri) in prefixes {
            start.push_attribute((format!("xmlns:{prefix}").as_str(), *uri));
        }
    }
    for (prefix, uri) in &local_decls {
        start.push_attribute((format!("xmlns:{prefix}").as_str(), uri.as_str()));
    }
    for (key, value) in &attrs {
        start.push_attribute((key.as_str(), *value));
    }

    if el.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for node in &el.children {
        match node {
            Node::Element(child) => write_element(writer, child, prefixes, false)?,
            Node::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(qname.as_str())))?;
    Ok(())
}

fn qualify(
    ns: Option<&str>,
    local: &str,
    prefixes: &[(&str, &str)],
    local_decls: &mut Vec<(String, String)>,
) -> String {
    let Some(uri) = ns else {
        return local.to_string();
    };
    if let Some((prefix, _)) = prefixes.iter().find(|(_, u)| *u == uri) {
        return format!("{prefix}:{local}");
    }
    if let Some((prefix, _)) = local_decls.iter().find(|(_, u)| u == uri) {
        return format!("{prefix}:{local}");
    }
    let prefix = format!("x{}", local_decls.len());
    local_decls.push((prefix.clone(), uri.to_string()));
    format!("{prefix}:{local}")
}
