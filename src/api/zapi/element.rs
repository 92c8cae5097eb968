//! ZAPI XML element tree
//!
//! Requests are built as [`ZapiElement`] trees and encoded into the
//! `<netapp>` envelope; responses are parsed with `roxmltree` back into the
//! same tree shape.

use crate::api::transport::TransportError;

/// One XML element with either text or child elements
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ZapiElement {
    name: String,
    text: Option<String>,
    children: Vec<ZapiElement>,
}

impl ZapiElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn leaf(name: impl Into<String>, text: impl ToString) -> Self {
        Self {
            name: name.into(),
            text: Some(text.to_string()),
            children: Vec::new(),
        }
    }

    /// Append a text child
    pub fn child(mut self, name: impl Into<String>, text: impl ToString) -> Self {
        self.children.push(Self::leaf(name, text));
        self
    }

    /// Append a text child unless the value is empty
    pub fn child_opt(self, name: impl Into<String>, text: &str) -> Self {
        if text.is_empty() {
            self
        } else {
            self.child(name, text)
        }
    }

    /// Append a nested element
    pub fn push(mut self, child: ZapiElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn add(&mut self, child: ZapiElement) {
        self.children.push(child);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn children(&self) -> &[ZapiElement] {
        &self.children
    }

    pub fn get(&self, name: &str) -> Option<&ZapiElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn text_of(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ZapiElement::text)
    }

    /// Descend through nested children by name
    pub fn path(&self, path: &[&str]) -> Option<&ZapiElement> {
        path.iter().try_fold(self, |node, name| node.get(name))
    }

    pub fn path_text(&self, path: &[&str]) -> Option<&str> {
        self.path(path).and_then(ZapiElement::text)
    }

    pub fn path_string(&self, path: &[&str]) -> String {
        self.path_text(path).unwrap_or_default().to_string()
    }

    pub fn path_u64(&self, path: &[&str]) -> Option<u64> {
        self.path_text(path).and_then(|t| t.trim().parse().ok())
    }

    pub fn path_bool(&self, path: &[&str]) -> Option<bool> {
        self.path_text(path).map(|t| t.trim().eq_ignore_ascii_case("true"))
    }

    /// Children of the named child, or nothing
    pub fn list(&self, name: &str) -> &[ZapiElement] {
        self.get(name).map(|e| e.children()).unwrap_or(&[])
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        out.push('>');
        if let Some(text) = &self.text {
            out.push_str(&escape(text));
        }
        for child in &self.children {
            child.write_xml(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        let children: Vec<ZapiElement> = node
            .children()
            .filter(|c| c.is_element())
            .map(Self::from_node)
            .collect();
        let text = if children.is_empty() {
            Some(node.text().unwrap_or_default().to_string())
        } else {
            None
        };
        Self {
            name: node.tag_name().name().to_string(),
            text,
            children,
        }
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Wrap a request in the `<netapp>` envelope
pub fn envelope(request: &ZapiElement, version: &str, vfiler: &str) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    out.push_str(&format!(
        "<netapp xmlns=\"http://www.netapp.com/filer/admin\" version=\"{}\"",
        escape(version)
    ));
    if !vfiler.is_empty() {
        out.push_str(&format!(" vfiler=\"{}\"", escape(vfiler)));
    }
    out.push('>');
    out.push_str(&request.to_xml());
    out.push_str("</netapp>");
    out
}

/// Parsed `<results>` element with its status attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZapiResponse {
    /// `passed` or `failed`
    pub status: String,
    pub reason: String,
    pub errno: String,
    pub results: ZapiElement,
}

impl ZapiResponse {
    pub fn passed(results: ZapiElement) -> Self {
        Self {
            status: "passed".to_string(),
            reason: String::new(),
            errno: String::new(),
            results,
        }
    }

    pub fn failed(errno: &str, reason: impl Into<String>) -> Self {
        Self {
            status: "failed".to_string(),
            reason: reason.into(),
            errno: errno.to_string(),
            results: ZapiElement::new("results"),
        }
    }

    /// Parse a full `<netapp><results .../></netapp>` document
    pub fn from_xml(xml: &str) -> Result<Self, TransportError> {
        let doc = roxmltree::Document::parse(xml)
            .map_err(|e| TransportError::malformed(format!("invalid ZAPI XML: {}", e)))?;

        let root = doc.root_element();
        if root.tag_name().name() != "netapp" {
            return Err(TransportError::malformed(format!(
                "unexpected root element <{}>",
                root.tag_name().name()
            )));
        }

        let results = root
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "results")
            .ok_or_else(|| TransportError::malformed("ZAPI response has no <results>"))?;

        Ok(Self {
            status: results.attribute("status").unwrap_or_default().to_string(),
            reason: results.attribute("reason").unwrap_or_default().to_string(),
            errno: results.attribute("errno").unwrap_or_default().to_string(),
            results: ZapiElement::from_node(results),
        })
    }
}
