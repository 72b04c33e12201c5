//! Owned, mutable HTML tree.
//!
//! `scraper` gives a read-only view; this module copies its parse into an
//! `ego_tree::Tree` we can edit in place and serialize back to HTML.

use std::fmt::Write as _;

use ego_tree::{NodeId, NodeRef, Tree};
use scraper::node::Node;
use scraper::Html;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "xmp", "iframe", "noembed", "noframes"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    Document,
    Doctype(String),
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub name: String,
    attrs: Vec<(String, String)>,
}

impl ElementData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|(key, _)| key == name)?;
        Some(self.attrs.remove(pos).1)
    }

    pub fn retain_attrs(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.attrs.retain(|(key, _)| keep(key));
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_ascii_whitespace()
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    tree: Tree<MarkupNode>,
}

impl Document {
    /// Parses a full document. Never fails: html5ever recovers from any input.
    pub fn parse(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let mut tree = Tree::new(MarkupNode::Document);
        let root = tree.root().id();
        copy_children(parsed.tree.root(), &mut tree, root);
        Self { tree }
    }

    /// Node ids in document order, detached subtrees excluded.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.tree.root().descendants().map(|node| node.id()).collect()
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.tree.get(id)?.value() {
            MarkupNode::Element(data) => Some(data),
            _ => None,
        }
    }

    /// Applies `edit` to the element at `id`. Returns false for non-elements.
    pub fn edit_element(&mut self, id: NodeId, edit: impl FnOnce(&mut ElementData)) -> bool {
        let Some(mut node) = self.tree.get_mut(id) else {
            return false;
        };
        match node.value() {
            MarkupNode::Element(data) => {
                edit(data);
                true
            }
            _ => false,
        }
    }

    /// Elements named `name`, in document order.
    pub fn elements_named(&self, name: &str) -> Vec<NodeId> {
        self.tree
            .root()
            .descendants()
            .filter(|node| matches!(node.value(), MarkupNode::Element(el) if el.name == name))
            .map(|node| node.id())
            .collect()
    }

    /// Closest ancestor element named `name`.
    pub fn ancestor_named(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.tree
            .get(id)?
            .ancestors()
            .find(|node| matches!(node.value(), MarkupNode::Element(el) if el.name == name))
            .map(|node| node.id())
    }

    /// Removes a node and its subtree from the document.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(mut node) = self.tree.get_mut(id) {
            node.detach();
        }
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for child in self.tree.root().children() {
            write_node(child, &mut out);
        }
        out
    }
}

fn copy_children(src: NodeRef<'_, Node>, dst: &mut Tree<MarkupNode>, parent: NodeId) {
    for child in src.children() {
        let Some(value) = convert(child.value()) else {
            continue;
        };
        let Some(mut parent_node) = dst.get_mut(parent) else {
            return;
        };
        let id = parent_node.append(value).id();
        copy_children(child, dst, id);
    }
}

fn convert(node: &Node) -> Option<MarkupNode> {
    match node {
        Node::Doctype(doctype) => Some(MarkupNode::Doctype(doctype.name().to_string())),
        Node::Element(element) => {
            let mut data = ElementData::new(element.name());
            for (key, value) in element.attrs() {
                data.attrs.push((key.to_string(), value.to_string()));
            }
            Some(MarkupNode::Element(data))
        }
        Node::Text(text) => Some(MarkupNode::Text(String::from(&**text))),
        Node::Comment(comment) => Some(MarkupNode::Comment(String::from(&**comment))),
        _ => None,
    }
}

fn write_node(node: NodeRef<'_, MarkupNode>, out: &mut String) {
    match node.value() {
        MarkupNode::Document => {
            for child in node.children() {
                write_node(child, out);
            }
        }
        MarkupNode::Doctype(name) => {
            let _ = write!(out, "<!DOCTYPE {name}>");
        }
        MarkupNode::Comment(text) => {
            let _ = write!(out, "<!--{text}-->");
        }
        MarkupNode::Text(text) => {
            let raw = node
                .parent()
                .and_then(|p| match p.value() {
                    MarkupNode::Element(el) => Some(RAW_TEXT_ELEMENTS.contains(&el.name.as_str())),
                    _ => None,
                })
                .unwrap_or(false);
            if raw {
                out.push_str(text);
            } else {
                escape_text(text, out);
            }
        }
        MarkupNode::Element(el) => {
            out.push('<');
            out.push_str(&el.name);
            for (key, value) in el.attrs() {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                escape_attr(value, out);
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&el.name.as_str()) {
                return;
            }
            for child in node.children() {
                write_node(child, out);
            }
            out.push_str("</");
            out.push_str(&el.name);
            out.push('>');
        }
    }
}

pub(crate) fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}
