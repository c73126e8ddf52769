//! Mutable DOM helpers
//!
//! The `scraper` crate is read-only, so edits to the rendered document
//! (absolutizing attributes, removing `<base>`, replacing `<style>` text)
//! go through an html5ever `RcDom`.

use crate::error::PipelineError;
use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{parse_document, parse_fragment, Attribute, LocalName, Namespace, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};
use std::rc::Rc;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

pub fn parse(html: &str) -> RcDom {
    parse_document(RcDom::default(), ParseOpts::default()).one(html)
}

/// Parse `html` as the content of a `<body>` element. Use
/// [`fragment_root`] to reach the parsed nodes; the returned dom must stay
/// alive while its handles are used, since dropping it empties the tree.
pub fn parse_body_fragment(html: &str) -> RcDom {
    let context = QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from("body"));
    parse_fragment(RcDom::default(), ParseOpts::default(), context, Vec::new()).one(html)
}

/// Element whose children are the nodes of a parsed body fragment.
pub fn fragment_root(dom: &RcDom) -> Handle {
    let root = dom.document.children.borrow().first().cloned();
    root.unwrap_or_else(|| dom.document.clone())
}

/// Serialize the children of `handle` (the whole document when given the
/// document node).
pub fn serialize_children(handle: &Handle) -> Result<String, PipelineError> {
    let mut buf = Vec::new();
    let node: SerializableHandle = handle.clone().into();
    serialize(&mut buf, &node, SerializeOpts::default())?;
    String::from_utf8(buf).map_err(|_| PipelineError::Encoding)
}

pub fn tag_name(handle: &Handle) -> Option<&str> {
    match &handle.data {
        NodeData::Element { name, .. } => Some(&*name.local),
        _ => None,
    }
}

pub fn is_tag(handle: &Handle, tag: &str) -> bool {
    tag_name(handle).map_or(false, |name| name.eq_ignore_ascii_case(tag))
}

pub fn get_attr(handle: &Handle, name: &str) -> Option<String> {
    match &handle.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// First of `names` whose value is present and not blank
pub fn first_attr(handle: &Handle, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| get_attr(handle, name))
        .find(|value| !value.trim().is_empty())
}

pub fn set_attr(handle: &Handle, name: &str, value: &str) {
    if let NodeData::Element { attrs, .. } = &handle.data {
        let mut attrs = attrs.borrow_mut();
        match attrs.iter_mut().find(|attr| &*attr.name.local == name) {
            Some(attr) => attr.value = StrTendril::from(value),
            None => attrs.push(Attribute {
                name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
                value: StrTendril::from(value),
            }),
        }
    }
}

pub fn remove_attr(handle: &Handle, name: &str) {
    if let NodeData::Element { attrs, .. } = &handle.data {
        attrs.borrow_mut().retain(|attr| &*attr.name.local != name);
    }
}

/// Visit `handle` and all its descendants in document order.
pub fn walk(handle: &Handle, visit: &mut impl FnMut(&Handle)) {
    visit(handle);
    let children: Vec<Handle> = handle.children.borrow().iter().cloned().collect();
    for child in &children {
        walk(child, visit);
    }
}

/// Every element named `tag`, in document order
pub fn elements_by_tag(root: &Handle, tag: &str) -> Vec<Handle> {
    let mut found = Vec::new();
    walk(root, &mut |node| {
        if is_tag(node, tag) {
            found.push(node.clone());
        }
    });
    found
}

pub fn first_by_tag(root: &Handle, tag: &str) -> Option<Handle> {
    elements_by_tag(root, tag).into_iter().next()
}

/// Detach every element named `tag`. Returns how many were removed.
pub fn remove_elements(root: &Handle, tag: &str) -> usize {
    let mut removed = 0;
    walk(root, &mut |node| {
        let before = node.children.borrow().len();
        node.children.borrow_mut().retain(|child| {
            let matches = is_tag(child, tag);
            if matches {
                child.parent.set(None);
            }
            !matches
        });
        removed += before - node.children.borrow().len();
    });
    removed
}

/// Concatenated text of the direct text children (enough for `<style>`).
pub fn text_content(handle: &Handle) -> String {
    let mut text = String::new();
    for child in handle.children.borrow().iter() {
        if let NodeData::Text { contents } = &child.data {
            text.push_str(&contents.borrow());
        }
    }
    text
}

/// Replace the text of an element that only holds text (such as `<style>`).
pub fn set_text_content(handle: &Handle, text: &str) {
    let mut children = handle.children.borrow_mut();
    let first_text = children
        .iter()
        .position(|child| matches!(child.data, NodeData::Text { .. }));

    let Some(index) = first_text else {
        return;
    };
    let keep = Rc::clone(&children[index]);
    if let NodeData::Text { contents } = &keep.data {
        *contents.borrow_mut() = StrTendril::from(text);
    }
    children.retain(|child| Rc::ptr_eq(child, &keep) || !matches!(child.data, NodeData::Text { .. }));
}

/// Escape `&` the way the serializer writes it inside attribute values.
pub fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edits_attributes_and_serializes() {
        let dom = parse(r#"<html><head></head><body><img src="a.png" srcset="a2.png 2x"></body></html>"#);
        let img = first_by_tag(&dom.document, "img").unwrap();

        set_attr(&img, "src", "https://x.com/a.png");
        set_attr(&img, "data-section-id", "section_0");
        remove_attr(&img, "srcset");

        let html = serialize_children(&dom.document).unwrap();
        assert!(html.contains(r#"src="https://x.com/a.png""#));
        assert!(html.contains(r#"data-section-id="section_0""#));
        assert!(!html.contains("srcset"));
    }

    #[test]
    fn removes_every_base_element() {
        let dom = parse(r#"<html><head><base href="https://x.com/"><title>t</title></head><body><base href="/b/"></body></html>"#);
        assert_eq!(remove_elements(&dom.document, "base"), 2);
        assert!(first_by_tag(&dom.document, "base").is_none());
        assert!(serialize_children(&dom.document).unwrap().contains("<title>t</title>"));
    }

    #[test]
    fn replaces_style_text() {
        let dom = parse("<html><head><style>.a{background:url(x.png)}</style></head><body></body></html>");
        let style = first_by_tag(&dom.document, "style").unwrap();
        assert_eq!(text_content(&style), ".a{background:url(x.png)}");

        set_text_content(&style, ".a{background:url(\"images/x.png\")}");
        let html = serialize_children(&dom.document).unwrap();
        assert!(html.contains(r#"<style>.a{background:url("images/x.png")}</style>"#));
    }

    #[test]
    fn first_attr_skips_blank_values() {
        let dom = parse(r#"<img src="" data-src="  " data-original="real.jpg">"#);
        let img = first_by_tag(&dom.document, "img").unwrap();
        assert_eq!(first_attr(&img, &["src", "data-src", "data-original"]).as_deref(), Some("real.jpg"));
    }

    #[test]
    fn body_fragment_keeps_leading_style() {
        let dom = parse_body_fragment("<style>p{}</style><p>hi <img src=\"a.png\"></p>");
        let root = fragment_root(&dom);
        let html = serialize_children(&root).unwrap();
        assert_eq!(html, "<style>p{}</style><p>hi <img src=\"a.png\"></p>");
    }

    #[test]
    fn fragment_nodes_are_reachable_while_dom_lives() {
        let dom = parse_body_fragment("<section><img src=\"a.png\"><img src=\"b.png\"></section>");
        let images = elements_by_tag(&fragment_root(&dom), "img");
        let srcs: Vec<String> = images.iter().filter_map(|img| get_attr(img, "src")).collect();
        assert_eq!(srcs, vec!["a.png", "b.png"]);
    }
}
