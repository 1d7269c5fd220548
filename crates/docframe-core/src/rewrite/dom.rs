//! Thin helpers over the `markup5ever_rcdom` tree.
//!
//! The rc-DOM exposes its nodes as `Rc<Node>` with interior mutability for
//! children and attributes. Every helper here snapshots what it iterates so
//! callers can mutate the tree while walking the result.

use html5ever::serialize::{SerializeOpts, TraversalScope, serialize};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{Attribute, LocalName, Namespace, ParseOpts, QualName, parse_document};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use std::cell::RefCell;
use std::rc::Rc;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Parse a full HTML document. html5ever never rejects input.
pub fn parse(html: &str) -> RcDom {
    parse_document(RcDom::default(), ParseOpts::default()).one(html)
}

/// Serialize the children of the document node (doctype and root element).
pub fn serialize_document(dom: &RcDom) -> String {
    let mut out = Vec::new();
    let handle: SerializableHandle = dom.document.clone().into();
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::ChildrenOnly(None),
        ..SerializeOpts::default()
    };

    if let Err(err) = serialize(&mut out, &handle, opts) {
        tracing::warn!(error = %err, "html serialization stopped early");
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Local tag name of an element, `None` for other node kinds.
pub fn tag_name(node: &Handle) -> Option<&str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(&*name.local),
        _ => None,
    }
}

/// Whether `node` is an element with the given local name.
pub fn is_element(node: &Handle, tag: &str) -> bool {
    tag_name(node).is_some_and(|name| name.eq_ignore_ascii_case(tag))
}

/// Value of an attribute, if the node is an element carrying it.
pub fn attr(node: &Handle, name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| &*a.name.local == name)
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

/// Value of an attribute when present and not blank.
pub fn non_empty_attr(node: &Handle, name: &str) -> Option<String> {
    attr(node, name).filter(|v| !v.trim().is_empty())
}

/// Set (or add) an attribute on an element. No-op for other node kinds.
pub fn set_attr(node: &Handle, name: &str, value: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let mut attrs = attrs.borrow_mut();
        if let Some(existing) = attrs.iter_mut().find(|a| &*a.name.local == name) {
            existing.value = StrTendril::from(value);
        } else {
            attrs.push(attribute(name, value));
        }
    }
}

/// Remove an attribute from an element.
pub fn remove_attr(node: &Handle, name: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        attrs.borrow_mut().retain(|a| &*a.name.local != name);
    }
}

/// Whether the element's `class` attribute contains `class` as a token.
pub fn has_class(node: &Handle, class: &str) -> bool {
    attr(node, "class").is_some_and(|value| value.split_whitespace().any(|c| c == class))
}

/// Create a detached HTML element.
pub fn create_element(tag: &str, attrs: &[(&str, &str)]) -> Handle {
    Node::new(NodeData::Element {
        name: QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(tag)),
        attrs: RefCell::new(attrs.iter().map(|(k, v)| attribute(k, v)).collect()),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

/// Create a detached text node.
pub fn create_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from(text)),
    })
}

/// Text of a text node.
pub fn text(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

fn attribute(name: &str, value: &str) -> Attribute {
    Attribute {
        name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
        value: StrTendril::from(value),
    }
}

/// Snapshot of a node's children.
pub fn children(node: &Handle) -> Vec<Handle> {
    node.children.borrow().clone()
}

/// Element children of `node` with the given tag.
pub fn child_elements(node: &Handle, tag: &str) -> Vec<Handle> {
    children(node)
        .into_iter()
        .filter(|child| is_element(child, tag))
        .collect()
}

/// All descendants of `node` in document order (excluding `node`).
pub fn descendants(node: &Handle) -> Vec<Handle> {
    let mut out = Vec::new();
    let mut stack: Vec<Handle> = children(node).into_iter().rev().collect();
    while let Some(next) = stack.pop() {
        stack.extend(children(&next).into_iter().rev());
        out.push(next);
    }
    out
}

/// Descendant elements with the given tag, in document order.
pub fn elements_by_tag(node: &Handle, tag: &str) -> Vec<Handle> {
    descendants(node)
        .into_iter()
        .filter(|n| is_element(n, tag))
        .collect()
}

/// First descendant element with the given tag.
pub fn find_element(node: &Handle, tag: &str) -> Option<Handle> {
    descendants(node).into_iter().find(|n| is_element(n, tag))
}

/// Parent of a node, if attached.
pub fn parent(node: &Handle) -> Option<Handle> {
    let weak = node.parent.take();
    let parent = weak.as_ref().and_then(std::rc::Weak::upgrade);
    node.parent.set(weak);
    parent
}

/// Append `child` as the last child of `parent`.
pub fn append(parent: &Handle, child: Handle) {
    detach(&child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

/// Insert `child` as the first child of `parent`.
pub fn prepend(parent: &Handle, child: Handle) {
    detach(&child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().insert(0, child);
}

/// Insert `new_node` right after `reference` under the same parent.
pub fn insert_after(reference: &Handle, new_node: Handle) {
    let Some(parent) = parent(reference) else {
        return;
    };
    detach(&new_node);
    let mut siblings = parent.children.borrow_mut();
    let idx = siblings
        .iter()
        .position(|c| Rc::ptr_eq(c, reference))
        .map_or(siblings.len(), |i| i + 1);
    new_node.parent.set(Some(Rc::downgrade(&parent)));
    siblings.insert(idx, new_node);
}

/// Remove a node from its parent. Returns `false` when already detached.
pub fn detach(node: &Handle) -> bool {
    let Some(parent) = parent(node) else {
        return false;
    };
    node.parent.set(None);
    let mut siblings = parent.children.borrow_mut();
    match siblings.iter().position(|c| Rc::ptr_eq(c, node)) {
        Some(idx) => {
            siblings.remove(idx);
            true
        },
        None => false,
    }
}

/// Put `replacement` in place of `node`. Returns `false` when `node` is detached.
pub fn replace(node: &Handle, replacement: Handle) -> bool {
    let Some(parent) = parent(node) else {
        return false;
    };
    detach(&replacement);
    let mut siblings = parent.children.borrow_mut();
    let Some(idx) = siblings.iter().position(|c| Rc::ptr_eq(c, node)) else {
        return false;
    };
    replacement.parent.set(Some(Rc::downgrade(&parent)));
    siblings[idx] = replacement;
    node.parent.set(None);
    true
}
