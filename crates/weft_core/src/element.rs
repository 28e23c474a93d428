//! Element tree arena
//!
//! A minimal stand-in for the element subtree the directives operate on:
//! tagged nodes with ordered attributes, text content, a form value, a
//! visibility flag, and child lists. Template elements (`tag == "template"`)
//! carry inert content that the list directive clones per item.
//!
//! This is deliberately not a renderer or layout tree; it is the smallest
//! surface the directive compiler needs: attribute scan/strip, text and
//! value writes, subtree cloning, and generated-clone bookkeeping.

use indexmap::IndexMap;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

new_key_type! {
    /// Unique identifier for an element in the tree
    pub struct ElementId;
}

/// A single node in the element tree
#[derive(Clone, Debug)]
pub struct ElementNode {
    /// Tag name ("div", "input", "template", ...)
    pub tag: String,
    /// Text content written by render bindings
    pub text: String,
    /// Form value read and written by two-way state bindings
    pub value: String,
    /// Visibility flag toggled by conditional directives
    pub visible: bool,
    attributes: IndexMap<String, String>,
    children: SmallVec<[ElementId; 4]>,
    parent: Option<ElementId>,
    /// Template element that produced this node as a list clone, if any
    generated_by: Option<ElementId>,
}

impl ElementNode {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            text: String::new(),
            value: String::new(),
            visible: true,
            attributes: IndexMap::new(),
            children: SmallVec::new(),
            parent: None,
            generated_by: None,
        }
    }
}

/// Arena-backed element tree with a fixed root
pub struct ElementTree {
    nodes: SlotMap<ElementId, ElementNode>,
    root: ElementId,
}

impl ElementTree {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(ElementNode::new("root"));
        Self { nodes, root }
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create a detached element; attach it with [`append_child`]
    ///
    /// [`append_child`]: ElementTree::append_child
    pub fn create_element(&mut self, tag: &str) -> ElementId {
        self.nodes.insert(ElementNode::new(tag))
    }

    pub fn append_child(&mut self, parent: ElementId, child: ElementId) {
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.push(child);
        }
    }

    /// Detach an element from its parent and drop its whole subtree
    pub fn remove(&mut self, id: ElementId) {
        if let Some(parent) = self.nodes.get(id).and_then(|n| n.parent) {
            if let Some(node) = self.nodes.get_mut(parent) {
                node.children.retain(|c| *c != id);
            }
        }
        for descendant in self.descendants(id) {
            self.nodes.remove(descendant);
        }
    }

    pub fn get(&self, id: ElementId) -> Option<&ElementNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut ElementNode> {
        self.nodes.get_mut(id)
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: ElementId) -> Vec<ElementId> {
        self.nodes
            .get(id)
            .map(|n| n.children.to_vec())
            .unwrap_or_default()
    }

    /// Preorder walk of an element and everything beneath it
    pub fn descendants(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current) {
                out.push(current);
                for &child in node.children.iter().rev() {
                    stack.push(child);
                }
            }
        }
        out
    }

    pub fn attribute(&self, id: ElementId, name: &str) -> Option<&str> {
        self.nodes
            .get(id)
            .and_then(|n| n.attributes.get(name))
            .map(String::as_str)
    }

    pub fn set_attribute(&mut self, id: ElementId, name: &str, value: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.attributes.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove_attribute(&mut self, id: ElementId, name: &str) -> bool {
        self.nodes
            .get_mut(id)
            .map(|n| n.attributes.shift_remove(name).is_some())
            .unwrap_or(false)
    }

    /// Snapshot of an element's attributes in insertion order
    pub fn attributes(&self, id: ElementId) -> Vec<(String, String)> {
        self.nodes
            .get(id)
            .map(|n| {
                n.attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_text(&mut self, id: ElementId, text: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.text = text.to_string();
        }
    }

    pub fn text(&self, id: ElementId) -> &str {
        self.nodes.get(id).map(|n| n.text.as_str()).unwrap_or("")
    }

    pub fn set_value(&mut self, id: ElementId, value: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.value = value.to_string();
        }
    }

    pub fn value_of(&self, id: ElementId) -> &str {
        self.nodes.get(id).map(|n| n.value.as_str()).unwrap_or("")
    }

    pub fn set_visible(&mut self, id: ElementId, visible: bool) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.visible = visible;
        }
    }

    pub fn is_visible(&self, id: ElementId) -> bool {
        self.nodes.get(id).map(|n| n.visible).unwrap_or(false)
    }

    /// Template elements carry inert content cloned by list directives
    pub fn is_template(&self, id: ElementId) -> bool {
        self.nodes.get(id).map(|n| n.tag == "template").unwrap_or(false)
    }

    pub fn generated_by(&self, id: ElementId) -> Option<ElementId> {
        self.nodes.get(id).and_then(|n| n.generated_by)
    }

    /// Deep-clone a subtree under `into_parent`
    ///
    /// The top of the clone records `generated_by` so replace-all list
    /// re-renders can find and drop stale clones.
    pub fn clone_subtree(
        &mut self,
        source: ElementId,
        into_parent: ElementId,
        generated_by: Option<ElementId>,
    ) -> ElementId {
        let clone = self.clone_node(source, into_parent);
        if let Some(node) = self.nodes.get_mut(clone) {
            node.generated_by = generated_by;
        }
        clone
    }

    fn clone_node(&mut self, source: ElementId, into_parent: ElementId) -> ElementId {
        let (mut node, children) = match self.nodes.get(source) {
            Some(n) => (
                ElementNode {
                    tag: n.tag.clone(),
                    text: n.text.clone(),
                    value: n.value.clone(),
                    visible: n.visible,
                    attributes: n.attributes.clone(),
                    children: SmallVec::new(),
                    parent: None,
                    generated_by: None,
                },
                n.children.to_vec(),
            ),
            None => return self.create_element(""),
        };
        node.parent = Some(into_parent);
        let clone = self.nodes.insert(node);
        if let Some(parent) = self.nodes.get_mut(into_parent) {
            parent.children.push(clone);
        }
        for child in children {
            self.clone_node(child, clone);
        }
        clone
    }

    /// Drop every child of `parent` that was generated from `template`
    ///
    /// Returns the removed clone roots so callers can release bindings
    /// held against them.
    pub fn remove_generated(&mut self, parent: ElementId, template: ElementId) -> Vec<ElementId> {
        let stale: Vec<ElementId> = self
            .children(parent)
            .into_iter()
            .filter(|&c| self.generated_by(c) == Some(template))
            .collect();
        for &id in &stale {
            self.remove(id);
        }
        stale
    }
}

impl Default for ElementTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_append() {
        let mut tree = ElementTree::new();
        let div = tree.create_element("div");
        tree.append_child(tree.root(), div);

        assert_eq!(tree.parent(div), Some(tree.root()));
        assert_eq!(tree.children(tree.root()), vec![div]);
        assert!(tree.is_visible(div));
    }

    #[test]
    fn test_attributes_preserve_order() {
        let mut tree = ElementTree::new();
        let el = tree.create_element("input");
        tree.set_attribute(el, "b", "2");
        tree.set_attribute(el, "a", "1");

        let attrs = tree.attributes(el);
        assert_eq!(attrs[0].0, "b");
        assert_eq!(attrs[1].0, "a");

        assert!(tree.remove_attribute(el, "b"));
        assert!(!tree.remove_attribute(el, "b"));
        assert_eq!(tree.attribute(el, "a"), Some("1"));
    }

    #[test]
    fn test_clone_subtree() {
        let mut tree = ElementTree::new();
        let template = tree.create_element("template");
        tree.append_child(tree.root(), template);
        let li = tree.create_element("li");
        tree.set_attribute(li, "v-name", "renderName");
        tree.append_child(template, li);

        let clone = tree.clone_subtree(li, tree.root(), Some(template));
        assert_ne!(clone, li);
        assert_eq!(tree.attribute(clone, "v-name"), Some("renderName"));
        assert_eq!(tree.generated_by(clone), Some(template));
        // the source keeps its attribute
        assert_eq!(tree.attribute(li, "v-name"), Some("renderName"));
    }

    #[test]
    fn test_remove_generated() {
        let mut tree = ElementTree::new();
        let template = tree.create_element("template");
        tree.append_child(tree.root(), template);
        let li = tree.create_element("li");
        tree.append_child(template, li);

        let a = tree.clone_subtree(li, tree.root(), Some(template));
        let b = tree.clone_subtree(li, tree.root(), Some(template));
        assert_eq!(tree.children(tree.root()).len(), 3);

        let removed = tree.remove_generated(tree.root(), template);
        assert_eq!(removed, vec![a, b]);
        assert_eq!(tree.children(tree.root()), vec![template]);
        assert!(!tree.contains(a));
    }

    #[test]
    fn test_remove_drops_subtree() {
        let mut tree = ElementTree::new();
        let div = tree.create_element("div");
        tree.append_child(tree.root(), div);
        let span = tree.create_element("span");
        tree.append_child(div, span);

        tree.remove(div);
        assert!(!tree.contains(div));
        assert!(!tree.contains(span));
        assert!(tree.children(tree.root()).is_empty());
    }
}
