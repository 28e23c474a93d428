//! Item scope for list-stamped subtrees
//!
//! Directives inside a stamped list clone resolve names against the item
//! first and fall back to top-level state. `merge_into` grafts the
//! conventional `item` / `items` / `index` entries onto a state snapshot
//! before handlers run.

use weft_core::{StateView, Value};

/// Scope of one stamped list item
#[derive(Clone, Debug)]
pub struct ItemContext {
    pub item: Value,
    pub items: Vec<Value>,
    pub index: usize,
}

impl ItemContext {
    pub fn new(item: Value, items: Vec<Value>, index: usize) -> Self {
        Self { item, items, index }
    }

    /// Resolve a dotted path against this item
    ///
    /// `"item"` (or the empty path) is the item itself; `"item.done"` and
    /// the shorthand `"done"` both descend into it. `"index"` resolves to
    /// the stamp position.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        match path {
            "" | "item" => Some(self.item.clone()),
            "index" => Some(Value::from(self.index)),
            _ => {
                let rest = path.strip_prefix("item.").unwrap_or(path);
                self.item.lookup_path(rest).cloned()
            }
        }
    }

    /// Extend a state snapshot with this item's scope entries
    pub fn merge_into(&self, view: StateView) -> StateView {
        view.with_entry("item", self.item.clone())
            .with_entry("items", Value::List(self.items.clone()))
            .with_entry("index", Value::from(self.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn todo(label: &str, done: bool) -> Value {
        let mut map = IndexMap::new();
        map.insert("label".to_string(), Value::from(label));
        map.insert("done".to_string(), Value::from(done));
        Value::Map(map)
    }

    #[test]
    fn test_lookup_paths() {
        let items = vec![todo("a", false), todo("b", true)];
        let ctx = ItemContext::new(items[1].clone(), items, 1);

        assert_eq!(ctx.lookup("item.label"), Some(Value::from("b")));
        assert_eq!(ctx.lookup("done"), Some(Value::Bool(true)));
        assert_eq!(ctx.lookup("index"), Some(Value::Int(1)));
        assert_eq!(ctx.lookup("item"), Some(ctx.item.clone()));
        assert_eq!(ctx.lookup("missing"), None);
    }

    #[test]
    fn test_merge_into_view() {
        let mut entries = IndexMap::new();
        entries.insert("filter".to_string(), Value::from("all"));
        let view = StateView::new(entries);

        let ctx = ItemContext::new(todo("a", false), vec![todo("a", false)], 0);
        let merged = ctx.merge_into(view);

        assert_eq!(merged.get("filter"), Some(&Value::from("all")));
        assert_eq!(merged.lookup("item.label"), Some(&Value::from("a")));
        assert_eq!(merged.get("index"), Some(&Value::Int(0)));
        assert!(merged.get("items").is_some());
    }
}
