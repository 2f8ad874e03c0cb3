// src/clustering.rs
//
// Disjoint-set forest over record ids. Transitive closure of the accepted
// matches: merge every pair above threshold, then snapshot root → members.
// Single-threaded by contract; find compresses paths, so even reads mutate.

use std::collections::HashMap;

/// Id-keyed union-find. Elements are inserted on first `find`; every find
/// compresses the path it walked. Merging keeps trees shallow enough without
/// rank bookkeeping at the scale of an in-memory record set.
#[derive(Debug, Clone, Default)]
pub struct DisjointSetForest {
    parent: HashMap<String, String>,
}

impl DisjointSetForest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root of `id`, inserting a fresh singleton when unseen. Every node on
    /// the walked path is re-parented to the root.
    pub fn find(&mut self, id: &str) -> String {
        if !self.parent.contains_key(id) {
            self.parent.insert(id.to_string(), id.to_string());
            return id.to_string();
        }

        let mut root = id.to_string();
        loop {
            let next = self.parent[&root].clone();
            if next == root {
                break;
            }
            root = next;
        }

        let mut cursor = id.to_string();
        while cursor != root {
            let next = self.parent[&cursor].clone();
            self.parent.insert(cursor, root.clone());
            cursor = next;
        }
        root
    }

    /// Union the sets containing `x` and `y`. The parent pointer is only
    /// rewired across distinct roots, so no cycle can form.
    pub fn merge(&mut self, x: &str, y: &str) {
        let root_x = self.find(x);
        let root_y = self.find(y);
        if root_x != root_y {
            self.parent.insert(root_x, root_y);
        }
    }

    pub fn same_set(&mut self, x: &str, y: &str) -> bool {
        self.find(x) == self.find(y)
    }

    /// Number of elements ever seen.
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Current partition as root → sorted members. Singletons appear as
    /// one-element lists.
    pub fn snapshot(&mut self) -> HashMap<String, Vec<String>> {
        let ids: Vec<String> = self.parent.keys().cloned().collect();
        let mut clusters: HashMap<String, Vec<String>> = HashMap::new();
        for id in ids {
            let root = self.find(&id);
            clusters.entry(root).or_default().push(id);
        }
        for members in clusters.values_mut() {
            members.sort();
        }
        clusters
    }
}
