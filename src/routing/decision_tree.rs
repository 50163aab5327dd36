//! Candidate index over route constraints.
//!
//! # Responsibilities
//! - Pre-group descriptors by route constraint so a lookup touches only
//!   the branches the request's values can satisfy
//! - Return exactly what a brute-force scan would return
//! - Rebuild whenever the descriptor snapshot version changes
//!
//! # Design Decisions
//! - One level per route key, keys sorted; a descriptor without a
//!   constraint on a key sits under that level's `unconstrained` child
//! - Leaves store indices into the snapshot, so the union can be put back
//!   into descriptor order before catch-all precedence applies
//! - A tree holds the snapshot it was built from and is never patched

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::descriptor::store::{ActionDescriptorCollection, ActionDescriptorProvider};
use crate::descriptor::types::{ActionDescriptor, RouteKeyHandling};
use crate::routing::matcher::apply_catch_all_precedence;
use crate::routing::values::{normalize_value, RouteValues};

#[derive(Debug)]
enum Node {
    Leaf(Vec<usize>),
    Branch(Box<Branch>),
}

#[derive(Debug)]
struct Branch {
    key: String,
    exact: HashMap<String, Node>,
    deny: Option<Node>,
    catch_all: Option<Node>,
    unconstrained: Option<Node>,
}

/// Index for one descriptor snapshot.
#[derive(Debug)]
pub struct DecisionTree {
    collection: Arc<ActionDescriptorCollection>,
    root: Node,
}

impl DecisionTree {
    pub fn build(collection: Arc<ActionDescriptorCollection>) -> Self {
        let keys: Vec<String> = collection
            .items
            .iter()
            .flat_map(|d| d.route_constraints.iter().map(|c| c.key.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let indices = (0..collection.items.len()).collect();
        let root = build_node(&collection.items, indices, &keys);

        tracing::debug!(
            version = collection.version,
            descriptors = collection.items.len(),
            levels = keys.len(),
            "Built action decision tree"
        );

        Self { collection, root }
    }

    /// Snapshot version this tree was built from.
    pub fn version(&self) -> u64 {
        self.collection.version
    }

    pub fn collection(&self) -> &Arc<ActionDescriptorCollection> {
        &self.collection
    }

    /// Descriptors whose route constraints pass, after catch-all precedence.
    pub fn select(&self, values: &RouteValues) -> Vec<Arc<ActionDescriptor>> {
        let mut indices = Vec::new();
        walk(&self.root, values, &mut indices);
        indices.sort_unstable();

        let matched = indices
            .into_iter()
            .map(|i| Arc::clone(&self.collection.items[i]))
            .collect();
        apply_catch_all_precedence(matched)
    }
}

fn build_node(items: &[Arc<ActionDescriptor>], indices: Vec<usize>, keys: &[String]) -> Node {
    let Some((key, rest)) = keys.split_first() else {
        return Node::Leaf(indices);
    };
    if indices.is_empty() {
        return Node::Leaf(indices);
    }

    let mut exact: HashMap<String, Vec<usize>> = HashMap::new();
    let mut deny = Vec::new();
    let mut catch_all = Vec::new();
    let mut unconstrained = Vec::new();

    for index in indices {
        match items[index].route_constraint(key).map(|c| &c.handling) {
            Some(RouteKeyHandling::Require(value)) => exact.entry(normalize_value(value)).or_default().push(index),
            Some(RouteKeyHandling::Deny) => deny.push(index),
            Some(RouteKeyHandling::CatchAll) => catch_all.push(index),
            None => unconstrained.push(index),
        }
    }

    let child = |group: Vec<usize>| (!group.is_empty()).then(|| build_node(items, group, rest));

    Node::Branch(Box::new(Branch {
        key: key.clone(),
        exact: exact
            .into_iter()
            .map(|(value, group)| (value, build_node(items, group, rest)))
            .collect(),
        deny: child(deny),
        catch_all: child(catch_all),
        unconstrained: child(unconstrained),
    }))
}

fn walk(node: &Node, values: &RouteValues, out: &mut Vec<usize>) {
    match node {
        Node::Leaf(indices) => out.extend_from_slice(indices),
        Node::Branch(branch) => {
            match values.get(&branch.key) {
                Some(value) => {
                    if let Some(child) = branch.exact.get(&normalize_value(value)) {
                        walk(child, values, out);
                    }
                    if let Some(child) = &branch.catch_all {
                        walk(child, values, out);
                    }
                }
                None => {
                    if let Some(child) = &branch.deny {
                        walk(child, values, out);
                    }
                }
            }
            if let Some(child) = &branch.unconstrained {
                walk(child, values, out);
            }
        }
    }
}

/// Serves the tree for the provider's current snapshot.
pub struct DecisionTreeProvider {
    descriptors: Arc<dyn ActionDescriptorProvider>,
    cached: ArcSwapOption<DecisionTree>,
}

impl DecisionTreeProvider {
    pub fn new(descriptors: Arc<dyn ActionDescriptorProvider>) -> Self {
        Self {
            descriptors,
            cached: ArcSwapOption::const_empty(),
        }
    }

    /// Returns a tree matching the current snapshot, rebuilding if stale.
    pub fn tree(&self) -> Arc<DecisionTree> {
        let collection = self.descriptors.action_descriptors();
        if let Some(tree) = self.cached.load_full() {
            if tree.version() == collection.version {
                return tree;
            }
        }

        let tree = Arc::new(DecisionTree::build(collection));
        self.cached.store(Some(Arc::clone(&tree)));
        tree
    }
}
