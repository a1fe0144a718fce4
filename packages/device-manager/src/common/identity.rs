//! Identity assignment for nested entity trees.
//!
//! Every identifiable node exposes its id slot through [`Identifiable`] and
//! walks its own children. [`assign_ids`] visits the tree depth-first,
//! pre-order, and fills every empty id with a fresh one from an [`IdMinter`].
//! Existing ids are never replaced, so a second pass over an assigned tree is
//! a no-op.
//!
//! Ids look like `urn:infai:ses:<segment>:<uuid v4>`, e.g.
//! `urn:infai:ses:content-variable:6f0e2b1c-…`.

use thiserror::Error;
use uuid::Uuid;

/// Default prefix of every minted id.
pub const DEFAULT_ID_NAMESPACE: &str = "urn:infai:ses";

/// Receives every id slot of a tree, parents before children.
pub trait IdVisitor {
    fn visit(&mut self, segment: &'static str, id: &mut String);
}

/// A node of an entity tree that carries an id.
pub trait Identifiable {
    /// Kind segment used when minting ids for this node.
    fn id_segment(&self) -> &'static str;

    fn id(&self) -> &str;

    fn id_mut(&mut self) -> &mut String;

    /// Walk the identifiable children (not the node itself).
    fn walk_children(&mut self, _visitor: &mut dyn IdVisitor) {}
}

/// Visit `node` and then, recursively, all of its children.
pub fn walk<E: Identifiable + ?Sized>(node: &mut E, visitor: &mut dyn IdVisitor) {
    let segment = node.id_segment();
    visitor.visit(segment, node.id_mut());
    node.walk_children(visitor);
}

/// Visit every node of a child collection.
pub fn walk_all<E: Identifiable>(nodes: &mut [E], visitor: &mut dyn IdVisitor) {
    for node in nodes {
        walk(node, visitor);
    }
}

/// Mints `<namespace>:<segment>:<uuid v4>` ids.
#[derive(Debug, Clone)]
pub struct IdMinter {
    namespace: String,
}

impl IdMinter {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn mint(&self, segment: &str) -> String {
        format!("{}:{}:{}", self.namespace, segment, Uuid::new_v4())
    }
}

impl Default for IdMinter {
    fn default() -> Self {
        Self::new(DEFAULT_ID_NAMESPACE)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The body names a different entity than the request path.
    #[error("id in body `{body_id}` does not match id in path `{path_id}`")]
    IdMismatch { path_id: String, body_id: String },

    /// A create names the entity it wants to write. Only updates may do that.
    #[error("id `{body_id}` must not be set on create")]
    IdOnCreate { body_id: String },
}

struct Assigner<'a> {
    minter: &'a IdMinter,
    assigned: usize,
}

impl IdVisitor for Assigner<'_> {
    fn visit(&mut self, segment: &'static str, id: &mut String) {
        if id.is_empty() {
            *id = self.minter.mint(segment);
            self.assigned += 1;
        }
    }
}

/// Give every node with an empty id a fresh one.
///
/// Returns how many ids were minted.
pub fn assign_ids<E: Identifiable + ?Sized>(tree: &mut E, minter: &IdMinter) -> usize {
    let mut assigner = Assigner {
        minter,
        assigned: 0,
    };
    walk(tree, &mut assigner);
    assigner.assigned
}

/// Identity assignment for a create.
///
/// The root id is always minted here; a body that already carries one is
/// rejected. Nested ids are kept as with [`assign_ids`].
pub fn assign_ids_for_create<E: Identifiable + ?Sized>(
    tree: &mut E,
    minter: &IdMinter,
) -> Result<usize, IdentityError> {
    if !tree.id().is_empty() {
        return Err(IdentityError::IdOnCreate {
            body_id: tree.id().to_string(),
        });
    }
    Ok(assign_ids(tree, minter))
}

/// Identity assignment for an update addressed by `path_id`.
///
/// A non-empty root id that differs from `path_id` is rejected before
/// anything else happens. Otherwise nested ids are assigned and the root id is
/// set to `path_id`.
pub fn assign_ids_for_update<E: Identifiable + ?Sized>(
    tree: &mut E,
    path_id: &str,
    minter: &IdMinter,
) -> Result<usize, IdentityError> {
    if !tree.id().is_empty() && tree.id() != path_id {
        return Err(IdentityError::IdMismatch {
            path_id: path_id.to_string(),
            body_id: tree.id().to_string(),
        });
    }
    *tree.id_mut() = path_id.to_string();
    Ok(assign_ids(tree, minter))
}

/// Collect every id of a tree in visiting order.
pub fn collect_ids<E: Identifiable + ?Sized>(tree: &mut E) -> Vec<String> {
    struct Collector(Vec<String>);

    impl IdVisitor for Collector {
        fn visit(&mut self, _segment: &'static str, id: &mut String) {
            self.0.push(id.clone());
        }
    }

    let mut collector = Collector(Vec::new());
    walk(tree, &mut collector);
    collector.0
}
