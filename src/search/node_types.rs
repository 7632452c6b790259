//! Compile-time node type specialization for search.
//!
//! Uses Rust generics to compile different versions of the search
//! functions per node type, so the branches guarded by `NT::PV` and
//! `NT::ROOT` are eliminated entirely in null-window nodes.
//!
//! # Node Types
//! - `Root`: root of the search tree (PV = true, ROOT = true)
//! - `Pv`: on the principal variation, non-root
//! - `NonPv`: null-window node off the principal variation

/// Trait for compile-time node type specialization.
pub trait NodeType {
    /// Whether this node searches with a full (alpha, beta) window.
    const PV: bool;
    /// Whether this node is the root of the search tree.
    const ROOT: bool;
    /// The node type of child PV searches from this node.
    type Next: NodeType;
}

/// Root node of the search tree.
pub struct Root;

/// A node on the principal variation (non-root).
pub struct Pv;

/// A null-window node off the principal variation.
pub struct NonPv;

impl NodeType for Root {
    const PV: bool = true;
    const ROOT: bool = true;
    type Next = Pv;
}

impl NodeType for Pv {
    const PV: bool = true;
    const ROOT: bool = false;
    type Next = Self;
}

impl NodeType for NonPv {
    const PV: bool = false;
    const ROOT: bool = false;
    type Next = Self;
}
