//! Native programs: the tree handed to store drivers and its text form.

pub mod ir;
pub mod render;

pub use ir::{
    edge_lookup, edge_vars, existence, Binding, CompareOp, EdgeKey, Expr, Node, OrderKey, Pattern,
    Projection, Select, Triple, Update, Var,
};
