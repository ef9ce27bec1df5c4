//! decgen turns textual binary-pattern specifications into C-family decoder
//! source. A specification lists fixed-width bit patterns (with don't-care
//! positions), optional context-flag constraints, weights, and code
//! fragments; the generated decoder dispatches to the first matching rule
//! through a tree of conditionals and switches chosen by a quality-driven
//! heuristic.
//!
//! The pipeline is staged: [`spec::parse_str`] produces a
//! [`Specification`]; [`tree::build_tree`] projects its rules through rule
//! sets into a decoder [`Node`] tree; [`emit::emit`] renders the tree.

pub mod config;
pub mod emit;
pub mod reach;
pub mod spec;
pub mod tree;

pub use config::Config;
pub use spec::{Condition, Specification, SpecError, TristateBitArray};
pub use tree::{build_tree, Node};
