//! Decoder-tree construction: rule-set projection, per-bit quality
//! analysis, and the strategy cascade that assembles the tree.

pub mod analyser;
pub mod bitfield;
pub mod builder;
pub mod node;
pub mod ruleset;

pub use analyser::BitfieldAnalyser;
pub use bitfield::{Bitfield, BitfieldSet, Switchable};
pub use builder::build_tree;
pub use node::Node;
pub use ruleset::{RuleSet, RuleSetEntry};
