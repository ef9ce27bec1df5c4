//! Reachability reporting. Rules stay immutable; the walk records rule
//! identities in a side table instead of marking the rules themselves.

use ahash::AHashSet;

use crate::spec::{Rule, Specification};
use crate::tree::Node;

/// Rules that never appear in the built tree, in source order. These are
/// shadowed by earlier rules (or by the fixed flags) and warrant a warning,
/// not a failure.
pub fn unreachable_rules<'a>(spec: &'a Specification, tree: &Node<'a>) -> Vec<&'a Rule> {
    let mut reached: AHashSet<*const Rule> = AHashSet::new();
    tree.touch(&mut |node| {
        if let Node::Rule(rule) = node {
            reached.insert(*rule as *const Rule);
        }
    });
    spec.rules()
        .iter()
        .filter(|rule| !reached.contains(&(*rule as *const Rule)))
        .collect()
}
