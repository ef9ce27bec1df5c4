//! Turns a rule set into a decoder tree through a fixed cascade of
//! optimisation strategies. The first strategy that applies wins; the
//! closing if-chain always applies, so building cannot fail.

use log::trace;

use crate::config::Config;
use crate::spec::{Condition, Specification, TristateBitArray};

use super::analyser::BitfieldAnalyser;
use super::bitfield::Switchable;
use super::node::Node;
use super::ruleset::RuleSet;

/// Builds the decoder tree for a fully populated specification.
/// `fixed_flags` pins context flags for the whole decoder, e.g. from a
/// command-line override.
pub fn build_tree<'a>(
    spec: &'a Specification,
    fixed_flags: Option<&TristateBitArray>,
) -> Node<'a> {
    assert!(spec.num_bits() > 0, "specification has no instruction width");
    assert!(!spec.rules().is_empty(), "specification has no rules");
    let root = RuleSet::root(spec, fixed_flags);
    TreeBuilder {
        spec,
        rule_set: root,
        switch_nesting_depth: 0,
        total_switch_bits: 0,
    }
    .build()
}

struct TreeBuilder<'a> {
    spec: &'a Specification,
    rule_set: RuleSet<'a>,
    switch_nesting_depth: usize,
    total_switch_bits: usize,
}

impl<'a> TreeBuilder<'a> {
    fn build(&self) -> Node<'a> {
        trace!(
            "building subtree: {} rules, depth {}, {} switch bits used",
            self.rule_set.num_rules(),
            self.switch_nesting_depth,
            self.total_switch_bits
        );
        if let Some(node) = self.try_empty() {
            return node;
        }
        if let Some(node) = self.try_fallback_sequence() {
            return node;
        }
        if let Some(node) = self.try_lift_flags() {
            return node;
        }
        if let Some(node) = self.try_lift_decode_bits() {
            return node;
        }
        if let Some(node) = self.try_inverted_pair() {
            return node;
        }
        if let Some(node) = self.try_switch() {
            return node;
        }
        if let Some(node) = self.try_sequence() {
            return node;
        }
        self.build_if_chain()
    }

    fn config(&self) -> &'a Config {
        self.spec.config()
    }

    fn descend(&self, rule_set: RuleSet<'a>) -> TreeBuilder<'a> {
        TreeBuilder {
            spec: self.spec,
            rule_set,
            switch_nesting_depth: self.switch_nesting_depth,
            total_switch_bits: self.total_switch_bits,
        }
    }

    fn try_empty(&self) -> Option<Node<'a>> {
        if self.rule_set.num_rules() == 0 {
            Some(Node::Empty)
        } else {
            None
        }
    }

    /// When the list ends in an unconditional catch-all, build the tree for
    /// everything in front of it and append the catch-all to the resulting
    /// sequence.
    fn try_fallback_sequence(&self) -> Option<Node<'a>> {
        if !self.config().allow_sequence || self.rule_set.num_rules() < 2 {
            return None;
        }
        let last = self.rule_set.entries().last().expect("at least two entries");
        if !last.effective().is_empty() {
            return None;
        }
        let front = self.descend(self.rule_set.derive_excluding_last()).build();
        let mut items = match front {
            Node::Sequence(items) => items,
            other => vec![other],
        };
        items.push(Node::Rule(last.rule()));
        Some(Node::Sequence(items))
    }

    /// When every entry still requires the same flag pattern, test it once
    /// and recurse over rules stripped of it.
    fn try_lift_flags(&self) -> Option<Node<'a>> {
        let entries = self.rule_set.entries();
        let flags = entries[0].effective().flags();
        if flags.is_empty() {
            return None;
        }
        if !entries.iter().all(|e| e.effective().flags() == flags) {
            return None;
        }
        let condition = Condition::new(
            TristateBitArray::new(self.spec.num_bits()),
            flags.clone(),
        );
        let subtree = self.descend(self.rule_set.derive(&condition)).build();
        Some(Node::IfElse {
            condition,
            then_branch: Box::new(subtree),
            else_branch: Box::new(Node::Empty),
        })
    }

    /// Decode-bit counterpart of the flag lift.
    fn try_lift_decode_bits(&self) -> Option<Node<'a>> {
        let entries = self.rule_set.entries();
        let decode = entries[0].effective().decode();
        if decode.is_empty() {
            return None;
        }
        if !entries.iter().all(|e| e.effective().decode() == decode) {
            return None;
        }
        let condition = Condition::new(
            decode.clone(),
            TristateBitArray::new(self.spec.num_flags()),
        );
        let subtree = self.descend(self.rule_set.derive(&condition)).build();
        Some(Node::IfElse {
            condition,
            then_branch: Box::new(subtree),
            else_branch: Box::new(Node::Empty),
        })
    }

    /// Two rules distinguished by opposite values of one decode bit need a
    /// single test with both branches populated.
    fn try_inverted_pair(&self) -> Option<Node<'a>> {
        let entries = self.rule_set.entries();
        if entries.len() != 2 {
            return None;
        }
        for entry in entries {
            let effective = entry.effective();
            if !effective.flags().is_empty() {
                return None;
            }
            if effective.decode().num_significant_bits() != 1 {
                return None;
            }
        }
        let first = entries[0].effective().decode();
        let second = entries[1].effective().decode();
        let bit = first.significant_positions().next().expect("one bit");
        if second.significant_positions().next() != Some(bit) {
            return None;
        }
        if first.get_value_bit(bit) == second.get_value_bit(bit) {
            return None;
        }
        Some(Node::IfElse {
            condition: entries[0].effective().clone(),
            then_branch: Box::new(Node::Rule(entries[0].rule())),
            else_branch: Box::new(Node::Rule(entries[1].rule())),
        })
    }

    fn is_switch_permitted(&self) -> bool {
        let config = self.config();
        config.allow_switch
            && self.rule_set.num_rules() >= config.min_switch_rules
            && self.switch_nesting_depth <= config.max_switch_nesting_depth
    }

    fn try_switch(&self) -> Option<Node<'a>> {
        if !self.is_switch_permitted() {
            return None;
        }
        let config = self.config();
        let min_bits = config.min_switch_bits;
        // Selector widths are capped at 64, the widest value a tristate
        // bitfield load can carry; the configuration is not validated
        // upstream, so the cap is applied here.
        let max_bits = config
            .max_switch_bits
            .min(config.max_total_switch_bits.saturating_sub(self.total_switch_bits))
            .min(64);
        if min_bits == 0 || max_bits < min_bits {
            return None;
        }
        let ideal =
            BitfieldAnalyser::ideal_width(self.rule_set.num_rules()).clamp(min_bits, max_bits);

        let analyser = BitfieldAnalyser::new(&self.rule_set, config);
        let single = analyser.find_best_bitfield(min_bits, max_bits, ideal);
        let set = analyser.find_best_bitfield_set(min_bits, max_bits, ideal);
        let selector = match (single, set) {
            (Some(field), Some(set)) => {
                // The single field wins ties.
                if set.quality() > field.quality() {
                    Switchable::Set(set)
                } else {
                    Switchable::Field(field)
                }
            }
            (Some(field), None) => Switchable::Field(field),
            (None, Some(set)) => Switchable::Set(set),
            (None, None) => return None,
        };

        let width = selector.num_bits();
        let empty_flags = TristateBitArray::new(self.spec.num_flags());
        // The case count is tracked in u128 so a full 64-bit selector does
        // not wrap; each individual case value still fits in u64.
        let mut cases: Vec<Node<'a>> = Vec::new();
        for value in 0..selector.num_values() {
            let bits = selector.bits_for_value(self.spec.num_bits(), value as u64);
            let condition = Condition::new(bits, empty_flags.clone());
            let subtree = TreeBuilder {
                spec: self.spec,
                rule_set: self.rule_set.derive(&condition),
                switch_nesting_depth: self.switch_nesting_depth + 1,
                total_switch_bits: self.total_switch_bits + width,
            }
            .build();
            // Identical case bodies collapse into a fall-through reference
            // to the first occurrence.
            let node = match cases.iter().position(|case| *case == subtree) {
                Some(earlier) => Node::ChildReference(earlier),
                None => subtree,
            };
            cases.push(node);
        }
        Some(Node::Switch { selector, cases })
    }

    fn try_sequence(&self) -> Option<Node<'a>> {
        if !self.config().allow_sequence || self.rule_set.num_rules() < 2 {
            return None;
        }
        let items = self
            .rule_set
            .entries()
            .iter()
            .map(|entry| Node::IfElse {
                condition: entry.effective().clone(),
                then_branch: Box::new(Node::Rule(entry.rule())),
                else_branch: Box::new(Node::Empty),
            })
            .collect();
        Some(Node::Sequence(items))
    }

    /// The unconditional fallback: nested if/else tests in priority order.
    fn build_if_chain(&self) -> Node<'a> {
        let config = self.config();
        let mut node = Node::Empty;
        for entry in self.rule_set.entries().iter().rev() {
            if entry.effective().is_empty() {
                // An unconditional rule shadows everything behind it.
                node = Node::Rule(entry.rule());
                continue;
            }
            let condition = if config.no_optimise_if_condition_nodes {
                entry.rule().condition().clone()
            } else {
                entry.effective().clone()
            };
            node = Node::IfElse {
                condition,
                then_branch: Box::new(Node::Rule(entry.rule())),
                else_branch: Box::new(node),
            };
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::spec::parse_str;

    use super::*;

    fn spec(source: &str, config: Config) -> Specification {
        parse_str(source, config).expect("parse")
    }

    #[test]
    fn lone_unconditional_rule_becomes_a_bare_rule_node() {
        let spec = spec("%bits 4\n.... : act();\n", Config::default());
        let tree = build_tree(&spec, None);
        assert!(matches!(tree, Node::Rule(_)));
    }

    #[test]
    fn single_conditional_rule_is_lifted_into_an_if() {
        let spec = spec("%bits 4\n1010 : act();\n", Config::default());
        let tree = build_tree(&spec, None);
        match tree {
            Node::IfElse {
                condition,
                then_branch,
                else_branch,
            } => {
                assert_eq!(condition.decode().to_string(), "1010");
                assert!(matches!(*then_branch, Node::Rule(_)));
                assert!(matches!(*else_branch, Node::Empty));
            }
            other => panic!("expected if/else, got {other:?}"),
        }
    }

    #[test]
    fn sequence_disallowed_falls_back_to_if_chain() {
        let mut config = Config::default();
        config.allow_sequence = false;
        let spec = spec("%bits 4\n0000 : a();\n0001 : b();\n.... : c();\n", config);
        let tree = build_tree(&spec, None);
        // IfElse(0000, a, IfElse(0001, b, c))
        match tree {
            Node::IfElse { else_branch, .. } => match *else_branch {
                Node::IfElse { else_branch, .. } => {
                    assert!(matches!(*else_branch, Node::Rule(_)), "catch-all terminates the chain");
                }
                other => panic!("expected nested if, got {other:?}"),
            },
            other => panic!("expected if chain, got {other:?}"),
        }
    }

    #[test]
    fn unoptimised_if_conditions_use_the_full_rule_condition() {
        let mut config = Config::default();
        config.allow_sequence = false;
        config.allow_switch = false;
        config.no_optimise_if_condition_nodes = true;
        let spec = spec("%bits 4\n00.. : a();\n01.. : b();\n", config);
        let tree = build_tree(&spec, None);
        let mut conditions = Vec::new();
        tree.touch(&mut |node| {
            if let Node::IfElse { condition, .. } = node {
                conditions.push(condition.decode().to_string());
            }
        });
        assert!(
            conditions.iter().any(|c| c == "00.." || c == "01.."),
            "verbatim rule conditions expected, got {conditions:?}"
        );
    }

    #[test]
    fn switch_not_taken_below_min_rules() {
        let spec = spec(
            "%bits 4\n0000 : a();\n0001 : b();\n0010 : c();\n",
            Config::default(),
        );
        let tree = build_tree(&spec, None);
        let mut switches = 0;
        tree.touch(&mut |node| {
            if matches!(node, Node::Switch { .. }) {
                switches += 1;
            }
        });
        assert_eq!(switches, 0, "three rules stay below MinSwitchRules");
    }

    #[test]
    fn oversized_switch_width_limits_are_clamped() {
        let mut config = Config::default();
        config.max_switch_bits = 200;
        config.max_total_switch_bits = 200;
        let mut source = String::from("%bits 4\n");
        for value in 0..16u32 {
            source.push_str(&format!("{value:04b} : act{value}();\n"));
        }
        let spec = spec(&source, config);
        let tree = build_tree(&spec, None);
        match tree {
            Node::Switch { selector, cases } => {
                assert_eq!(selector.num_bits(), 4, "only the discriminating bits are switched");
                assert_eq!(cases.len(), 16);
            }
            other => panic!("expected switch, got {other:?}"),
        }
    }

    #[test]
    fn deterministic_rebuild_produces_equal_trees() {
        let source = "%bits 8\n0000.... : a();\n0001.... : b();\n0010.... : c();\n0011.... : d();\n1....... : e();\n";
        let spec = spec(source, Config::default());
        let first = build_tree(&spec, None);
        let second = build_tree(&spec, None);
        assert_eq!(first, second);
    }

    #[test]
    #[should_panic(expected = "no rules")]
    fn empty_specification_is_a_programming_error() {
        let spec = spec("%bits 4\n", Config::default());
        let _ = build_tree(&spec, None);
    }
}
