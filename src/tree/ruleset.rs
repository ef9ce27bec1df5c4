//! Rule sets: the projection of the specification's rule table under the
//! condition accumulated along a path through the decoder tree.

use crate::spec::{Condition, Rule, Specification, TristateBitArray};

/// A rule together with its effective condition: the part of the rule's
/// condition the enclosing rule set has not already established.
#[derive(Debug, Clone)]
pub struct RuleSetEntry<'a> {
    rule: &'a Rule,
    effective: Condition,
}

impl<'a> RuleSetEntry<'a> {
    pub fn rule(&self) -> &'a Rule {
        self.rule
    }

    pub fn effective(&self) -> &Condition {
        &self.effective
    }
}

/// An accumulating condition plus the rules still in play under it, in
/// priority order.
#[derive(Debug, Clone)]
pub struct RuleSet<'a> {
    condition: Condition,
    entries: Vec<RuleSetEntry<'a>>,
}

impl<'a> RuleSet<'a> {
    /// The root projection: every rule compatible with an empty decode
    /// pattern plus the caller's fixed flags.
    pub fn root(spec: &'a Specification, fixed_flags: Option<&TristateBitArray>) -> Self {
        let flags = match fixed_flags {
            Some(flags) => {
                assert_eq!(
                    flags.len(),
                    spec.num_flags(),
                    "fixed-flag array length must match the flag table"
                );
                flags.clone()
            }
            None => TristateBitArray::new(spec.num_flags()),
        };
        let condition = Condition::new(TristateBitArray::new(spec.num_bits()), flags);
        let entries = populate(spec.rules().iter(), &condition);
        Self { condition, entries }
    }

    /// Narrows the set by a further condition. Entries keep their relative
    /// order; population stops after the first entry whose effective
    /// condition becomes empty, since that rule matches unconditionally and
    /// shadows everything behind it.
    pub fn derive(&self, condition: &Condition) -> Self {
        let condition = self.condition.union(condition);
        let entries = populate(self.entries.iter().map(|entry| entry.rule), &condition);
        Self { condition, entries }
    }

    /// Same condition, without the final entry. Used when the catch-all at
    /// the end of a sequence is peeled off and handled separately.
    pub fn derive_excluding_last(&self) -> Self {
        let mut entries = self.entries.clone();
        entries.pop();
        Self {
            condition: self.condition.clone(),
            entries,
        }
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn entries(&self) -> &[RuleSetEntry<'a>] {
        &self.entries
    }

    pub fn num_rules(&self) -> usize {
        self.entries.len()
    }
}

fn populate<'a>(
    rules: impl Iterator<Item = &'a Rule>,
    condition: &Condition,
) -> Vec<RuleSetEntry<'a>> {
    let mut entries = Vec::new();
    for rule in rules {
        if !rule.condition().is_compatible(condition) {
            continue;
        }
        let effective = rule.condition().subtract_intersection(condition);
        let unconditional = effective.is_empty();
        entries.push(RuleSetEntry { rule, effective });
        if unconditional {
            break;
        }
    }
    entries
}
