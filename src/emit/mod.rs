//! Renders a decoder tree as C-family source text.
//!
//! The emitter assumes the `fetch` fragment leaves the instruction word in
//! `insn` and the `decodeFlags` fragment leaves the packed context flags in
//! `flags`; both fragments are opaque pass-through text owned by the
//! specification author.

use std::fmt;

use crate::spec::{Condition, Fragment, FragmentSlot, Specification, TristateBitArray};
use crate::tree::bitfield::{Bitfield, Switchable};
use crate::tree::Node;

#[derive(Debug)]
pub enum EmitError {
    /// The condition tests are rendered as single masked compares; words
    /// beyond 64 bits have no C expression here.
    WordTooWide { what: &'static str, bits: usize },
}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitError::WordTooWide { what, bits } => {
                write!(f, "{what} width {bits} exceeds the 64-bit emitter limit")
            }
        }
    }
}

impl std::error::Error for EmitError {}

/// Renders the full output file for a built tree.
pub fn emit(spec: &Specification, tree: &Node<'_>) -> Result<String, EmitError> {
    if spec.num_bits() > 64 {
        return Err(EmitError::WordTooWide {
            what: "instruction",
            bits: spec.num_bits(),
        });
    }
    if spec.num_flags() > 64 {
        return Err(EmitError::WordTooWide {
            what: "flag set",
            bits: spec.num_flags(),
        });
    }
    let mut emitter = Emitter {
        spec,
        out: String::new(),
    };
    emitter.file(tree);
    Ok(emitter.out)
}

struct Emitter<'a> {
    spec: &'a Specification,
    out: String,
}

impl<'a> Emitter<'a> {
    fn file(&mut self, tree: &Node<'_>) {
        self.fragment(self.spec.fragment(FragmentSlot::FileStart), 0);
        let enum_depth = self.spec.enum_indentation();
        self.fragment(self.spec.fragment(FragmentSlot::EnumStart), enum_depth);
        self.fragment(self.spec.fragment(FragmentSlot::EnumEnd), enum_depth);
        let root_depth = self.spec.root_indentation();
        self.fragment(self.spec.fragment(FragmentSlot::Fetch), root_depth);
        self.fragment(self.spec.fragment(FragmentSlot::DecodeFlags), root_depth);
        self.node(tree, root_depth);
        self.fragment(self.spec.fragment(FragmentSlot::FileEnd), 0);
    }

    fn fragment(&mut self, fragment: &Fragment, depth: usize) {
        for line in fragment.lines() {
            if line.verbatim {
                self.out.push_str(&line.text);
                self.out.push('\n');
            } else {
                self.line(depth, &line.text);
            }
        }
    }

    fn line(&mut self, depth: usize, text: &str) {
        for _ in 0..depth {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn node(&mut self, node: &Node<'_>, depth: usize) {
        match node {
            Node::Empty => {}
            Node::Rule(rule) => {
                self.fragment(rule.code(), depth);
                if self.spec.config().insert_returns {
                    self.line(depth, "return;");
                }
            }
            Node::Sequence(items) => {
                for item in items {
                    self.node(item, depth);
                }
            }
            Node::IfElse {
                condition,
                then_branch,
                else_branch,
            } => {
                let header = format!(
                    "if ({}) {{{}",
                    self.condition_test(condition),
                    self.comment(condition)
                );
                self.line(depth, &header);
                self.node(then_branch, depth + 1);
                if !matches!(**else_branch, Node::Empty) {
                    self.line(depth, "} else {");
                    self.node(else_branch, depth + 1);
                }
                self.line(depth, "}");
            }
            Node::Switch { selector, cases } => {
                let header = format!("switch ({}) {{", selector_expression(selector));
                self.line(depth, &header);
                // Cases that fall through to an earlier body become extra
                // labels on that body.
                let mut labels: Vec<Vec<usize>> = cases.iter().map(|_| Vec::new()).collect();
                for (index, case) in cases.iter().enumerate() {
                    match case {
                        Node::ChildReference(target) => labels[*target].push(index),
                        _ => labels[index].push(index),
                    }
                }
                for (index, case) in cases.iter().enumerate() {
                    if matches!(case, Node::ChildReference(_)) {
                        continue;
                    }
                    for label in &labels[index] {
                        self.line(depth, &format!("case 0x{label:X}:"));
                    }
                    self.node(case, depth + 1);
                    if !self.spec.config().no_break_after_rule {
                        self.line(depth + 1, "break;");
                    }
                }
                self.line(depth, "}");
            }
            Node::ChildReference(_) => {
                unreachable!("child references are emitted as case labels")
            }
        }
    }

    fn comment(&self, condition: &Condition) -> String {
        if self.spec.config().no_pretty_output {
            String::new()
        } else {
            format!(" /* {} */", condition.pretty(self.spec))
        }
    }

    fn condition_test(&self, condition: &Condition) -> String {
        let mut parts = Vec::new();
        if !condition.decode().is_empty() {
            parts.push(masked_compare("insn", condition.decode()));
        }
        if !condition.flags().is_empty() {
            parts.push(masked_compare("flags", condition.flags()));
        }
        parts.join(" && ")
    }
}

fn masked_compare(variable: &str, pattern: &TristateBitArray) -> String {
    format!(
        "({variable} & 0x{:X}) == 0x{:X}",
        pattern.mask_word(0),
        pattern.value_word(0)
    )
}

fn field_expression(field: &Bitfield) -> String {
    let mask = if field.num_bits() >= 64 {
        u64::MAX
    } else {
        (1u64 << field.num_bits()) - 1
    };
    if field.start() == 0 {
        format!("(insn & 0x{mask:X})")
    } else {
        format!("((insn >> {}) & 0x{mask:X})", field.start())
    }
}

fn selector_expression(selector: &Switchable) -> String {
    match selector {
        Switchable::Field(field) => field_expression(field),
        Switchable::Set(set) => {
            let mut out = String::new();
            let mut shift = 0;
            for (index, field) in set.fields().iter().enumerate() {
                if index > 0 {
                    out.push_str(" | ");
                }
                if shift == 0 {
                    out.push_str(&field_expression(field));
                } else {
                    out.push_str(&format!("({} << {shift})", field_expression(field)));
                }
                shift += field.num_bits();
            }
            format!("({out})")
        }
    }
}
