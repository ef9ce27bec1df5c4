//! In-memory data model of a decoder specification: context flags, pattern
//! rules, opaque code fragments, and the container tying them together.

use ahash::AHashMap;

use crate::config::Config;

use super::condition::Condition;

/// A named boolean context input. Flags are created at parse time and never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct Flag {
    name: String,
    index: usize,
    is_dummy: bool,
}

impl Flag {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_dummy(&self) -> bool {
        self.is_dummy
    }
}

/// One line of an opaque code fragment. Verbatim lines came from `@` input
/// lines and keep their whitespace; the rest are re-indented on emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentLine {
    pub text: String,
    pub verbatim: bool,
}

/// An opaque code payload: the action of a rule or one of the prologue and
/// epilogue slots of the specification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    lines: Vec<FragmentLine>,
}

impl Fragment {
    pub fn push_verbatim(&mut self, text: &str) {
        self.lines.push(FragmentLine {
            text: text.to_string(),
            verbatim: true,
        });
    }

    pub fn push_trimmed(&mut self, text: &str) {
        self.lines.push(FragmentLine {
            text: text.trim().to_string(),
            verbatim: false,
        });
    }

    pub fn lines(&self) -> &[FragmentLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// A single pattern rule: the condition an input must satisfy, the code to
/// emit on match, a relative frequency weight, and the source line for
/// diagnostics. Rule order is match priority: first match wins.
#[derive(Debug)]
pub struct Rule {
    condition: Condition,
    code: Fragment,
    weight: u32,
    line: usize,
}

impl Rule {
    pub fn new(condition: Condition, code: Fragment, weight: u32, line: usize) -> Self {
        assert!(weight >= 1, "rule weight must be positive");
        Self {
            condition,
            code,
            weight,
            line,
        }
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn code(&self) -> &Fragment {
        &self.code
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn line(&self) -> usize {
        self.line
    }
}

/// Identifies a fragment slot of the specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentSlot {
    FileStart,
    FileEnd,
    EnumStart,
    EnumEnd,
    DecodeFlags,
    Fetch,
}

/// The fully parsed input: instruction width, flag table, ordered rule
/// table, pass-through code fragments, and the build configuration.
#[derive(Debug)]
pub struct Specification {
    num_bits: usize,
    flags: Vec<Flag>,
    flags_by_name: AHashMap<String, usize>,
    rules: Vec<Rule>,
    file_start: Fragment,
    file_end: Fragment,
    enum_start: Fragment,
    enum_end: Fragment,
    decode_flags: Fragment,
    fetch: Fragment,
    root_indentation: usize,
    enum_indentation: usize,
    config: Config,
}

impl Specification {
    /// A specification is born with a single dummy flag so flag-side
    /// tristate arrays never need a zero length. The first real flag
    /// replaces it.
    pub fn new(config: Config) -> Self {
        Self {
            num_bits: 0,
            flags: vec![Flag {
                name: String::new(),
                index: 0,
                is_dummy: true,
            }],
            flags_by_name: AHashMap::new(),
            rules: Vec::new(),
            file_start: Fragment::default(),
            file_end: Fragment::default(),
            enum_start: Fragment::default(),
            enum_end: Fragment::default(),
            decode_flags: Fragment::default(),
            fetch: Fragment::default(),
            root_indentation: 0,
            enum_indentation: 0,
            config,
        }
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    pub fn num_flags(&self) -> usize {
        self.flags.len()
    }

    /// True once a real (non-dummy) flag has been declared.
    pub fn has_flags(&self) -> bool {
        self.flags.iter().any(|f| !f.is_dummy)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn flag(&self, index: usize) -> &Flag {
        &self.flags[index]
    }

    pub fn flag_by_name(&self, name: &str) -> Option<&Flag> {
        self.flags_by_name.get(name).map(|i| &self.flags[*i])
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fragment(&self, slot: FragmentSlot) -> &Fragment {
        match slot {
            FragmentSlot::FileStart => &self.file_start,
            FragmentSlot::FileEnd => &self.file_end,
            FragmentSlot::EnumStart => &self.enum_start,
            FragmentSlot::EnumEnd => &self.enum_end,
            FragmentSlot::DecodeFlags => &self.decode_flags,
            FragmentSlot::Fetch => &self.fetch,
        }
    }

    pub fn root_indentation(&self) -> usize {
        self.root_indentation
    }

    pub fn enum_indentation(&self) -> usize {
        self.enum_indentation
    }

    pub(super) fn set_num_bits(&mut self, num_bits: usize) {
        assert!(num_bits >= 1, "instruction width must be positive");
        self.num_bits = num_bits;
    }

    /// Registers a flag name. Returns `false` when the name is already
    /// taken. Adding the first real flag removes the dummy.
    pub(super) fn add_flag(&mut self, name: &str) -> bool {
        if self.flags_by_name.contains_key(name) {
            return false;
        }
        if self.flags.len() == 1 && self.flags[0].is_dummy {
            self.flags.clear();
        }
        let index = self.flags.len();
        self.flags.push(Flag {
            name: name.to_string(),
            index,
            is_dummy: false,
        });
        self.flags_by_name.insert(name.to_string(), index);
        true
    }

    pub(super) fn push_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub(super) fn fragment_mut(&mut self, slot: FragmentSlot) -> &mut Fragment {
        match slot {
            FragmentSlot::FileStart => &mut self.file_start,
            FragmentSlot::FileEnd => &mut self.file_end,
            FragmentSlot::EnumStart => &mut self.enum_start,
            FragmentSlot::EnumEnd => &mut self.enum_end,
            FragmentSlot::DecodeFlags => &mut self.decode_flags,
            FragmentSlot::Fetch => &mut self.fetch,
        }
    }

    pub(super) fn rule_code_mut(&mut self) -> Option<&mut Fragment> {
        self.rules.last_mut().map(|rule| &mut rule.code)
    }

    pub(super) fn set_root_indentation(&mut self, depth: usize) {
        self.root_indentation = depth;
    }

    pub(super) fn set_enum_indentation(&mut self, depth: usize) {
        self.enum_indentation = depth;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_flag_is_replaced_by_the_first_real_one() {
        let mut spec = Specification::new(Config::default());
        assert_eq!(spec.num_flags(), 1, "born with the dummy flag");
        assert!(!spec.has_flags());
        assert!(spec.flag(0).is_dummy());

        assert!(spec.add_flag("CARRY"));
        assert_eq!(spec.num_flags(), 1, "dummy replaced, not appended to");
        assert!(spec.has_flags());
        assert_eq!(spec.flag(0).name(), "CARRY");

        assert!(spec.add_flag("ZERO"));
        assert_eq!(spec.num_flags(), 2);
        assert_eq!(spec.flag_by_name("ZERO").map(Flag::index), Some(1));
    }

    #[test]
    fn duplicate_flags_are_rejected() {
        let mut spec = Specification::new(Config::default());
        assert!(spec.add_flag("CARRY"));
        assert!(!spec.add_flag("CARRY"));
    }
}
