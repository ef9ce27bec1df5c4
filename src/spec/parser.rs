//! Line-oriented parser for decoder specifications.
//!
//! The first column decides what a line is: `%` starts a directive, `@` a
//! whitespace-preserving code-fragment line, `#` a comment, any other
//! non-blank character a pattern rule; indented lines are trimmed fragment
//! continuations attached to the most recent rule or fragment directive.

use crate::config::Config;

use super::condition::Condition;
use super::error::{SpecError, SpecErrorKind};
use super::model::{Fragment, FragmentSlot, Rule, Specification};
use super::tristate::TristateBitArray;

/// Parses a complete specification source. The configuration travels with
/// the returned [`Specification`] for the rest of the pipeline.
pub fn parse_str(source: &str, config: Config) -> Result<Specification, SpecError> {
    let mut parser = SpecParser::new(config);
    for (idx, line) in source.lines().enumerate() {
        parser.line(idx + 1, line)?;
    }
    parser.finish()
}

/// Where fragment continuation lines currently land.
enum FragmentTarget {
    None,
    Slot(FragmentSlot),
    Rule,
}

struct SpecParser {
    spec: Specification,
    target: FragmentTarget,
    saw_rule: bool,
}

impl SpecParser {
    fn new(config: Config) -> Self {
        Self {
            spec: Specification::new(config),
            target: FragmentTarget::None,
            saw_rule: false,
        }
    }

    fn line(&mut self, line_no: usize, line: &str) -> Result<(), SpecError> {
        if line.trim().is_empty() {
            return Ok(());
        }
        let first = line.chars().next().expect("non-empty line");
        match first {
            '#' => Ok(()),
            '%' => self.directive(line_no, &line[1..]),
            '@' => self.fragment_line(line_no, &line[1..], true),
            ch if ch.is_whitespace() => self.fragment_line(line_no, line, false),
            _ => self.pattern_rule(line_no, line),
        }
    }

    fn finish(self) -> Result<Specification, SpecError> {
        for rule in self.spec.rules() {
            if rule.code().is_empty() {
                return Err(SpecError::new(rule.line(), SpecErrorKind::MissingAction));
            }
        }
        Ok(self.spec)
    }

    fn directive(&mut self, line_no: usize, body: &str) -> Result<(), SpecError> {
        let body = body.trim();
        let (name, rest) = match body.find(char::is_whitespace) {
            Some(pos) => (&body[..pos], body[pos..].trim()),
            None => (body, ""),
        };
        if self.saw_rule {
            return Err(SpecError::new(
                line_no,
                SpecErrorKind::DirectiveAfterRule(name.to_string()),
            ));
        }
        match name {
            "bits" => {
                let bits = parse_usize(line_no, rest)?;
                if bits == 0 {
                    return Err(SpecError::new(line_no, SpecErrorKind::ZeroWidth));
                }
                self.spec.set_num_bits(bits);
                self.target = FragmentTarget::None;
                Ok(())
            }
            "flag" => {
                if rest.is_empty() || !rest.chars().all(is_ident_char) {
                    return Err(SpecError::new(
                        line_no,
                        SpecErrorKind::TrailingText(rest.to_string()),
                    ));
                }
                if !self.spec.add_flag(rest) {
                    return Err(SpecError::new(
                        line_no,
                        SpecErrorKind::DuplicateFlag(rest.to_string()),
                    ));
                }
                self.target = FragmentTarget::None;
                Ok(())
            }
            "rootIndentation" => {
                let depth = parse_usize(line_no, rest)?;
                self.spec.set_root_indentation(depth);
                self.target = FragmentTarget::None;
                Ok(())
            }
            "enumIndentation" => {
                let depth = parse_usize(line_no, rest)?;
                self.spec.set_enum_indentation(depth);
                self.target = FragmentTarget::None;
                Ok(())
            }
            _ => {
                let slot = match name {
                    "fileStart" => FragmentSlot::FileStart,
                    "fileEnd" => FragmentSlot::FileEnd,
                    "enumStart" => FragmentSlot::EnumStart,
                    "enumEnd" => FragmentSlot::EnumEnd,
                    "decodeFlags" => FragmentSlot::DecodeFlags,
                    "fetch" => FragmentSlot::Fetch,
                    _ => {
                        return Err(SpecError::new(
                            line_no,
                            SpecErrorKind::UnknownDirective(name.to_string()),
                        ));
                    }
                };
                self.target = FragmentTarget::Slot(slot);
                if let Some(inline) = rest.strip_prefix(':') {
                    self.spec.fragment_mut(slot).push_trimmed(inline);
                } else if !rest.is_empty() {
                    return Err(SpecError::new(
                        line_no,
                        SpecErrorKind::TrailingText(rest.to_string()),
                    ));
                }
                Ok(())
            }
        }
    }

    fn fragment_line(&mut self, line_no: usize, text: &str, verbatim: bool) -> Result<(), SpecError> {
        let fragment: &mut Fragment = match self.target {
            FragmentTarget::None => {
                return Err(SpecError::new(line_no, SpecErrorKind::StrayFragment));
            }
            FragmentTarget::Slot(slot) => self.spec.fragment_mut(slot),
            FragmentTarget::Rule => self
                .spec
                .rule_code_mut()
                .expect("rule target implies at least one rule"),
        };
        if verbatim {
            fragment.push_verbatim(text);
        } else {
            fragment.push_trimmed(text);
        }
        Ok(())
    }

    fn pattern_rule(&mut self, line_no: usize, line: &str) -> Result<(), SpecError> {
        let num_bits = self.spec.num_bits();
        if num_bits == 0 {
            return Err(SpecError::new(line_no, SpecErrorKind::MissingBits));
        }

        let pattern_len = line
            .chars()
            .take_while(|ch| matches!(ch, '0' | '1' | '.'))
            .count();
        if pattern_len != num_bits {
            return Err(SpecError::new(
                line_no,
                SpecErrorKind::WrongBitCount {
                    expected: num_bits,
                    found: pattern_len,
                },
            ));
        }

        let mut decode = TristateBitArray::new(num_bits);
        for (pos, ch) in line[..pattern_len].chars().enumerate() {
            let bit = num_bits - 1 - pos;
            match ch {
                '0' => decode.set_bit(bit, false),
                '1' => decode.set_bit(bit, true),
                _ => {}
            }
        }

        let mut rest = line[pattern_len..].trim_start();
        let mut weight = 1u32;
        if let Some(after) = rest.strip_prefix('$') {
            let literal_len = after
                .chars()
                .take_while(|ch| ch.is_ascii_digit() || *ch == '.')
                .count();
            let literal = &after[..literal_len];
            // The grammar reads a decimal literal here but the stored weight
            // is an integer; fractional digits are truncated away.
            weight = literal
                .parse::<f64>()
                .ok()
                .map(|w| w as u32)
                .filter(|w| *w >= 1)
                .ok_or_else(|| {
                    SpecError::new(line_no, SpecErrorKind::BadNumber(literal.to_string()))
                })?;
            rest = after[literal_len..].trim_start();
        }

        let mut flags = TristateBitArray::new(self.spec.num_flags());
        if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or_else(|| {
                SpecError::new(line_no, SpecErrorKind::TrailingText(rest.to_string()))
            })?;
            for item in after[..close].split(',') {
                let item = item.trim();
                let (value, name) = match item.strip_prefix('!') {
                    Some(name) => (false, name.trim()),
                    None => (true, item),
                };
                let flag = self.spec.flag_by_name(name).ok_or_else(|| {
                    SpecError::new(line_no, SpecErrorKind::UndeclaredFlag(name.to_string()))
                })?;
                flags.set_bit(flag.index(), value);
            }
            rest = after[close + 1..].trim_start();
        }

        let mut code = Fragment::default();
        if let Some(inline) = rest.strip_prefix(':') {
            code.push_trimmed(inline);
        } else if !rest.is_empty() {
            return Err(SpecError::new(
                line_no,
                SpecErrorKind::TrailingText(rest.to_string()),
            ));
        }

        self.spec.push_rule(Rule::new(
            Condition::new(decode, flags),
            code,
            weight,
            line_no,
        ));
        self.saw_rule = true;
        self.target = FragmentTarget::Rule;
        Ok(())
    }
}

fn parse_usize(line_no: usize, text: &str) -> Result<usize, SpecError> {
    text.parse::<usize>()
        .map_err(|_| SpecError::new(line_no, SpecErrorKind::BadNumber(text.to_string())))
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Specification {
        parse_str(source, Config::default()).expect("parse")
    }

    fn parse_err(source: &str) -> SpecError {
        parse_str(source, Config::default()).expect_err("expected parse error")
    }

    #[test]
    fn parses_minimal_rule_with_inline_action() {
        let spec = parse("%bits 4\n01.1 : emit();\n");
        assert_eq!(spec.num_bits(), 4);
        assert_eq!(spec.rules().len(), 1);
        let rule = &spec.rules()[0];
        assert_eq!(rule.weight(), 1);
        assert_eq!(rule.line(), 2);
        assert_eq!(rule.condition().decode().to_string(), "01.1");
        assert!(rule.condition().flags().is_empty());
        assert_eq!(rule.code().lines()[0].text, "emit();");
    }

    #[test]
    fn attaches_indented_and_verbatim_fragment_lines() {
        let spec = parse("%bits 2\n10\n    first();\n@  raw();  \n");
        let code = spec.rules()[0].code();
        assert_eq!(code.lines().len(), 2);
        assert_eq!(code.lines()[0].text, "first();");
        assert!(!code.lines()[0].verbatim);
        assert_eq!(code.lines()[1].text, "  raw();  ", "@ lines keep their whitespace");
        assert!(code.lines()[1].verbatim);
    }

    #[test]
    fn parses_weight_and_flag_constraints() {
        let spec = parse("%bits 4\n%flag C\n%flag Z\n0000 $3 [C,!Z] : act();\n");
        let rule = &spec.rules()[0];
        assert_eq!(rule.weight(), 3);
        let flags = rule.condition().flags();
        assert!(flags.get_mask_bit(0) && flags.get_value_bit(0), "C required set");
        assert!(flags.get_mask_bit(1) && !flags.get_value_bit(1), "Z required clear");
    }

    #[test]
    fn weight_accepts_decimal_literal_but_truncates() {
        let spec = parse("%bits 4\n.... $2.9 : act();\n");
        assert_eq!(spec.rules()[0].weight(), 2, "fractional part is discarded");
    }

    #[test]
    fn fragment_directives_collect_following_lines() {
        let spec = parse("%bits 4\n%fileStart\n@#include <stdint.h>\n%fetch : insn = next();\n.... : act();\n");
        let file_start = spec.fragment(FragmentSlot::FileStart);
        assert_eq!(file_start.lines()[0].text, "#include <stdint.h>");
        let fetch = spec.fragment(FragmentSlot::Fetch);
        assert_eq!(fetch.lines()[0].text, "insn = next();");
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let spec = parse("# comment\n\n%bits 2\n# another\n..\n    act();\n");
        assert_eq!(spec.rules().len(), 1);
    }

    #[test]
    fn indentation_directives_are_recorded() {
        let spec = parse("%bits 1\n%rootIndentation 2\n%enumIndentation 1\n. : act();\n");
        assert_eq!(spec.root_indentation(), 2);
        assert_eq!(spec.enum_indentation(), 1);
    }

    #[test]
    fn rejects_unknown_directive() {
        let err = parse_err("%bogus\n");
        assert!(matches!(err.kind, SpecErrorKind::UnknownDirective(ref name) if name == "bogus"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn rejects_bad_number() {
        let err = parse_err("%bits four\n");
        assert!(matches!(err.kind, SpecErrorKind::BadNumber(_)));
    }

    #[test]
    fn rejects_wrong_bit_count() {
        let err = parse_err("%bits 4\n000 : act();\n");
        assert!(
            matches!(err.kind, SpecErrorKind::WrongBitCount { expected: 4, found: 3 }),
            "got {:?}",
            err.kind
        );
    }

    #[test]
    fn rejects_undeclared_flag() {
        let err = parse_err("%bits 4\n.... [NOPE] : act();\n");
        assert!(matches!(err.kind, SpecErrorKind::UndeclaredFlag(ref name) if name == "NOPE"));
    }

    #[test]
    fn rejects_duplicate_flag() {
        let err = parse_err("%bits 4\n%flag C\n%flag C\n");
        assert!(matches!(err.kind, SpecErrorKind::DuplicateFlag(_)));
        assert_eq!(err.line, 3);
    }

    #[test]
    fn rejects_rule_before_bits() {
        let err = parse_err("0000 : act();\n");
        assert!(matches!(err.kind, SpecErrorKind::MissingBits));
    }

    #[test]
    fn rejects_directive_after_rule() {
        let err = parse_err("%bits 4\n.... : act();\n%flag C\n");
        assert!(matches!(err.kind, SpecErrorKind::DirectiveAfterRule(ref name) if name == "flag"));
    }

    #[test]
    fn rejects_zero_width() {
        let err = parse_err("%bits 0\n");
        assert!(matches!(err.kind, SpecErrorKind::ZeroWidth));
    }

    #[test]
    fn rejects_stray_fragment_line() {
        let err = parse_err("%bits 4\n    act();\n");
        assert!(matches!(err.kind, SpecErrorKind::StrayFragment));
    }

    #[test]
    fn rejects_rule_without_action() {
        let err = parse_err("%bits 4\n....\n");
        assert!(matches!(err.kind, SpecErrorKind::MissingAction));
        assert_eq!(err.line, 2, "reported on the rule line");
    }

    #[test]
    fn rejects_zero_weight() {
        let err = parse_err("%bits 4\n.... $0.4 : act();\n");
        assert!(matches!(err.kind, SpecErrorKind::BadNumber(_)));
    }
}
