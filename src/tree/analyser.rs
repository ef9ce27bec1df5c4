//! Per-bit discrimination scoring and the search for the best switchable
//! bitfield (or set of disjoint bitfields) over a rule set.

use smallvec::SmallVec;

use crate::config::Config;
use crate::spec::TristateBitArray;

use super::bitfield::{Bitfield, BitfieldSet};
use super::ruleset::RuleSet;

/// Precomputed per-bit statistics for one rule set.
///
/// `bit_quality[i]` is zero when no effective condition defines bit `i` or
/// when every rule that defines it agrees on its value; otherwise it is the
/// bit's share of the total score, weighted by how evenly the rules split on
/// the bit's value.
pub struct BitfieldAnalyser<'c> {
    config: &'c Config,
    exclusion: TristateBitArray,
    bit_quality: Vec<f32>,
    min_significant: usize,
    max_significant: usize,
    has_candidates: bool,
}

impl<'c> BitfieldAnalyser<'c> {
    pub fn new(rule_set: &RuleSet<'_>, config: &'c Config) -> Self {
        let num_bits = rule_set.condition().decode().len();
        let mut total = vec![0u32; num_bits];
        let mut total_one = vec![0u32; num_bits];
        let mut score = vec![0f32; num_bits];

        for entry in rule_set.entries() {
            let effective = entry.effective();
            // A rule that still needs a flag test after the switch only
            // partially benefits from bit discrimination.
            let weight = if effective.flags().is_empty() {
                entry.rule().weight() as f32
            } else {
                entry.rule().weight() as f32 * config.bit_flag_coef
            };
            let decode = effective.decode();
            for i in decode.significant_positions() {
                total[i] += 1;
                if decode.get_value_bit(i) {
                    total_one[i] += 1;
                }
                score[i] += weight;
            }
        }

        let score_sum: f32 = score.iter().sum();
        let mut bit_quality = vec![0f32; num_bits];
        for i in 0..num_bits {
            if total[i] == 0 || score[i] == 0.0 || score_sum == 0.0 {
                continue;
            }
            let ones = total_one[i].min(total[i] - total_one[i]) as f32;
            let balance = 2.0 * ones / total[i] as f32;
            bit_quality[i] = balance * score[i] / score_sum;
        }

        let mut min_significant = 0;
        let mut max_significant = 0;
        let mut has_candidates = false;
        for (i, quality) in bit_quality.iter().enumerate() {
            if *quality > 0.0 {
                if !has_candidates {
                    min_significant = i;
                }
                max_significant = i;
                has_candidates = true;
            }
        }

        Self {
            config,
            exclusion: rule_set.condition().decode().clone(),
            bit_quality,
            min_significant,
            max_significant,
            has_candidates,
        }
    }

    pub fn bit_quality(&self, i: usize) -> f32 {
        self.bit_quality[i]
    }

    /// The ideal switch width for `rule_count` rules: enough bits to give
    /// every rule its own case.
    pub fn ideal_width(rule_count: usize) -> usize {
        debug_assert!(rule_count >= 1);
        rule_count.next_power_of_two().trailing_zeros() as usize
    }

    /// Highest-quality contiguous bitfield with width in `[min, max]`,
    /// avoiding excluded bits and bits that cannot discriminate. Earlier
    /// candidates win ties.
    pub fn find_best_bitfield(&self, min: usize, max: usize, ideal: usize) -> Option<Bitfield> {
        let config = self.config;
        self.search(min, max, &[], |start, end, sum| {
            Bitfield::scored(start, end, sum, ideal, config).quality()
        })
        .map(|(start, end, sum)| Bitfield::scored(start, end, sum, ideal, config))
    }

    /// Highest-quality set of 2 to `MaxSwitchSplits + 1` disjoint bitfields
    /// with total width in `[min, max]`.
    pub fn find_best_bitfield_set(
        &self,
        min: usize,
        max: usize,
        ideal: usize,
    ) -> Option<BitfieldSet> {
        if self.config.max_switch_splits == 0 || !self.has_candidates {
            return None;
        }
        let mut best: Option<BitfieldSet> = None;
        for count in 2..=self.config.max_switch_splits + 1 {
            let Some((fields, quality_sum)) = self.collect_set_fields(count, max, &[]) else {
                continue;
            };
            let width: usize = fields.iter().map(Bitfield::num_bits).sum();
            if width < min || width > max {
                continue;
            }
            let candidate = BitfieldSet::scored(fields, quality_sum, ideal, self.config);
            if best
                .as_ref()
                .map_or(true, |b| candidate.quality() > b.quality())
            {
                best = Some(candidate);
            }
        }
        best
    }

    /// Recursive exact-`count` search: choose the current field's width,
    /// solve for the remaining fields within the leftover budget, then place
    /// the best field of the chosen width outside the bits already taken.
    /// Maximises the summed per-bit quality; the caller applies the width
    /// penalty.
    fn collect_set_fields(
        &self,
        count: usize,
        budget: usize,
        used: &[Bitfield],
    ) -> Option<(SmallVec<[Bitfield; 2]>, f32)> {
        debug_assert!(count >= 1);
        if budget < count {
            return None;
        }
        if count == 1 {
            let (field, quality_sum) = self.best_raw_field(1, budget, used)?;
            let mut fields = SmallVec::new();
            fields.push(field);
            return Some((fields, quality_sum));
        }

        let mut best: Option<(SmallVec<[Bitfield; 2]>, f32)> = None;
        for width in 1..=budget - (count - 1) {
            let Some((sub_fields, sub_sum)) =
                self.collect_set_fields(count - 1, budget - width, used)
            else {
                continue;
            };
            let mut taken: Vec<Bitfield> = used.to_vec();
            taken.extend(sub_fields.iter().copied());
            let Some((field, field_sum)) = self.best_raw_field(width, width, &taken) else {
                continue;
            };
            let total = sub_sum + field_sum;
            if best.as_ref().map_or(true, |(_, q)| total > *q) {
                let mut fields = sub_fields;
                fields.push(field);
                best = Some((fields, total));
            }
        }
        best
    }

    /// Best field by summed per-bit quality, width in `[min, max]`. Used by
    /// the set search, where the width penalty is applied to the whole set.
    fn best_raw_field(
        &self,
        min: usize,
        max: usize,
        used: &[Bitfield],
    ) -> Option<(Bitfield, f32)> {
        self.search(min, max, used, |_, _, sum| sum).map(|(start, end, sum)| {
            let width = end - start + 1;
            (Bitfield::scored(start, end, sum, width, self.config), sum)
        })
    }

    /// Enumerates candidate ranges, start ascending then end ascending, and
    /// keeps the strictly best by `metric`. A zero-quality or excluded bit
    /// invalidates every range extending across it.
    fn search(
        &self,
        min: usize,
        max: usize,
        used: &[Bitfield],
        metric: impl Fn(usize, usize, f32) -> f32,
    ) -> Option<(usize, usize, f32)> {
        if !self.has_candidates || min == 0 || max < min {
            return None;
        }
        let mut best: Option<(usize, usize, f32)> = None;
        let mut best_metric = f32::NEG_INFINITY;
        for start in self.min_significant..=self.max_significant {
            let mut sum = 0f32;
            let last = self.max_significant.min(start + max - 1);
            for end in start..=last {
                if self.bit_quality[end] == 0.0 || self.is_taken(end, used) {
                    break;
                }
                sum += self.bit_quality[end];
                if end - start + 1 < min {
                    continue;
                }
                let value = metric(start, end, sum);
                if value > best_metric {
                    best_metric = value;
                    best = Some((start, end, sum));
                }
            }
        }
        best
    }

    fn is_taken(&self, bit: usize, used: &[Bitfield]) -> bool {
        self.exclusion.get_mask_bit(bit)
            || used
                .iter()
                .any(|field| field.start() <= bit && bit <= field.end())
    }
}
