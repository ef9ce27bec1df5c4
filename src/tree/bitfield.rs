//! Switchable expressions: contiguous bitfields and ordered sets of
//! disjoint bitfields, each carrying a quality score relative to an ideal
//! switch width.

use smallvec::SmallVec;

use crate::config::Config;
use crate::spec::TristateBitArray;

/// A contiguous inclusive bit range `[start..=end]`, at most 64 bits wide.
#[derive(Debug, Clone, Copy)]
pub struct Bitfield {
    start: usize,
    end: usize,
    quality: f32,
}

impl Bitfield {
    /// Scores the field against the caller's ideal width: the summed per-bit
    /// quality, damped by the width mismatch.
    pub fn scored(start: usize, end: usize, quality_sum: f32, ideal: usize, config: &Config) -> Self {
        assert!(start <= end, "inverted bitfield range");
        let width = end - start + 1;
        assert!(width <= 64, "bitfield wider than 64 bits");
        let delta = (ideal as f32 - width as f32).abs();
        let quality = quality_sum / (1.0 + delta).powf(config.bitfield_length_delta_power);
        Self { start, end, quality }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn num_bits(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    pub fn bits_for_value(&self, num_bits_total: usize, value: u64) -> TristateBitArray {
        TristateBitArray::load_bitfield_value(num_bits_total, self.start, self.end, value)
    }
}

impl PartialEq for Bitfield {
    /// Positional equality; the quality score is derived data.
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.end == other.end
    }
}

/// Disjoint bitfields concatenated into one switch expression. Fields are
/// kept in ascending start order; case value `v` assigns its lowest chunk to
/// the lowest-positioned field.
#[derive(Debug, Clone)]
pub struct BitfieldSet {
    fields: SmallVec<[Bitfield; 2]>,
    quality: f32,
}

impl BitfieldSet {
    /// Builds a set from disjoint fields and their summed per-bit quality.
    /// The quality formula is reapplied on every construction, so growing a
    /// set recomputes its score.
    pub fn scored(
        mut fields: SmallVec<[Bitfield; 2]>,
        quality_sum: f32,
        ideal: usize,
        config: &Config,
    ) -> Self {
        assert!(!fields.is_empty(), "bitfield set needs at least one field");
        fields.sort_by_key(Bitfield::start);
        for pair in fields.windows(2) {
            assert!(pair[0].end < pair[1].start, "bitfield set members overlap");
        }
        let width: usize = fields.iter().map(Bitfield::num_bits).sum();
        let delta = (ideal as f32 - width as f32).abs();
        let quality = config.bitfield_set_coef * quality_sum
            / (1.0 + delta).powf(config.bitfield_set_length_delta_power);
        Self { fields, quality }
    }

    pub fn fields(&self) -> &[Bitfield] {
        &self.fields
    }

    pub fn num_bits(&self) -> usize {
        self.fields.iter().map(Bitfield::num_bits).sum()
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    pub fn bits_for_value(&self, num_bits_total: usize, value: u64) -> TristateBitArray {
        let mut out = TristateBitArray::new(num_bits_total);
        let mut shift = 0;
        for field in &self.fields {
            let chunk = (value >> shift) & mask_for_width(field.num_bits());
            out = out.union(&field.bits_for_value(num_bits_total, chunk));
            shift += field.num_bits();
        }
        out
    }
}

impl PartialEq for BitfieldSet {
    /// Pairwise field equality at matching indices.
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self.fields.iter().zip(&other.fields).all(|(a, b)| a == b)
    }
}

/// Expression a switch node dispatches on.
#[derive(Debug, Clone, PartialEq)]
pub enum Switchable {
    Field(Bitfield),
    Set(BitfieldSet),
}

impl Switchable {
    pub fn num_bits(&self) -> usize {
        match self {
            Switchable::Field(field) => field.num_bits(),
            Switchable::Set(set) => set.num_bits(),
        }
    }

    /// Number of case values the expression can take. Widths run up to 64
    /// inclusive, so the count is returned as `u128` to keep `2^64` exact.
    pub fn num_values(&self) -> u128 {
        debug_assert!(self.num_bits() <= 64);
        1u128 << self.num_bits()
    }

    pub fn quality(&self) -> f32 {
        match self {
            Switchable::Field(field) => field.quality(),
            Switchable::Set(set) => set.quality(),
        }
    }

    /// The tristate pattern an input must match for this expression to
    /// evaluate to `value`: exactly the covered positions, defined to the
    /// corresponding bits of `value`.
    pub fn bits_for_value(&self, num_bits_total: usize, value: u64) -> TristateBitArray {
        match self {
            Switchable::Field(field) => field.bits_for_value(num_bits_total, value),
            Switchable::Set(set) => set.bits_for_value(num_bits_total, value),
        }
    }
}

fn mask_for_width(width: usize) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

#[cfg(test)]
mod tests {
    use smallvec::smallvec;

    use super::*;

    #[test]
    fn bitfield_quality_penalises_width_mismatch() {
        let config = Config::default();
        let exact = Bitfield::scored(0, 3, 1.0, 4, &config);
        assert_eq!(exact.quality(), 1.0, "no penalty at the ideal width");
        let narrow = Bitfield::scored(0, 1, 1.0, 4, &config);
        assert!(
            narrow.quality() < exact.quality(),
            "two bits short of ideal must score below exact"
        );
        let expected = 1.0 / 3.0f32.sqrt();
        assert!((narrow.quality() - expected).abs() < 1e-6);
    }

    #[test]
    fn set_quality_applies_coefficient() {
        let mut config = Config::default();
        config.bitfield_set_coef = 0.5;
        let set = BitfieldSet::scored(
            smallvec![
                Bitfield::scored(0, 1, 0.5, 4, &config),
                Bitfield::scored(4, 5, 0.5, 4, &config),
            ],
            1.0,
            4,
            &config,
        );
        assert_eq!(set.num_bits(), 4);
        assert_eq!(set.quality(), 0.5, "coefficient scales the summed quality");
    }

    #[test]
    fn set_value_enumeration_fills_low_field_first() {
        let config = Config::default();
        let set = BitfieldSet::scored(
            smallvec![
                Bitfield::scored(4, 5, 0.5, 4, &config),
                Bitfield::scored(0, 1, 0.5, 4, &config),
            ],
            1.0,
            4,
            &config,
        );
        // Fields re-sorted ascending: [0..=1] then [4..=5].
        let bits = set.bits_for_value(8, 0b0111);
        assert_eq!(bits.to_string(), "..01 ..11");
    }

    #[test]
    fn bitfield_set_equality_compares_pairwise() {
        let config = Config::default();
        let a = BitfieldSet::scored(
            smallvec![
                Bitfield::scored(0, 1, 0.5, 4, &config),
                Bitfield::scored(4, 5, 0.5, 4, &config),
            ],
            1.0,
            4,
            &config,
        );
        let b = BitfieldSet::scored(
            smallvec![
                Bitfield::scored(0, 1, 0.5, 4, &config),
                Bitfield::scored(4, 5, 0.5, 4, &config),
            ],
            1.0,
            2,
            &config,
        );
        let c = BitfieldSet::scored(
            smallvec![
                Bitfield::scored(0, 1, 0.5, 4, &config),
                Bitfield::scored(6, 7, 0.5, 4, &config),
            ],
            1.0,
            4,
            &config,
        );
        assert_eq!(a, b, "same fields, different score: still equal");
        assert_ne!(a, c, "second field differs and must be compared");
    }

    #[test]
    fn num_values_is_exact_for_a_full_width_selector() {
        let field = Bitfield::scored(0, 63, 1.0, 64, &Config::default());
        let selector = Switchable::Field(field);
        assert_eq!(selector.num_bits(), 64);
        assert_eq!(
            selector.num_values(),
            u64::MAX as u128 + 1,
            "a 64-bit selector has 2^64 case values, not a wrapped count"
        );
        let narrow = Switchable::Field(Bitfield::scored(0, 3, 1.0, 4, &Config::default()));
        assert_eq!(narrow.num_values(), 16);
    }

    #[test]
    fn field_bits_for_value_covers_exactly_the_range() {
        let field = Bitfield::scored(2, 4, 1.0, 3, &Config::default());
        let bits = field.bits_for_value(8, 0b101);
        assert_eq!(bits.num_significant_bits(), 3);
        assert_eq!(bits.to_string(), "...1 01..");
    }
}
