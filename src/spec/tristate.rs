//! Fixed-length arrays of tristate bits, the algebra every condition and
//! switch expression in the pipeline is built on.
//!
//! A position is either defined to 0, defined to 1, or unknown. The array is
//! encoded as two parallel 64-bit word vectors: `mask` marks defined
//! positions, `value` holds the bit where defined. Every operation keeps the
//! canonical form `value & mask == value`; undefined positions always read
//! as zero.

use std::fmt;

use smallvec::{smallvec, SmallVec};

const WORD_BITS: usize = 64;

type Words = SmallVec<[u64; 1]>;

fn mask_for_width(width: usize) -> u64 {
    if width >= WORD_BITS {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// A vector of `len` positions, each 0, 1, or unknown. Value-semantic: all
/// algebraic operations return fresh arrays.
#[derive(Clone, PartialEq, Eq)]
pub struct TristateBitArray {
    len: usize,
    mask: Words,
    value: Words,
}

impl TristateBitArray {
    /// Creates an all-unknown array. Zero-length arrays are a programming
    /// error; specifications always carry at least one bit and one flag slot.
    pub fn new(len: usize) -> Self {
        assert!(len >= 1, "tristate array must have at least one position");
        let words = len.div_ceil(WORD_BITS);
        Self {
            len,
            mask: smallvec![0; words],
            value: smallvec![0; words],
        }
    }

    /// Returns a fresh array with positions `start..=end` defined to the low
    /// `end - start + 1` bits of `value`. The range may cross a word
    /// boundary but is capped at 64 bits.
    pub fn load_bitfield_value(len: usize, start: usize, end: usize, value: u64) -> Self {
        assert!(
            start <= end && end < len,
            "bitfield [{start}..={end}] out of range for {len} positions"
        );
        let width = end - start + 1;
        assert!(width <= WORD_BITS, "bitfield wider than 64 bits");

        let mut out = Self::new(len);
        let field_mask = mask_for_width(width);
        let value = value & field_mask;
        let word = start / WORD_BITS;
        let bit = start % WORD_BITS;
        out.mask[word] |= field_mask << bit;
        out.value[word] |= value << bit;
        if bit + width > WORD_BITS {
            let spill = WORD_BITS - bit;
            out.mask[word + 1] |= field_mask >> spill;
            out.value[word + 1] |= value >> spill;
        }
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Defines position `i`. The one mutating operation, reserved for
    /// parse-time construction.
    pub fn set_bit(&mut self, i: usize, value: bool) {
        assert!(i < self.len, "bit {i} out of range for {} positions", self.len);
        let word = i / WORD_BITS;
        let bit = 1u64 << (i % WORD_BITS);
        self.mask[word] |= bit;
        if value {
            self.value[word] |= bit;
        } else {
            self.value[word] &= !bit;
        }
    }

    pub fn get_mask_bit(&self, i: usize) -> bool {
        assert!(i < self.len, "bit {i} out of range for {} positions", self.len);
        self.mask[i / WORD_BITS] & (1u64 << (i % WORD_BITS)) != 0
    }

    pub fn get_value_bit(&self, i: usize) -> bool {
        assert!(i < self.len, "bit {i} out of range for {} positions", self.len);
        self.value[i / WORD_BITS] & (1u64 << (i % WORD_BITS)) != 0
    }

    pub fn num_significant_bits(&self) -> usize {
        self.mask.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.iter().all(|w| *w == 0)
    }

    /// Iterates the defined positions in ascending order.
    pub fn significant_positions(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|i| self.get_mask_bit(*i))
    }

    /// True when the arrays agree on every position both define.
    pub fn is_compatible(&self, rhs: &Self) -> bool {
        self.check_len(rhs);
        self.mask
            .iter()
            .zip(&rhs.mask)
            .zip(self.value.iter().zip(&rhs.value))
            .all(|((m1, m2), (v1, v2))| (m1 & m2) & (v1 ^ v2) == 0)
    }

    /// True when any position is defined in both arrays.
    pub fn mask_intersects(&self, rhs: &Self) -> bool {
        self.check_len(rhs);
        self.mask.iter().zip(&rhs.mask).any(|(m1, m2)| m1 & m2 != 0)
    }

    /// Positions defined by either operand. Requires compatibility.
    pub fn union(&self, rhs: &Self) -> Self {
        self.check_len(rhs);
        self.check_agreement(rhs);
        let mut out = self.clone();
        for (word, other) in out.mask.iter_mut().zip(&rhs.mask) {
            *word |= other;
        }
        for (word, other) in out.value.iter_mut().zip(&rhs.value) {
            *word |= other;
        }
        out
    }

    /// Positions defined by both operands with agreeing values.
    pub fn intersection(&self, rhs: &Self) -> Self {
        self.check_len(rhs);
        let mut out = Self::new(self.len);
        for i in 0..self.mask.len() {
            let agreed = self.mask[i] & rhs.mask[i] & !(self.value[i] ^ rhs.value[i]);
            out.mask[i] = agreed;
            out.value[i] = self.value[i] & agreed;
        }
        out
    }

    /// Clears every position `rhs` defines.
    pub fn subtract(&self, rhs: &Self) -> Self {
        self.check_len(rhs);
        self.check_agreement(rhs);
        let mut out = self.clone();
        for i in 0..out.mask.len() {
            out.mask[i] &= !rhs.mask[i];
            out.value[i] &= !rhs.mask[i];
        }
        out
    }

    /// Clears the positions where both operands agree; positions where they
    /// disagree or only one side defines are kept.
    pub fn subtract_intersection(&self, rhs: &Self) -> Self {
        self.subtract(&self.intersection(rhs))
    }

    /// Raw 64-bit view of the defined-position mask, word `idx`.
    pub fn mask_word(&self, idx: usize) -> u64 {
        self.mask[idx]
    }

    /// Raw 64-bit view of the defined values, word `idx`.
    pub fn value_word(&self, idx: usize) -> u64 {
        self.value[idx]
    }

    fn check_len(&self, rhs: &Self) {
        assert_eq!(
            self.len, rhs.len,
            "tristate length mismatch: {} vs {}",
            self.len, rhs.len
        );
    }

    fn check_agreement(&self, rhs: &Self) {
        for i in 0..self.mask.len() {
            assert_eq!(
                self.value[i] & rhs.mask[i],
                rhs.value[i] & self.mask[i],
                "incompatible tristate operands in word {i}"
            );
        }
    }
}

impl fmt::Display for TristateBitArray {
    /// Most-significant position first, `.` for unknown, a space after every
    /// fourth bit counting from the LSB. This format is emitted into
    /// generated-code comments.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use fmt::Write;
        for i in (0..self.len).rev() {
            let glyph = if !self.get_mask_bit(i) {
                '.'
            } else if self.get_value_bit(i) {
                '1'
            } else {
                '0'
            };
            f.write_char(glyph)?;
            if i != 0 && i % 4 == 0 {
                f.write_char(' ')?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for TristateBitArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TristateBitArray({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::TristateBitArray;

    fn from_pattern(pattern: &str) -> TristateBitArray {
        let len = pattern.len();
        let mut out = TristateBitArray::new(len);
        for (pos, ch) in pattern.chars().enumerate() {
            match ch {
                '0' => out.set_bit(len - 1 - pos, false),
                '1' => out.set_bit(len - 1 - pos, true),
                '.' => {}
                other => panic!("bad pattern glyph {other:?}"),
            }
        }
        out
    }

    #[test]
    fn set_and_get_round_trip() {
        let mut arr = TristateBitArray::new(70);
        arr.set_bit(0, true);
        arr.set_bit(63, false);
        arr.set_bit(64, true);
        arr.set_bit(69, false);
        assert!(arr.get_mask_bit(0) && arr.get_value_bit(0));
        assert!(arr.get_mask_bit(63) && !arr.get_value_bit(63));
        assert!(arr.get_mask_bit(64) && arr.get_value_bit(64));
        assert!(arr.get_mask_bit(69) && !arr.get_value_bit(69));
        assert!(!arr.get_mask_bit(32), "untouched position stays unknown");
        assert_eq!(arr.num_significant_bits(), 4);
    }

    #[test]
    fn empty_iff_no_significant_bits() {
        let mut arr = TristateBitArray::new(8);
        assert!(arr.is_empty());
        arr.set_bit(3, false);
        assert!(!arr.is_empty());
        assert_eq!(arr.num_significant_bits(), 1);
    }

    #[test]
    fn compatibility_ignores_one_sided_positions() {
        let a = from_pattern("10..");
        let b = from_pattern("1.0.");
        let c = from_pattern("0...");
        assert!(a.is_compatible(&b), "agreeing overlap is compatible");
        assert!(b.is_compatible(&a), "compatibility is symmetric");
        assert!(!a.is_compatible(&c), "bit 3 disagrees");
    }

    #[test]
    fn union_merges_defined_positions() {
        let a = from_pattern("10..");
        let b = from_pattern("..01");
        assert_eq!(a.union(&b), from_pattern("1001"));
        assert_eq!(a.union(&a), a, "union is idempotent");
    }

    #[test]
    #[should_panic(expected = "incompatible")]
    fn union_rejects_disagreeing_operands() {
        let a = from_pattern("10..");
        let b = from_pattern("0...");
        let _ = a.union(&b);
    }

    #[test]
    fn intersection_keeps_agreed_positions_only() {
        let a = from_pattern("10.0");
        let b = from_pattern("1.00");
        assert_eq!(a.intersection(&b), from_pattern("1..0"));
        let c = from_pattern("00..");
        assert_eq!(a.intersection(&c), from_pattern(".0.."), "disagreeing bit drops out");
    }

    #[test]
    fn subtract_clears_rhs_positions() {
        let a = from_pattern("1010");
        let b = from_pattern("1.1.");
        assert_eq!(a.subtract(&b), from_pattern(".0.0"));
    }

    #[test]
    fn subtract_intersection_definition_holds() {
        let a = from_pattern("101.");
        let b = from_pattern("1.00");
        assert_eq!(
            a.subtract_intersection(&b),
            a.subtract(&a.intersection(&b)),
            "subtract_intersection must equal subtract of intersection"
        );
        assert!(a.subtract_intersection(&a).is_empty());
    }

    #[test]
    fn load_bitfield_sets_exactly_the_range() {
        let arr = TristateBitArray::load_bitfield_value(16, 4, 7, 0b1010);
        assert_eq!(arr.num_significant_bits(), 4);
        assert_eq!(arr.to_string(), ".... .... 1010 ....");
        assert!(!arr.get_value_bit(4));
        assert!(arr.get_value_bit(5));
        assert!(!arr.get_value_bit(6));
        assert!(arr.get_value_bit(7));
    }

    #[test]
    fn load_bitfield_crosses_word_boundary() {
        let arr = TristateBitArray::load_bitfield_value(80, 60, 67, 0b1111_0001);
        assert_eq!(arr.num_significant_bits(), 8);
        for i in 60..=67 {
            assert!(arr.get_mask_bit(i), "bit {i} must be defined");
        }
        assert!(arr.get_value_bit(60), "low bit of the value lands on start");
        assert!(!arr.get_value_bit(61));
        assert!(arr.get_value_bit(67), "high bit crosses into the second word");
        assert!(!arr.get_mask_bit(59));
        assert!(!arr.get_mask_bit(68));
    }

    #[test]
    fn display_groups_nibbles_msb_first() {
        let arr = from_pattern("10..0110");
        assert_eq!(arr.to_string(), "10.. 0110");
        let narrow = from_pattern("1.0");
        assert_eq!(narrow.to_string(), "1.0", "no grouping below five bits");
    }

    #[test]
    fn mask_intersects_detects_overlap() {
        let a = from_pattern("1...");
        let b = from_pattern(".0..");
        let c = from_pattern("0...");
        assert!(!a.mask_intersects(&b));
        assert!(a.mask_intersects(&c));
    }
}
