use std::collections::BTreeMap;
use std::fmt;

/// Lengths above this all land in one overflow bucket.
pub const OVERFLOW_BUCKET: u64 = 2000;

/// Coarsens a raw write/read length.
///
/// Exact up to 50 bytes, tens up to 100, hundreds up to 2000, then a single
/// overflow bucket. Applying it to an already bucketed value is a no-op.
pub fn bucket_length(length: u64) -> u64 {
    match length {
        0..=50 => length,
        51..=100 => 10 * (length / 10),
        101..=OVERFLOW_BUCKET => 100 * (length / 100),
        _ => OVERFLOW_BUCKET,
    }
}

/// Occurrence counts keyed by bucketed length.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct LengthHistogram {
    buckets: BTreeMap<u64, u64>,
}

impl LengthHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, length: u64) {
        *self.buckets.entry(bucket_length(length)).or_insert(0) += 1;
    }

    /// Occurrences recorded in exactly this bucket.
    pub fn count(&self, bucket: u64) -> u64 {
        self.buckets.get(&bucket).copied().unwrap_or(0)
    }

    pub fn count_where(&self, mut pred: impl FnMut(u64) -> bool) -> u64 {
        self.buckets
            .iter()
            .filter(|(bucket, _)| pred(**bucket))
            .map(|(_, count)| *count)
            .sum()
    }

    pub fn total(&self) -> u64 {
        self.buckets.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.buckets.iter().map(|(bucket, count)| (*bucket, *count))
    }

    /// Integer percentage (0..=100, rounded down) of occurrences whose
    /// bucketed length is at most `n`. An empty histogram yields 0.
    pub fn percentile_at_most(&self, n: u64) -> u8 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        let occurs = self.count_where(|bucket| bucket <= n);
        let pct = u128::from(occurs) * 100 / u128::from(total);
        u8::try_from(pct).unwrap_or(100)
    }
}

impl Extend<u64> for LengthHistogram {
    fn extend<T: IntoIterator<Item = u64>>(&mut self, iter: T) {
        for length in iter {
            self.record(length);
        }
    }
}

impl FromIterator<u64> for LengthHistogram {
    fn from_iter<T: IntoIterator<Item = u64>>(iter: T) -> Self {
        let mut hist = Self::new();
        hist.extend(iter);
        hist
    }
}

impl fmt::Display for LengthHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (bucket, count)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{bucket}: {count}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bucket_boundaries() {
        assert_eq!(bucket_length(0), 0);
        assert_eq!(bucket_length(50), 50);
        assert_eq!(bucket_length(51), 50);
        assert_eq!(bucket_length(59), 50);
        assert_eq!(bucket_length(99), 90);
        assert_eq!(bucket_length(100), 100);
        assert_eq!(bucket_length(101), 100);
        assert_eq!(bucket_length(1999), 1900);
        assert_eq!(bucket_length(2000), 2000);
        assert_eq!(bucket_length(2001), 2000);
        assert_eq!(bucket_length(u64::MAX), 2000);
    }

    #[test]
    fn percentile_of_empty_is_zero() {
        let hist = LengthHistogram::new();
        assert_eq!(hist.percentile_at_most(0), 0);
        assert_eq!(hist.percentile_at_most(u64::MAX), 0);
    }

    #[test]
    fn percentile_rounds_down() {
        let hist: LengthHistogram = [3, 3, 6].into_iter().collect();
        assert_eq!(hist.percentile_at_most(2), 0);
        assert_eq!(hist.percentile_at_most(3), 66);
        assert_eq!(hist.percentile_at_most(6), 100);
    }

    #[test]
    fn counts_follow_buckets() {
        let hist: LengthHistogram = [3, 57, 58, 150, 4096].into_iter().collect();
        assert_eq!(hist.count(50), 2);
        assert_eq!(hist.count(57), 0);
        assert_eq!(hist.count(100), 1);
        assert_eq!(hist.count(2000), 1);
        assert_eq!(hist.count_where(|b| b % 3 != 0 && b < 10), 0);
        assert_eq!(hist.to_string(), "{3: 1, 50: 2, 100: 1, 2000: 1}");
    }

    proptest! {
        #[test]
        fn bucketing_is_idempotent(len in any::<u64>()) {
            let once = bucket_length(len);
            prop_assert_eq!(bucket_length(once), once);
            prop_assert!(once <= len);
        }

        #[test]
        fn total_matches_recorded(lengths in prop::collection::vec(0u64..5000, 0..200)) {
            let hist: LengthHistogram = lengths.iter().copied().collect();
            prop_assert_eq!(hist.total(), lengths.len() as u64);
        }

        #[test]
        fn percentile_is_monotonic(
            lengths in prop::collection::vec(0u64..5000, 1..200),
            a in 0u64..3000,
            b in 0u64..3000,
        ) {
            let hist: LengthHistogram = lengths.into_iter().collect();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(hist.percentile_at_most(lo) <= hist.percentile_at_most(hi));
            prop_assert_eq!(hist.percentile_at_most(u64::MAX), 100);
            prop_assert_eq!(hist.percentile_at_most(OVERFLOW_BUCKET), 100);
        }
    }
}
