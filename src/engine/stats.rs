/// Running count, mean and sum of squared deviations (m2) over payoff
/// samples.
///
/// Deviations are taken from the running mean, so precision holds when
/// payoffs are large and tightly clustered. Partitions are accumulated
/// independently and merged in a fixed order, so the reduction does not
/// depend on how many workers produced them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PayoffStats {
    pub count: usize,
    mean: f64,
    m2: f64,
}

impl PayoffStats {
    pub fn from_slice(payoffs: &[f64]) -> Self {
        let mut stats = Self::default();
        for &p in payoffs {
            stats.push(p);
        }
        stats
    }

    #[inline]
    pub fn push(&mut self, payoff: f64) {
        self.count += 1;
        let delta = payoff - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (payoff - self.mean);
    }

    /// Pairwise combination of two partitions (Chan et al.).
    #[inline]
    pub fn merge(self, other: Self) -> Self {
        if other.count == 0 {
            return self;
        }
        if self.count == 0 {
            return other;
        }
        let (na, nb) = (self.count as f64, other.count as f64);
        let n = na + nb;
        let delta = other.mean - self.mean;
        Self {
            count: self.count + other.count,
            mean: self.mean + delta * nb / n,
            m2: self.m2 + other.m2 + delta * delta * na * nb / n,
        }
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population variance m2 / n.
    #[inline]
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        (self.m2 / self.count as f64).max(0.0)
    }

    #[inline]
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Standard error of the mean: std_dev / sqrt(count).
    #[inline]
    pub fn std_error(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.std_dev() / (self.count as f64).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_known_moments() {
        let s = PayoffStats::from_slice(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(s.count, 8);
        assert_abs_diff_eq!(s.mean(), 5.0);
        assert_abs_diff_eq!(s.std_dev(), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.std_error(), 2.0 / 8f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let data: Vec<f64> = (0..1000).map(|i| ((i * 37) % 101) as f64 * 0.25).collect();
        let whole = PayoffStats::from_slice(&data);
        let merged = data
            .chunks(128)
            .map(PayoffStats::from_slice)
            .fold(PayoffStats::default(), PayoffStats::merge);
        assert_eq!(whole.count, merged.count);
        assert_abs_diff_eq!(whole.mean(), merged.mean(), epsilon = 1e-12);
        assert_abs_diff_eq!(whole.variance(), merged.variance(), epsilon = 1e-9);
    }

    #[test]
    fn test_single_sample_has_zero_error() {
        let s = PayoffStats::from_slice(&[3.5]);
        assert_eq!(s.std_error(), 0.0);
        assert_eq!(s.mean(), 3.5);
    }

    #[test]
    fn test_constant_samples_never_negative_variance() {
        let s = PayoffStats::from_slice(&[0.1; 10_000]);
        assert!(s.variance() >= 0.0);
        assert!(s.std_error().is_finite());
    }

    #[test]
    fn test_large_clustered_payoffs_keep_precision() {
        let base = 1e9;
        let data: Vec<f64> = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]
            .iter()
            .map(|d| base + d)
            .collect();
        let s = PayoffStats::from_slice(&data);
        assert_abs_diff_eq!(s.mean(), base + 5.0, epsilon = 1e-6);
        assert_abs_diff_eq!(s.std_dev(), 2.0, epsilon = 1e-6);

        let merged = data
            .chunks(3)
            .map(PayoffStats::from_slice)
            .fold(PayoffStats::default(), PayoffStats::merge);
        assert_abs_diff_eq!(merged.std_dev(), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_merge_with_empty_is_identity() {
        let s = PayoffStats::from_slice(&[1.0, 2.0, 3.0]);
        assert_eq!(s.merge(PayoffStats::default()), s);
        assert_eq!(PayoffStats::default().merge(s), s);
    }

    #[test]
    fn test_empty_is_zero() {
        let s = PayoffStats::default();
        assert_eq!(s.mean(), 0.0);
        assert_eq!(s.std_error(), 0.0);
    }
}
