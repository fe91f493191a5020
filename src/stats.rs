use std::fmt;

/// Point-in-time usage report for a buffer pool.
///
/// Counters accumulate from open; the lookup-index figures describe the
/// moment the snapshot was taken.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UsageStats {
    /// Fix requests since open, hits and misses together.
    pub requests: u64,
    /// Requests answered from a resident frame.
    pub hits: u64,
    /// Bucket-chain links examined across all hits.
    pub hit_lookups: u64,
    /// Bucket-chain links examined across all misses.
    pub miss_lookups: u64,
    /// Buckets in the lookup index (equal to the frame count).
    pub bucket_count: usize,
    /// Buckets currently holding at least one page.
    pub used_buckets: usize,
    /// Length of the longest bucket chain.
    pub max_chain_len: usize,
    /// Length of the shortest non-empty bucket chain, 0 when the index is
    /// empty.
    pub min_chain_len: usize,
    /// Pages currently resident, the sum of all chain lengths.
    pub resident_pages: usize,
}

impl UsageStats {
    /// Fraction of requests answered from the cache, 0.0 before any request.
    pub fn hit_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.requests as f64
        }
    }

    /// Average chain links examined per hit.
    pub fn avg_hit_lookups(&self) -> f64 {
        if self.hits == 0 {
            0.0
        } else {
            self.hit_lookups as f64 / self.hits as f64
        }
    }

    /// Average chain links examined per miss.
    pub fn avg_miss_lookups(&self) -> f64 {
        let misses = self.requests - self.hits;
        if misses == 0 {
            0.0
        } else {
            self.miss_lookups as f64 / misses as f64
        }
    }

    /// Fraction of buckets in use.
    pub fn index_occupancy(&self) -> f64 {
        if self.bucket_count == 0 {
            0.0
        } else {
            self.used_buckets as f64 / self.bucket_count as f64
        }
    }

    /// Average length of the non-empty bucket chains.
    pub fn avg_chain_len(&self) -> f64 {
        if self.used_buckets == 0 {
            0.0
        } else {
            self.resident_pages as f64 / self.used_buckets as f64
        }
    }
}

impl fmt::Display for UsageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Buffer usage statistics:")?;
        writeln!(f)?;
        writeln!(f, "Requests:                 {}", self.requests)?;
        writeln!(f, "Hits:                     {}", self.hits)?;
        writeln!(f, "Hit ratio:                {:.2}%", self.hit_ratio() * 100.0)?;
        writeln!(f)?;
        writeln!(f, "Average hit lookups:      {:.2}", self.avg_hit_lookups())?;
        writeln!(f, "Average miss lookups:     {:.2}", self.avg_miss_lookups())?;
        writeln!(f)?;
        writeln!(
            f,
            "Index occupancy:          {:.2}%",
            self.index_occupancy() * 100.0
        )?;
        writeln!(f, "Average chain length:     {:.2}", self.avg_chain_len())?;
        writeln!(f, "Maximum chain length:     {}", self.max_chain_len)?;
        write!(f, "Minimum chain length:     {}", self.min_chain_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratios_guard_zero_denominators() {
        let stats = UsageStats::default();
        assert_eq!(stats.hit_ratio(), 0.0);
        assert_eq!(stats.avg_hit_lookups(), 0.0);
        assert_eq!(stats.avg_miss_lookups(), 0.0);
        assert_eq!(stats.index_occupancy(), 0.0);
        assert_eq!(stats.avg_chain_len(), 0.0);
    }

    #[test]
    fn test_derived_ratios() {
        let stats = UsageStats {
            requests: 10,
            hits: 8,
            hit_lookups: 12,
            miss_lookups: 4,
            bucket_count: 16,
            used_buckets: 4,
            max_chain_len: 3,
            min_chain_len: 1,
            resident_pages: 8,
        };
        assert_eq!(stats.hit_ratio(), 0.8);
        assert_eq!(stats.avg_hit_lookups(), 1.5);
        assert_eq!(stats.avg_miss_lookups(), 2.0);
        assert_eq!(stats.index_occupancy(), 0.25);
        assert_eq!(stats.avg_chain_len(), 2.0);
    }

    #[test]
    fn test_display_reports_all_sections() {
        let report = UsageStats {
            requests: 3,
            hits: 1,
            ..Default::default()
        }
        .to_string();
        assert!(report.contains("Requests:"));
        assert!(report.contains("Hit ratio:"));
        assert!(report.contains("Maximum chain length:"));
    }
}
