//! Shard planning
//!
//! A run may be split across N independent workers. Worker `i` of `N` starts
//! at page `start + i` and then strides by `N`, so the workers together cover
//! exactly the pages a single worker would, with no overlap. Planning is pure
//! arithmetic computed once up front; invalid shard parameters are rejected
//! before any browser work begins.

use crate::ConfigError;

/// The page-visiting plan for one worker of a (possibly sharded) run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardPlan {
    pub shard_count: u32,
    pub shard_index: u32,
    pub effective_start_page: u32,
    pub stride: u32,
}

impl ShardPlan {
    /// Validates the shard parameters and derives the start page and stride.
    ///
    /// `start_page` is clamped up to 1 (page numbering is 1-based). When
    /// `shard_count` is 1 the plan degrades to a plain sequential walk.
    pub fn plan(shard_count: u32, shard_index: u32, start_page: u32) -> Result<Self, ConfigError> {
        if shard_count < 1 {
            return Err(ConfigError::Validation(
                "shard count must be at least 1".into(),
            ));
        }
        if shard_index >= shard_count {
            return Err(ConfigError::Validation(format!(
                "shard index {} out of range for {} shard(s)",
                shard_index, shard_count
            )));
        }
        let base = start_page.max(1);
        let effective_start_page = if shard_count > 1 {
            base + shard_index
        } else {
            base
        };
        Ok(Self {
            shard_count,
            shard_index,
            effective_start_page,
            stride: shard_count,
        })
    }

    pub fn is_sharded(&self) -> bool {
        self.shard_count > 1
    }

    /// Filename suffix distinguishing this worker's artifacts, empty when
    /// the run is not sharded
    pub fn artifact_suffix(&self) -> String {
        if self.is_sharded() {
            format!("_shard{}of{}", self.shard_index + 1, self.shard_count)
        } else {
            String::new()
        }
    }

    /// Remote key prefix for this worker's uploads
    pub fn key_prefix(&self, base: &str) -> String {
        let base = base.trim_end_matches('/');
        if self.is_sharded() {
            format!("{}/shard_{}of{}", base, self.shard_index + 1, self.shard_count)
        } else {
            base.to_string()
        }
    }

    /// The n-th page this worker visits (0-based n)
    pub fn page_at(&self, n: u32) -> u32 {
        self.effective_start_page + n * self.stride
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_shard_walks_sequentially_from_page_one() {
        let plan = ShardPlan::plan(1, 0, 0).unwrap();
        assert_eq!(plan.effective_start_page, 1);
        assert_eq!(plan.stride, 1);
        assert_eq!(
            (0..3).map(|n| plan.page_at(n)).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(plan.artifact_suffix(), "");
    }

    #[test]
    fn middle_shard_of_three_visits_its_arithmetic_sequence() {
        let plan = ShardPlan::plan(3, 1, 1).unwrap();
        assert_eq!(plan.effective_start_page, 2);
        assert_eq!(plan.stride, 3);
        assert_eq!(
            (0..3).map(|n| plan.page_at(n)).collect::<Vec<_>>(),
            vec![2, 5, 8]
        );
    }

    #[test]
    fn shards_cover_the_page_space_disjointly() {
        let count = 4;
        let mut pages: Vec<u32> = (0..count)
            .flat_map(|i| {
                let plan = ShardPlan::plan(count, i, 1).unwrap();
                (0..5).map(move |n| plan.page_at(n))
            })
            .collect();
        pages.sort_unstable();
        let expected: Vec<u32> = (1..=count * 5).collect();
        assert_eq!(pages, expected);
    }

    #[test]
    fn start_page_is_clamped_to_one() {
        let plan = ShardPlan::plan(2, 0, 0).unwrap();
        assert_eq!(plan.effective_start_page, 1);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        assert!(ShardPlan::plan(2, 2, 1).is_err());
        assert!(ShardPlan::plan(0, 0, 1).is_err());
    }

    #[test]
    fn sharded_artifacts_carry_a_one_based_suffix() {
        let plan = ShardPlan::plan(3, 1, 1).unwrap();
        assert_eq!(plan.artifact_suffix(), "_shard2of3");
        assert_eq!(plan.key_prefix("runs/current"), "runs/current/shard_2of3");
    }

    #[test]
    fn unsharded_key_prefix_passes_through() {
        let plan = ShardPlan::plan(1, 0, 1).unwrap();
        assert_eq!(plan.key_prefix("runs/current/"), "runs/current");
    }
}
