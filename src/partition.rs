//! Train/holdout partitioning of the merged record set

use crate::error::{PipelineError, Result};
use crate::storage::{ArtifactKind, ArtifactStore};
use crate::types::{MergedRecord, MergedSet};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// How rows are assigned to the holdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategy {
    /// Whole cards (`cc_num` groups) go to one side
    #[default]
    Group,
    /// Each label class is split separately, preserving the fraud ratio
    Stratified,
}

impl FromStr for SplitStrategy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "group" => Ok(SplitStrategy::Group),
            "stratified" => Ok(SplitStrategy::Stratified),
            other => Err(PipelineError::Config(format!("unknown split strategy {:?}", other))),
        }
    }
}

impl fmt::Display for SplitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitStrategy::Group => write!(f, "group"),
            SplitStrategy::Stratified => write!(f, "stratified"),
        }
    }
}

/// Disjoint train and holdout sets covering a merged set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub strategy: SplitStrategy,
    pub seed: u64,
    pub holdout_fraction: f64,
    pub train: MergedSet,
    pub holdout: MergedSet,
}

/// Split a merged set. Both sides keep the merged (timestamp) row order.
pub fn sample(
    merged: &MergedSet,
    strategy: SplitStrategy,
    seed: u64,
    holdout_fraction: f64,
) -> Result<Partition> {
    if !(holdout_fraction > 0.0 && holdout_fraction < 1.0) {
        return Err(PipelineError::Config(format!(
            "holdout fraction must be in (0, 1), got {}",
            holdout_fraction
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let holdout_rows = match strategy {
        SplitStrategy::Group => group_holdout(&merged.records, holdout_fraction, &mut rng),
        SplitStrategy::Stratified => stratified_holdout(&merged.records, holdout_fraction, &mut rng),
    };

    let (mut train, mut holdout) = (Vec::new(), Vec::new());
    for (i, record) in merged.records.iter().enumerate() {
        if holdout_rows.contains(&i) {
            holdout.push(record.clone());
        } else {
            train.push(record.clone());
        }
    }

    if train.is_empty() || holdout.is_empty() {
        return Err(PipelineError::InsufficientData(format!(
            "{} split of {} rows left an empty partition (train {}, holdout {})",
            strategy,
            merged.len(),
            train.len(),
            holdout.len()
        )));
    }

    let partition = Partition {
        strategy,
        seed,
        holdout_fraction,
        train: merged.with_records(train),
        holdout: merged.with_records(holdout),
    };

    if strategy == SplitStrategy::Stratified
        && (partition.train.positives() == 0 || partition.holdout.positives() == 0)
    {
        return Err(PipelineError::InsufficientData(format!(
            "stratified split needs fraud rows on both sides (train {}, holdout {})",
            partition.train.positives(),
            partition.holdout.positives()
        )));
    }

    info!(
        strategy = %strategy,
        seed,
        train_rows = partition.train.len(),
        holdout_rows = partition.holdout.len(),
        train_fraud_ratio = partition.train.fraud_ratio(),
        holdout_fraud_ratio = partition.holdout.fraud_ratio(),
        "Merged set partitioned"
    );

    Ok(partition)
}

/// Shuffle the distinct cards and send the first `ceil(fraction * n_cards)` to the holdout.
fn group_holdout(records: &[MergedRecord], fraction: f64, rng: &mut ChaCha8Rng) -> HashSet<usize> {
    let mut cards: Vec<u64> = records
        .iter()
        .map(|r| r.cc_num)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    cards.shuffle(rng);

    let n_holdout = (fraction * cards.len() as f64).ceil() as usize;
    let holdout_cards: HashSet<u64> = cards.into_iter().take(n_holdout).collect();

    records
        .iter()
        .enumerate()
        .filter(|(_, r)| holdout_cards.contains(&r.cc_num))
        .map(|(i, _)| i)
        .collect()
}

/// Shuffle each label class and send `round(fraction * n_class)` rows of it to the holdout.
fn stratified_holdout(records: &[MergedRecord], fraction: f64, rng: &mut ChaCha8Rng) -> HashSet<usize> {
    let mut holdout = HashSet::new();

    for label in [0u8, 1u8] {
        let mut rows: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_fraud == label)
            .map(|(i, _)| i)
            .collect();
        rows.shuffle(rng);

        let n_holdout = (fraction * rows.len() as f64).round() as usize;
        holdout.extend(rows.into_iter().take(n_holdout));
    }

    holdout
}

/// Diagnostics of one side of a partition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SideDescription {
    /// (rows, columns)
    pub shape: (usize, usize),
    pub fraud_ratio: f64,
    pub unique_cc_nums: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionDescription {
    pub strategy: SplitStrategy,
    pub train: SideDescription,
    pub holdout: SideDescription,
}

pub fn describe(partition: &Partition) -> PartitionDescription {
    let side = |set: &MergedSet| SideDescription {
        shape: (set.len(), set.columns.len()),
        fraud_ratio: set.fraud_ratio(),
        unique_cc_nums: set.records.iter().map(|r| r.cc_num).collect::<HashSet<_>>().len(),
    };

    PartitionDescription {
        strategy: partition.strategy,
        train: side(&partition.train),
        holdout: side(&partition.holdout),
    }
}

/// Persist a partition under a version tag.
pub fn load(store: &ArtifactStore, version: &str, partition: &Partition) -> Result<()> {
    let path = store.save(ArtifactKind::Partition, version, partition)?;
    info!(version, path = %path.display(), "Partition stored");
    Ok(())
}
