//! Three-valued results for batch steps and the settle-all combinator
//!
//! Batch operations (per-directory scans, per-id imports) never fail fast.
//! Every item settles to an [`Outcome`], and [`settle_all`] waits for all of
//! them before partitioning by result.

use crate::error::ModelError;
use futures::future::join_all;
use std::fmt;
use std::future::Future;

/// Result of one item in a batch
#[derive(Debug)]
pub enum Outcome<T> {
    /// Item produced a value
    Ok(T),
    /// Item was intentionally left out (expected condition, not an error)
    Skipped(String),
    /// Item failed; the rest of the batch is unaffected
    Failed(ModelError),
}

impl<T> Outcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Consume into the success value, if any
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Ok(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Ok(value) => Outcome::Ok(f(value)),
            Self::Skipped(reason) => Outcome::Skipped(reason),
            Self::Failed(err) => Outcome::Failed(err),
        }
    }
}

impl<T> From<Result<T, ModelError>> for Outcome<T> {
    fn from(result: Result<T, ModelError>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(err) => Self::Failed(err),
        }
    }
}

impl<T> fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok(_) => write!(f, "ok"),
            Self::Skipped(reason) => write!(f, "skipped: {}", reason),
            Self::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Batch results partitioned by outcome, keyed by the item label
#[derive(Debug)]
pub struct Settled<K, T> {
    pub ok: Vec<(K, T)>,
    pub skipped: Vec<(K, String)>,
    pub failed: Vec<(K, ModelError)>,
}

impl<K, T> Default for Settled<K, T> {
    fn default() -> Self {
        Self {
            ok: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<K, T> Settled<K, T> {
    /// Number of items that settled, whatever their outcome
    pub fn len(&self) -> usize {
        self.ok.len() + self.skipped.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop labels and keep only success values, in input order
    pub fn into_values(self) -> Vec<T> {
        self.ok.into_iter().map(|(_, value)| value).collect()
    }
}

/// Run all labelled futures concurrently, wait for every one, partition by outcome
///
/// Ordering within each partition follows input order.
pub async fn settle_all<K, T, F, I>(items: I) -> Settled<K, T>
where
    I: IntoIterator<Item = (K, F)>,
    F: Future<Output = Outcome<T>>,
{
    let (labels, futures): (Vec<K>, Vec<F>) = items.into_iter().unzip();
    let outcomes = join_all(futures).await;

    let mut settled = Settled::default();
    for (label, outcome) in labels.into_iter().zip(outcomes) {
        match outcome {
            Outcome::Ok(value) => settled.ok.push((label, value)),
            Outcome::Skipped(reason) => settled.skipped.push((label, reason)),
            Outcome::Failed(err) => settled.failed.push((label, err)),
        }
    }
    settled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::time::Duration;

    type BoxedOutcome<T> = Pin<Box<dyn Future<Output = Outcome<T>>>>;

    #[tokio::test]
    async fn test_settle_all_partitions_by_outcome() {
        let items: Vec<(&str, BoxedOutcome<i32>)> = vec![
            ("a", Box::pin(async { Outcome::Ok(1) })),
            ("b", Box::pin(async { Outcome::Skipped("no descriptor".to_string()) })),
            ("c", Box::pin(async { Outcome::Failed(ModelError::Transient("busy".to_string())) })),
            ("d", Box::pin(async { Outcome::Ok(4) })),
        ];

        let settled = settle_all(items).await;

        assert_eq!(settled.len(), 4);
        assert_eq!(settled.ok, vec![("a", 1), ("d", 4)]);
        assert_eq!(settled.skipped.len(), 1);
        assert_eq!(settled.skipped[0].0, "b");
        assert_eq!(settled.failed.len(), 1);
        assert_eq!(settled.failed[0].0, "c");
    }

    #[tokio::test]
    async fn test_slow_item_does_not_block_others_from_settling() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Outcome::<u32>::Failed(ModelError::NotFound("slow".to_string()))
        };
        let fast = async { Outcome::Ok(7u32) };

        let items: Vec<(u8, BoxedOutcome<u32>)> = vec![(0, Box::pin(slow)), (1, Box::pin(fast))];
        let settled = settle_all(items).await;

        assert_eq!(settled.into_values(), vec![7]);
    }

    #[tokio::test]
    async fn test_settle_all_empty() {
        let items: Vec<(u8, std::future::Ready<Outcome<()>>)> = Vec::new();
        let settled = settle_all(items).await;
        assert!(settled.is_empty());
    }

    #[test]
    fn test_outcome_from_result() {
        let ok = Outcome::from(Ok::<u8, ModelError>(3));
        assert!(ok.is_ok());
        let failed = Outcome::from(Err::<u8, _>(ModelError::Storage("x".to_string())));
        assert!(failed.is_failed());
        assert_eq!(Outcome::<u8>::Skipped("absent".to_string()).to_string(), "skipped: absent");
    }

    #[test]
    fn test_outcome_map() {
        assert_eq!(Outcome::Ok(2).map(|v| v * 2).ok(), Some(4));
        assert!(Outcome::<u8>::Skipped("s".to_string()).map(|v| v + 1).is_skipped());
    }
}
