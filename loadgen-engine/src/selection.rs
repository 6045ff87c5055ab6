//! Random selection that avoids previously rejected candidates

use loadgen_resilience::{RetryError, RetryExecutor, RetryPolicy, Retryable};
use rand::Rng;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use thiserror::Error;

/// Pick uniformly among candidates whose key is not in `excluded`
pub fn select_excluding<'a, T, K, R>(
    candidates: &'a [T],
    excluded: &HashSet<K>,
    key: impl Fn(&T) -> K,
    rng: &mut R,
) -> Option<&'a T>
where
    K: Eq + Hash,
    R: Rng + ?Sized,
{
    let remaining: Vec<&T> = candidates
        .iter()
        .filter(|candidate| !excluded.contains(&key(*candidate)))
        .collect();
    if remaining.is_empty() {
        return None;
    }
    Some(remaining[rng.gen_range(0..remaining.len())])
}

#[derive(Error, Debug)]
pub enum SelectionError<E> {
    /// Fetching the candidate list failed
    #[error("candidate lookup failed: {0}")]
    Fetch(E),

    /// Every lookup came back without an acceptable candidate
    #[error("no acceptable candidate after {attempts} lookups")]
    Exhausted { attempts: u32 },
}

enum LookupError<E> {
    Fetch(E),
    NoCandidates,
}

impl<E: fmt::Display> fmt::Display for LookupError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::Fetch(error) => write!(f, "{}", error),
            LookupError::NoCandidates => write!(f, "no acceptable candidate"),
        }
    }
}

impl<E> Retryable for LookupError<E> {
    fn is_retryable(&self) -> bool {
        matches!(self, LookupError::NoCandidates)
    }

    fn is_transient(&self) -> bool {
        matches!(self, LookupError::NoCandidates)
    }
}

/// Fetch the current candidate list and pick one not in `excluded`.
///
/// When the list is empty or fully excluded the fetch is repeated under
/// `policy`; a fetch error ends the acquisition immediately.
pub async fn acquire_with_exclusion<T, K, R, F, Fut, E>(
    policy: &RetryPolicy,
    excluded: &HashSet<K>,
    key: impl Fn(&T) -> K,
    rng: &mut R,
    mut fetch: F,
) -> Result<T, SelectionError<E>>
where
    K: Eq + Hash,
    R: Rng + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
    E: fmt::Display,
{
    let key = &key;
    let executor = RetryExecutor::new(policy.clone());

    let result = executor
        .execute(|| {
            let lookup = fetch();
            async move {
                let candidates = match lookup.await {
                    Ok(candidates) => candidates,
                    Err(error) => return Err(LookupError::Fetch(error)),
                };
                let remaining: Vec<T> = candidates
                    .into_iter()
                    .filter(|candidate| !excluded.contains(&key(candidate)))
                    .collect();
                if remaining.is_empty() {
                    Err(LookupError::NoCandidates)
                } else {
                    Ok(remaining)
                }
            }
        })
        .await;

    match result {
        Ok(mut remaining) => {
            let index = rng.gen_range(0..remaining.len());
            Ok(remaining.swap_remove(index))
        }
        Err(RetryError::NonRetryableError(LookupError::Fetch(error))) => Err(SelectionError::Fetch(error)),
        Err(RetryError::MaxAttemptsExceeded { attempts, .. })
        | Err(RetryError::DeadlineExceeded { attempts, .. }) => Err(SelectionError::Exhausted { attempts }),
        Err(RetryError::NonRetryableError(LookupError::NoCandidates)) => {
            Err(SelectionError::Exhausted { attempts: 1 })
        }
    }
}
