use std::future::Future;

use futures_util::{StreamExt, TryStreamExt, stream};

/// Runs `f` over `items` with at most `limit` futures in flight.
///
/// Results keep input order. The first error short-circuits: futures still
/// pending are dropped and their results are never observed.
pub async fn map_bounded<I, F, Fut, T, E>(items: I, limit: usize, f: F) -> Result<Vec<T>, E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    stream::iter(items)
        .map(f)
        .buffered(limit.max(1))
        .try_collect()
        .await
}
