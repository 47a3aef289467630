//! Sequential iteration over the valid connections of a pool.

use anyhow::Result;
use std::future::Future;
use tracing::{debug, info, warn};

use crate::pool::{ConnectionPool, PooledConnection};

/// Per-connection operation failure, surfaced once and never retried.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionFailure {
    pub username: String,
    pub error: String,
}

/// What happened during one pass over the pool.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IterationSummary {
    /// Valid handles the operation ran on
    pub visited: usize,
    /// Invalid handles skipped
    pub skipped: usize,
    pub failures: Vec<ConnectionFailure>,
}

/// Applies `op` to every valid connection, strictly one at a time and in
/// registration order.
///
/// Resolves and validates the pool first (once per pool lifetime). Invalid
/// handles are skipped silently. A failing operation is logged and recorded,
/// and iteration moves on to the next handle. Returns once every handle has
/// been visited, including when there are none.
///
/// The pool stays mutably borrowed for the whole pass, so a second pass
/// over the same pool cannot start before this one returns.
pub async fn for_each_connection<'p, F, Fut>(
    pool: &'p mut ConnectionPool,
    mut op: F,
) -> Result<IterationSummary>
where
    F: FnMut(&'p PooledConnection) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    pool.ensure_validated().await?;
    let pool: &'p ConnectionPool = pool;

    let mut summary = IterationSummary::default();
    for handle in pool.handles() {
        if !handle.is_valid() {
            debug!(username = %handle.username(), "Skipping invalid connection");
            summary.skipped += 1;
            continue;
        }

        summary.visited += 1;
        if let Err(e) = op(handle).await {
            warn!(username = %handle.username(), error = %e, "Connection operation failed");
            summary.failures.push(ConnectionFailure {
                username: handle.username().to_string(),
                error: format!("{:#}", e),
            });
        }
    }

    info!(
        visited = summary.visited,
        skipped = summary.skipped,
        failures = summary.failures.len(),
        "Connection pass complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryAccount, MemoryConnectionFactory};
    use pryv_wdc::credentials::{Credentials, MemoryVault};
    use std::sync::Arc;

    const C1: &str = "https://t1@c1.pryv.me/";
    const C2: &str = "https://t2@c2.pryv.me/";
    const C3: &str = "https://t3@c3.pryv.me/";

    fn pool(factory: MemoryConnectionFactory) -> ConnectionPool {
        let endpoints = vec![C1.to_string(), C2.to_string(), C3.to_string()];
        ConnectionPool::new(
            Arc::new(MemoryVault::with_credentials(Credentials::for_endpoints(
                &endpoints,
            ))),
            Arc::new(factory),
        )
    }

    #[tokio::test]
    async fn test_invalid_connection_is_skipped() {
        let mut pool = pool(
            MemoryConnectionFactory::new()
                .with_account(C1, MemoryAccount::new("a1"))
                .with_account(C2, MemoryAccount::invalid("expired"))
                .with_account(C3, MemoryAccount::new("a3")),
        );

        let mut visited = Vec::new();
        let summary = for_each_connection(&mut pool, |handle| {
            visited.push(handle.username().to_string());
            async { Ok::<(), anyhow::Error>(()) }
        })
        .await
        .unwrap();

        assert_eq!(visited, vec!["c1.pryv.me", "c3.pryv.me"]);
        assert_eq!(summary.visited, 2);
        assert_eq!(summary.skipped, 1);
        assert!(summary.failures.is_empty());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_iteration() {
        let mut pool = pool(
            MemoryConnectionFactory::new()
                .with_account(C1, MemoryAccount::new("a1"))
                .with_account(C2, MemoryAccount::new("a2"))
                .with_account(C3, MemoryAccount::new("a3")),
        );

        let mut visited = Vec::new();
        let summary = for_each_connection(&mut pool, |handle| {
            visited.push(handle.username().to_string());
            let fail = handle.username() == "c1.pryv.me";
            async move {
                if fail {
                    anyhow::bail!("network down");
                }
                Ok(())
            }
        })
        .await
        .unwrap();

        assert_eq!(visited.len(), 3);
        assert_eq!(
            summary.failures,
            vec![ConnectionFailure {
                username: "c1.pryv.me".to_string(),
                error: "network down".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_empty_pool_completes() {
        let mut pool = ConnectionPool::new(
            Arc::new(MemoryVault::new()),
            Arc::new(MemoryConnectionFactory::new()),
        );
        let summary = for_each_connection(&mut pool, |_handle| async {
            Ok::<(), anyhow::Error>(())
        })
        .await
        .unwrap();
        assert_eq!(summary, IterationSummary::default());
    }

    #[tokio::test]
    async fn test_repeated_passes_validate_once() {
        let factory = Arc::new(
            MemoryConnectionFactory::new()
                .with_account(C1, MemoryAccount::new("a1"))
                .with_account(C2, MemoryAccount::new("a2"))
                .with_account(C3, MemoryAccount::new("a3")),
        );
        let endpoints = vec![C1.to_string(), C2.to_string(), C3.to_string()];
        let mut pool = ConnectionPool::new(
            Arc::new(MemoryVault::with_credentials(Credentials::for_endpoints(
                &endpoints,
            ))),
            factory.clone(),
        );

        for _ in 0..3 {
            for_each_connection(&mut pool, |_handle| async { Ok::<(), anyhow::Error>(()) })
                .await
                .unwrap();
        }
        assert_eq!(factory.account(C2).unwrap().probes(), 1);
        assert_eq!(factory.connects(), 3);
    }
}
