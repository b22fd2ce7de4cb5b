//! Persistence gateway: every table is touched through the functions in the
//! submodules, and every multi-row write of the admission and consumer paths
//! goes through [`with_transaction`].

pub mod mensagens;
pub mod notas;
pub mod outbox;
pub mod solicitacoes;

use futures::future::BoxFuture;
use sqlx::PgPool;
use sqlx::Postgres;
use sqlx::Transaction;

pub type PgTransaction = Transaction<'static, Postgres>;

/// Scoped transactional region: the closure receives the open transaction,
/// which commits when it returns `Ok` and rolls back on `Err`. Row locks
/// taken inside are released either way.
pub async fn with_transaction<T, F>(pool: &PgPool, f: F) -> Result<T, anyhow::Error>
where
    T: Send,
    F: for<'t> FnOnce(&'t mut PgTransaction) -> BoxFuture<'t, Result<T, anyhow::Error>>,
{
    let mut transaction = pool.begin().await?;
    match f(&mut transaction).await {
        Ok(value) => {
            transaction.commit().await?;
            Ok(value)
        }
        Err(e) => {
            // rollback failure is secondary to the original error
            if let Err(rollback) = transaction.rollback().await {
                tracing::error!(
                    error.cause_chain = ?rollback,
                    "falha ao reverter transacao"
                );
            }
            Err(e)
        }
    }
}
