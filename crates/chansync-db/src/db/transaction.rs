//! Database transaction utilities

use chansync_core::StoreError;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::ops::{Deref, DerefMut};

/// A transaction that must be finished with [`commit`](Self::commit) or
/// [`rollback`](Self::rollback). Dropping it unfinished rolls back.
///
/// ```ignore
/// let mut tx = TransactionGuard::begin(&pool).await?;
/// sqlx::query("UPDATE metadata SET ...").execute(&mut *tx).await?;
/// tx.commit().await?;
/// ```
pub struct TransactionGuard {
    transaction: Transaction<'static, Postgres>,
}

impl TransactionGuard {
    pub async fn begin(pool: &PgPool) -> Result<Self, StoreError> {
        let transaction = pool.begin().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to begin database transaction");
            StoreError::from(e)
        })?;
        Ok(Self { transaction })
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.transaction.commit().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to commit database transaction");
            StoreError::from(e)
        })
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        self.transaction.rollback().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to rollback database transaction");
            StoreError::from(e)
        })
    }
}

impl Deref for TransactionGuard {
    type Target = PgConnection;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}

impl DerefMut for TransactionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.transaction
    }
}
