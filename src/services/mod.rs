//! Application services.
//!
//! Each operation opens one transaction, runs its steps against it and either
//! commits or rolls back explicitly before surfacing the error. Events go out
//! only after a successful commit.

use crate::store::Transaction;
use crate::Result;

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod coupons;
pub mod orders;
pub mod tickets;
pub mod users;

/// Commits on success, rolls back on failure. A failed rollback is logged and
/// the original error is returned.
pub(crate) async fn finish<T>(tx: Box<dyn Transaction>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
