use crate::domain::errors::RepositoryError;
use crate::domain::portfolio::{Portfolio, Transaction};
use async_trait::async_trait;

/// Read access to portfolio snapshots.
///
/// The engine never mutates portfolios; each analysis runs against the
/// snapshot returned here.
#[async_trait]
pub trait PortfolioRepository: Send + Sync {
    async fn portfolio(&self, portfolio_id: &str) -> Result<Portfolio, RepositoryError>;
    async fn list_portfolio_ids(&self) -> Vec<String>;
}

/// Read access to transaction history.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Transactions for a portfolio within the trailing `days` window,
    /// newest first. Unknown portfolios yield an empty list.
    async fn recent_transactions(&self, portfolio_id: &str, days: i64) -> Vec<Transaction>;
}
