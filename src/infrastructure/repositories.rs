use crate::domain::errors::RepositoryError;
use crate::domain::portfolio::{Portfolio, Transaction};
use crate::domain::ports::{PortfolioRepository, TransactionRepository};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory portfolio store keyed by portfolio id.
///
/// Backs the demo runner and tests; production lookups are a collaborator
/// behind the same port.
#[derive(Debug, Default)]
pub struct InMemoryPortfolioRepository {
    portfolios: RwLock<HashMap<String, Portfolio>>,
}

impl InMemoryPortfolioRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, portfolio: Portfolio) {
        self.portfolios
            .write()
            .await
            .insert(portfolio.portfolio_id.clone(), portfolio);
    }
}

#[async_trait]
impl PortfolioRepository for InMemoryPortfolioRepository {
    async fn portfolio(&self, portfolio_id: &str) -> Result<Portfolio, RepositoryError> {
        self.portfolios
            .read()
            .await
            .get(portfolio_id)
            .cloned()
            .ok_or_else(|| RepositoryError::PortfolioNotFound {
                portfolio_id: portfolio_id.to_string(),
            })
    }

    async fn list_portfolio_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.portfolios.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// In-memory transaction history keyed by portfolio id
#[derive(Debug, Default)]
pub struct InMemoryTransactionRepository {
    transactions: RwLock<HashMap<String, Vec<Transaction>>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, transaction: Transaction) {
        self.transactions
            .write()
            .await
            .entry(transaction.portfolio_id.clone())
            .or_default()
            .push(transaction);
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn recent_transactions(&self, portfolio_id: &str, days: i64) -> Vec<Transaction> {
        let cutoff = Utc::now() - Duration::days(days);
        let mut recent: Vec<Transaction> = self
            .transactions
            .read()
            .await
            .get(portfolio_id)
            .map(|txs| {
                txs.iter()
                    .filter(|t| t.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent
    }
}
