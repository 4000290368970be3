/*
 * Responsibility
 * - expense records partitioned by principal id
 * - the store only ever receives a principal id that was proven by the verifier;
 *   it never inspects tokens itself
 */
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::repos::error::RepoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Food,
    Transport,
    Entertainment,
    Shopping,
    Gadget,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Food,
        Category::Transport,
        Category::Entertainment,
        Category::Shopping,
        Category::Gadget,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Transport => "transport",
            Category::Entertainment => "entertainment",
            Category::Shopping => "shopping",
            Category::Gadget => "gadget",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Amex,
    Visa,
    Cash,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] =
        [PaymentMethod::Amex, PaymentMethod::Visa, PaymentMethod::Cash];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Amex => "amex",
            PaymentMethod::Visa => "visa",
            PaymentMethod::Cash => "cash",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseRow {
    pub id: Uuid,
    pub user_id: String,
    pub date: NaiveDate,
    pub amount: f64,
    pub category: Category,
    pub description: String,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone)]
pub struct NewExpense {
    pub date: NaiveDate,
    pub amount: f64,
    pub category: Category,
    pub description: String,
    pub payment_method: PaymentMethod,
}

#[async_trait]
pub trait ExpenseRepo: Send + Sync {
    async fn create(&self, user_id: &str, expense: NewExpense) -> Result<ExpenseRow, RepoError>;

    /// Records of one principal, newest date first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ExpenseRow>, RepoError>;

    /// Record count per category across every principal.
    async fn category_counts(&self) -> Result<BTreeMap<Category, u64>, RepoError>;
}

#[derive(Debug, Default)]
pub struct InMemoryExpenseRepo {
    partitions: RwLock<HashMap<String, Vec<ExpenseRow>>>,
}

impl InMemoryExpenseRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExpenseRepo for InMemoryExpenseRepo {
    async fn create(&self, user_id: &str, expense: NewExpense) -> Result<ExpenseRow, RepoError> {
        if user_id.is_empty() {
            return Err(RepoError::Invalid("empty partition key".to_string()));
        }
        if !(expense.amount.is_finite() && expense.amount > 0.0) {
            return Err(RepoError::Invalid("amount must be positive".to_string()));
        }

        let row = ExpenseRow {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            date: expense.date,
            amount: expense.amount,
            category: expense.category,
            description: expense.description,
            payment_method: expense.payment_method,
        };

        self.partitions
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(row.clone());

        Ok(row)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ExpenseRow>, RepoError> {
        let mut rows = self
            .partitions
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(rows)
    }

    async fn category_counts(&self) -> Result<BTreeMap<Category, u64>, RepoError> {
        let partitions = self.partitions.read().await;
        let mut counts = BTreeMap::new();
        for row in partitions.values().flatten() {
            *counts.entry(row.category).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
