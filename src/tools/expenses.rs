//! Expense tracker capabilities.
//!
//! Every capability here acts on behalf of the verified principal and reads its id from
//! the request context, never from arguments.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::dispatch::{Capability, CapabilityDescriptor, Invocation, RequestContext};
use crate::error::AppError;
use crate::repos::{Category, ExpenseRepo, NewExpense, PaymentMethod};
use crate::tools::{parse_arguments, text_content};

pub const MY_EXPENSES_URI: &str = "expenses://me";

pub fn capabilities(repo: Arc<dyn ExpenseRepo>) -> Vec<Arc<dyn Capability>> {
    vec![
        Arc::new(AddUserExpense::new(repo.clone())),
        Arc::new(GetUserExpenses::new(repo.clone())),
        Arc::new(GetExpenseStats::new(repo.clone())),
        Arc::new(MyExpensesResource::new(repo)),
    ]
}

#[derive(Debug, Deserialize)]
struct AddExpenseArgs {
    date: NaiveDate,
    amount: f64,
    category: Category,
    description: String,
    payment_method: PaymentMethod,
}

pub struct AddUserExpense {
    repo: Arc<dyn ExpenseRepo>,
    descriptor: CapabilityDescriptor,
}

impl AddUserExpense {
    pub fn new(repo: Arc<dyn ExpenseRepo>) -> Self {
        let schema = json!({
            "type": "object",
            "properties": {
                "date": { "type": "string", "format": "date", "description": "Date of the expense in YYYY-MM-DD format" },
                "amount": { "type": "number", "exclusiveMinimum": 0, "description": "Positive numeric amount of the expense" },
                "category": { "type": "string", "enum": Category::ALL.map(|c| c.as_str()), "description": "Category label" },
                "description": { "type": "string", "description": "Human-readable description of the expense" },
                "payment_method": { "type": "string", "enum": PaymentMethod::ALL.map(|p| p.as_str()), "description": "Payment method used" }
            },
            "required": ["date", "amount", "category", "description", "payment_method"]
        });
        Self {
            repo,
            descriptor: CapabilityDescriptor::tool(
                "add_user_expense",
                "Add a new expense for the authenticated user.",
                schema,
            )
            .requiring_identity(),
        }
    }
}

#[async_trait]
impl Capability for AddUserExpense {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        invocation: &Invocation,
        ctx: &RequestContext,
    ) -> Result<Value, AppError> {
        let user_id = ctx.require_user_id()?;
        let args: AddExpenseArgs = parse_arguments(&invocation.arguments)?;
        if !(args.amount.is_finite() && args.amount > 0.0) {
            return Err(AppError::bad_request("INVALID_ARGUMENT", "amount must be positive"));
        }

        let row = self
            .repo
            .create(
                &user_id,
                NewExpense {
                    date: args.date,
                    amount: args.amount,
                    category: args.category,
                    description: args.description,
                    payment_method: args.payment_method,
                },
            )
            .await?;

        info!(expense_id = %row.id, "expense added");
        Ok(text_content(format!(
            "Successfully added expense: ${} for {} on {}",
            row.amount, row.description, row.date
        )))
    }
}

pub struct GetUserExpenses {
    repo: Arc<dyn ExpenseRepo>,
    descriptor: CapabilityDescriptor,
}

impl GetUserExpenses {
    pub fn new(repo: Arc<dyn ExpenseRepo>) -> Self {
        Self {
            repo,
            descriptor: CapabilityDescriptor::tool(
                "get_user_expenses",
                "Get the authenticated user's expense data.",
                json!({ "type": "object", "properties": {} }),
            )
            .requiring_identity(),
        }
    }
}

async fn expense_summary(repo: &dyn ExpenseRepo, user_id: &str) -> Result<String, AppError> {
    let rows = repo.list_for_user(user_id).await?;
    if rows.is_empty() {
        return Ok("No expenses found.".to_string());
    }

    let mut summary = format!("Expense data ({} entries):\n\n", rows.len());
    for row in &rows {
        let _ = writeln!(
            summary,
            "Date: {}, Amount: ${}, Category: {}, Description: {}, Payment: {}",
            row.date, row.amount, row.category, row.description, row.payment_method
        );
    }
    Ok(summary)
}

#[async_trait]
impl Capability for GetUserExpenses {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        _invocation: &Invocation,
        ctx: &RequestContext,
    ) -> Result<Value, AppError> {
        let user_id = ctx.require_user_id()?;
        let summary = expense_summary(self.repo.as_ref(), &user_id).await?;
        Ok(text_content(summary))
    }
}

pub struct GetExpenseStats {
    repo: Arc<dyn ExpenseRepo>,
    descriptor: CapabilityDescriptor,
}

impl GetExpenseStats {
    pub fn new(repo: Arc<dyn ExpenseRepo>) -> Self {
        Self {
            repo,
            descriptor: CapabilityDescriptor::tool(
                "get_expense_stats",
                "Get a count of expenses per category across all users. Admin group only.",
                json!({ "type": "object", "properties": {} }),
            )
            .privileged(),
        }
    }
}

#[async_trait]
impl Capability for GetExpenseStats {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        _invocation: &Invocation,
        ctx: &RequestContext,
    ) -> Result<Value, AppError> {
        // The privilege hook already checked membership; this only guards direct calls.
        ctx.require_user_id()?;

        let counts = self.repo.category_counts().await?;
        if counts.is_empty() {
            return Ok(text_content("No expense data found to summarize."));
        }

        let mut summary = "Expense Statistics (Count per Category):\n".to_string();
        for (category, count) in &counts {
            let _ = writeln!(summary, "- Category {category}: {count} expenses");
        }
        Ok(text_content(summary))
    }
}

pub struct MyExpensesResource {
    repo: Arc<dyn ExpenseRepo>,
    descriptor: CapabilityDescriptor,
}

impl MyExpensesResource {
    pub fn new(repo: Arc<dyn ExpenseRepo>) -> Self {
        Self {
            repo,
            descriptor: CapabilityDescriptor::resource(
                MY_EXPENSES_URI,
                "Expenses of the authenticated user.",
                "text/plain",
            )
            .requiring_identity(),
        }
    }
}

#[async_trait]
impl Capability for MyExpensesResource {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        invocation: &Invocation,
        ctx: &RequestContext,
    ) -> Result<Value, AppError> {
        let user_id = ctx.require_user_id()?;
        let summary = expense_summary(self.repo.as_ref(), &user_id).await?;
        Ok(json!({
            "contents": [{
                "uri": invocation.target,
                "mimeType": "text/plain",
                "text": summary,
            }]
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::InMemoryExpenseRepo;

    fn ctx_for(user: Option<&str>) -> RequestContext {
        let ctx = RequestContext::new("test", None);
        if let Some(user) = user {
            ctx.set_state(crate::dispatch::USER_ID_KEY, json!(user)).unwrap();
        }
        ctx
    }

    fn text_of(v: &Value) -> &str {
        v["content"][0]["text"].as_str().unwrap()
    }

    #[tokio::test]
    async fn add_then_list_for_same_user() {
        let repo: Arc<dyn ExpenseRepo> = Arc::new(InMemoryExpenseRepo::new());
        let add = AddUserExpense::new(repo.clone());
        let list = GetUserExpenses::new(repo);
        let ctx = ctx_for(Some("alice"));

        let args = json!({
            "date": "2025-04-01",
            "amount": 42.5,
            "category": "food",
            "description": "team lunch",
            "payment_method": "amex"
        });
        let out = add
            .invoke(&Invocation::tool("add_user_expense", args), &ctx)
            .await
            .unwrap();
        assert_eq!(
            text_of(&out),
            "Successfully added expense: $42.5 for team lunch on 2025-04-01"
        );

        let out = list
            .invoke(&Invocation::tool("get_user_expenses", json!({})), &ctx)
            .await
            .unwrap();
        assert!(text_of(&out).starts_with("Expense data (1 entries)"));
        assert!(text_of(&out).contains("Category: food"));
    }

    #[tokio::test]
    async fn empty_listing_has_a_friendly_message() {
        let repo: Arc<dyn ExpenseRepo> = Arc::new(InMemoryExpenseRepo::new());
        let out = GetUserExpenses::new(repo)
            .invoke(&Invocation::tool("get_user_expenses", json!({})), &ctx_for(Some("bob")))
            .await
            .unwrap();
        assert_eq!(text_of(&out), "No expenses found.");
    }

    #[tokio::test]
    async fn handlers_refuse_to_run_without_a_user_id() {
        let repo: Arc<dyn ExpenseRepo> = Arc::new(InMemoryExpenseRepo::new());
        let err = GetUserExpenses::new(repo)
            .invoke(&Invocation::tool("get_user_expenses", json!({})), &ctx_for(None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthenticationRequired));
    }

    #[tokio::test]
    async fn invalid_arguments_are_bad_requests() {
        let repo: Arc<dyn ExpenseRepo> = Arc::new(InMemoryExpenseRepo::new());
        let add = AddUserExpense::new(repo);
        let ctx = ctx_for(Some("alice"));

        let negative = json!({
            "date": "2025-04-01", "amount": -1.0, "category": "food",
            "description": "x", "payment_method": "cash"
        });
        let bad_category = json!({
            "date": "2025-04-01", "amount": 1.0, "category": "rent",
            "description": "x", "payment_method": "cash"
        });

        for args in [negative, bad_category] {
            let err = add
                .invoke(&Invocation::tool("add_user_expense", args), &ctx)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest { .. }));
        }
    }

    #[tokio::test]
    async fn resource_returns_text_contents() {
        let repo: Arc<dyn ExpenseRepo> = Arc::new(InMemoryExpenseRepo::new());
        let out = MyExpensesResource::new(repo)
            .invoke(&Invocation::resource(MY_EXPENSES_URI), &ctx_for(Some("alice")))
            .await
            .unwrap();
        assert_eq!(out["contents"][0]["uri"], MY_EXPENSES_URI);
        assert_eq!(out["contents"][0]["text"], "No expenses found.");
    }
}
