pub mod error;
pub mod expense_repo;

pub use expense_repo::{
    Category, ExpenseRepo, ExpenseRow, InMemoryExpenseRepo, NewExpense, PaymentMethod,
};
