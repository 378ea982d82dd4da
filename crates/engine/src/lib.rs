//! ragline engine: the token budget controller and the [`ContextEngine`]
//! facade that runs a customer turn through routing, retrieval, session
//! memory and budgeting.

pub mod budget;
pub mod engine;

pub use budget::{
    AdjustmentReason, BudgetAdjustment, BudgetComponents, BudgetError, ContextSection,
    PromptSection, TextSection, TokenBudgetController, TokenBudgetPlan,
};
pub use engine::{ContextEngine, EngineParts, PreparedContext, TurnInput};
