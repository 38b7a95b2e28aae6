//! Tools available to the household agent
//!
//! Tools are stateless singletons. Everything a call needs (the household
//! it acts on, the database, a cancellation signal) arrives in `ToolContext`.

mod arithmetic;
mod budget;
mod cart;
mod inventory;
mod pantry;
pub mod schema;

pub use arithmetic::AddNumbersTool;
pub use budget::FetchHouseholdBudgetTool;
pub use cart::{AddToCartTool, BulkAddToCartTool, ViewCartTool};
pub use inventory::FetchHouseholdInventoryTool;
pub use pantry::{AddPantryItemTool, AnalyzePantryItemsTool};

use crate::conversation::ToolErrorKind;
use crate::db::{Database, DbError};
use crate::llm::ToolDefinition;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Failure of a single tool call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("no tool named '{0}' is registered")]
    UnknownTool(String),
    #[error("{0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Execution(String),
}

impl ToolError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::UnknownTool(_) => ToolErrorKind::UnknownTool,
            ToolError::InvalidArguments(_) => ToolErrorKind::InvalidArguments,
            ToolError::Execution(_) => ToolErrorKind::ExecutionFailed,
        }
    }
}

impl From<DbError> for ToolError {
    fn from(e: DbError) -> Self {
        ToolError::Execution(e.to_string())
    }
}

/// Registration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("a tool named '{0}' is already registered")]
    DuplicateToolName(String),
    #[error("no tool named '{0}' is registered")]
    NotFound(String),
}

/// The household a session acts on
#[derive(Clone)]
pub struct HouseholdScope {
    pub household_id: String,
    pub db: Database,
}

/// All context needed for a tool invocation
#[derive(Clone)]
pub struct ToolContext {
    /// Cancellation signal for long-running operations
    pub cancel: CancellationToken,
    pub session_id: String,
    household: Option<HouseholdScope>,
}

impl ToolContext {
    pub fn new(
        cancel: CancellationToken,
        session_id: impl Into<String>,
        household: Option<HouseholdScope>,
    ) -> Self {
        Self {
            cancel,
            session_id: session_id.into(),
            household,
        }
    }

    /// Household scope, or an error the model can act on
    pub fn household(&self) -> Result<&HouseholdScope, ToolError> {
        self.household.as_ref().ok_or_else(|| {
            ToolError::Execution(
                "this conversation is not linked to a household; ask the user which household to use"
                    .to_string(),
            )
        })
    }
}

/// Trait for tools that can be executed by the agent
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Tool description for LLM
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Execute with arguments already validated against `input_schema`
    async fn run(&self, input: Value, ctx: ToolContext) -> Result<String, ToolError>;
}

/// Deserialize validated arguments into the tool's input type
pub(crate) fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Collection of tools available to the agent, unique by name
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every household tool
    pub fn household() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(FetchHouseholdInventoryTool),
            Arc::new(FetchHouseholdBudgetTool),
            Arc::new(AnalyzePantryItemsTool),
            Arc::new(AddPantryItemTool),
            Arc::new(AddToCartTool),
            Arc::new(BulkAddToCartTool),
            Arc::new(ViewCartTool),
            Arc::new(AddNumbersTool),
        ];
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        if self.tools.iter().any(|t| t.name() == tool.name()) {
            return Err(RegistryError::DuplicateToolName(tool.name().to_string()));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Arc<dyn Tool>, RegistryError> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Get all tool definitions for LLM
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Look up, validate and run a tool
    pub async fn execute(
        &self,
        name: &str,
        input: Value,
        ctx: ToolContext,
    ) -> Result<String, ToolError> {
        let tool = self
            .get(name)
            .map_err(|_| ToolError::UnknownTool(name.to_string()))?;
        schema::validate(&tool.input_schema(), &input).map_err(ToolError::InvalidArguments)?;
        tool.run(input, ctx).await
    }
}

/// Format an amount of money the way the household UI does
pub(crate) fn dollars(amount: f64) -> String {
    format!("${amount:.2}")
}

/// Render a quantity without a trailing `.0` for whole numbers
pub(crate) fn quantity(value: f64) -> String {
    if value.fract().abs() < f64::EPSILON {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn household_tools_registered() {
        let registry = ToolRegistry::household().unwrap();
        let defs = registry.definitions();
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        for expected in [
            "fetch_household_inventory",
            "fetch_household_budget",
            "analyze_pantry_items",
            "add_pantry_item",
            "add_to_cart",
            "bulk_add_to_cart",
            "view_cart",
            "add_numbers",
        ] {
            assert!(names.contains(&expected), "Missing {expected}");
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(AddNumbersTool)).unwrap();
        assert_eq!(
            registry.register(Arc::new(AddNumbersTool)),
            Err(RegistryError::DuplicateToolName("add_numbers".to_string()))
        );
        assert_eq!(registry.definitions().len(), 1);
    }

    #[test]
    fn get_reports_missing_tool() {
        let registry = ToolRegistry::new();
        assert!(matches!(
            registry.get("teleport"),
            Err(RegistryError::NotFound(name)) if name == "teleport"
        ));
    }

    #[tokio::test]
    async fn execute_unknown_tool() {
        let registry = ToolRegistry::household().unwrap();
        let err = registry
            .execute("teleport", json!({}), detached_ctx())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::UnknownTool);
    }

    #[tokio::test]
    async fn execute_rejects_invalid_arguments_before_running() {
        let registry = ToolRegistry::household().unwrap();
        let err = registry
            .execute("add_numbers", json!({"a": "one", "b": 2}), detached_ctx())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::InvalidArguments);
    }

    #[tokio::test]
    async fn household_tools_need_a_household() {
        let registry = ToolRegistry::household().unwrap();
        let err = registry
            .execute("analyze_pantry_items", json!({}), detached_ctx())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::ExecutionFailed);
    }

    #[tokio::test]
    async fn execute_runs_valid_call() {
        let db = Database::open_in_memory().unwrap();
        let registry = ToolRegistry::household().unwrap();
        let out = registry
            .execute(
                "add_pantry_item",
                json!({"name": "milk"}),
                household_ctx(&db, "h1"),
            )
            .await
            .unwrap();
        assert!(out.contains("milk"));
    }

    #[test]
    fn formatting_helpers() {
        assert_eq!(dollars(12.5), "$12.50");
        assert_eq!(quantity(2.0), "2");
        assert_eq!(quantity(1.5), "1.5");
    }
}
