//! Expense records kept in the conversation's record book.
//!
//! Amounts are carried as [`Decimal`] and stored as two-decimal strings so
//! totals never pick up floating point drift.

use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

use switchyard_core::config::ToolsConfig;
use switchyard_core::{
    Constraint, ExecutionMode, FieldKind, FieldSpec, ParameterSchema, Record, RecordFilter,
    RecordId, RecordStore, RegistryError, ToolContext, ToolDefinition, ToolError, ToolHandler,
    ToolRegistry,
};

use super::{optional_str, required_str};

const KIND_FIELD: &str = "kind";
const EXPENSE_KIND: &str = "expense";
/// Per-expense ceiling; keeps listing totals far inside `Decimal` range.
const MAX_AMOUNT: f64 = 1_000_000_000_000.0;

pub fn register(registry: &mut ToolRegistry, config: &ToolsConfig) -> Result<(), RegistryError> {
    let mutating = if config.expense_confirmation { ExecutionMode::Confirm } else { ExecutionMode::Auto };

    registry.register(
        ToolDefinition::new("create_expense", "Record a new expense.", mutating).with_parameters(
            ParameterSchema::empty()
                .field(description_field(true))
                .field(amount_field(true))
                .field(category_field())
                .field(
                    FieldSpec::optional("incurred_on", FieldKind::Timestamp)
                        .describe("When the expense was incurred (RFC 3339)."),
                ),
        ),
        CreateExpense,
    )?;
    registry.register(
        ToolDefinition::auto("list_expenses", "List recorded expenses with their total.")
            .with_parameters(
                ParameterSchema::empty().field(category_field()).field(
                    FieldSpec::optional("limit", FieldKind::Integer)
                        .describe("Maximum number of expenses to return.")
                        .constrain(Constraint::Range { min: 1.0, max: 1000.0 }),
                ),
            ),
        ListExpenses,
    )?;
    registry.register(
        ToolDefinition::new("update_expense", "Change fields of an existing expense.", mutating)
            .with_parameters(
                ParameterSchema::empty()
                    .field(id_field())
                    .field(description_field(false))
                    .field(amount_field(false))
                    .field(category_field()),
            ),
        UpdateExpense,
    )?;
    registry.register(
        ToolDefinition::new("delete_expense", "Delete an expense.", mutating)
            .with_parameters(ParameterSchema::empty().field(id_field())),
        DeleteExpense,
    )?;
    Ok(())
}

fn id_field() -> FieldSpec {
    FieldSpec::required("id", FieldKind::String).describe("Expense id.")
}

fn description_field(required: bool) -> FieldSpec {
    let spec = if required {
        FieldSpec::required("description", FieldKind::String)
    } else {
        FieldSpec::optional("description", FieldKind::String)
    };
    spec.describe("What the money was spent on.").constrain(Constraint::MinLength { min: 1 })
}

fn amount_field(required: bool) -> FieldSpec {
    let spec = if required {
        FieldSpec::required("amount", FieldKind::Number)
    } else {
        FieldSpec::optional("amount", FieldKind::Number)
    };
    spec.describe("Amount spent.")
        .constrain(Constraint::Positive)
        .constrain(Constraint::Range { min: 0.0, max: MAX_AMOUNT })
}

fn category_field() -> FieldSpec {
    FieldSpec::optional("category", FieldKind::String).describe("Free-form category label.")
}

fn parse_amount(value: &Value) -> Result<Decimal, ToolError> {
    let raw = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().to_string(),
        _ => return Err(ToolError::Invalid("`amount` must be a number".to_string())),
    };
    let mut amount = Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|error| ToolError::Invalid(format!("`amount` is not a decimal: {error}")))?
        .round_dp(2);
    if amount <= Decimal::ZERO {
        return Err(ToolError::Invalid("`amount` must be positive".to_string()));
    }
    amount.rescale(2);
    Ok(amount)
}

fn is_expense(record: &Record) -> bool {
    record.field(KIND_FIELD) == Some(&Value::String(EXPENSE_KIND.to_string()))
}

fn find_expense(ctx: &mut ToolContext<'_>, id: &RecordId) -> Result<Record, ToolError> {
    ctx.records()
        .get(id)
        .filter(|record| is_expense(record))
        .cloned()
        .ok_or_else(|| ToolError::NotFound(format!("expense `{id}`")))
}

pub struct CreateExpense;

#[async_trait]
impl ToolHandler for CreateExpense {
    async fn execute(
        &self,
        arguments: Map<String, Value>,
        ctx: &mut ToolContext<'_>,
    ) -> Result<Value, ToolError> {
        let amount = arguments
            .get("amount")
            .ok_or_else(|| ToolError::Invalid("`amount` is required".to_string()))
            .and_then(parse_amount)?;

        let mut fields = Map::new();
        fields.insert(KIND_FIELD.to_string(), json!(EXPENSE_KIND));
        fields.insert("description".to_string(), json!(required_str(&arguments, "description")?));
        fields.insert("amount".to_string(), json!(amount.to_string()));
        for optional in ["category", "incurred_on"] {
            if let Some(value) = optional_str(&arguments, optional) {
                fields.insert(optional.to_string(), json!(value));
            }
        }

        let now = ctx.now();
        let record = ctx.records().create(fields, now)?;
        Ok(record.to_json())
    }
}

pub struct ListExpenses;

#[async_trait]
impl ToolHandler for ListExpenses {
    async fn execute(
        &self,
        arguments: Map<String, Value>,
        ctx: &mut ToolContext<'_>,
    ) -> Result<Value, ToolError> {
        let mut filter = RecordFilter::all().field_equals(KIND_FIELD, json!(EXPENSE_KIND));
        if let Some(category) = optional_str(&arguments, "category") {
            filter = filter.field_equals("category", json!(category));
        }
        if let Some(limit) = arguments.get("limit").and_then(Value::as_u64) {
            filter = filter.limit(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        let expenses = ctx.records().list(&filter);
        let mut total = Decimal::ZERO;
        for expense in &expenses {
            if let Some(amount) = expense.field("amount") {
                total = total
                    .checked_add(parse_amount(amount)?)
                    .ok_or_else(|| ToolError::Failed("expense total overflows".to_string()))?;
            }
        }
        total.rescale(2);

        Ok(json!({
            "expenses": expenses.iter().map(Record::to_json).collect::<Vec<_>>(),
            "count": expenses.len(),
            "total": total.to_string(),
        }))
    }
}

pub struct UpdateExpense;

#[async_trait]
impl ToolHandler for UpdateExpense {
    async fn execute(
        &self,
        arguments: Map<String, Value>,
        ctx: &mut ToolContext<'_>,
    ) -> Result<Value, ToolError> {
        let id = RecordId(required_str(&arguments, "id")?.to_string());
        find_expense(ctx, &id)?;

        let mut partial = Map::new();
        for field in ["description", "category"] {
            if let Some(value) = optional_str(&arguments, field) {
                partial.insert(field.to_string(), json!(value));
            }
        }
        if let Some(amount) = arguments.get("amount") {
            partial.insert("amount".to_string(), json!(parse_amount(amount)?.to_string()));
        }
        if partial.is_empty() {
            return Err(ToolError::Invalid("nothing to update".to_string()));
        }

        let now = ctx.now();
        let record = ctx.records().update(&id, partial, now)?;
        Ok(record.to_json())
    }
}

pub struct DeleteExpense;

#[async_trait]
impl ToolHandler for DeleteExpense {
    async fn execute(
        &self,
        arguments: Map<String, Value>,
        ctx: &mut ToolContext<'_>,
    ) -> Result<Value, ToolError> {
        let id = RecordId(required_str(&arguments, "id")?.to_string());
        find_expense(ctx, &id)?;
        let removed = ctx.records().delete(&id)?;
        Ok(json!({"deleted": removed.id.0}))
    }
}
