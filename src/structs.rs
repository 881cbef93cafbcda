use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{category::Category, errors::AppError};

pub type UserId = i64;

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub pwd_hash: String,
    pub partner_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Public view of another account, as shown in search results and requests.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub username: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            username: user.username.clone(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: i64,
    pub user_id: UserId,
    pub amount: String,
    #[sqlx(try_from = "String")]
    pub category: Category,
    pub date: NaiveDate,
    pub description: String,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub owner_name: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Income {
    pub id: i64,
    pub user_id: UserId,
    pub amount: String,
    pub source: String,
    pub date: NaiveDate,
    pub description: String,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub owner_name: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Default)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum EventType {
    #[default]
    Payment,
    Reminder,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    pub user_id: UserId,
    pub title: String,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LinkAction {
    Accept,
    Reject,
}

impl FromStr for LinkAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(LinkAction::Accept),
            "reject" => Ok(LinkAction::Reject),
            other => Err(AppError::ValidationError(format!(
                "Invalid action: {other}"
            ))),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PartnerRequest {
    pub id: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

/// A pending request as presented to its receiver.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequest {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub sender: UserSummary,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStats {
    #[serde(with = "rust_decimal::serde::float")]
    pub total_expenses: Decimal,
    pub expense_count: usize,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub partner: Option<UserSummary>,
    pub stats: ProfileStats,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Personal,
    Joint,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    #[default]
    Month,
    Year,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ExpenseInput {
    pub amount: Decimal,
    #[serde(default)]
    pub category: Option<String>,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct IncomeInput {
    pub amount: Decimal,
    pub source: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct EventInput {
    pub title: String,
    pub date: NaiveDate,
    #[serde(default, rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub description: String,
}

/// Largest amount a single record may carry.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

/// Rejects negative or oversized amounts and returns the normalized text that gets stored.
pub fn validate_amount(amount: Decimal) -> Result<String, AppError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AppError::ValidationError(
            "Amount must not be negative".to_owned(),
        ));
    }
    if amount > Decimal::from(MAX_AMOUNT) {
        return Err(AppError::ValidationError(format!(
            "Amount must not exceed {MAX_AMOUNT}"
        )));
    }
    Ok(amount.normalize().to_string())
}

impl ExpenseInput {
    pub fn category(&self) -> Category {
        self.category
            .as_deref()
            .map(Category::from_value)
            .unwrap_or_default()
    }
}

impl IncomeInput {
    pub fn validate(&self) -> Result<String, AppError> {
        if self.source.trim().is_empty() {
            return Err(AppError::ValidationError("Source is required".to_owned()));
        }
        validate_amount(self.amount)
    }
}

impl EventInput {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::ValidationError("Title is required".to_owned()));
        }
        Ok(())
    }
}
