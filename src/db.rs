use chrono::Utc;

use crate::{
    errors::{conflict_on_unique, AppError},
    stats,
    structs::{
        validate_amount, Event, EventInput, Expense, ExpenseInput, Income, IncomeInput, NewUser,
        Profile, ProfileStats, User, UserId, UserSummary, ViewMode,
    },
    utils, AppState,
};

// ---- users ----

pub async fn create_user(state: &AppState, new_user: NewUser) -> Result<User, AppError> {
    let created_at = Utc::now();
    let pwd_hash = utils::hash_password(&new_user.password)?;
    let pool = state.db_pool.clone();
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (name, username, email, pwd_hash, created_at) VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(new_user.name.trim())
    .bind(new_user.username.trim())
    .bind(new_user.email.trim().to_lowercase())
    .bind(pwd_hash)
    .bind(created_at)
    .fetch_one(&pool)
    .await
    .map_err(|e| conflict_on_unique(e, "Email or username already exists"))?;
    log::info!("User created: {} ({})", user.username, user.id);
    Ok(user)
}

pub async fn get_user_by_id(state: &AppState, id: UserId) -> Result<User, AppError> {
    let pool = state.db_pool.clone();
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_owned()))
}

pub async fn find_user_by_email(state: &AppState, email: &str) -> Result<Option<User>, AppError> {
    let pool = state.db_pool.clone();
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email.trim().to_lowercase())
        .fetch_optional(&pool)
        .await?;
    Ok(user)
}

pub async fn find_user_by_username(
    state: &AppState,
    username: &str,
) -> Result<Option<User>, AppError> {
    let pool = state.db_pool.clone();
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(username.trim())
        .fetch_optional(&pool)
        .await?;
    Ok(user)
}

pub async fn profile(state: &AppState, user_id: UserId) -> Result<Profile, AppError> {
    let user = get_user_by_id(state, user_id).await?;
    let partner = match user.partner_id {
        Some(partner_id) => Some(UserSummary::from(&get_user_by_id(state, partner_id).await?)),
        None => None,
    };
    let expenses = list_expenses(state, user_id, ViewMode::Personal).await?;
    Ok(Profile {
        id: user.id,
        name: user.name,
        email: user.email,
        username: user.username,
        created_at: user.created_at,
        partner,
        stats: ProfileStats {
            total_expenses: stats::total_of(&expenses),
            expense_count: expenses.len(),
        },
    })
}

/// Owners whose records are visible to `user_id` in the given mode. Without a
/// linked partner both slots hold the caller.
pub async fn visible_owners(
    state: &AppState,
    user_id: UserId,
    mode: ViewMode,
) -> Result<(UserId, UserId), AppError> {
    match mode {
        ViewMode::Personal => Ok((user_id, user_id)),
        ViewMode::Joint => {
            let user = get_user_by_id(state, user_id).await?;
            Ok((user_id, user.partner_id.unwrap_or(user_id)))
        }
    }
}

fn ensure_owner(owner: UserId, actor: UserId, what: &str) -> Result<(), AppError> {
    if owner != actor {
        log::warn!("User {} tried to modify {} owned by {}", actor, what, owner);
        return Err(AppError::Forbidden("Not authorized".to_owned()));
    }
    Ok(())
}

// ---- expenses ----

pub async fn list_expenses(
    state: &AppState,
    user_id: UserId,
    mode: ViewMode,
) -> Result<Vec<Expense>, AppError> {
    let (owner, partner) = visible_owners(state, user_id, mode).await?;
    let pool = state.db_pool.clone();
    let expenses = sqlx::query_as::<_, Expense>(
        "SELECT e.*, u.name AS owner_name FROM expenses e JOIN users u ON u.id = e.user_id \
         WHERE e.user_id IN ($1, $2) ORDER BY e.date DESC, e.id DESC",
    )
    .bind(owner)
    .bind(partner)
    .fetch_all(&pool)
    .await?;
    Ok(expenses)
}

pub async fn get_expense(state: &AppState, id: i64) -> Result<Option<Expense>, AppError> {
    let pool = state.db_pool.clone();
    let expense = sqlx::query_as::<_, Expense>("SELECT * FROM expenses WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?;
    Ok(expense)
}

pub async fn create_expense(
    state: &AppState,
    user_id: UserId,
    input: ExpenseInput,
) -> Result<Expense, AppError> {
    let amount = validate_amount(input.amount)?;
    let pool = state.db_pool.clone();
    let expense = sqlx::query_as::<_, Expense>(
        "INSERT INTO expenses (user_id, amount, category, date, description, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(user_id)
    .bind(amount)
    .bind(input.category().value())
    .bind(input.date)
    .bind(input.description.trim())
    .bind(Utc::now())
    .fetch_one(&pool)
    .await?;
    log::info!("Expense {} created by user {}", expense.id, user_id);
    Ok(expense)
}

pub async fn update_expense(
    state: &AppState,
    actor: UserId,
    id: i64,
    input: ExpenseInput,
) -> Result<Expense, AppError> {
    let existing = get_expense(state, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Expense not found".to_owned()))?;
    ensure_owner(existing.user_id, actor, "expense")?;
    let amount = validate_amount(input.amount)?;

    let pool = state.db_pool.clone();
    let expense = sqlx::query_as::<_, Expense>(
        "UPDATE expenses SET amount = $1, category = $2, date = $3, description = $4 \
         WHERE id = $5 AND user_id = $6 RETURNING *",
    )
    .bind(amount)
    .bind(input.category().value())
    .bind(input.date)
    .bind(input.description.trim())
    .bind(id)
    .bind(actor)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Expense not found".to_owned()))?;
    log::info!("Expense {} updated by user {}", id, actor);
    Ok(expense)
}

pub async fn delete_expense(state: &AppState, actor: UserId, id: i64) -> Result<(), AppError> {
    let existing = get_expense(state, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Expense not found".to_owned()))?;
    ensure_owner(existing.user_id, actor, "expense")?;

    let pool = state.db_pool.clone();
    sqlx::query("DELETE FROM expenses WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(actor)
        .execute(&pool)
        .await?;
    log::info!("Expense {} deleted by user {}", id, actor);
    Ok(())
}

// ---- incomes ----

pub async fn list_incomes(
    state: &AppState,
    user_id: UserId,
    mode: ViewMode,
) -> Result<Vec<Income>, AppError> {
    let (owner, partner) = visible_owners(state, user_id, mode).await?;
    let pool = state.db_pool.clone();
    let incomes = sqlx::query_as::<_, Income>(
        "SELECT i.*, u.name AS owner_name FROM incomes i JOIN users u ON u.id = i.user_id \
         WHERE i.user_id IN ($1, $2) ORDER BY i.date DESC, i.id DESC",
    )
    .bind(owner)
    .bind(partner)
    .fetch_all(&pool)
    .await?;
    Ok(incomes)
}

pub async fn get_income(state: &AppState, id: i64) -> Result<Option<Income>, AppError> {
    let pool = state.db_pool.clone();
    let income = sqlx::query_as::<_, Income>("SELECT * FROM incomes WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?;
    Ok(income)
}

pub async fn create_income(
    state: &AppState,
    user_id: UserId,
    input: IncomeInput,
) -> Result<Income, AppError> {
    let amount = input.validate()?;
    let pool = state.db_pool.clone();
    let income = sqlx::query_as::<_, Income>(
        "INSERT INTO incomes (user_id, amount, source, date, description, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(user_id)
    .bind(amount)
    .bind(input.source.trim())
    .bind(input.date)
    .bind(input.description.trim())
    .bind(Utc::now())
    .fetch_one(&pool)
    .await?;
    log::info!("Income {} created by user {}", income.id, user_id);
    Ok(income)
}

pub async fn update_income(
    state: &AppState,
    actor: UserId,
    id: i64,
    input: IncomeInput,
) -> Result<Income, AppError> {
    let existing = get_income(state, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Income not found".to_owned()))?;
    ensure_owner(existing.user_id, actor, "income")?;
    let amount = input.validate()?;

    let pool = state.db_pool.clone();
    let income = sqlx::query_as::<_, Income>(
        "UPDATE incomes SET amount = $1, source = $2, date = $3, description = $4 \
         WHERE id = $5 AND user_id = $6 RETURNING *",
    )
    .bind(amount)
    .bind(input.source.trim())
    .bind(input.date)
    .bind(input.description.trim())
    .bind(id)
    .bind(actor)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Income not found".to_owned()))?;
    log::info!("Income {} updated by user {}", id, actor);
    Ok(income)
}

pub async fn delete_income(state: &AppState, actor: UserId, id: i64) -> Result<(), AppError> {
    let existing = get_income(state, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Income not found".to_owned()))?;
    ensure_owner(existing.user_id, actor, "income")?;

    let pool = state.db_pool.clone();
    sqlx::query("DELETE FROM incomes WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(actor)
        .execute(&pool)
        .await?;
    log::info!("Income {} deleted by user {}", id, actor);
    Ok(())
}

// ---- events ----

pub async fn list_events(state: &AppState, user_id: UserId) -> Result<Vec<Event>, AppError> {
    let pool = state.db_pool.clone();
    let events = sqlx::query_as::<_, Event>(
        "SELECT * FROM events WHERE user_id = $1 ORDER BY date ASC, id ASC",
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;
    Ok(events)
}

pub async fn create_event(
    state: &AppState,
    user_id: UserId,
    input: EventInput,
) -> Result<Event, AppError> {
    input.validate()?;
    let pool = state.db_pool.clone();
    let event = sqlx::query_as::<_, Event>(
        "INSERT INTO events (user_id, title, date, event_type, description, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(user_id)
    .bind(input.title.trim())
    .bind(input.date)
    .bind(input.event_type)
    .bind(input.description.trim())
    .bind(Utc::now())
    .fetch_one(&pool)
    .await?;
    log::info!("Event {} created by user {}", event.id, user_id);
    Ok(event)
}

/// Deletes by id and owner together; returns whether anything matched.
pub async fn delete_event(state: &AppState, user_id: UserId, id: i64) -> Result<bool, AppError> {
    let pool = state.db_pool.clone();
    let result = sqlx::query("DELETE FROM events WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(&pool)
        .await?;
    let deleted = result.rows_affected() > 0;
    if deleted {
        log::info!("Event {} deleted by user {}", id, user_id);
    }
    Ok(deleted)
}
