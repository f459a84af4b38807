use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
pub enum PaymentStatus {
    Success,
    Failed,
    Pending,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Paypal,
    BankTransfer,
    Crypto,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Pending => "pending",
        }
    }
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreditCard => "credit_card",
            Self::DebitCard => "debit_card",
            Self::Paypal => "paypal",
            Self::BankTransfer => "bank_transfer",
            Self::Crypto => "crypto",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "pending" => Ok(Self::Pending),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit_card" => Ok(Self::CreditCard),
            "debit_card" => Ok(Self::DebitCard),
            "paypal" => Ok(Self::Paypal),
            "bank_transfer" => Ok(Self::BankTransfer),
            "crypto" => Ok(Self::Crypto),
            _ => Err(()),
        }
    }
}

/// Payment record. Created exclusively through the payment service, which
/// stamps the transaction id and fee; effectively append-only after that.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub amount: Decimal,
    pub receiver: String,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub description: Option<String>,
    pub transaction_id: String,
    pub currency: String,
    pub fee: Decimal,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Combined visibility scope + caller-supplied filters for list/stats/export.
/// `owner = Some(id)` is the hard authorization boundary for non-admins.
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub owner: Option<Uuid>,
    pub status: Option<PaymentStatus>,
    pub method: Option<PaymentMethod>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
}

const PAYMENT_COLUMNS: &str = "id, amount, receiver, status, method, description, \
                               transaction_id, currency, fee, user_id, created_at, updated_at";

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &PaymentFilter) {
    qb.push(" WHERE TRUE");
    if let Some(owner) = filter.owner {
        qb.push(" AND user_id = ").push_bind(owner);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(method) = filter.method {
        qb.push(" AND method = ").push_bind(method);
    }
    if let Some(start) = filter.start_date {
        qb.push(" AND created_at >= ")
            .push_bind(start.midnight().assume_utc());
    }
    if let Some(end) = filter.end_date {
        // Inclusive of the whole end day.
        qb.push(" AND created_at < ")
            .push_bind(end.midnight().assume_utc() + time::Duration::days(1));
    }
}

/// Row to insert; the service stamps `transaction_id` and `fee` before
/// building one.
#[derive(Debug)]
pub struct NewPayment<'a> {
    pub amount: Decimal,
    pub receiver: &'a str,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub description: Option<&'a str>,
    pub transaction_id: &'a str,
    pub currency: &'a str,
    pub fee: Decimal,
    pub user_id: Uuid,
}

pub async fn insert(db: &PgPool, new: NewPayment<'_>) -> anyhow::Result<Payment> {
    let payment = sqlx::query_as::<_, Payment>(&format!(
        r#"
        INSERT INTO payments (amount, receiver, status, method, description,
                              transaction_id, currency, fee, user_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {PAYMENT_COLUMNS}
        "#,
    ))
    .bind(new.amount)
    .bind(new.receiver)
    .bind(new.status)
    .bind(new.method)
    .bind(new.description)
    .bind(new.transaction_id)
    .bind(new.currency)
    .bind(new.fee)
    .bind(new.user_id)
    .fetch_one(db)
    .await?;
    Ok(payment)
}

pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Payment>> {
    let payment = sqlx::query_as::<_, Payment>(&format!(
        r#"
        SELECT {PAYMENT_COLUMNS}
        FROM payments
        WHERE id = $1
        "#,
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(payment)
}

/// Filtered page, newest first.
pub async fn list(
    db: &PgPool,
    filter: &PaymentFilter,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<Payment>> {
    let mut qb = QueryBuilder::new(format!("SELECT {PAYMENT_COLUMNS} FROM payments"));
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    let rows = qb.build_query_as::<Payment>().fetch_all(db).await?;
    Ok(rows)
}

/// Full matching set, newest first, for CSV export.
pub async fn list_all(db: &PgPool, filter: &PaymentFilter) -> anyhow::Result<Vec<Payment>> {
    let mut qb = QueryBuilder::new(format!("SELECT {PAYMENT_COLUMNS} FROM payments"));
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY created_at DESC");
    let rows = qb.build_query_as::<Payment>().fetch_all(db).await?;
    Ok(rows)
}

pub async fn count(db: &PgPool, filter: &PaymentFilter) -> anyhow::Result<i64> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM payments");
    push_filters(&mut qb, filter);
    let (n,): (i64,) = qb.build_query_as().fetch_one(db).await?;
    Ok(n)
}

/// Payments created at or after `since`, under the given scope.
pub async fn count_since(
    db: &PgPool,
    owner: Option<Uuid>,
    since: OffsetDateTime,
) -> anyhow::Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM payments
        WHERE ($1::uuid IS NULL OR user_id = $1) AND created_at >= $2
        "#,
    )
    .bind(owner)
    .bind(since)
    .fetch_one(db)
    .await?;
    Ok(n)
}

/// Summed amount of `success` payments created at or after `since`.
pub async fn sum_success_since(
    db: &PgPool,
    owner: Option<Uuid>,
    since: OffsetDateTime,
) -> anyhow::Result<Decimal> {
    let (total,): (Decimal,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(amount), 0)
        FROM payments
        WHERE ($1::uuid IS NULL OR user_id = $1)
          AND created_at >= $2
          AND status = 'success'
        "#,
    )
    .bind(owner)
    .bind(since)
    .fetch_one(db)
    .await?;
    Ok(total)
}

/// All-time count of `failed` payments under the given scope.
pub async fn count_failed(db: &PgPool, owner: Option<Uuid>) -> anyhow::Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM payments
        WHERE ($1::uuid IS NULL OR user_id = $1) AND status = 'failed'
        "#,
    )
    .bind(owner)
    .fetch_one(db)
    .await?;
    Ok(n)
}

pub async fn recent(db: &PgPool, owner: Option<Uuid>, limit: i64) -> anyhow::Result<Vec<Payment>> {
    let rows = sqlx::query_as::<_, Payment>(&format!(
        r#"
        SELECT {PAYMENT_COLUMNS}
        FROM payments
        WHERE ($1::uuid IS NULL OR user_id = $1)
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    ))
    .bind(owner)
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn count_by_status(
    db: &PgPool,
    owner: Option<Uuid>,
) -> anyhow::Result<Vec<(PaymentStatus, i64)>> {
    let rows: Vec<(PaymentStatus, i64)> = sqlx::query_as(
        r#"
        SELECT status, COUNT(*)
        FROM payments
        WHERE ($1::uuid IS NULL OR user_id = $1)
        GROUP BY status
        "#,
    )
    .bind(owner)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Per-day revenue/count of `success` payments since `since`, chronological.
pub async fn revenue_by_day(
    db: &PgPool,
    owner: Option<Uuid>,
    since: OffsetDateTime,
) -> anyhow::Result<Vec<(Date, Decimal, i64)>> {
    let rows: Vec<(Date, Decimal, i64)> = sqlx::query_as(
        r#"
        SELECT (created_at AT TIME ZONE 'UTC')::date AS day,
               COALESCE(SUM(amount), 0) AS revenue,
               COUNT(*) AS count
        FROM payments
        WHERE ($1::uuid IS NULL OR user_id = $1)
          AND created_at >= $2
          AND status = 'success'
        GROUP BY day
        ORDER BY day ASC
        "#,
    )
    .bind(owner)
    .bind(since)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn count_all(db: &PgPool) -> anyhow::Result<i64> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM payments")
        .fetch_one(db)
        .await?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_method_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Success).unwrap(),
            "\"success\""
        );
        assert_eq!(
            serde_json::to_string(&PaymentMethod::CreditCard).unwrap(),
            "\"credit_card\""
        );
        assert_eq!(
            serde_json::to_string(&PaymentMethod::BankTransfer).unwrap(),
            "\"bank_transfer\""
        );
    }

    #[test]
    fn method_rejects_unknown_value() {
        assert!(serde_json::from_str::<PaymentMethod>("\"cash\"").is_err());
        assert!(serde_json::from_str::<PaymentStatus>("\"refunded\"").is_err());
    }
}
