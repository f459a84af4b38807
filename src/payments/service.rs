use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::{Decimal, RoundingStrategy};
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, Time};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::claims::{Claims, Role};
use crate::error::ApiError;
use crate::payments::dto::{
    CreatePaymentRequest, DayRevenue, ListPaymentsQuery, PaymentPage, StatsSnapshot, StatusCount,
};
use crate::payments::repo::{self, Payment, PaymentFilter, PaymentMethod, PaymentStatus};
use crate::state::AppState;

const DEFAULT_CURRENCY: &str = "INR";
const DEFAULT_PAGE_SIZE: i64 = 10;
const RECENT_PAYMENTS_LIMIT: i64 = 5;

const DATE_FORMAT: &[time::format_description::FormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

/// Visibility scope of a requester. `None` means unrestricted (admin); for
/// everyone else the owner filter is forced regardless of what the caller
/// asked for. This is the hard authorization boundary, not a default.
pub(crate) fn scope_for(claims: &Claims) -> Option<Uuid> {
    match claims.role {
        Role::Admin => None,
        Role::User => Some(claims.sub),
    }
}

/// 2.9% of the amount, rounded to 2 decimal places (half away from zero).
pub(crate) fn default_fee(amount: Decimal) -> Decimal {
    (amount * Decimal::new(29, 3))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Opaque transaction id: a millisecond timestamp plus random alphanumeric
/// tail, so concurrent creations cannot race a shared counter.
pub(crate) fn generate_transaction_id() -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
    format!("TXN{millis}{suffix}")
}

#[instrument(skip(state, input))]
pub async fn create(
    state: &AppState,
    input: CreatePaymentRequest,
    owner_id: Uuid,
) -> Result<Payment, ApiError> {
    if input.amount <= Decimal::ZERO {
        return Err(ApiError::Validation("Amount must be positive".into()));
    }
    let receiver = input.receiver.trim();
    if receiver.is_empty() {
        return Err(ApiError::Validation("Receiver is required".into()));
    }
    if input.fee.is_some_and(|fee| fee < Decimal::ZERO) {
        return Err(ApiError::Validation("Fee must not be negative".into()));
    }

    let fee = input.fee.unwrap_or_else(|| default_fee(input.amount));
    let currency = input.currency.as_deref().unwrap_or(DEFAULT_CURRENCY);
    let transaction_id = generate_transaction_id();

    let payment = repo::insert(
        &state.db,
        repo::NewPayment {
            amount: input.amount,
            receiver,
            status: input.status,
            method: input.method,
            description: input.description.as_deref(),
            transaction_id: &transaction_id,
            currency,
            fee,
            user_id: owner_id,
        },
    )
    .await?;

    info!(payment_id = %payment.id, transaction_id = %payment.transaction_id, "payment created");

    // Fire-and-forget fan-out over per-connection channels; a slow client
    // never delays this request. Stats are pushed unconditionally as a cache
    // invalidation cue, not a diff.
    state.notifier.payment_created(&payment);
    state.notifier.stats_updated();

    Ok(payment)
}

#[instrument(skip(state, query, claims))]
pub async fn list(
    state: &AppState,
    query: &ListPaymentsQuery,
    claims: &Claims,
) -> Result<PaymentPage, ApiError> {
    let (page, limit) = resolve_page(query);
    let filter = resolve_filter(query, claims)?;

    let total = repo::count(&state.db, &filter).await?;
    let payments = repo::list(&state.db, &filter, limit, (page - 1) * limit).await?;

    Ok(PaymentPage {
        payments,
        total,
        total_pages: total_pages(total, limit),
    })
}

pub async fn get_by_id(state: &AppState, id: Uuid) -> Result<Payment, ApiError> {
    // TODO: unlike list/stats/export, this path applies no ownership scoping,
    // so any authenticated user can fetch any payment by id. Confirm whether
    // detail views rely on that before tightening.
    repo::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Payment not found".into()))
}

#[instrument(skip(state, claims))]
pub async fn stats(state: &AppState, claims: &Claims) -> Result<StatsSnapshot, ApiError> {
    let owner = scope_for(claims);
    let now = OffsetDateTime::now_utc();
    let start_of_today = now.replace_time(Time::MIDNIGHT);
    // Rolling 7x24h window, not a calendar week.
    let start_of_week = now - Duration::days(7);

    let (
        total_payments_today,
        total_payments_week,
        total_revenue_today,
        total_revenue_week,
        failed_transactions,
        recent_payments,
        by_status,
        by_day,
    ) = tokio::try_join!(
        repo::count_since(&state.db, owner, start_of_today),
        repo::count_since(&state.db, owner, start_of_week),
        repo::sum_success_since(&state.db, owner, start_of_today),
        repo::sum_success_since(&state.db, owner, start_of_week),
        repo::count_failed(&state.db, owner),
        repo::recent(&state.db, owner, RECENT_PAYMENTS_LIMIT),
        repo::count_by_status(&state.db, owner),
        repo::revenue_by_day(&state.db, owner, start_of_week),
    )?;

    Ok(StatsSnapshot {
        total_payments_today,
        total_payments_week,
        total_revenue_today,
        total_revenue_week,
        failed_transactions,
        recent_payments,
        payments_by_status: by_status
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect(),
        revenue_by_day: by_day
            .into_iter()
            .map(|(day, revenue, count)| DayRevenue {
                day,
                revenue,
                count,
            })
            .collect(),
    })
}

#[instrument(skip(state, query, claims))]
pub async fn export_csv(
    state: &AppState,
    query: &ListPaymentsQuery,
    claims: &Claims,
) -> Result<String, ApiError> {
    let filter = resolve_filter(query, claims)?;
    let payments = repo::list_all(&state.db, &filter).await?;
    Ok(render_csv(&payments))
}

/// Boot-time convenience: inserts a handful of sample payments owned by the
/// seeded admin when the table is empty. Goes through `create`, so the usual
/// stamping and fan-out rules apply.
pub async fn seed_sample_data(state: &AppState, admin_id: Uuid) -> anyhow::Result<()> {
    if repo::count_all(&state.db).await? > 0 {
        return Ok(());
    }

    let samples = [
        (
            Decimal::new(15000, 2),
            "John Doe",
            PaymentStatus::Success,
            PaymentMethod::CreditCard,
            "Product purchase",
        ),
        (
            Decimal::new(7550, 2),
            "Jane Smith",
            PaymentStatus::Success,
            PaymentMethod::Paypal,
            "Service payment",
        ),
        (
            Decimal::new(20000, 2),
            "Mike Johnson",
            PaymentStatus::Failed,
            PaymentMethod::DebitCard,
            "Order #12345",
        ),
        (
            Decimal::new(9999, 2),
            "Sarah Wilson",
            PaymentStatus::Pending,
            PaymentMethod::BankTransfer,
            "Subscription fee",
        ),
        (
            Decimal::new(100000, 2),
            "Corporate Client",
            PaymentStatus::Success,
            PaymentMethod::Crypto,
            "Large order payment",
        ),
    ];

    for (amount, receiver, status, method, description) in samples {
        let input = CreatePaymentRequest {
            amount,
            receiver: receiver.to_string(),
            status,
            method,
            description: Some(description.to_string()),
            currency: None,
            fee: None,
        };
        create(state, input, admin_id)
            .await
            .map_err(anyhow::Error::new)?;
    }

    info!("sample payment data seeded");
    Ok(())
}

fn resolve_page(query: &ListPaymentsQuery) -> (i64, i64) {
    let page = query
        .page
        .as_deref()
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|&p| p >= 1)
        .unwrap_or(1);
    let limit = query
        .limit
        .as_deref()
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|&l| l >= 1)
        .unwrap_or(DEFAULT_PAGE_SIZE);
    (page, limit)
}

fn resolve_filter(query: &ListPaymentsQuery, claims: &Claims) -> Result<PaymentFilter, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            s.parse::<PaymentStatus>()
                .map_err(|()| ApiError::Validation(format!("Unknown status filter: {s}")))
        })
        .transpose()?;
    let method = query
        .method
        .as_deref()
        .map(|m| {
            m.parse::<PaymentMethod>()
                .map_err(|()| ApiError::Validation(format!("Unknown method filter: {m}")))
        })
        .transpose()?;
    let start_date = parse_date(query.start_date.as_deref(), "startDate")?;
    let end_date = parse_date(query.end_date.as_deref(), "endDate")?;

    Ok(PaymentFilter {
        owner: scope_for(claims),
        status,
        method,
        start_date,
        end_date,
    })
}

fn parse_date(value: Option<&str>, field: &str) -> Result<Option<Date>, ApiError> {
    value
        .map(|v| {
            Date::parse(v, DATE_FORMAT)
                .map_err(|_| ApiError::Validation(format!("Invalid {field}, expected YYYY-MM-DD")))
        })
        .transpose()
}

fn total_pages(total: i64, limit: i64) -> i64 {
    if total == 0 {
        0
    } else {
        (total + limit - 1) / limit
    }
}

const CSV_HEADER: [&str; 9] = [
    "Transaction ID",
    "Date",
    "Amount",
    "Currency",
    "Receiver",
    "Status",
    "Method",
    "Description",
    "Fee",
];

/// Fixed 9-column layout, every field quoted, header always present.
fn render_csv(payments: &[Payment]) -> String {
    let mut rows = Vec::with_capacity(payments.len() + 1);
    rows.push(csv_row(CSV_HEADER.iter().map(|s| (*s).to_string())));
    for p in payments {
        let date = p.created_at.date().format(DATE_FORMAT).unwrap_or_default();
        rows.push(csv_row(
            [
                p.transaction_id.clone(),
                date,
                p.amount.to_string(),
                p.currency.clone(),
                p.receiver.clone(),
                p.status.as_str().to_string(),
                p.method.as_str().to_string(),
                p.description.clone().unwrap_or_default(),
                p.fee.to_string(),
            ]
            .into_iter(),
        ));
    }
    rows.join("\n")
}

fn csv_row(fields: impl Iterator<Item = String>) -> String {
    fields
        .map(|f| format!("\"{}\"", f.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(",")
}
