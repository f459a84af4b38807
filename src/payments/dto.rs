use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::payments::repo::{Payment, PaymentMethod, PaymentStatus};

/// Body for `POST /payments`. Status and method are validated by
/// deserialization into their closed enums.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub amount: Decimal,
    pub receiver: String,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub description: Option<String>,
    pub currency: Option<String>,
    pub fee: Option<Decimal>,
}

/// Raw query string for `GET /payments` and the CSV export. Page and limit are
/// parsed leniently (anything unusable falls back to defaults); filter values
/// are validated strictly.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPaymentsQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub status: Option<String>,
    pub method: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPage {
    pub payments: Vec<Payment>,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct StatusCount {
    pub status: PaymentStatus,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct DayRevenue {
    pub day: Date,
    pub revenue: Decimal,
    pub count: i64,
}

/// Aggregate dashboard figures, computed on demand under the requester's
/// scope (admins get global figures, non-admins only their own).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_payments_today: i64,
    pub total_payments_week: i64,
    pub total_revenue_today: Decimal,
    pub total_revenue_week: Decimal,
    pub failed_transactions: i64,
    pub recent_payments: Vec<Payment>,
    pub payments_by_status: Vec<StatusCount>,
    pub revenue_by_day: Vec<DayRevenue>,
}
