use napi::Result as NapiResult;
use napi_derive::napi;
use serde_json::json;

use realty_cashflow_core::loan::amortization::{self, LoanTerms};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Loans
// ---------------------------------------------------------------------------

/// Input: `{"principal", "annual_rate", "tenure_months"}`.
#[napi]
pub fn calculate_emi(input_json: String) -> NapiResult<String> {
    let raw: LoanTerms = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let terms =
        LoanTerms::new(raw.principal, raw.annual_rate, raw.tenure_months).map_err(to_napi_error)?;
    let installment = terms.installment().map_err(to_napi_error)?;
    serde_json::to_string(&json!({ "installment": installment, "terms": terms }))
        .map_err(to_napi_error)
}

#[napi]
pub fn amortization_schedule(input_json: String) -> NapiResult<String> {
    let input: amortization::AmortizationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = amortization::build_amortization_schedule(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

#[napi]
pub fn disbursement_schedule(input_json: String) -> NapiResult<String> {
    let input: realty_cashflow_core::construction::disbursement::ScheduleInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = realty_cashflow_core::construction::disbursement::build_disbursement_schedule(
        &input,
    )
    .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Returns
// ---------------------------------------------------------------------------

#[napi]
pub fn solve_irr(input_json: String) -> NapiResult<String> {
    let input: realty_cashflow_core::returns::solver::RateOfReturnInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = realty_cashflow_core::returns::solver::calculate_rate_of_return(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// Missing scenario fields take the reference-deal defaults.
#[napi]
pub fn analyze_investment(input_json: String) -> NapiResult<String> {
    let input: realty_cashflow_core::scenario::ScenarioInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = realty_cashflow_core::analysis::analyze(input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
