use clap::Args;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use realty_cashflow_core::loan::amortization::{self, AmortizationInput, LedgerView, LoanTerms};

use crate::input;

/// Arguments for a loan installment
#[derive(Args)]
pub struct EmiArgs {
    /// Loan principal
    #[arg(long)]
    pub principal: Decimal,

    /// Annual interest rate as a percentage (e.g. 8.6)
    #[arg(long)]
    pub rate: Decimal,

    /// Loan tenure in months
    #[arg(long)]
    pub tenure_months: u32,
}

pub fn run_emi(args: EmiArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let terms = LoanTerms::new(args.principal, args.rate, args.tenure_months)?;
    let installment = terms.installment()?;
    let total_interest = amortization::total_interest(&terms.ledger()?);

    Ok(json!({
        "installment": installment.round_dp(2),
        "principal": terms.principal,
        "annual_rate": terms.annual_rate,
        "tenure_months": terms.tenure_months,
        "total_interest": total_interest.round_dp(2),
        "total_paid": (total_interest + terms.principal).round_dp(2),
    }))
}

/// Arguments for an amortisation ledger
#[derive(Args)]
pub struct AmortizationArgs {
    /// Path to a JSON or YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Loan principal
    #[arg(long)]
    pub principal: Option<Decimal>,

    /// Annual interest rate as a percentage
    #[arg(long)]
    pub rate: Option<Decimal>,

    /// Loan tenure in months
    #[arg(long)]
    pub tenure_months: Option<u32>,

    /// Ledger presentation
    #[arg(long, value_enum, default_value = "annual")]
    pub view: ViewArg,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum ViewArg {
    Monthly,
    Annual,
}

impl From<ViewArg> for LedgerView {
    fn from(v: ViewArg) -> Self {
        match v {
            ViewArg::Monthly => LedgerView::Monthly,
            ViewArg::Annual => LedgerView::Annual,
        }
    }
}

pub fn run_amortization(args: AmortizationArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let amort_input: AmortizationInput = if let Some(ref path) = args.input {
        input::file::read_document(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        AmortizationInput {
            principal: args
                .principal
                .ok_or("--principal is required (or provide --input)")?,
            annual_rate: args.rate.ok_or("--rate is required (or provide --input)")?,
            tenure_months: args
                .tenure_months
                .ok_or("--tenure-months is required (or provide --input)")?,
            view: args.view.into(),
        }
    };

    let result = amortization::build_amortization_schedule(&amort_input)?;
    Ok(serde_json::to_value(result)?)
}
