use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use realty_cashflow_core::returns::solver::{self, RateOfReturnInput};

use crate::input;

/// Arguments for IRR / XIRR
#[derive(Args)]
pub struct IrrArgs {
    /// Path to a JSON or YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Cash flows, first one at time zero (comma-separated, e.g. "-100,30,30,130")
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub cash_flows: Option<Vec<Decimal>>,

    /// One date per cash flow (comma-separated YYYY-MM-DD); switches to XIRR
    #[arg(long, value_delimiter = ',')]
    pub dates: Option<Vec<NaiveDate>>,
}

pub fn run_irr(args: IrrArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let ror_input: RateOfReturnInput = if let Some(ref path) = args.input {
        input::file::read_document(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        RateOfReturnInput {
            cash_flows: args
                .cash_flows
                .ok_or("--cash-flows is required (or provide --input)")?,
            dates: args.dates,
        }
    };

    let result = solver::calculate_rate_of_return(&ror_input)?;
    Ok(serde_json::to_value(result)?)
}
