use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use realty_cashflow_core::construction::disbursement::{self, DisbursementTranche, ScheduleInput};

use crate::input;

/// Arguments for a disbursement schedule
#[derive(Args)]
pub struct ScheduleArgs {
    /// Path to a JSON or YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Total property price
    #[arg(long)]
    pub price: Option<Decimal>,

    /// Tranche as PERCENT@MONTH, repeatable (e.g. --tranche 10@0 --tranche 90@24)
    #[arg(long = "tranche", value_parser = parse_tranche)]
    pub tranches: Vec<DisbursementTranche>,

    /// Reject tranches falling after this month
    #[arg(long)]
    pub horizon_months: Option<u32>,
}

fn parse_tranche(raw: &str) -> Result<DisbursementTranche, String> {
    let (pct, month) = raw
        .split_once('@')
        .ok_or_else(|| format!("expected PERCENT@MONTH, got '{raw}'"))?;
    let percentage: Decimal = pct
        .trim()
        .parse()
        .map_err(|e| format!("invalid percentage '{pct}': {e}"))?;
    let month: u32 = month
        .trim()
        .parse()
        .map_err(|e| format!("invalid month '{month}': {e}"))?;
    Ok(DisbursementTranche::new(percentage, month))
}

pub fn run_schedule(args: ScheduleArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let schedule_input: ScheduleInput = if let Some(ref path) = args.input {
        input::file::read_document(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        if args.tranches.is_empty() {
            return Err("at least one --tranche is required (or provide --input)".into());
        }
        ScheduleInput {
            total_price: args.price.ok_or("--price is required (or provide --input)")?,
            tranches: args.tranches,
            horizon_months: args.horizon_months,
        }
    };

    let result = disbursement::build_disbursement_schedule(&schedule_input)?;
    Ok(serde_json::to_value(result)?)
}
