use chrono::NaiveDate;
use clap::Args;
use serde_json::Value;
use tracing::info;

use realty_cashflow_core::analysis;
use realty_cashflow_core::scenario::{InvestmentScenario, ScenarioInput};

use crate::input;

/// Arguments for a full investment analysis
#[derive(Args)]
pub struct AnalyzeArgs {
    /// Path to a JSON or YAML scenario; omitted fields take reference defaults
    #[arg(long)]
    pub input: Option<String>,

    /// Calendar date of month 0, enables XIRR
    #[arg(long)]
    pub start_date: Option<NaiveDate>,

    /// Month the property is sold
    #[arg(long)]
    pub sale_month: Option<u32>,

    /// Emit the month-by-month loan ledger instead of annual totals
    #[arg(long)]
    pub monthly: bool,
}

pub fn run_analyze(args: AnalyzeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut scenario_input: ScenarioInput = if let Some(ref path) = args.input {
        input::file::read_document(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        info!("no scenario supplied, analysing the reference deal");
        ScenarioInput::default()
    };

    if args.start_date.is_some() {
        scenario_input.start_date = args.start_date;
    }
    if args.sale_month.is_some() {
        scenario_input.sale_month = args.sale_month;
    }
    if args.monthly {
        scenario_input.ledger_view = realty_cashflow_core::loan::amortization::LedgerView::Monthly;
    }

    let scenario = InvestmentScenario::new(scenario_input)?;
    info!(
        scenario = scenario.name(),
        horizon_months = scenario.horizon_months(),
        "analysing scenario"
    );
    let result = analysis::analyze_investment(&scenario)?;
    Ok(serde_json::to_value(result)?)
}
