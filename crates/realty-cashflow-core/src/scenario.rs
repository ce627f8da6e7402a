use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::construction::disbursement::{self, Disbursement, DisbursementTranche};
use crate::error::RealtyError;
use crate::loan::amortization::{LedgerView, LoanTerms};
use crate::loan::tranches::{FinancingMode, FinancingTerms};
use crate::types::*;
use crate::RealtyResult;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// How the purchase price is paid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PaymentPlan {
    /// Completed property: full price paid at month 0, loan drawn at once
    Ready,
    /// Under construction: price paid in milestone tranches
    Staggered(Vec<DisbursementTranche>),
}

/// Holding period, in months or whole years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Horizon {
    Months(u32),
    Years(u32),
}

impl Horizon {
    pub fn months(self) -> u32 {
        match self {
            Horizon::Months(m) => m,
            Horizon::Years(y) => y.saturating_mul(MONTHS_PER_YEAR),
        }
    }
}

/// Fixed exchange rate used to restate summary figures in a second currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyConversion {
    pub currency: Currency,
    /// Units of `currency` per one unit of the deal currency
    pub rate: Decimal,
}

/// Raw deal parameters as supplied by a caller.
///
/// Missing fields fall back to a reference under-construction apartment deal.
/// Nothing here is checked until conversion into [`InvestmentScenario`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioInput {
    pub name: String,
    pub currency: Currency,
    pub property_price: Money,
    pub payment_plan: PaymentPlan,
    /// Sanctioned loan; zero for an all-cash purchase
    pub loan_amount: Money,
    pub loan_rate: Percent,
    pub loan_tenure_months: u32,
    pub financing_mode: FinancingMode,
    /// Starting monthly rent once the property is let
    pub monthly_rent: Money,
    /// Annual rent escalation
    pub rent_escalation: Percent,
    /// Flat monthly maintenance deducted from rent
    pub monthly_maintenance: Money,
    /// Flat tax rate on rent after maintenance
    pub rental_tax_rate: Percent,
    /// Annual property appreciation
    pub appreciation_rate: Percent,
    pub horizon: Horizon,
    /// First month rent can be earned; defaults to the last disbursement month
    #[serde(skip_serializing_if = "Option::is_none")]
    pub possession_month: Option<Month>,
    /// Month the property is sold; defaults to the end of the horizon
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_month: Option<Month>,
    /// Calendar date of month 0, enables XIRR
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporting: Option<CurrencyConversion>,
    pub ledger_view: LedgerView,
}

impl Default for ScenarioInput {
    fn default() -> Self {
        Self {
            name: "Reference apartment".into(),
            currency: Currency::INR,
            property_price: dec!(8500000),
            payment_plan: PaymentPlan::Staggered(vec![
                DisbursementTranche::new(dec!(10), 0),
                DisbursementTranche::new(dec!(20), 1),
                DisbursementTranche::new(dec!(30), 9),
                DisbursementTranche::new(dec!(40), 36),
            ]),
            loan_amount: dec!(3000000),
            loan_rate: dec!(8.6),
            loan_tenure_months: 240,
            financing_mode: FinancingMode::EquityFirst,
            monthly_rent: dec!(24000),
            rent_escalation: dec!(5),
            monthly_maintenance: Decimal::ZERO,
            rental_tax_rate: Decimal::ZERO,
            appreciation_rate: dec!(6),
            horizon: Horizon::Years(10),
            possession_month: None,
            sale_month: None,
            start_date: None,
            reporting: None,
            ledger_view: LedgerView::Annual,
        }
    }
}

// ---------------------------------------------------------------------------
// Validated scenario
// ---------------------------------------------------------------------------

/// A fully validated, immutable deal. Every projection is a pure function of it.
#[derive(Debug, Clone, Serialize)]
pub struct InvestmentScenario {
    input: ScenarioInput,
    disbursements: Vec<Disbursement>,
    financing: Option<FinancingTerms>,
    horizon_months: Month,
    possession_month: Month,
    sale_month: Month,
}

impl TryFrom<ScenarioInput> for InvestmentScenario {
    type Error = RealtyError;

    fn try_from(input: ScenarioInput) -> RealtyResult<Self> {
        let horizon_months = input.horizon.months();
        if horizon_months == 0 {
            return Err(RealtyError::domain(
                "horizon",
                "Holding horizon must be at least one month",
            ));
        }
        if input.property_price <= Decimal::ZERO {
            return Err(RealtyError::domain(
                "property_price",
                "Property price must be positive",
            ));
        }

        let disbursements = match &input.payment_plan {
            PaymentPlan::Ready => disbursement::schedule(
                input.property_price,
                &[DisbursementTranche::new(Decimal::ONE_HUNDRED, 0)],
            )?,
            PaymentPlan::Staggered(tranches) => {
                disbursement::schedule_within(input.property_price, tranches, horizon_months)?
            }
        };
        let completion_month = disbursements.last().map(|d| d.month).unwrap_or_default();

        let financing = validate_financing(&input)?;
        validate_income(&input)?;

        let sale_month = input.sale_month.unwrap_or(horizon_months);
        if sale_month == 0 || sale_month > horizon_months {
            return Err(RealtyError::domain(
                "sale_month",
                format!("Sale month must fall within 1..={horizon_months}"),
            ));
        }
        if sale_month < completion_month {
            return Err(RealtyError::domain(
                "sale_month",
                format!("Sale at month {sale_month} precedes the final disbursement at month {completion_month}"),
            ));
        }

        if let Some(conv) = &input.reporting {
            if conv.rate <= Decimal::ZERO {
                return Err(RealtyError::domain(
                    "reporting.rate",
                    "Exchange rate must be positive",
                ));
            }
        }

        let possession_month = input.possession_month.unwrap_or(completion_month);

        Ok(Self {
            input,
            disbursements,
            financing,
            horizon_months,
            possession_month,
            sale_month,
        })
    }
}

impl InvestmentScenario {
    /// Validate and freeze a set of deal parameters.
    pub fn new(input: ScenarioInput) -> RealtyResult<Self> {
        Self::try_from(input)
    }

    pub fn input(&self) -> &ScenarioInput {
        &self.input
    }

    pub fn name(&self) -> &str {
        &self.input.name
    }

    pub fn property_price(&self) -> Money {
        self.input.property_price
    }

    /// Disbursement events sorted by month.
    pub fn disbursements(&self) -> &[Disbursement] {
        &self.disbursements
    }

    pub fn is_staggered(&self) -> bool {
        matches!(self.input.payment_plan, PaymentPlan::Staggered(_))
    }

    /// Loan terms, absent for an all-cash purchase.
    pub fn financing(&self) -> Option<&FinancingTerms> {
        self.financing.as_ref()
    }

    pub fn horizon_months(&self) -> Month {
        self.horizon_months
    }

    pub fn possession_month(&self) -> Month {
        self.possession_month
    }

    pub fn sale_month(&self) -> Month {
        self.sale_month
    }

    pub fn monthly_rent(&self) -> Money {
        self.input.monthly_rent
    }

    pub fn rent_escalation(&self) -> Percent {
        self.input.rent_escalation
    }

    pub fn monthly_maintenance(&self) -> Money {
        self.input.monthly_maintenance
    }

    pub fn rental_tax_rate(&self) -> Percent {
        self.input.rental_tax_rate
    }

    pub fn appreciation_rate(&self) -> Percent {
        self.input.appreciation_rate
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.input.start_date
    }

    pub fn reporting(&self) -> Option<&CurrencyConversion> {
        self.input.reporting.as_ref()
    }

    pub fn ledger_view(&self) -> LedgerView {
        self.input.ledger_view
    }
}

fn validate_financing(input: &ScenarioInput) -> RealtyResult<Option<FinancingTerms>> {
    if input.loan_amount < Decimal::ZERO {
        return Err(RealtyError::domain("loan_amount", "Loan amount cannot be negative"));
    }
    if input.loan_amount > input.property_price {
        return Err(RealtyError::domain(
            "loan_amount",
            "Loan amount cannot exceed the property price",
        ));
    }
    if input.loan_amount.is_zero() {
        return Ok(None);
    }

    // Surfaces rate/tenure errors at construction rather than mid-projection
    LoanTerms::new(input.loan_amount, input.loan_rate, input.loan_tenure_months)?;

    Ok(Some(FinancingTerms {
        loan_amount: input.loan_amount,
        annual_rate: input.loan_rate,
        tenure_months: input.loan_tenure_months,
        mode: input.financing_mode,
    }))
}

fn validate_income(input: &ScenarioInput) -> RealtyResult<()> {
    if input.monthly_rent < Decimal::ZERO {
        return Err(RealtyError::domain("monthly_rent", "Rent cannot be negative"));
    }
    if input.monthly_maintenance < Decimal::ZERO {
        return Err(RealtyError::domain(
            "monthly_maintenance",
            "Maintenance cannot be negative",
        ));
    }
    if input.rent_escalation <= -Decimal::ONE_HUNDRED {
        return Err(RealtyError::domain(
            "rent_escalation",
            "Rent escalation must be above -100%",
        ));
    }
    if input.appreciation_rate <= -Decimal::ONE_HUNDRED {
        return Err(RealtyError::domain(
            "appreciation_rate",
            "Appreciation must be above -100%",
        ));
    }
    if input.rental_tax_rate < Decimal::ZERO || input.rental_tax_rate > Decimal::ONE_HUNDRED {
        return Err(RealtyError::domain(
            "rental_tax_rate",
            "Tax rate must be a percentage between 0 and 100",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reference_defaults_validate() {
        let scenario = InvestmentScenario::new(ScenarioInput::default()).unwrap();
        assert_eq!(scenario.horizon_months(), 120);
        assert_eq!(scenario.possession_month(), 36);
        assert_eq!(scenario.sale_month(), 120);
        assert!(scenario.is_staggered());
        assert_eq!(scenario.disbursements().len(), 4);
    }

    #[test]
    fn test_ready_property_possession_at_zero() {
        let input = ScenarioInput {
            payment_plan: PaymentPlan::Ready,
            ..ScenarioInput::default()
        };
        let scenario = InvestmentScenario::new(input).unwrap();
        assert_eq!(scenario.possession_month(), 0);
        assert_eq!(scenario.disbursements()[0].amount, dec!(8500000));
    }

    #[test]
    fn test_all_cash_has_no_financing() {
        let input = ScenarioInput {
            loan_amount: Decimal::ZERO,
            ..ScenarioInput::default()
        };
        let scenario = InvestmentScenario::new(input).unwrap();
        assert!(scenario.financing().is_none());
    }

    #[test]
    fn test_negative_rate_is_domain_error() {
        let input = ScenarioInput {
            loan_rate: dec!(-1),
            ..ScenarioInput::default()
        };
        assert!(matches!(
            InvestmentScenario::new(input),
            Err(RealtyError::Domain { .. })
        ));
    }

    #[test]
    fn test_bad_tranches_are_schedule_error() {
        let input = ScenarioInput {
            payment_plan: PaymentPlan::Staggered(vec![
                DisbursementTranche::new(dec!(60), 0),
                DisbursementTranche::new(dec!(30), 12),
            ]),
            ..ScenarioInput::default()
        };
        assert!(matches!(
            InvestmentScenario::new(input),
            Err(RealtyError::InvalidSchedule { .. })
        ));
    }

    #[test]
    fn test_tranche_after_horizon_rejected() {
        let input = ScenarioInput {
            horizon: Horizon::Years(2),
            ..ScenarioInput::default()
        };
        assert!(matches!(
            InvestmentScenario::new(input),
            Err(RealtyError::InvalidSchedule { .. })
        ));
    }

    #[test]
    fn test_sale_before_completion_rejected() {
        let input = ScenarioInput {
            sale_month: Some(24),
            ..ScenarioInput::default()
        };
        assert!(InvestmentScenario::new(input).is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "property_price": "5000000", "loan_amount": "0", "horizon": { "Months": 60 } }"#;
        let input: ScenarioInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.property_price, dec!(5000000));
        assert_eq!(input.monthly_rent, dec!(24000));
        assert_eq!(input.horizon.months(), 60);
    }

    #[test]
    fn test_zero_exchange_rate_rejected() {
        let input = ScenarioInput {
            reporting: Some(CurrencyConversion {
                currency: Currency::USD,
                rate: Decimal::ZERO,
            }),
            ..ScenarioInput::default()
        };
        assert!(InvestmentScenario::new(input).is_err());
    }
}
