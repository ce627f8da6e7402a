use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::error::RealtyError;
use crate::types::*;
use crate::RealtyResult;

const NEWTON_SEED: Rate = dec!(0.10);
const BRACKET_LOW: Rate = dec!(-0.99);
const BRACKET_HIGH: Rate = dec!(10);
/// NPV tolerance relative to the largest absolute cash flow
const NPV_TOLERANCE: Decimal = dec!(0.0000000001);
/// Looser NPV bound accepted when the rate itself has stopped moving
const STALL_NPV_TOLERANCE: Decimal = dec!(0.000001);
const RATE_TOLERANCE: Decimal = dec!(0.000000000001);
const DERIVATIVE_FLOOR: Decimal = dec!(0.000000001);
const MAX_NEWTON_ITERATIONS: u32 = 50;
const MAX_BISECTION_ITERATIONS: u32 = 200;
/// Hard cap on NPV evaluations across both phases
const MAX_TOTAL_STEPS: u32 = 300;
const DAYS_PER_YEAR: Decimal = dec!(365);

/// Sign-change scan points for the bisection bracket, low to high.
const BRACKET_GRID: [Decimal; 21] = [
    dec!(-0.99),
    dec!(-0.95),
    dec!(-0.9),
    dec!(-0.8),
    dec!(-0.6),
    dec!(-0.4),
    dec!(-0.2),
    dec!(0),
    dec!(0.05),
    dec!(0.1),
    dec!(0.2),
    dec!(0.35),
    dec!(0.5),
    dec!(0.75),
    dec!(1),
    dec!(1.5),
    dec!(2),
    dec!(3),
    dec!(5),
    dec!(7.5),
    dec!(10),
];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which refinement produced the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverMethod {
    Newton,
    Bisection,
}

/// A converged rate with solver diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootReport {
    pub rate: Rate,
    pub method: SolverMethod,
    pub iterations: u32,
    /// Residual NPV at the returned rate
    pub npv_at_rate: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateOfReturnInput {
    /// Cash flows, index 0 first; one per year unless `dates` is given
    pub cash_flows: Vec<Money>,
    /// Calendar dates for a date-weighted (XIRR) solve
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dates: Option<Vec<NaiveDate>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateOfReturnOutput {
    /// "IRR" or "XIRR"
    pub measure: String,
    pub rate: Rate,
    pub rate_pct: Percent,
    pub method: SolverMethod,
    pub iterations: u32,
    pub npv_at_rate: Money,
}

/// Root-finder state: Newton first, bisection as fallback, then a terminal state.
#[derive(Debug, Clone)]
enum Phase {
    Newton {
        rate: Rate,
        iteration: u32,
        /// NPV at the previously evaluated rate; the undiscounted sum before any step
        last_npv: Money,
    },
    Bisection {
        low: Rate,
        high: Rate,
        npv_low: Money,
        iteration: u32,
    },
    Converged(RootReport),
    Failed {
        iterations: u32,
        last_delta: Money,
    },
}

impl Phase {
    /// Most recent NPV known to this state.
    fn last_npv(&self) -> Money {
        match self {
            Phase::Newton { last_npv, .. } => *last_npv,
            Phase::Bisection { npv_low, .. } => *npv_low,
            Phase::Converged(report) => report.npv_at_rate,
            Phase::Failed { last_delta, .. } => *last_delta,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Net Present Value of equally spaced cash flows (index = period).
pub fn npv(rate: Rate, cash_flows: &[Money]) -> RealtyResult<Money> {
    if rate <= dec!(-1) {
        return Err(RealtyError::domain(
            "rate",
            "Discount rate must be greater than -100%",
        ));
    }
    let times = period_times(cash_flows.len());
    npv_and_derivative(cash_flows, &times, rate)
        .map(|(v, _)| v)
        .ok_or_else(|| RealtyError::domain("rate", "Discount factors overflow decimal range"))
}

/// Internal Rate of Return for flows spaced one year apart.
pub fn irr(cash_flows: &[Money]) -> RealtyResult<Rate> {
    Ok(find_root("IRR", cash_flows, &period_times(cash_flows.len()))?.rate)
}

/// Date-weighted IRR; year fractions are actual days / 365 from the first date.
pub fn xirr(dated_flows: &[(NaiveDate, Money)]) -> RealtyResult<Rate> {
    let (dates, flows): (Vec<NaiveDate>, Vec<Money>) = dated_flows.iter().copied().unzip();
    Ok(find_root("XIRR", &flows, &date_times(&dates)?)?.rate)
}

/// IRR when `dates` is `None`, otherwise XIRR against the given dates.
pub fn solve(cash_flows: &[Money], dates: Option<&[NaiveDate]>) -> RealtyResult<RootReport> {
    match dates {
        None => find_root("IRR", cash_flows, &period_times(cash_flows.len())),
        Some(d) => {
            if d.len() != cash_flows.len() {
                return Err(RealtyError::DateError(format!(
                    "{} cash flows but {} dates",
                    cash_flows.len(),
                    d.len()
                )));
            }
            find_root("XIRR", cash_flows, &date_times(d)?)
        }
    }
}

/// Solve IRR/XIRR wrapped in the standard output envelope.
pub fn calculate_rate_of_return(
    input: &RateOfReturnInput,
) -> RealtyResult<ComputationOutput<RateOfReturnOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let report = solve(&input.cash_flows, input.dates.as_deref())?;
    if report.method == SolverMethod::Bisection {
        warnings.push("Newton iteration did not settle; rate found by bisection".into());
    }
    if count_sign_changes(&input.cash_flows) > 1 {
        warnings.push(
            "Cash flows change sign more than once; other rates may also zero the NPV".into(),
        );
    }

    let measure = if input.dates.is_some() { "XIRR" } else { "IRR" };
    let output = RateOfReturnOutput {
        measure: measure.into(),
        rate: report.rate,
        rate_pct: report.rate * Decimal::ONE_HUNDRED,
        method: report.method,
        iterations: report.iterations,
        npv_at_rate: report.npv_at_rate,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Rate of return: Newton-Raphson with bisection fallback",
        input,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Root finding
// ---------------------------------------------------------------------------

fn find_root(function: &str, cash_flows: &[Money], times: &[Decimal]) -> RealtyResult<RootReport> {
    find_root_within(function, cash_flows, times, MAX_TOTAL_STEPS)
}

fn find_root_within(
    function: &str,
    cash_flows: &[Money],
    times: &[Decimal],
    max_steps: u32,
) -> RealtyResult<RootReport> {
    if cash_flows.len() < 2 {
        return Err(RealtyError::InsufficientData(format!(
            "{function} requires at least 2 cash flows"
        )));
    }

    let has_outflow = cash_flows.iter().any(|cf| *cf < Decimal::ZERO);
    let has_inflow = cash_flows.iter().any(|cf| *cf > Decimal::ZERO);
    if !has_outflow || !has_inflow {
        return Err(RealtyError::NoConvergence {
            function: function.into(),
            iterations: 0,
            last_delta: cash_flows.iter().copied().sum(),
        });
    }

    let scale = cash_flows
        .iter()
        .map(|cf| cf.abs())
        .max()
        .unwrap_or(Decimal::ONE)
        .max(Decimal::ONE);
    let solver = Solver {
        cash_flows,
        times,
        tolerance: NPV_TOLERANCE * scale,
        stall_tolerance: STALL_NPV_TOLERANCE * scale,
    };

    let mut phase = Phase::Newton {
        rate: NEWTON_SEED,
        iteration: 0,
        last_npv: cash_flows.iter().copied().sum(),
    };
    let mut steps = 0u32;

    loop {
        phase = match phase {
            Phase::Converged(report) => {
                debug!(function, rate = %report.rate, iterations = report.iterations, "converged");
                return Ok(report);
            }
            Phase::Failed {
                iterations,
                last_delta,
            } => {
                return Err(RealtyError::NoConvergence {
                    function: function.into(),
                    iterations,
                    last_delta,
                });
            }
            ref exhausted if steps >= max_steps => Phase::Failed {
                iterations: steps,
                last_delta: exhausted.last_npv(),
            },
            Phase::Newton {
                rate, iteration, ..
            } => solver.newton_step(rate, iteration),
            Phase::Bisection {
                low,
                high,
                npv_low,
                iteration,
            } => solver.bisection_step(low, high, npv_low, iteration),
        };
        steps += 1;
    }
}

struct Solver<'a> {
    cash_flows: &'a [Money],
    times: &'a [Decimal],
    tolerance: Decimal,
    stall_tolerance: Decimal,
}

impl Solver<'_> {
    fn eval(&self, rate: Rate) -> Option<(Money, Decimal)> {
        npv_and_derivative(self.cash_flows, self.times, rate)
    }

    fn newton_step(&self, rate: Rate, iteration: u32) -> Phase {
        if iteration >= MAX_NEWTON_ITERATIONS {
            return self.enter_bisection("iteration cap reached");
        }
        let Some((value, slope)) = self.eval(rate) else {
            return self.enter_bisection("NPV not evaluable");
        };

        if value.abs() <= self.tolerance {
            return Phase::Converged(RootReport {
                rate,
                method: SolverMethod::Newton,
                iterations: iteration,
                npv_at_rate: value,
            });
        }
        if slope.abs() < DERIVATIVE_FLOOR {
            return self.enter_bisection("derivative near zero");
        }

        let Some(next) = value.checked_div(slope).map(|step| rate - step) else {
            return self.enter_bisection("step overflow");
        };
        if next <= BRACKET_LOW || next >= BRACKET_HIGH {
            return self.enter_bisection("step left the bracket");
        }
        if (next - rate).abs() < RATE_TOLERANCE && value.abs() <= self.stall_tolerance {
            return Phase::Converged(RootReport {
                rate: next,
                method: SolverMethod::Newton,
                iterations: iteration + 1,
                npv_at_rate: value,
            });
        }

        Phase::Newton {
            rate: next,
            iteration: iteration + 1,
            last_npv: value,
        }
    }

    /// Scan the grid for the lowest adjacent pair with an NPV sign change.
    fn enter_bisection(&self, reason: &str) -> Phase {
        debug!(reason, "newton phase abandoned, bracketing");

        let mut previous: Option<(Rate, Money)> = None;
        let mut last_delta = Decimal::ZERO;

        for &rate in BRACKET_GRID.iter() {
            let Some((value, _)) = self.eval(rate) else {
                continue;
            };
            last_delta = value;
            if value.is_zero() {
                return Phase::Converged(RootReport {
                    rate,
                    method: SolverMethod::Bisection,
                    iterations: 0,
                    npv_at_rate: value,
                });
            }
            if let Some((low, npv_low)) = previous {
                if npv_low.is_sign_negative() != value.is_sign_negative() {
                    return Phase::Bisection {
                        low,
                        high: rate,
                        npv_low,
                        iteration: 0,
                    };
                }
            }
            previous = Some((rate, value));
        }

        Phase::Failed {
            iterations: 0,
            last_delta,
        }
    }

    fn bisection_step(&self, low: Rate, high: Rate, npv_low: Money, iteration: u32) -> Phase {
        if iteration >= MAX_BISECTION_ITERATIONS {
            return Phase::Failed {
                iterations: iteration,
                last_delta: npv_low,
            };
        }

        let mid = (low + high) / dec!(2);
        let Some((value, _)) = self.eval(mid) else {
            return Phase::Failed {
                iterations: iteration,
                last_delta: npv_low,
            };
        };

        if value.abs() <= self.tolerance || (high - low) / dec!(2) < RATE_TOLERANCE {
            return Phase::Converged(RootReport {
                rate: mid,
                method: SolverMethod::Bisection,
                iterations: iteration + 1,
                npv_at_rate: value,
            });
        }

        if value.is_sign_negative() == npv_low.is_sign_negative() {
            Phase::Bisection {
                low: mid,
                high,
                npv_low: value,
                iteration: iteration + 1,
            }
        } else {
            Phase::Bisection {
                low,
                high: mid,
                npv_low,
                iteration: iteration + 1,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// NPV(r) = Σ CF_t / (1+r)^t and dNPV/dr, or `None` when the decimal range is exceeded.
fn npv_and_derivative(cash_flows: &[Money], times: &[Decimal], rate: Rate) -> Option<(Money, Decimal)> {
    let one_plus_r = Decimal::ONE + rate;
    if one_plus_r <= Decimal::ZERO {
        return None;
    }

    let mut value = Decimal::ZERO;
    let mut slope = Decimal::ZERO;

    for (cf, t) in cash_flows.iter().zip(times) {
        let factor = if t.is_zero() {
            Decimal::ONE
        } else if t.fract().is_zero() {
            one_plus_r.checked_powi(t.trunc().try_into().ok()?)?
        } else {
            one_plus_r.checked_powd(*t)?
        };
        let discounted = cf.checked_div(factor)?;
        value = value.checked_add(discounted)?;
        // d/dr of CF_t / (1+r)^t = -t * CF_t / (1+r)^(t+1)
        let term = t.checked_mul(discounted)?.checked_div(one_plus_r)?;
        slope = slope.checked_sub(term)?;
    }

    Some((value, slope))
}

fn period_times(n: usize) -> Vec<Decimal> {
    (0..n).map(|t| Decimal::from(t as u64)).collect()
}

fn date_times(dates: &[NaiveDate]) -> RealtyResult<Vec<Decimal>> {
    let Some(&base) = dates.first() else {
        return Ok(Vec::new());
    };
    dates
        .iter()
        .map(|d| {
            let days = (*d - base).num_days();
            if days < 0 {
                return Err(RealtyError::DateError(format!(
                    "{d} precedes the first cash-flow date {base}"
                )));
            }
            Ok(Decimal::from(days) / DAYS_PER_YEAR)
        })
        .collect()
}

fn count_sign_changes(cash_flows: &[Money]) -> usize {
    cash_flows
        .iter()
        .filter(|cf| !cf.is_zero())
        .map(|cf| cf.is_sign_negative())
        .collect::<Vec<_>>()
        .windows(2)
        .filter(|w| w[0] != w[1])
        .count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_npv_basic() {
        let cfs = vec![dec!(-1000), dec!(300), dec!(400), dec!(500)];
        let result = npv(dec!(0.10), &cfs).unwrap();
        // -1000 + 300/1.1 + 400/1.21 + 500/1.331 ≈ -21.04
        assert!((result - dec!(-21.04)).abs() < dec!(0.01));
    }

    #[test]
    fn test_npv_zero_rate() {
        let cfs = vec![dec!(-100), dec!(50), dec!(50), dec!(50)];
        assert_eq!(npv(Decimal::ZERO, &cfs).unwrap(), dec!(50));
    }

    #[test]
    fn test_irr_even_flows() {
        let cfs = vec![dec!(-1000), dec!(400), dec!(400), dec!(400)];
        let rate = irr(&cfs).unwrap();
        // ~9.70%
        assert!((rate - dec!(0.097)).abs() < dec!(0.001));
        assert!(npv(rate, &cfs).unwrap().abs() < dec!(0.0001));
    }

    #[test]
    fn test_irr_closed_form() {
        // 1000 grows to 2000 over 5 years: (1+r)^5 = 2
        let cfs = vec![dec!(-1000), dec!(0), dec!(0), dec!(0), dec!(0), dec!(2000)];
        let rate = irr(&cfs).unwrap();
        let grown = dec!(1000) * (Decimal::ONE + rate).powi(5);
        assert!((grown - dec!(2000)).abs() < dec!(0.0001));
    }

    #[test]
    fn test_reference_sale_series_positive() {
        let cfs = vec![
            dec!(-5000000),
            dec!(500000),
            dec!(500000),
            dec!(500000),
            dec!(11000000),
        ];
        let rate = irr(&cfs).unwrap();
        assert!(rate > Decimal::ZERO);
    }

    #[test]
    fn test_step_budget_reports_last_npv() {
        let cfs = vec![
            dec!(-5000000),
            dec!(500000),
            dec!(500000),
            dec!(500000),
            dec!(11000000),
        ];
        let times = period_times(cfs.len());
        let err = find_root_within("IRR", &cfs, &times, 2).unwrap_err();
        match err {
            RealtyError::NoConvergence {
                iterations,
                last_delta,
                ..
            } => {
                assert_eq!(iterations, 2);
                assert!(!last_delta.is_zero());
                // NPV at the last rate evaluated, still far from the root
                assert!(last_delta.abs() > dec!(1));
            }
            other => panic!("expected NoConvergence, got {other:?}"),
        }
    }

    #[test]
    fn test_all_negative_is_no_convergence() {
        let err = irr(&[dec!(-100), dec!(-50), dec!(-20)]).unwrap_err();
        assert!(matches!(err, RealtyError::NoConvergence { .. }));
    }

    #[test]
    fn test_all_positive_is_no_convergence() {
        let err = irr(&[dec!(100), dec!(50)]).unwrap_err();
        assert!(matches!(err, RealtyError::NoConvergence { .. }));
    }

    #[test]
    fn test_single_flow_insufficient() {
        assert!(matches!(
            irr(&[dec!(-100)]),
            Err(RealtyError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_negative_irr() {
        let rate = irr(&[dec!(-1000), dec!(900)]).unwrap();
        assert!((rate - dec!(-0.10)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_returns_far_from_seed() {
        // 100x in one year: 9900% lies beyond the bracket top, no root inside
        let err = irr(&[dec!(-1), dec!(100)]).unwrap_err();
        assert!(matches!(err, RealtyError::NoConvergence { .. }));

        // 500% sits inside the bracket but far from the seed
        let rate = irr(&[dec!(-1), dec!(6)]).unwrap();
        assert!((rate - dec!(5)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_xirr_one_year() {
        let d0 = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let d1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let rate = xirr(&[(d0, dec!(-1000)), (d1, dec!(1100))]).unwrap();
        assert!((rate - dec!(0.10)).abs() < dec!(0.0001));
    }

    #[test]
    fn test_xirr_irregular() {
        let flows = [
            (NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), dec!(-1000)),
            (NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(), dec!(-500)),
            (NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), dec!(1700)),
        ];
        let rate = xirr(&flows).unwrap();
        assert!(rate > dec!(0.10) && rate < dec!(0.20));
    }

    #[test]
    fn test_solve_date_mismatch() {
        let d0 = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let err = solve(&[dec!(-1), dec!(2)], Some(&[d0])).unwrap_err();
        assert!(matches!(err, RealtyError::DateError(_)));
    }

    #[test]
    fn test_dates_before_first_rejected() {
        let flows = [
            (NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), dec!(-1000)),
            (NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), dec!(1100)),
        ];
        assert!(matches!(xirr(&flows), Err(RealtyError::DateError(_))));
    }

    #[test]
    fn test_envelope_reports_measure() {
        let input = RateOfReturnInput {
            cash_flows: vec![dec!(-1000), dec!(400), dec!(400), dec!(400)],
            dates: None,
        };
        let out = calculate_rate_of_return(&input).unwrap();
        assert_eq!(out.result.measure, "IRR");
        assert_eq!(out.result.rate_pct, out.result.rate * dec!(100));
    }

    #[test]
    fn test_multiple_sign_changes_warned() {
        let input = RateOfReturnInput {
            cash_flows: vec![dec!(-100), dec!(230), dec!(-132)],
            dates: None,
        };
        let out = calculate_rate_of_return(&input).unwrap();
        assert!(out.result.rate > Decimal::ZERO);
        assert!(out.warnings.iter().any(|w| w.contains("more than once")));
    }
}
