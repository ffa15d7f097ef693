// Screening thresholds and score weights

use serde::{Deserialize, Serialize};

/// Inclusive price-to-earnings band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeBand {
    pub min: f64,
    pub max: f64,
}

impl PeBand {
    pub fn contains(&self, pe: f64) -> bool {
        pe >= self.min && pe <= self.max
    }
}

/// Eligibility filters applied before a ticker is scored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningCriteria {
    /// Dividend yield (%) must be strictly above this
    pub min_dividend_yield: f64,
    /// Hard beta ceiling; `None` leaves beta to the score penalty only
    pub max_beta: Option<f64>,
    pub pe_band: Option<PeBand>,
    pub require_revenue_growth: bool,
}

impl Default for ScreeningCriteria {
    fn default() -> Self {
        Self::basic()
    }
}

impl ScreeningCriteria {
    /// High-yield profile: >5% yield, beta below 1.5, P/E 5-60, growing revenue.
    pub fn basic() -> Self {
        Self {
            min_dividend_yield: 5.0,
            max_beta: Some(1.5),
            pe_band: Some(PeBand { min: 5.0, max: 60.0 }),
            require_revenue_growth: true,
        }
    }

    /// Broader profile: >2% yield, no hard beta ceiling, revenue growth not required.
    pub fn relaxed() -> Self {
        Self {
            min_dividend_yield: 2.0,
            max_beta: None,
            pe_band: Some(PeBand { min: 5.0, max: 60.0 }),
            require_revenue_growth: false,
        }
    }
}

/// Weights of the composite score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub dividend_weight: f64,
    pub dividend_cap: f64,
    pub revenue_growth_weight: f64,
    pub earnings_growth_weight: f64,
    pub growth_cap: f64,
    pub beta_penalty: f64,
    pub strong_buy_bonus: f64,
    pub buy_bonus: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            dividend_weight: 0.30,
            dividend_cap: 30.0,
            revenue_growth_weight: 0.25,
            earnings_growth_weight: 0.25,
            growth_cap: 20.0,
            beta_penalty: 10.0,
            strong_buy_bonus: 20.0,
            buy_bonus: 10.0,
        }
    }
}
