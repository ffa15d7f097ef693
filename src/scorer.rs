// Eligibility filters and composite scoring

use std::fmt;

use crate::models::{
    Locale, MarketSnapshot, RecommendationKey, ScoredCandidate, ScoringWeights, ScreeningCriteria,
};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

/// Why a snapshot did not make the cut
#[derive(Debug, Clone, PartialEq)]
pub enum Ineligible {
    MissingPrice,
    NonPositivePrice(f64),
    DividendYieldTooLow { yield_pct: f64, min: f64 },
    BetaTooHigh { beta: f64, max: f64 },
    MissingEarnings,
    PeOutOfBand(f64),
    MissingRevenueGrowth,
    RevenueNotGrowing(f64),
}

impl fmt::Display for Ineligible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ineligible::MissingPrice => write!(f, "no current price"),
            Ineligible::NonPositivePrice(price) => write!(f, "price {:.2} is not positive", price),
            Ineligible::DividendYieldTooLow { yield_pct, min } => {
                write!(f, "dividend yield {:.2}% not above {:.2}%", yield_pct, min)
            }
            Ineligible::BetaTooHigh { beta, max } => write!(f, "beta {:.2} not below {:.2}", beta, max),
            Ineligible::MissingEarnings => write!(f, "no trailing EPS for P/E"),
            Ineligible::PeOutOfBand(pe) => write!(f, "P/E {:.2} outside band", pe),
            Ineligible::MissingRevenueGrowth => write!(f, "no revenue growth"),
            Ineligible::RevenueNotGrowing(growth) => write!(f, "revenue growth {:.2}% not positive", growth),
        }
    }
}

/// Price-to-earnings ratio when both inputs are present and EPS is non-zero
pub fn pe_ratio(price: Option<f64>, trailing_eps: Option<f64>) -> Option<f64> {
    match (price, trailing_eps) {
        (Some(price), Some(eps)) if eps != 0.0 => Some(price / eps),
        _ => None,
    }
}

pub struct Scorer {
    criteria: ScreeningCriteria,
    weights: ScoringWeights,
    locale: Locale,
}

impl Scorer {
    pub fn new(criteria: ScreeningCriteria, weights: ScoringWeights, locale: Locale) -> Self {
        Self {
            criteria,
            weights,
            locale,
        }
    }

    pub fn criteria(&self) -> &ScreeningCriteria {
        &self.criteria
    }

    /// Apply every eligibility filter and, if all pass, score the snapshot.
    /// A filter whose input is absent fails.
    pub fn evaluate(&self, snapshot: &MarketSnapshot) -> Result<ScoredCandidate, Ineligible> {
        let criteria = &self.criteria;

        let price = snapshot.current_price.ok_or(Ineligible::MissingPrice)?;
        if price <= 0.0 {
            return Err(Ineligible::NonPositivePrice(price));
        }

        if snapshot.dividend_yield <= criteria.min_dividend_yield {
            return Err(Ineligible::DividendYieldTooLow {
                yield_pct: snapshot.dividend_yield,
                min: criteria.min_dividend_yield,
            });
        }

        if let Some(max_beta) = criteria.max_beta {
            if snapshot.beta >= max_beta {
                return Err(Ineligible::BetaTooHigh {
                    beta: snapshot.beta,
                    max: max_beta,
                });
            }
        }

        let pe = pe_ratio(snapshot.current_price, snapshot.trailing_eps);
        if let Some(band) = criteria.pe_band {
            let pe = pe.ok_or(Ineligible::MissingEarnings)?;
            if !band.contains(pe) {
                return Err(Ineligible::PeOutOfBand(pe));
            }
        }

        if criteria.require_revenue_growth {
            let growth = snapshot.revenue_growth.ok_or(Ineligible::MissingRevenueGrowth)?;
            if growth <= 0.0 {
                return Err(Ineligible::RevenueNotGrowing(growth));
            }
        }

        Ok(ScoredCandidate {
            snapshot: snapshot.clone(),
            pe_ratio: pe,
            annual_dividend_return: snapshot.dividend_yield / 100.0 * price,
            recommendation_label: snapshot.recommendation.label(self.locale).to_string(),
            score: self.score(snapshot),
        })
    }

    /// Weighted composite of yield, growth, beta and analyst consensus,
    /// clamped to [0, 100]. Absent growth counts as zero.
    pub fn score(&self, snapshot: &MarketSnapshot) -> f64 {
        let w = &self.weights;

        let bonus = match snapshot.recommendation {
            RecommendationKey::StrongBuy => w.strong_buy_bonus,
            RecommendationKey::Buy => w.buy_bonus,
            _ => 0.0,
        };

        let score = w.dividend_weight * snapshot.dividend_yield.min(w.dividend_cap)
            + w.revenue_growth_weight * snapshot.revenue_growth.unwrap_or(0.0).clamp(0.0, w.growth_cap)
            + w.earnings_growth_weight * snapshot.earnings_growth.unwrap_or(0.0).clamp(0.0, w.growth_cap)
            - w.beta_penalty * snapshot.beta
            + bonus;

        if score.is_nan() {
            return MIN_SCORE;
        }
        score.clamp(MIN_SCORE, MAX_SCORE)
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(ScreeningCriteria::default(), ScoringWeights::default(), Locale::default())
    }
}
