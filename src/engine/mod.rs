//! Pure probability math for price-target claims.
//!
//! Everything here is deterministic f64 arithmetic with no IO. The model is
//! a driftless lognormal: the z-score measures the standardized log-distance
//! from spot to target, and Black-Scholes call delta (r = 0) doubles as the
//! risk-neutral probability of finishing in the money.
//!
//! ```text
//! z  = ln(K/S) / (σ√T)          P(S_T > K) = 1 - Φ(z)
//! d1 = [ln(S/K) + σ²T/2] / (σ√T)   callDelta = Φ(d1)
//! one-touch: P = min(1, 2·q)    q = P of the side the target sits on
//! ```

use crate::types::{
    BetType, Confidence, Direction, ProbMethod, ProbabilityEstimate, TradeSignal,
};

/// Standard normal CDF, Abramowitz-Stegun 7.1.26 (max error ≤ 7.5e-8).
pub fn normal_cdf(x: f64) -> f64 {
    if x.is_infinite() {
        return if x > 0.0 { 1.0 } else { 0.0 };
    }

    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let z = x.abs() / std::f64::consts::SQRT_2;

    let t = 1.0 / (1.0 + p * z);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-z * z).exp();

    0.5 * (1.0 + sign * y)
}

/// Standardized log-distance from spot to target.
///
/// Degenerate inputs (non-positive price, vol or time) collapse to ±∞ by the
/// sign of (target - spot) so the probabilities below stay well defined.
pub fn z_score(spot: f64, target: f64, vol: f64, time_years: f64) -> f64 {
    if spot <= 0.0 || target <= 0.0 || vol <= 0.0 || time_years <= 0.0 {
        return match target.partial_cmp(&spot) {
            Some(std::cmp::Ordering::Greater) => f64::INFINITY,
            Some(std::cmp::Ordering::Less) => f64::NEG_INFINITY,
            _ => 0.0,
        };
    }
    (target / spot).ln() / (vol * time_years.sqrt())
}

/// P(S_T > K) under the driftless lognormal.
pub fn prob_above(spot: f64, target: f64, vol: f64, time_years: f64) -> f64 {
    1.0 - normal_cdf(z_score(spot, target, vol, time_years))
}

/// Settlement probability for a binary claim in the asked direction.
pub fn binary_prob(
    spot: f64,
    target: f64,
    vol: f64,
    time_years: f64,
    direction: Direction,
) -> f64 {
    let above = prob_above(spot, target, vol, time_years);
    match direction {
        Direction::Above => above,
        Direction::Below => 1.0 - above,
    }
}

/// One-touch probability via the reflection rule: twice the terminal
/// probability of the side the target sits on, capped at 1.
///
/// Direction-internal: which side matters is decided by K vs S, not by the
/// question's wording.
pub fn one_touch_prob(spot: f64, target: f64, vol: f64, time_years: f64) -> f64 {
    let above = prob_above(spot, target, vol, time_years);
    let q = if target > spot { above } else { 1.0 - above };
    (2.0 * q).min(1.0)
}

/// Black-Scholes call delta with zero rate.
pub fn call_delta(spot: f64, strike: f64, vol: f64, time_years: f64) -> f64 {
    if spot <= 0.0 || strike <= 0.0 || vol <= 0.0 || time_years <= 0.0 {
        return match spot.partial_cmp(&strike) {
            Some(std::cmp::Ordering::Greater) => 1.0,
            Some(std::cmp::Ordering::Less) => 0.0,
            _ => 0.5,
        };
    }
    let d1 = ((spot / strike).ln() + 0.5 * vol * vol * time_years) / (vol * time_years.sqrt());
    normal_cdf(d1)
}

/// Model probability for a claim using the at-the-money (or default) vol.
pub fn zscore_estimate(
    spot: f64,
    target: f64,
    vol: f64,
    time_years: f64,
    bet_type: BetType,
    direction: Direction,
) -> ProbabilityEstimate {
    let z = z_score(spot, target, vol, time_years);
    let mut audit = vec![
        format!(
            "inputs: spot={:.2} target={:.2} vol={:.4} t={:.4}y",
            spot, target, vol, time_years
        ),
        format!("z = ln(target/spot) / (vol * sqrt(t)) = {:.4}", z),
    ];

    let probability = match bet_type {
        BetType::Binary => {
            let p = binary_prob(spot, target, vol, time_years, direction);
            audit.push(format!("binary {:?}: P = {:.4}", direction, p));
            p
        }
        BetType::OneTouch => {
            let p = one_touch_prob(spot, target, vol, time_years);
            audit.push(format!("one-touch: P = min(1, 2q) = {:.4}", p));
            p
        }
    };

    ProbabilityEstimate {
        method: ProbMethod::Zscore,
        probability: probability.clamp(0.0, 1.0),
        volatility_used: vol,
        time_to_expiry_years: time_years.max(0.0),
        z_score: Some(z),
        delta: None,
        audit_trail: audit,
    }
}

/// Model probability from the options smile: the per-strike IV (and, when the
/// quoted strike is close enough, the exchange's own call delta).
///
/// Returns `None` at the boundaries: a probability of exactly 0 or 1 carries
/// no tradeable information, so the caller falls back to the z-score
/// estimate.
pub fn options_delta_estimate(
    spot: f64,
    target: f64,
    iv: f64,
    exchange_delta: Option<f64>,
    time_years: f64,
    bet_type: BetType,
    direction: Direction,
) -> Option<ProbabilityEstimate> {
    let mut audit = vec![format!(
        "inputs: spot={:.2} target={:.2} iv={:.4} t={:.4}y",
        spot, target, iv, time_years
    )];

    let delta = match exchange_delta {
        Some(d) => {
            audit.push(format!("call delta from exchange smile: {:.4}", d));
            d
        }
        None => {
            let d = call_delta(spot, target, iv, time_years);
            audit.push(format!("call delta = Phi(d1) = {:.4}", d));
            d
        }
    };

    let probability = match (bet_type, direction) {
        (BetType::Binary, Direction::Above) => {
            audit.push("binary above: P = callDelta".to_string());
            delta
        }
        (BetType::Binary, Direction::Below) => {
            audit.push("binary below: P = 1 - callDelta".to_string());
            1.0 - delta
        }
        (BetType::OneTouch, _) => {
            let base = if target > spot { delta } else { 1.0 - delta };
            let p = (2.0 * base).min(1.0);
            audit.push(format!("one-touch: P = min(1, 2 * {:.4}) = {:.4}", base, p));
            p
        }
    };

    if probability <= 0.0 || probability >= 1.0 {
        return None;
    }

    Some(ProbabilityEstimate {
        method: ProbMethod::OptionsDelta,
        probability,
        volatility_used: iv,
        time_to_expiry_years: time_years.max(0.0),
        z_score: None,
        delta: Some(delta),
        audit_trail: audit,
    })
}

/// Probability implied by a vertical spread's price relative to its width.
/// Not used by the main pipeline; kept for cross-checks.
pub fn vertical_spread_prob(spread_price: f64, strike_width: f64) -> f64 {
    if strike_width <= 0.0 {
        return 0.0;
    }
    (spread_price / strike_width).clamp(0.0, 1.0)
}

/// Classify a signed edge (`polymarket - model`) into signal and confidence.
pub fn classify_edge(edge: f64) -> (TradeSignal, Confidence) {
    let signal = if edge.abs() < 0.03 {
        TradeSignal::Neutral
    } else if edge > 0.0 {
        TradeSignal::Sell
    } else {
        TradeSignal::Buy
    };

    let confidence = if edge.abs() > 0.10 {
        Confidence::High
    } else if edge.abs() > 0.05 {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    (signal, confidence)
}

/// Annualized realized volatility from a daily close series.
pub fn realized_volatility(daily_closes: &[f64]) -> Option<f64> {
    if daily_closes.len() < 2 {
        return None;
    }
    let returns: Vec<f64> = daily_closes
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect();
    if returns.len() < 2 {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    Some(var.sqrt() * 365.0_f64.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_cdf_known_values() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.0) - 0.8413447).abs() < 1e-6);
        assert!((normal_cdf(-1.0) - 0.1586553).abs() < 1e-6);
        assert!((normal_cdf(1.96) - 0.9750021).abs() < 1e-6);
        assert_eq!(normal_cdf(f64::INFINITY), 1.0);
        assert_eq!(normal_cdf(f64::NEG_INFINITY), 0.0);
    }

    #[test]
    fn normal_cdf_symmetry_and_monotonicity() {
        let mut prev = 0.0;
        let mut z = -6.0;
        while z <= 6.0 {
            let p = normal_cdf(z);
            assert!((p + normal_cdf(-z) - 1.0).abs() < 1e-6, "symmetry at z={}", z);
            assert!(p >= prev, "monotone at z={}", z);
            prev = p;
            z += 0.25;
        }
    }

    #[test]
    fn binary_above_no_drift() {
        // S=100k, K=120k, vol=0.55, T=0.25: z = ln(1.2)/0.275 ≈ 0.6630
        let z = z_score(100_000.0, 120_000.0, 0.55, 0.25);
        assert!((z - 0.6630).abs() < 0.0005);

        let p = prob_above(100_000.0, 120_000.0, 0.55, 0.25);
        assert!((p - 0.2537).abs() < 0.0005);
    }

    #[test]
    fn one_touch_down() {
        // S=100k, K=80k: z ≈ -0.8113, P(below) ≈ 0.2086, touch ≈ 0.4171
        let z = z_score(100_000.0, 80_000.0, 0.55, 0.25);
        assert!((z + 0.8113).abs() < 0.0005);

        let below = binary_prob(100_000.0, 80_000.0, 0.55, 0.25, Direction::Below);
        assert!((below - 0.2086).abs() < 0.001);

        let touch = one_touch_prob(100_000.0, 80_000.0, 0.55, 0.25);
        assert!((touch - 0.4171).abs() < 0.001);
    }

    #[test]
    fn zscore_prob_symmetry() {
        // P(S_T > K | from S) + P(S_T > S | from K) = 1
        for (s, k) in [(100.0, 120.0), (50_000.0, 42_000.0), (3000.0, 3000.0)] {
            let a = prob_above(s, k, 0.6, 0.5);
            let b = prob_above(k, s, 0.6, 0.5);
            assert!((a + b - 1.0).abs() < 1e-6, "s={} k={}", s, k);
        }
    }

    #[test]
    fn one_touch_bounds() {
        for (s, k) in [(100.0, 130.0), (100.0, 80.0), (100.0, 101.0)] {
            let touch = one_touch_prob(s, k, 0.7, 0.3);
            let side = if k > s { Direction::Above } else { Direction::Below };
            let binary = binary_prob(s, k, 0.7, 0.3, side);
            assert!(touch >= binary - 1e-12);
            assert!(touch <= (2.0 * binary).min(1.0) + 1e-12);
        }
    }

    #[test]
    fn degenerate_inputs_collapse_to_certainty() {
        // Zero time: target above spot can no longer be reached.
        assert_eq!(z_score(100.0, 120.0, 0.5, 0.0), f64::INFINITY);
        assert_eq!(prob_above(100.0, 120.0, 0.5, 0.0), 0.0);
        assert_eq!(prob_above(100.0, 80.0, 0.5, 0.0), 1.0);
        assert_eq!(z_score(100.0, 100.0, 0.0, 1.0), 0.0);
    }

    #[test]
    fn call_delta_behaviour() {
        // Deep ITM -> 1, deep OTM -> 0, ATM near 0.5 (slightly above for σ²T/2)
        assert!(call_delta(200.0, 100.0, 0.3, 0.1) > 0.99);
        assert!(call_delta(50.0, 100.0, 0.3, 0.1) < 0.01);
        let atm = call_delta(100.0, 100.0, 0.5, 0.25);
        assert!(atm > 0.5 && atm < 0.6);
    }

    #[test]
    fn options_delta_binary_directions() {
        let above = options_delta_estimate(
            100.0, 110.0, 0.6, Some(0.42), 0.25, BetType::Binary, Direction::Above,
        )
        .unwrap();
        assert!((above.probability - 0.42).abs() < 1e-12);

        let below = options_delta_estimate(
            100.0, 110.0, 0.6, Some(0.42), 0.25, BetType::Binary, Direction::Below,
        )
        .unwrap();
        assert!((below.probability - 0.58).abs() < 1e-12);
    }

    #[test]
    fn options_delta_one_touch_uses_target_side() {
        // Target below spot: base is the put-side probability.
        let est = options_delta_estimate(
            100.0, 90.0, 0.6, Some(0.80), 0.25, BetType::OneTouch, Direction::Below,
        )
        .unwrap();
        assert!((est.probability - 0.40).abs() < 1e-12);
    }

    #[test]
    fn options_delta_refuses_boundaries() {
        let at_one = options_delta_estimate(
            100.0, 110.0, 0.6, Some(1.0), 0.25, BetType::Binary, Direction::Above,
        );
        assert!(at_one.is_none());

        let at_zero = options_delta_estimate(
            100.0, 110.0, 0.6, Some(0.0), 0.25, BetType::Binary, Direction::Above,
        );
        assert!(at_zero.is_none());

        // One-touch saturating at 1.0 is also a boundary.
        let saturated = options_delta_estimate(
            100.0, 110.0, 0.6, Some(0.7), 0.25, BetType::OneTouch, Direction::Above,
        );
        assert!(saturated.is_none());
    }

    #[test]
    fn vertical_spread_clamps() {
        assert_eq!(vertical_spread_prob(500.0, 1000.0), 0.5);
        assert_eq!(vertical_spread_prob(1500.0, 1000.0), 1.0);
        assert_eq!(vertical_spread_prob(-10.0, 1000.0), 0.0);
        assert_eq!(vertical_spread_prob(10.0, 0.0), 0.0);
    }

    #[test]
    fn edge_classifier_bands() {
        // polymarket=0.30 model=0.20 -> +0.10 -> sell, medium (strict >0.10 for high)
        assert_eq!(classify_edge(0.10), (TradeSignal::Sell, Confidence::Medium));
        // polymarket=0.32 model=0.20 -> +0.12 -> high
        assert_eq!(classify_edge(0.12), (TradeSignal::Sell, Confidence::High));
        assert_eq!(classify_edge(0.02), (TradeSignal::Neutral, Confidence::Low));
        assert_eq!(classify_edge(-0.02), (TradeSignal::Neutral, Confidence::Low));
        assert_eq!(classify_edge(-0.06), (TradeSignal::Buy, Confidence::Medium));
        assert_eq!(classify_edge(-0.15), (TradeSignal::Buy, Confidence::High));
        // band boundaries are strict
        assert_eq!(classify_edge(0.05).1, Confidence::Low);
        assert_eq!(classify_edge(0.03).0, TradeSignal::Sell);
    }

    #[test]
    fn zscore_estimate_carries_audit_trail() {
        let est = zscore_estimate(
            100_000.0, 120_000.0, 0.55, 0.25, BetType::Binary, Direction::Above,
        );
        assert_eq!(est.method, ProbMethod::Zscore);
        assert!(est.z_score.is_some());
        assert!(!est.audit_trail.is_empty());
        assert!((est.probability - 0.2537).abs() < 0.0005);
    }

    #[test]
    fn realized_vol_sanity() {
        assert!(realized_volatility(&[100.0]).is_none());
        let flat = realized_volatility(&[100.0, 100.0, 100.0, 100.0]).unwrap();
        assert!(flat.abs() < 1e-12);

        // 1% daily alternating moves: annualized vol in a plausible band
        let mut series = vec![100.0];
        for i in 1..30 {
            let last = series[i - 1];
            series.push(if i % 2 == 0 { last * 1.01 } else { last * 0.99 });
        }
        let vol = realized_volatility(&series).unwrap();
        assert!(vol > 0.1 && vol < 0.4, "vol={}", vol);
    }
}
