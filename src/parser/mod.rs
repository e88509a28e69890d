//! Free-text market question parser.
//!
//! Turns a question like "Will Bitcoin hit $200k by December 31, 2025?" into
//! a typed [`CryptoClaim`], or rejects it. The parser is table-driven: the
//! disqualifying patterns, symbol patterns and date patterns are ordered data,
//! not control flow, so matching order is explicit (for instance "MegaETH" is
//! disqualified before the ETH symbol pattern ever runs).

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{BetType, CryptoClaim, Direction};

/// Questions mentioning any of these are not price-target markets.
static DISQUALIFIERS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)market\s*cap", "market cap"),
        (r"(?i)\bfdv\b", "FDV"),
        (r"(?i)\btvl\b", "TVL"),
        (r"(?i)\bmcap\b", "MCap"),
        (r"(?i)dominance", "dominance"),
        (r"(?i)\bfees?\b", "fees"),
        (r"(?i)\bgas\b", "gas"),
        (r"(?i)staking", "staking"),
        (r"(?i)airdrop", "airdrop"),
        (r"(?i)\betf\b", "ETF"),
        (r"(?i)halving", "halving"),
        (r"(?i)\bwrapped\b", "wrapped derivative"),
        (r"(?i)\bstaked\b", "staked derivative"),
        (r"(?i)megaeth", "MegaETH"),
    ]
    .into_iter()
    .map(|(p, label)| (Regex::new(p).unwrap(), label))
    .collect()
});

/// Ordered symbol patterns; the first match wins. Word boundaries keep
/// tickers from matching inside other project names.
static SYMBOL_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\b(btc|bitcoin)\b", "BTC"),
        (r"(?i)\b(eth|ethereum|ether)\b", "ETH"),
        (r"(?i)\b(sol|solana)\b", "SOL"),
        (r"(?i)\b(xrp|ripple)\b", "XRP"),
        (r"(?i)\b(doge|dogecoin)\b", "DOGE"),
        (r"(?i)\b(ada|cardano)\b", "ADA"),
        (r"(?i)\b(link|chainlink)\b", "LINK"),
        (r"(?i)\b(avax|avalanche)\b", "AVAX"),
    ]
    .into_iter()
    .map(|(p, sym)| (Regex::new(p).unwrap(), sym))
    .collect()
});

/// At least one of these must appear for the question to be about price.
const PRICE_INTENT: &[&str] = &[
    "price", "hit", "reach", "above", "below", "exceed", "surpass", "over", "under", "dip", "$",
];

/// Target price patterns, tried in order. The k/thousand forms multiply by
/// 1000; commas are stripped before matching.
static PRICE_PATTERNS: Lazy<Vec<(Regex, f64)>> = Lazy::new(|| {
    [
        (r"(?i)\$\s*(\d+(?:\.\d+)?)\s*k\b", 1000.0),
        (r"(?i)\b(\d+(?:\.\d+)?)\s*thousand\b", 1000.0),
        (r"\$\s*(\d+(?:\.\d+)?)", 1.0),
        (r"(?i)\b(\d+(?:\.\d+)?)\s*(?:dollars|usd)\b", 1.0),
    ]
    .into_iter()
    .map(|(p, mult)| (Regex::new(p).unwrap(), mult))
    .collect()
});

static ONE_TOUCH_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(hit|reach|touch|surpass|exceed|dip|drop|crash)").unwrap()
});

static BELOW_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(below|under|less than|fall|dip|drop|crash|sink|plunge|decline)").unwrap()
});

static MONTH_DAY_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sep|sept|oct|nov|dec)\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b").unwrap()
});

static DAY_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sep|sept|oct|nov|dec)\.?\s+(\d{4})\b").unwrap()
});

static NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());

static BY_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bby\s+(?:the\s+)?(?:end\s+of\s+)?(\d{4})\b").unwrap());

static BEFORE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bbefore\s+(\d{4})\b").unwrap());

static IN_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bin\s+(\d{4})\b").unwrap());

/// Parse a market question into a claim. `end_date_hint` is the market's own
/// end date, used when the text carries no expiry. Any failure is a single
/// "unparseable" rejection; callers treat rejected markets as non-crypto.
pub fn parse_claim(
    market_id: &str,
    question: &str,
    end_date_hint: Option<DateTime<Utc>>,
) -> Option<CryptoClaim> {
    parse_claim_at(market_id, question, end_date_hint, Utc::now())
}

/// [`parse_claim`] with an explicit clock.
pub fn parse_claim_at(
    market_id: &str,
    question: &str,
    end_date_hint: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<CryptoClaim> {
    for (pattern, label) in DISQUALIFIERS.iter() {
        if pattern.is_match(question) {
            tracing::trace!(market_id, disqualifier = label, "rejected question");
            return None;
        }
    }

    let symbol = SYMBOL_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(question))
        .map(|(_, sym)| sym.to_string())?;

    let lower = question.to_lowercase();
    if !PRICE_INTENT.iter().any(|kw| lower.contains(kw)) {
        return None;
    }

    let target_price = extract_target_price(question)?;
    if target_price <= 0.0 {
        return None;
    }

    let bet_type = if ONE_TOUCH_WORDS.is_match(question) {
        BetType::OneTouch
    } else {
        BetType::Binary
    };

    let direction = if BELOW_WORDS.is_match(question) {
        Direction::Below
    } else {
        Direction::Above
    };

    let expiry = extract_expiry(question).or(end_date_hint)?;
    if expiry <= now {
        return None;
    }

    Some(CryptoClaim {
        market_id: market_id.to_string(),
        question: question.to_string(),
        symbol,
        target_price,
        expiry,
        bet_type,
        direction,
    })
}

fn extract_target_price(question: &str) -> Option<f64> {
    let text = question.replace(',', "");
    for (pattern, multiplier) in PRICE_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(&text) {
            if let Ok(value) = caps[1].parse::<f64>() {
                return Some(value * multiplier);
            }
        }
    }
    None
}

fn extract_expiry(question: &str) -> Option<DateTime<Utc>> {
    if let Some(caps) = MONTH_DAY_YEAR.captures(question) {
        let month = month_number(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        if let Some(expiry) = day_end(year, month, day) {
            return Some(expiry);
        }
    }

    if let Some(caps) = DAY_MONTH_YEAR.captures(question) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_number(&caps[2])?;
        let year: i32 = caps[3].parse().ok()?;
        if let Some(expiry) = day_end(year, month, day) {
            return Some(expiry);
        }
    }

    if let Some(caps) = NUMERIC_DATE.captures(question) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        if let Some(expiry) = day_end(year, month, day) {
            return Some(expiry);
        }
    }

    if let Some(caps) = BY_YEAR.captures(question) {
        let year: i32 = caps[1].parse().ok()?;
        return year_end(year);
    }

    // "before 2026" means anytime up to the end of 2025.
    if let Some(caps) = BEFORE_YEAR.captures(question) {
        let year: i32 = caps[1].parse().ok()?;
        return year_end(year - 1);
    }

    if let Some(caps) = IN_YEAR.captures(question) {
        let year: i32 = caps[1].parse().ok()?;
        return year_end(year);
    }

    None
}

/// 23:59:59 UTC on the given day.
fn day_end(year: i32, month: u32, day: u32) -> Option<DateTime<Utc>> {
    if !(2000..=2100).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|dt| dt.and_utc())
}

fn year_end(year: i32) -> Option<DateTime<Utc>> {
    day_end(year, 12, 31)
}

fn month_number(name: &str) -> Option<u32> {
    let prefix = name.to_lowercase();
    let month = match &prefix[..3] {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn parse(question: &str) -> Option<CryptoClaim> {
        parse_claim_at("m1", question, None, now())
    }

    #[test]
    fn parses_one_touch_with_k_suffix() {
        let claim = parse("Will Bitcoin hit $200k by December 31, 2025?").unwrap();
        assert_eq!(claim.symbol, "BTC");
        assert_eq!(claim.target_price, 200_000.0);
        assert_eq!(claim.bet_type, BetType::OneTouch);
        assert_eq!(claim.direction, Direction::Above);
        assert_eq!(
            claim.expiry,
            Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap()
        );
    }

    #[test]
    fn rejects_market_cap_and_megaeth() {
        assert!(parse("MegaETH market cap above $5B in 2026").is_none());
        // Each disqualifier is sufficient on its own.
        assert!(parse("Will Bitcoin market cap reach $3T in 2026?").is_none());
        assert!(parse("Will MegaETH trade above $5 in 2026?").is_none());
    }

    #[test]
    fn rejects_other_disqualifiers() {
        assert!(parse("Will Ethereum gas fees drop below $1 in 2026?").is_none());
        assert!(parse("Will the Bitcoin ETF reach $100 in 2026?").is_none());
        assert!(parse("Will ETH staking yield exceed $5 in 2026?").is_none());
        assert!(parse("Will Bitcoin dominance exceed 60 in 2026?").is_none());
        assert!(parse("Next Bitcoin halving before 2029?").is_none());
    }

    #[test]
    fn eth_inside_megaeth_does_not_match() {
        // The word-boundary anchor alone keeps the ticker from matching
        // inside another project name.
        assert!(!SYMBOL_PATTERNS[1].0.is_match("megaeth mainnet"));
    }

    #[test]
    fn symbol_table_order_decides_ties() {
        let claim = parse("Will Bitcoin or Ethereum reach $100,000 in 2025?").unwrap();
        assert_eq!(claim.symbol, "BTC");
    }

    #[test]
    fn rejects_without_symbol_or_intent() {
        assert!(parse("Will the Fed cut rates to $2 in 2025?").is_none());
        assert!(parse("Will Bitcoin flip gold in 2025?").is_none());
    }

    #[test]
    fn price_pattern_order() {
        assert_eq!(
            parse("Will Ethereum reach $5,000 in 2025?").unwrap().target_price,
            5000.0
        );
        assert_eq!(
            parse("Will Solana reach 500 dollars in 2025?").unwrap().target_price,
            500.0
        );
        assert_eq!(
            parse("Will Bitcoin reach 150 thousand in 2025?").unwrap().target_price,
            150_000.0
        );
        assert_eq!(
            parse("Will BTC trade above $120k in 2025?").unwrap().target_price,
            120_000.0
        );
    }

    #[test]
    fn binary_vs_one_touch() {
        let binary = parse("Will Bitcoin be above $100,000 on December 31, 2025?").unwrap();
        assert_eq!(binary.bet_type, BetType::Binary);

        let touch = parse("Will Bitcoin reach $100,000 in 2025?").unwrap();
        assert_eq!(touch.bet_type, BetType::OneTouch);
    }

    #[test]
    fn direction_keywords() {
        let below = parse("Will Ethereum drop below $2,000 in 2025?").unwrap();
        assert_eq!(below.direction, Direction::Below);
        assert_eq!(below.bet_type, BetType::OneTouch); // "drop" is a touch word

        let crash = parse("Will Solana crash to $50 in 2025?").unwrap();
        assert_eq!(crash.direction, Direction::Below);

        let above = parse("Will XRP be above $5 in 2025?").unwrap();
        assert_eq!(above.direction, Direction::Above);
    }

    #[test]
    fn date_formats() {
        let mdy = parse("Will BTC be above $100,000 on March 1, 2026?").unwrap();
        assert_eq!(
            mdy.expiry,
            Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 59).unwrap()
        );

        let dmy = parse("Will BTC be above $100,000 on 15 March 2026?").unwrap();
        assert_eq!(
            dmy.expiry,
            Utc.with_ymd_and_hms(2026, 3, 15, 23, 59, 59).unwrap()
        );

        let numeric = parse("Will BTC be above $100,000 on 03/15/2026?").unwrap();
        assert_eq!(
            numeric.expiry,
            Utc.with_ymd_and_hms(2026, 3, 15, 23, 59, 59).unwrap()
        );

        let by_year = parse("Will BTC reach $150k by end of 2026?").unwrap();
        assert_eq!(
            by_year.expiry,
            Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap()
        );

        let in_year = parse("Will BTC reach $150k in 2026?").unwrap();
        assert_eq!(
            in_year.expiry,
            Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap()
        );
    }

    #[test]
    fn before_year_means_prior_year_end() {
        let claim = parse("Will BTC reach $150k before 2027?").unwrap();
        assert_eq!(
            claim.expiry,
            Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap()
        );
    }

    #[test]
    fn falls_back_to_end_date_hint() {
        let hint = Utc.with_ymd_and_hms(2025, 9, 30, 12, 0, 0).unwrap();
        let claim =
            parse_claim_at("m1", "Will BTC trade above $100,000?", Some(hint), now()).unwrap();
        assert_eq!(claim.expiry, hint);

        assert!(parse_claim_at("m1", "Will BTC trade above $100,000?", None, now()).is_none());
    }

    #[test]
    fn rejects_past_expiry() {
        assert!(parse("Will BTC reach $100k by December 31, 2024?").is_none());

        let stale_hint = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(parse_claim_at(
            "m1",
            "Will BTC trade above $100,000?",
            Some(stale_hint),
            now()
        )
        .is_none());
    }

    #[test]
    fn parsed_fields_round_trip() {
        // Same question always parses to the same claim.
        let q = "Will Ethereum dip under $1,500 before 2027?";
        let a = parse(q).unwrap();
        let b = parse(q).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.symbol, "ETH");
        assert_eq!(a.target_price, 1500.0);
        assert_eq!(a.bet_type, BetType::OneTouch);
        assert_eq!(a.direction, Direction::Below);
    }
}
