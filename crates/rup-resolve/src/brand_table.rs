//! Static brand/ticker fallback table.
//!
//! Tier 3 of the resolver: a local table of well-known consumer brands and
//! their parent tickers.  Exact-name matches carry confidence 0.95;
//! substring overlap in either direction carries 0.80.  The table is small
//! on purpose — anything beyond it belongs to the learned knowledge base.

/// `(brand, ticker, company)` — brand names lowercase.
const BRAND_TICKERS: &[(&str, &str, &str)] = &[
    ("amazon", "AMZN", "Amazon.com, Inc."),
    ("apple", "AAPL", "Apple Inc."),
    ("best buy", "BBY", "Best Buy Co., Inc."),
    ("chevron", "CVX", "Chevron Corporation"),
    ("chipotle", "CMG", "Chipotle Mexican Grill, Inc."),
    ("coca-cola", "KO", "The Coca-Cola Company"),
    ("costco", "COST", "Costco Wholesale Corporation"),
    ("cvs", "CVS", "CVS Health Corporation"),
    ("delta air lines", "DAL", "Delta Air Lines, Inc."),
    ("disney", "DIS", "The Walt Disney Company"),
    ("domino's", "DPZ", "Domino's Pizza, Inc."),
    ("exxon", "XOM", "Exxon Mobil Corporation"),
    ("home depot", "HD", "The Home Depot, Inc."),
    ("kroger", "KR", "The Kroger Co."),
    ("lowe's", "LOW", "Lowe's Companies, Inc."),
    ("lyft", "LYFT", "Lyft, Inc."),
    ("mcdonald's", "MCD", "McDonald's Corporation"),
    ("microsoft", "MSFT", "Microsoft Corporation"),
    ("netflix", "NFLX", "Netflix, Inc."),
    ("nike", "NKE", "NIKE, Inc."),
    ("pepsi", "PEP", "PepsiCo, Inc."),
    ("shell", "SHEL", "Shell plc"),
    ("spotify", "SPOT", "Spotify Technology S.A."),
    ("starbucks", "SBUX", "Starbucks Corporation"),
    ("target", "TGT", "Target Corporation"),
    ("uber", "UBER", "Uber Technologies, Inc."),
    ("walgreens", "WBA", "Walgreens Boots Alliance, Inc."),
    ("walmart", "WMT", "Walmart Inc."),
    ("whole foods", "AMZN", "Amazon.com, Inc."),
];

/// Fixed confidence for substring-overlap matches.
pub const FUZZY_SUBSTRING_CONFIDENCE: f64 = 0.80;
/// Fixed confidence for exact-name matches.
pub const FUZZY_EXACT_CONFIDENCE: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyMatch {
    pub ticker: &'static str,
    pub company: &'static str,
    pub confidence: f64,
}

/// Look a merchant name up in the static table.
///
/// Exact matches win over substring matches; among substring matches the
/// longest brand name wins, so `"shell"` cannot shadow a more specific
/// entry.
pub fn lookup(merchant: &str) -> Option<FuzzyMatch> {
    let needle = merchant.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    for (brand, ticker, company) in BRAND_TICKERS {
        if needle == *brand {
            return Some(FuzzyMatch {
                ticker,
                company,
                confidence: FUZZY_EXACT_CONFIDENCE,
            });
        }
    }

    let mut best: Option<(&'static str, FuzzyMatch)> = None;
    for (brand, ticker, company) in BRAND_TICKERS {
        if needle.contains(brand) || brand.contains(needle.as_str()) {
            let replace = match &best {
                Some((seen, _)) => brand.len() > seen.len(),
                None => true,
            };
            if replace {
                best = Some((
                    brand,
                    FuzzyMatch {
                        ticker,
                        company,
                        confidence: FUZZY_SUBSTRING_CONFIDENCE,
                    },
                ));
            }
        }
    }
    best.map(|(_, m)| m)
}
