//! Default keyword tables for the heuristic classifier.
//!
//! Categories are tried in order; the first one with a matching keyword wins.

/// Category → keywords, in priority order.
pub const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "adult",
        &["porn", "xxx", "sex", "nude", "escort", "camgirl", "hentai", "nsfw", "milf", "webcam girls"],
    ),
    (
        "gambling",
        &[
            "casino", "poker", "bet", "betting", "slots", "jackpot", "roulette", "baccarat", "sportsbook", "togel",
            "judi", "slot gacor",
        ],
    ),
    (
        "pharma",
        &["viagra", "cialis", "levitra", "pharmacy", "rx", "tramadol", "xanax", "diet pills", "no prescription"],
    ),
    (
        "crypto",
        &["airdrop", "bitcoin doubler", "crypto giveaway", "free btc", "nft mint", "guaranteed returns"],
    ),
    ("malware", &["keygen", "warez", "crack download", "serial key", "apk mod", "nulled"]),
    (
        "spam",
        &["replica watches", "payday loan", "buy followers", "cheap seo", "essay writing service", "backlinks"],
    ),
];

/// Domain fragments that mark a site as legitimate regardless of keyword hits.
pub const LEGITIMATE_PATTERNS: &[&str] = &[
    // sports
    "football", "soccer", "basketball", "baseball", "hockey", "tennis", "golf", "cricket", "rugby", "olympic",
    "fifa", "espn",
    // news
    "news", "times", "herald", "tribune", "gazette", "journal", "bbc", "cnn", "reuters",
    // government and education
    ".gov", ".edu", ".mil", ".ac.", "university", "college",
    // brands
    "google", "microsoft", "apple", "amazon", "wikipedia", "github", "mozilla", "youtube", "linkedin",
    // technology
    "tech", "software", "developer", "cloud", "linux", "python",
];
