//! Fallback policy: a static map from source key to an ordered list of
//! alternate source keys, consulted only by the pipeline's retry node.
//!
//! Pure data, deliberately not scored/weighted — the retry selection is
//! decidable by inspection.

/// Generic fallback used by any source that has no explicit entry below.
const DEFAULT_FALLBACK: &[&str] = &["news", "reddit", "ddg_news"];

/// Returns the ordered fallback list for `source`, or the generic default
/// when `source` has no explicit entry.
pub fn fallbacks_for(source: &str) -> &'static [&'static str] {
    match source {
        "news" => &["ddg_news", "reddit", "news_rapidapi"],
        "news_rapidapi" => &["news", "ddg_news", "reddit"],
        "crypto" => &["cryptonews", "ddg_news", "news"],
        "dexscreener" => &["crypto", "cryptonews", "news"],
        "cryptonews" => &["crypto", "ddg_news", "news"],
        "reddit" => &["ddg_news", "news", "ddg"],
        "github" => &["ddg", "news", "reddit"],
        "arxiv" => &["ddg", "news", "github"],
        "stocks" => &["news", "ddg_news", "crypto"],
        "wikipedia" => &["ddg", "news", "serper"],
        "ddg" => &["serper", "news", "wikipedia"],
        "ddg_news" => &["news", "serper", "reddit"],
        "serper" => &["ddg", "news", "ddg_news"],
        "tmz" => &["news", "ddg_news", "reddit"],
        "weather" => &["ddg", "news"],
        _ => DEFAULT_FALLBACK,
    }
}

/// Picks the first fallback for `original_source` not already present in
/// `tried_sources`, if any.
pub fn next_fallback(original_source: &str, tried_sources: &[String]) -> Option<&'static str> {
    fallbacks_for(original_source)
        .iter()
        .find(|candidate| !tried_sources.iter().any(|tried| tried == *candidate))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_source_has_explicit_entry() {
        assert_eq!(fallbacks_for("crypto"), &["cryptonews", "ddg_news", "news"]);
    }

    #[test]
    fn test_unknown_source_falls_to_generic_default() {
        assert_eq!(fallbacks_for("totally_unregistered"), DEFAULT_FALLBACK);
    }

    #[test]
    fn test_next_fallback_skips_already_tried() {
        let tried = vec!["crypto".to_string(), "cryptonews".to_string()];
        assert_eq!(next_fallback("crypto", &tried), Some("ddg_news"));
    }

    #[test]
    fn test_next_fallback_exhausted_returns_none() {
        let tried = vec![
            "crypto".to_string(),
            "cryptonews".to_string(),
            "ddg_news".to_string(),
            "news".to_string(),
        ];
        assert_eq!(next_fallback("crypto", &tried), None);
    }
}
