//! Price text parsing.

/// Parses a formatted amount such as `"€ 1.250.000"`, `"1,250,000 $"` or
/// `"950,50"`.
///
/// When both `.` and `,` appear, the one that occurs last is the decimal
/// separator. A lone separator followed by exactly three digits, or a
/// separator that repeats, is a thousands separator.
pub fn parse_price_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == ',');

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) => {
            let (thousands, decimal) = if dot > comma { (',', '.') } else { ('.', ',') };
            cleaned
                .chars()
                .filter(|c| *c != thousands)
                .map(|c| if c == decimal { '.' } else { c })
                .collect()
        }
        (Some(_), None) => single_separator(cleaned, '.'),
        (None, Some(_)) => single_separator(cleaned, ','),
        (None, None) => cleaned.to_string(),
    };

    normalized.parse().ok()
}

fn single_separator(text: &str, sep: char) -> String {
    let count = text.matches(sep).count();
    let digits_after = text.rsplit(sep).next().map_or(0, str::len);

    if count > 1 || digits_after == 3 {
        text.replace(sep, "")
    } else {
        text.replace(sep, ".")
    }
}

/// Splits a price string into its amount and currency token.
///
/// The last whitespace-separated token is taken as currency when it is
/// alphabetic (`EUR`, `€`) or at most three characters long.
pub fn split_price_currency(text: &str) -> (Option<f64>, Option<String>) {
    let parts: Vec<&str> = text.split_whitespace().collect();
    let Some((last, rest)) = parts.split_last() else {
        return (None, None);
    };

    let last_clean = last.replace('.', "");
    let is_currency = !last_clean.chars().any(|c| c.is_ascii_digit())
        && (last_clean.chars().all(char::is_alphabetic) || last.chars().count() <= 3);

    if is_currency {
        (parse_price_amount(&rest.concat()), Some((*last).to_string()))
    } else {
        (parse_price_amount(&parts.concat()), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_number() {
        assert_eq!(parse_price_amount("350000"), Some(350_000.0));
    }

    #[test]
    fn test_parse_european_thousands() {
        assert_eq!(parse_price_amount("€ 1.250.000"), Some(1_250_000.0));
        assert_eq!(parse_price_amount("350.000 €"), Some(350_000.0));
    }

    #[test]
    fn test_parse_us_thousands() {
        assert_eq!(parse_price_amount("$1,250,000"), Some(1_250_000.0));
        assert_eq!(parse_price_amount("1,200"), Some(1200.0));
    }

    #[test]
    fn test_parse_mixed_separators() {
        assert_eq!(parse_price_amount("1.234.567,89"), Some(1_234_567.89));
        assert_eq!(parse_price_amount("1,234,567.89"), Some(1_234_567.89));
    }

    #[test]
    fn test_parse_decimal_comma() {
        assert_eq!(parse_price_amount("950,5"), Some(950.5));
    }

    #[test]
    fn test_parse_no_digits() {
        assert_eq!(parse_price_amount("Price on request"), None);
        assert_eq!(parse_price_amount(""), None);
    }

    #[test]
    fn test_split_price_currency_symbol() {
        let (amount, currency) = split_price_currency("1,250,000 €");
        assert_eq!(amount, Some(1_250_000.0));
        assert_eq!(currency.as_deref(), Some("€"));
    }

    #[test]
    fn test_split_price_currency_code() {
        let (amount, currency) = split_price_currency("2.500 EUR");
        assert_eq!(amount, Some(2500.0));
        assert_eq!(currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn test_split_price_without_currency() {
        let (amount, currency) = split_price_currency("420 000");
        assert_eq!(amount, Some(420_000.0));
        assert_eq!(currency, None);
    }

    #[test]
    fn test_split_price_empty() {
        assert_eq!(split_price_currency("   "), (None, None));
    }
}
