//! Value formatting applied before schema checks.

/// Normalize a date to `DD/MM/YYYY`.
///
/// Hyphens become slashes, single-digit day and month are zero-padded and
/// two-digit years are read as `20YY`. Strings that do not split into
/// three parts are returned trimmed, with hyphens already replaced.
pub fn format_date(value: &str) -> String {
    let cleaned = value.trim().replace('-', "/");
    let parts: Vec<&str> = cleaned.split('/').collect();
    let [day, month, year] = parts.as_slice() else {
        return cleaned;
    };

    let year = if year.len() == 2 {
        format!("20{}", year)
    } else {
        year.to_string()
    };
    format!("{}/{}/{}", zero_pad(day), zero_pad(month), year)
}

fn zero_pad(part: &str) -> String {
    if part.len() == 1 {
        format!("0{}", part)
    } else {
        part.to_string()
    }
}

/// Normalize an amount to decimal-comma euros, e.g. `100.50` to `100,50 €`.
///
/// A single `.` whose tail is one or two digits, with no comma present, is
/// read as the decimal separator. Anything after those digits leaves the
/// dot alone. ` €` is appended unless `€` or `EUR` is already there.
pub fn format_currency(value: &str) -> String {
    let mut amount = value.trim().to_string();

    if !amount.contains(',') {
        if let Some((_, decimals)) = amount.split_once('.') {
            if (1..=2).contains(&decimals.len()) && decimals.chars().all(|c| c.is_ascii_digit()) {
                amount = amount.replacen('.', ",", 1);
            }
        }
    }

    if !amount.contains('€') && !amount.contains("EUR") {
        amount.push_str(" €");
    }
    amount
}
