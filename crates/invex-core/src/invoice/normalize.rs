//! Text normalization applied before pattern matching.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref COLON: Regex = Regex::new(r"\s*:\s*").unwrap();
    // Hyphens together with any whitespace between them, e.g. `--` or `- -`.
    static ref HYPHEN_CLUSTER: Regex = Regex::new(r"-(?:\s*-)*").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

fn standardize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Flatten OCR text into a single normalized line.
///
/// Every `:` gets exactly one space on each side. A run of hyphens that
/// touches whitespace is treated as one separator and spaced the same way;
/// hyphens inside tokens such as `F2023-1234` are kept. Whitespace runs
/// (newlines included) collapse to one space.
///
/// The result is a fixed point: normalizing it again changes nothing.
pub fn normalize_text(text: &str) -> String {
    let text = standardize_line_endings(text);
    let text = COLON.replace_all(&text, " : ");
    let text = space_hyphens(&text);
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

fn space_hyphens(text: &str) -> String {
    let mut spaced = String::with_capacity(text.len());
    let mut last = 0;

    for cluster in HYPHEN_CLUSTER.find_iter(text) {
        spaced.push_str(&text[last..cluster.start()]);

        let before = text[..cluster.start()].chars().next_back();
        let after = text[cluster.end()..].chars().next();
        let touches_space = cluster.as_str().contains(char::is_whitespace)
            || before.is_some_and(char::is_whitespace)
            || after.is_some_and(char::is_whitespace);

        if touches_space {
            spaced.push(' ');
            spaced.push_str(cluster.as_str());
            spaced.push(' ');
        } else {
            spaced.push_str(cluster.as_str());
        }
        last = cluster.end();
    }

    spaced.push_str(&text[last..]);
    spaced
}

/// Split OCR text into trimmed, whitespace-collapsed, non-empty lines.
///
/// Used where line boundaries carry meaning, such as line-item tables.
pub fn normalize_lines(text: &str) -> Vec<String> {
    standardize_line_endings(text)
        .lines()
        .map(|line| WHITESPACE.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_separators() {
        let messy = "FACTURA  \r\nNúmero:  F2023-1234\r\nFecha:15/06/2023";
        assert_eq!(
            normalize_text(messy),
            "FACTURA Número : F2023-1234 Fecha : 15/06/2023"
        );
    }

    #[test]
    fn test_hyphen_inside_token_kept() {
        assert_eq!(normalize_text("Fecha 15-06-2023"), "Fecha 15-06-2023");
        assert_eq!(normalize_text("Total -  100"), "Total - 100");
        assert_eq!(normalize_text("a -b"), "a - b");
    }

    #[test]
    fn test_hyphen_runs_are_one_separator() {
        assert_eq!(normalize_text("a-- "), "a --");
        assert_eq!(normalize_text("a--:"), "a -- :");
        assert_eq!(normalize_text("a- -b"), "a - - b");
        assert_eq!(normalize_text("Total ---- 100"), "Total ---- 100");
        assert_eq!(normalize_text("F2023--1234"), "F2023--1234");
    }

    /// Every string of up to `max_len` characters over `alphabet`.
    fn all_strings(alphabet: &[char], max_len: usize) -> Vec<String> {
        let mut all = vec![String::new()];
        let mut previous = vec![String::new()];
        for _ in 0..max_len {
            let next: Vec<String> = previous
                .iter()
                .flat_map(|prefix| {
                    alphabet.iter().map(move |c| {
                        let mut s = prefix.clone();
                        s.push(*c);
                        s
                    })
                })
                .collect();
            all.extend(next.iter().cloned());
            previous = next;
        }
        all
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let alphabet = ['a', 'b', ' ', ':', '-', '\n', '\t', '\r'];
        for input in all_strings(&alphabet, 5) {
            let once = normalize_text(&input);
            assert_eq!(normalize_text(&once), once, "input {:?}", input);
        }
    }

    #[test]
    fn test_normalize_samples_are_idempotent() {
        let samples = [
            "FACTURA\r\nNº:F-1",
            "  - leading and trailing -  ",
            "Total:\t1.210,00 €\rIVA 21 %",
            "Concepto ---- ---- 100,00",
        ];
        for sample in samples {
            let once = normalize_text(sample);
            assert_eq!(normalize_text(&once), once, "input {:?}", sample);
        }
    }

    #[test]
    fn test_normalize_lines() {
        let text = "Descripción   Cantidad\r\n\r\n  Horas  2 \rTotal";
        assert_eq!(
            normalize_lines(text),
            vec!["Descripción Cantidad", "Horas 2", "Total"]
        );
    }
}
