//! Sheet-number conventions.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Discipline prefix, optional separator, then the sheet digits: A-101, A 1.01, FP2.3, M-2-01
    pub static ref SHEET_NUMBER: Regex = Regex::new(
        r"^[A-Z]{1,2}[- ]?\d[\d .\-]*$"
    ).unwrap();
}

/// Check whether recognized text looks like a conventional sheet number.
pub fn is_sheet_number(text: &str) -> bool {
    SHEET_NUMBER.is_match(text.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conventional_sheet_numbers() {
        for text in ["A-101", "A 1.01", "FP2.3", "M-2-01", " S1 "] {
            assert!(is_sheet_number(text), "{text}");
        }
    }

    #[test]
    fn test_unconventional_text() {
        for text in ["101", "SHEET 4", "a-101", "A-", "ABC-1", "A-1 of 12"] {
            assert!(!is_sheet_number(text), "{text}");
        }
    }
}
