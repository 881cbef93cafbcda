use chrono::{Datelike, NaiveDate};

use crate::structs::Granularity;

const MONTHS: [&str; 12] = [
    "ene", "feb", "mar", "abr", "may", "jun", "jul", "ago", "sept", "oct", "nov", "dic",
];

/// Whole-peso display: `.` between thousands, `'` at the millions point.
///
/// Missing or non-finite input renders as `$0`.
pub fn format_currency(amount: Option<f64>) -> String {
    let Some(amount) = amount.filter(|a| a.is_finite()) else {
        return "$0".to_owned();
    };
    let rounded = amount.round();
    let digits = format!("{:.0}", rounded.abs());

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        let remaining = digits.len() - i;
        if i > 0 && remaining % 3 == 0 {
            grouped.push(if remaining == 6 { '\'' } else { '.' });
        }
        grouped.push(c);
    }

    if rounded < 0.0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

fn month_abbrev(date: NaiveDate) -> &'static str {
    MONTHS[date.month0() as usize]
}

/// `01 ene 2024`
pub fn format_date(date: NaiveDate) -> String {
    format!("{:02} {} {}", date.day(), month_abbrev(date), date.year())
}

/// Chart label for a period bucket key. Keys that do not parse are returned as-is.
pub fn period_label(key: &str, granularity: Granularity) -> String {
    match granularity {
        Granularity::Day => NaiveDate::parse_from_str(key, "%Y-%m-%d")
            .map(|d| format!("{:02} {}", d.day(), month_abbrev(d)))
            .unwrap_or_else(|_| key.to_owned()),
        Granularity::Week => NaiveDate::parse_from_str(key, "%Y-%m-%d")
            .map(|d| format!("Sem {:02} {}", d.day(), month_abbrev(d)))
            .unwrap_or_else(|_| key.to_owned()),
        Granularity::Month => NaiveDate::parse_from_str(&format!("{key}-01"), "%Y-%m-%d")
            .map(|d| format!("{} {}", month_abbrev(d), d.year()))
            .unwrap_or_else(|_| key.to_owned()),
        Granularity::Year => key.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_edge_inputs() {
        assert_eq!(format_currency(None), "$0");
        assert_eq!(format_currency(Some(f64::NAN)), "$0");
        assert_eq!(format_currency(Some(f64::INFINITY)), "$0");
        assert_eq!(format_currency(Some(0.0)), "$0");
        assert_eq!(format_currency(Some(-0.4)), "$0");
    }

    #[test]
    fn currency_rounds_and_groups() {
        assert_eq!(format_currency(Some(999.4)), "$999");
        assert_eq!(format_currency(Some(999.5)), "$1.000");
        assert_eq!(format_currency(Some(12345.0)), "$12.345");
        assert_eq!(format_currency(Some(123456.0)), "$123.456");
        assert_eq!(format_currency(Some(-1500.0)), "-$1.500");
    }

    #[test]
    fn currency_marks_millions() {
        assert_eq!(format_currency(Some(1234567.0)), "$1'234.567");
        assert_eq!(format_currency(Some(98765432.1)), "$98'765.432");
        assert_eq!(format_currency(Some(1234567890.0)), "$1.234'567.890");
    }

    #[test]
    fn dates_use_spanish_short_months() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(format_date(date), "05 ene 2024");
        let date = NaiveDate::from_ymd_opt(2023, 9, 30).unwrap();
        assert_eq!(format_date(date), "30 sept 2023");
    }

    #[test]
    fn period_labels() {
        assert_eq!(period_label("2024-03-05", Granularity::Day), "05 mar");
        assert_eq!(period_label("2024-03-03", Granularity::Week), "Sem 03 mar");
        assert_eq!(period_label("2024-12", Granularity::Month), "dic 2024");
        assert_eq!(period_label("2024", Granularity::Year), "2024");
        assert_eq!(period_label("garbage", Granularity::Month), "garbage");
    }
}
