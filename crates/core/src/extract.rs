use std::sync::OnceLock;

use regex::Regex;

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// "по счёту №12", "по счету 12", "счет N12", "сч. №12", "сч 12", "в оплату 12".
// After a bare "сч" any one non-digit separator is accepted.
re!(re_invoice_number,
    r"(?:[Сс]ч[её]ту?|[Сс]ч\D?|[Оо]плату) ?[N№]? ?(\d+)\b");

/// Pull the invoice number out of a free-text payment purpose.
///
/// Returns the literal digits after the first recognised keyword, leading
/// zeros included, since the CRM stores invoice numbers as strings.
pub fn extract_invoice_number(payment_purpose: &str) -> Option<String> {
    re_invoice_number()
        .captures(payment_purpose)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
