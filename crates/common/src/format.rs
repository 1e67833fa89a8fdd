//! Display formatting for amounts shown to members.

/// Render an amount in rupees with Indian digit grouping.
///
/// `5000.0` → `₹5,000`, `125000.0` → `₹1,25,000`, `99.5` → `₹99.50`.
/// Paise are only shown when non-zero.
pub fn format_inr(amount: f64) -> String {
    if !amount.is_finite() {
        return "₹0".to_string();
    }

    let paise = (amount.abs() * 100.0).round() as u64;
    let rupees = paise / 100;
    let fraction = paise % 100;

    let sign = if amount < 0.0 && paise > 0 { "-" } else { "" };
    let mut out = format!("{sign}₹{}", group_indian(rupees));
    if fraction > 0 {
        out.push_str(&format!(".{fraction:02}"));
    }
    out
}

/// Last three digits form one group, every group above that has two.
fn group_indian(value: u64) -> String {
    let digits = value.to_string();
    if digits.len() <= 3 {
        return digits;
    }

    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(2);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();

    format!("{},{}", groups.join(","), tail)
}
