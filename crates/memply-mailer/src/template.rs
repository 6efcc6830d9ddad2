//! Placeholder template rendering for reminder messages.
//!
//! Templates use `{{variable}}` placeholders. Unresolved placeholders are
//! left in place rather than erroring, so a typo in a custom template
//! degrades to visible text instead of blocking the whole run.

use chrono::NaiveDate;
use std::collections::HashMap;

use memply_core::types::Member;

/// Substitute `{{key}}` placeholders from the map.
pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

/// The variable map for a membership reminder. Recognized variables:
/// `memberName`, `membershipName`, `daysUntilExpiry`, `expiryDate`,
/// `price`.
pub fn reminder_vars(member: &Member, today: NaiveDate) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("memberName".into(), member.name.clone());
    vars.insert("membershipName".into(), member.membership_name.clone());
    vars.insert(
        "daysUntilExpiry".into(),
        member.days_until_expiry(today).max(0).to_string(),
    );
    vars.insert("expiryDate".into(), member.expiry_date.to_string());
    vars.insert("price".into(), format_price(member.price_cents));
    vars
}

fn format_price(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, (cents % 100).abs())
}
