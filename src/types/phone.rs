/// Strips everything but ASCII digits.
#[must_use]
pub fn digits(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

/// Whether an inbound sender number belongs to a stored profile number.
///
/// Both sides are reduced to digits. The stored number only has to appear
/// inside the sender number, so a profile number saved without its country
/// code still matches.
#[must_use]
pub fn sender_matches(sender: &str, stored: &str) -> bool {
    let stored = digits(stored);
    if stored.is_empty() {
        return false;
    }
    digits(sender).contains(&stored)
}
