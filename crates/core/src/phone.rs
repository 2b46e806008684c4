use thiserror::Error;

/// Kenyan mobile country code expected by the payment gateway.
pub const COUNTRY_CODE: &str = "254";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid phone number: {0:?}")]
pub struct InvalidPhoneNumber(pub String);

/// Canonicalizes a subscriber number into the `254XXXXXXXXX` form the
/// gateway requires.
///
/// Accepts locally dialled numbers (`07...` / `01...`), already-canonical
/// numbers, and a leading `+`. Anything that does not end up matching
/// `254` + (`1`|`7`) + 8 digits is rejected — malformed numbers never
/// reach the network.
pub fn normalize(raw: &str) -> Result<String, InvalidPhoneNumber> {
    let mut phone = raw.trim();
    if let Some(rest) = phone.strip_prefix('+') {
        phone = rest;
    }

    let candidate = if phone.starts_with("07") || phone.starts_with("01") {
        format!("{}{}", COUNTRY_CODE, &phone[1..])
    } else {
        phone.to_string()
    };

    if is_canonical(&candidate) {
        Ok(candidate)
    } else {
        Err(InvalidPhoneNumber(raw.trim().to_string()))
    }
}

// 254 + (1|7) + 8 digits, nothing else.
fn is_canonical(phone: &str) -> bool {
    phone.len() == 12
        && phone.starts_with(COUNTRY_CODE)
        && matches!(phone.as_bytes()[3], b'1' | b'7')
        && phone.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_safaricom_number_is_prefixed() {
        assert_eq!(normalize("0712345678").unwrap(), "254712345678");
    }

    #[test]
    fn local_airtel_number_is_prefixed() {
        assert_eq!(normalize("0112345678").unwrap(), "254112345678");
    }

    #[test]
    fn canonical_number_passes_through() {
        assert_eq!(normalize("254712345678").unwrap(), "254712345678");
    }

    #[test]
    fn plus_prefix_is_stripped() {
        assert_eq!(normalize("+254712345678").unwrap(), "254712345678");
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(normalize("  0712345678\n").unwrap(), "254712345678");
    }

    #[test]
    fn wrong_subscriber_prefix_is_rejected() {
        assert!(normalize("0812345678").is_err());
        assert!(normalize("254812345678").is_err());
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(normalize("071234567").is_err());
        assert!(normalize("07123456789").is_err());
        assert!(normalize("2547123456789").is_err());
        assert!(normalize("").is_err());
    }

    #[test]
    fn non_digits_are_rejected() {
        assert!(normalize("07123a5678").is_err());
        assert!(normalize("0712 345678").is_err());
    }

    #[test]
    fn error_reports_the_original_input() {
        let err = normalize(" 0812345678 ").unwrap_err();
        assert_eq!(err, InvalidPhoneNumber("0812345678".to_string()));
    }
}
