use rand::Rng;

/// Current UTC timestamp in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Milliseconds in one hour
pub const HOUR_MS: i64 = 3_600_000;
/// Milliseconds in one day
pub const DAY_MS: i64 = 24 * HOUR_MS;

/// Generate a Snowflake-style i64 for use as resource ID.
///
/// Layout (53 bits, fits in JavaScript's Number.MAX_SAFE_INTEGER):
///   - 41 bits: milliseconds since 2024-01-01 UTC (~69 years)
///   - 12 bits: random (4096 values per ms)
pub fn snowflake_id() -> i64 {
    // Custom epoch: 2024-01-01 00:00:00 UTC
    const EPOCH_MS: i64 = 1_704_067_200_000;
    let now = now_millis();
    let ts = (now - EPOCH_MS) & 0x1FF_FFFF_FFFF; // 41 bits
    let rand_bits: i64 = rand::thread_rng().gen_range(0..0x1000); // 12 bits
    (ts << 12) | rand_bits
}

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Encode a non-negative integer in upper-case base36
pub fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Random string of `len` decimal digits (validation codes)
pub fn numeric_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Random string of `len` upper-case base36 characters (access codes)
pub fn alphanumeric_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
        .collect()
}

/// Parcel tracking code: `ECO` + base36 timestamp + 3 random chars
pub fn tracking_code(now: i64) -> String {
    format!(
        "ECO{}{}",
        to_base36(now.max(0) as u64),
        alphanumeric_code(3)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_id_positive_and_increasing() {
        let a = snowflake_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = snowflake_id();
        assert!(a > 0);
        assert!(b > a);
        assert!(b < (1_i64 << 53));
    }

    #[test]
    fn test_to_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "Z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1295), "ZZ");
    }

    #[test]
    fn test_numeric_code() {
        let code = numeric_code(6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_alphanumeric_code() {
        let code = alphanumeric_code(6);
        assert_eq!(code.len(), 6);
        assert!(
            code.chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
    }

    #[test]
    fn test_tracking_code_format() {
        let code = tracking_code(1_700_000_000_000);
        assert!(code.starts_with("ECO"));
        assert!(code[3..].starts_with(&to_base36(1_700_000_000_000)));
        assert_eq!(code.len(), 3 + to_base36(1_700_000_000_000).len() + 3);
    }
}
