//! Human-readable ticket ids for request reports.
//!
//! Format: `SRT-<base62 time>-<base62 report id>-<5 random base62 chars>`.
//! The random suffix is drawn when the ticket is generated, before the
//! operation is logged, so replay sees a fixed string.

use rand::Rng;

pub const TICKET_PREFIX: &str = "SRT";

const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Base62-encode a non-negative number
pub fn base62_encode(mut n: i64) -> String {
    if n <= 0 {
        return (ALPHABET[0] as char).to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(ALPHABET[(n % 62) as usize]);
        n /= 62;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn random_part(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ALPHABET[rng.gen_range(0..62)] as char)
        .collect()
}

/// Generate a ticket id for a report filed at `ts` with database id `id`
pub fn generate_ticket(id: i64, ts: i64) -> String {
    format!(
        "{}-{}-{}-{}",
        TICKET_PREFIX,
        base62_encode(ts),
        base62_encode(id),
        random_part(5)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base62_zero() {
        assert_eq!(base62_encode(0), "0");
    }

    #[test]
    fn test_base62_values() {
        assert_eq!(base62_encode(61), "z");
        assert_eq!(base62_encode(62), "10");
        assert_eq!(base62_encode(3843), "zz");
    }

    #[test]
    fn test_ticket_shape() {
        let ticket = generate_ticket(42, 1_700_000_000);
        let parts: Vec<&str> = ticket.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], TICKET_PREFIX);
        assert_eq!(parts[2], base62_encode(42));
        assert_eq!(parts[3].len(), 5);
    }

    #[test]
    fn test_tickets_differ_in_suffix() {
        let a = generate_ticket(1, 1_700_000_000);
        let b = generate_ticket(1, 1_700_000_000);
        // Shared prefix, (almost certainly) different random suffix
        assert_eq!(&a[..a.rfind('-').unwrap()], &b[..b.rfind('-').unwrap()]);
    }
}
