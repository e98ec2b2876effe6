use rand::Rng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const ROOM_CODE_LENGTH: usize = 5;
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// Get current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

// Random uppercase alphanumeric room code; uniqueness is checked by the registry
pub fn generate_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LENGTH)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

// Room codes are matched case-insensitively
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_code_shape() {
        for _ in 0..100 {
            let code = generate_room_code();
            assert_eq!(code.len(), ROOM_CODE_LENGTH);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_normalize_room_code() {
        assert_eq!(normalize_room_code(" ab1cd "), "AB1CD");
    }

    #[test]
    fn test_timestamp_is_monotonic_enough() {
        let first = get_timestamp();
        let second = get_timestamp();
        assert!(first > 0);
        assert!(second >= first);
    }
}
