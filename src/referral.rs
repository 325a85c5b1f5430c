use crate::economy::credit_reward;
use crate::profile::Profile;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Stable invite code for a user: eight characters drawn from the blake3
/// digest of the user id, followed by a one-character checksum.
pub fn referral_code(user_id: &str) -> String {
    let hash = blake3::hash(user_id.as_bytes());
    let bytes = hash.as_bytes();
    let mut code: String = bytes[..8]
        .iter()
        .map(|b| CODE_ALPHABET[(*b as usize) % CODE_ALPHABET.len()] as char)
        .collect();
    code.push(checksum_char(&code));
    code
}

/// Accepts codes produced by [`referral_code`], ignoring case.
pub fn is_valid_code(code: &str) -> bool {
    let code = code.to_ascii_uppercase();
    if code.len() != 9 || !code.bytes().all(|b| CODE_ALPHABET.contains(&b)) {
        return false;
    }
    let (body, check) = code.split_at(8);
    check.chars().next() == Some(checksum_char(body))
}

pub fn invite_link(bot: &str, user_id: &str) -> String {
    format!("https://t.me/{bot}?start={}", referral_code(user_id))
}

fn checksum_char(body: &str) -> char {
    let hash = blake3::hash(body.as_bytes());
    CODE_ALPHABET[(hash.as_bytes()[0] as usize) % CODE_ALPHABET.len()] as char
}

/// Counts a newly joined friend and pays the per-friend reward.
pub fn record_referral(profile: &mut Profile, reward: f64) -> f64 {
    profile.referral_count = profile.referral_count.saturating_add(1);
    credit_reward(profile, reward)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chrono::Utc;

    #[test]
    fn codes_are_stable_and_distinct() {
        let a = referral_code("alice");
        assert_eq!(a, referral_code("alice"));
        assert_ne!(a, referral_code("bob"));
        assert_eq!(a.len(), 9);
        assert!(is_valid_code(&a));
        assert!(is_valid_code(&a.to_ascii_lowercase()));
    }

    #[test]
    fn tampered_codes_fail_checksum() {
        let code = referral_code("alice");
        let (body, check) = code.split_at(8);
        let wrong = if check == "A" { 'B' } else { 'A' };
        assert!(!is_valid_code(&format!("{body}{wrong}")));
        assert!(!is_valid_code("short"));
        assert!(!is_valid_code("ABCDEFGH!"));
    }

    #[test]
    fn referral_counts_and_pays() {
        let mut profile = Profile::new(&Config::default(), Utc::now());
        record_referral(&mut profile, 0.05);
        record_referral(&mut profile, 0.05);
        assert_eq!(profile.referral_count, 2);
        assert!((profile.spendable_balance - 0.1).abs() < 1e-12);
    }

    #[test]
    fn link_embeds_code() {
        let link = invite_link("Spacelbot", "alice");
        assert!(link.starts_with("https://t.me/Spacelbot?start="));
        assert!(link.ends_with(&referral_code("alice")));
    }
}
