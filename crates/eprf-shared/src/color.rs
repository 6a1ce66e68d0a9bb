//! Deterministic cursor colours.
//!
//! Every client derives the same colour for the same user without any
//! coordination: the discord id is hashed (FNV-1a) into a fixed palette.

use crate::types::UserId;

/// Palette of visually distinct colours for remote cursors.
pub const CURSOR_PALETTE: [&str; 10] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6", "#9a6324",
    "#008080", "#800000",
];

/// Colour assigned to a user's cursor, stable for the lifetime of the id.
pub fn cursor_color(user: &UserId) -> &'static str {
    let index = fnv1a(user.as_str().as_bytes()) % CURSOR_PALETTE.len() as u64;
    CURSOR_PALETTE[index as usize]
}

/// 64-bit FNV-1a.  Not cryptographic; only needs to spread ids evenly.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_is_stable() {
        let user = UserId::from("287001634954805248");
        assert_eq!(cursor_color(&user), cursor_color(&user));
    }

    #[test]
    fn test_color_is_from_palette() {
        for id in ["1", "42", "287001634954805248", "999999999999999999"] {
            let color = cursor_color(&UserId::from(id));
            assert!(CURSOR_PALETTE.contains(&color));
        }
    }

    #[test]
    fn test_distinct_ids_spread_over_palette() {
        let colors: std::collections::HashSet<_> = (0..100)
            .map(|n| cursor_color(&UserId::new(format!("user-{n}"))))
            .collect();
        // 100 ids over a 10-colour palette must hit more than one colour.
        assert!(colors.len() > 1);
    }
}
