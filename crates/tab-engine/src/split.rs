use tab_types::ParticipantId;

/// Distribute `remaining` free units across `participants`.
///
/// Each participant in order receives `max(remaining / N, 1)` units until
/// nothing is left; units still left over after that pass are handed out
/// one at a time in the same order. The result lists only participants
/// that received something, in participant order, and always sums to
/// `remaining` when `participants` is non-empty.
///
/// Without the second pass a floor-division split leaves up to `N - 1`
/// units unassigned (3 units over 2 people leaves 1).
pub fn equal_split(remaining: u32, participants: &[ParticipantId]) -> Vec<(ParticipantId, u32)> {
    if remaining == 0 || participants.is_empty() {
        return Vec::new();
    }

    let count = u32::try_from(participants.len()).unwrap_or(u32::MAX);
    let base = (remaining / count).max(1);
    let mut shares = vec![0u32; participants.len()];
    let mut left = remaining;

    for share in shares.iter_mut() {
        if left == 0 {
            break;
        }
        let give = base.min(left);
        *share += give;
        left -= give;
    }

    // Leftover from the floor division is always smaller than N.
    for share in shares.iter_mut() {
        if left == 0 {
            break;
        }
        *share += 1;
        left -= 1;
    }

    participants
        .iter()
        .cloned()
        .zip(shares)
        .filter(|(_, units)| *units > 0)
        .collect()
}
