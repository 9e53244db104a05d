//! # Gesture Classification
//!
//! Rule-based classifier over the 21-point hand landmark layout. Each gesture is
//! a small weighted checklist of finger states; a gesture is reported when its
//! score reaches [`MIN_GESTURE_SCORE`].
//!
//! ## Hand Layout:
//! ```text
//! 0 wrist
//! 1-4   thumb  (cmc, mcp, ip, tip)
//! 5-8   index  (mcp, pip, dip, tip)
//! 9-12  middle
//! 13-16 ring
//! 17-20 pinky
//! ```
//!
//! ## Finger States:
//! - **Extended**: tip is farther from the wrist than the pip joint
//! - **Thumb extended**: thumb tip is farther from the pinky mcp than the thumb ip
//! - **Thumb upright**: `tip.y < ip.y < mcp.y` (image y grows downward)
//!
//! Thumb_Up scores 0.5 for an upright thumb plus 0.125 for every finger whose tip
//! sits below its pip joint. Thumb_Down mirrors it.

use std::cmp::Ordering;

use super::backend::{Category, Landmark};

pub const HAND_LANDMARKS: usize = 21;
pub const MIN_GESTURE_SCORE: f32 = 0.8;

const WRIST: usize = 0;
const THUMB_MCP: usize = 2;
const THUMB_IP: usize = 3;
const THUMB_TIP: usize = 4;
const PINKY_MCP: usize = 17;

/// (pip, tip) for index, middle, ring, pinky
const FINGERS: [(usize, usize); 4] = [(6, 8), (10, 12), (14, 16), (18, 20)];

/// Score every known gesture for one hand, best first, dropping weak matches.
pub fn classify_hand(hand: &[Landmark]) -> Vec<Category> {
    if hand.len() < HAND_LANDMARKS {
        return Vec::new();
    }

    let extended: Vec<bool> = FINGERS
        .iter()
        .map(|&(pip, tip)| distance(&hand[tip], &hand[WRIST]) > distance(&hand[pip], &hand[WRIST]))
        .collect();
    let thumb_extended =
        distance(&hand[THUMB_TIP], &hand[PINKY_MCP]) > distance(&hand[THUMB_IP], &hand[PINKY_MCP]);

    let (tip, ip, mcp) = (hand[THUMB_TIP].y, hand[THUMB_IP].y, hand[THUMB_MCP].y);
    let thumb_upright = tip < ip && ip < mcp;
    let thumb_downward = tip > ip && ip > mcp;

    let curled_below = FINGERS.iter().filter(|&&(pip, tip)| hand[tip].y > hand[pip].y).count();
    let curled_above = FINGERS.iter().filter(|&&(pip, tip)| hand[tip].y < hand[pip].y).count();

    let folded_count = extended.iter().filter(|e| !**e).count();
    let extended_count = extended.len() - folded_count;
    let index_pointing_up = extended[0] && hand[8].y < hand[6].y;

    let mut scores = vec![
        ("Thumb_Up", weight(thumb_upright, 0.5) + 0.125 * curled_below as f32),
        ("Thumb_Down", weight(thumb_downward, 0.5) + 0.125 * curled_above as f32),
        ("Closed_Fist", 0.2 * folded_count as f32 + weight(!thumb_extended, 0.2)),
        ("Open_Palm", 0.2 * extended_count as f32 + weight(thumb_extended, 0.2)),
        (
            "Pointing_Up",
            weight(index_pointing_up, 0.25)
                + extended[1..].iter().filter(|e| !**e).count() as f32 * 0.25,
        ),
        (
            "Victory",
            weight(extended[0], 0.25)
                + weight(extended[1], 0.25)
                + weight(!extended[2], 0.25)
                + weight(!extended[3], 0.25),
        ),
    ];

    // Stable sort keeps declaration order on ties
    scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    scores
        .into_iter()
        .filter(|(_, score)| *score >= MIN_GESTURE_SCORE)
        .map(|(name, score)| Category {
            name: name.to_string(),
            score: score.min(1.0),
        })
        .collect()
}

/// `Thumb_Up` → `Thumb up`
pub fn display_label(category: &str) -> String {
    let spaced = category.replace('_', " ").to_lowercase();
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn weight(condition: bool, value: f32) -> f32 {
    if condition {
        value
    } else {
        0.0
    }
}

fn distance(a: &Landmark, b: &Landmark) -> f32 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lm(x: f32, y: f32) -> Landmark {
        Landmark { x, y, z: 0.0 }
    }

    #[derive(Clone, Copy)]
    enum Thumb {
        Upright,
        Folded,
        Sideways,
    }

    /// Upright hand, wrist at the bottom of the frame.
    fn hand(thumb: Thumb, fingers: [bool; 4]) -> Vec<Landmark> {
        let mut points = vec![lm(0.5, 0.85)];

        points.extend(match thumb {
            Thumb::Upright => [lm(0.46, 0.75), lm(0.42, 0.65), lm(0.41, 0.55), lm(0.40, 0.45)],
            Thumb::Folded => [lm(0.46, 0.75), lm(0.44, 0.68), lm(0.48, 0.64), lm(0.53, 0.66)],
            Thumb::Sideways => [lm(0.46, 0.75), lm(0.40, 0.70), lm(0.34, 0.66), lm(0.28, 0.63)],
        });

        for (i, extended) in fingers.iter().enumerate() {
            let x = 0.5 + 0.04 * i as f32;
            if *extended {
                points.extend([lm(x, 0.6), lm(x, 0.5), lm(x, 0.42), lm(x, 0.35)]);
            } else {
                points.extend([lm(x, 0.6), lm(x + 0.03, 0.52), lm(x + 0.04, 0.58), lm(x + 0.02, 0.63)]);
            }
        }
        points
    }

    fn top(hand: &[Landmark]) -> Option<String> {
        classify_hand(hand).first().map(|c| c.name.clone())
    }

    #[test]
    fn test_thumb_up_scores_full_when_fingers_curl() {
        let h = hand(Thumb::Upright, [false; 4]);
        let categories = classify_hand(&h);
        assert_eq!(categories[0].name, "Thumb_Up");
        assert_eq!(categories[0].score, 1.0);
    }

    #[test]
    fn test_thumb_down_is_mirrored_thumb_up() {
        let h: Vec<Landmark> = hand(Thumb::Upright, [false; 4])
            .into_iter()
            .map(|p| lm(p.x, 1.2 - p.y))
            .collect();
        assert_eq!(top(&h).as_deref(), Some("Thumb_Down"));
    }

    #[test]
    fn test_open_palm_and_fist() {
        assert_eq!(top(&hand(Thumb::Sideways, [true; 4])).as_deref(), Some("Open_Palm"));
        assert_eq!(top(&hand(Thumb::Folded, [false; 4])).as_deref(), Some("Closed_Fist"));
    }

    #[test]
    fn test_pointing_and_victory() {
        assert_eq!(
            top(&hand(Thumb::Folded, [true, false, false, false])).as_deref(),
            Some("Pointing_Up")
        );
        assert_eq!(
            top(&hand(Thumb::Folded, [true, true, false, false])).as_deref(),
            Some("Victory")
        );
    }

    #[test]
    fn test_ambiguous_hand_is_unrecognized() {
        // Index and pinky out, thumb tucked
        let h = hand(Thumb::Folded, [true, false, false, true]);
        assert!(classify_hand(&h).is_empty());
    }

    #[test]
    fn test_short_landmark_set_is_unrecognized() {
        assert!(classify_hand(&[lm(0.5, 0.5); 5]).is_empty());
    }

    #[test]
    fn test_display_label() {
        assert_eq!(display_label("Thumb_Up"), "Thumb up");
        assert_eq!(display_label("Victory"), "Victory");
        assert_eq!(display_label(""), "");
    }
}
