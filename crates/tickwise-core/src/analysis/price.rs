use serde::Serialize;

use crate::PriceBar;

/// Look-back windows reported by [`price_movement`], in trading sessions.
pub const MOVEMENT_WINDOWS: [usize; 3] = [7, 30, 90];

/// Change from a past close to the latest close.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodChange {
    pub sessions: usize,
    pub reference_close: f64,
    /// `None` when the reference close is zero.
    pub change_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceMovement {
    pub sessions: usize,
    pub last_close: f64,
    pub previous_close: f64,
    pub daily_change: f64,
    pub daily_change_percent: Option<f64>,
    pub range_high: f64,
    pub range_low: f64,
    pub changes: Vec<PeriodChange>,
    pub last_volume: Option<u64>,
    pub average_volume: Option<u64>,
    /// Last volume over average volume.
    pub volume_ratio: Option<f64>,
}

/// Summarize daily bars (oldest first). Needs at least two bars.
///
/// A window longer than the history falls back to the oldest bar, so short
/// histories still report a change for every window.
pub fn price_movement(history: &[PriceBar]) -> Option<PriceMovement> {
    let [.., previous, last] = history else {
        return None;
    };

    let changes = MOVEMENT_WINDOWS
        .iter()
        .map(|&sessions| {
            let index = history.len().saturating_sub(sessions + 1);
            let reference_close = history[index].close;
            PeriodChange {
                sessions,
                reference_close,
                change_percent: percent_change(reference_close, last.close),
            }
        })
        .collect();

    let range_high = history
        .iter()
        .map(|bar| bar.high.unwrap_or(bar.close))
        .fold(f64::NEG_INFINITY, f64::max);
    let range_low = history
        .iter()
        .map(|bar| bar.low.unwrap_or(bar.close))
        .fold(f64::INFINITY, f64::min);

    let volumes: Vec<u64> = history.iter().filter_map(|bar| bar.volume).collect();
    let average_volume = (!volumes.is_empty())
        .then(|| volumes.iter().sum::<u64>() / volumes.len() as u64);
    let volume_ratio = match (last.volume, average_volume) {
        (Some(volume), Some(average)) if average > 0 => Some(volume as f64 / average as f64),
        _ => None,
    };

    Some(PriceMovement {
        sessions: history.len(),
        last_close: last.close,
        previous_close: previous.close,
        daily_change: last.close - previous.close,
        daily_change_percent: percent_change(previous.close, last.close),
        range_high,
        range_low,
        changes,
        last_volume: last.volume,
        average_volume,
        volume_ratio,
    })
}

fn percent_change(from: f64, to: f64) -> Option<f64> {
    (from != 0.0).then(|| (to - from) / from * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UtcDateTime;

    fn bars(closes: &[f64]) -> Vec<PriceBar> {
        let start = UtcDateTime::parse_date("2024-01-01").expect("valid");
        closes
            .iter()
            .enumerate()
            .map(|(day, &close)| PriceBar {
                volume: Some(1_000 * (day as u64 + 1)),
                ..PriceBar::close_only(start.plus_hours(24 * day as u32), close)
            })
            .collect()
    }

    #[test]
    fn needs_two_bars() {
        assert!(price_movement(&[]).is_none());
        assert!(price_movement(&bars(&[10.0])).is_none());
    }

    #[test]
    fn daily_change_compares_last_two_closes() {
        let movement = price_movement(&bars(&[100.0, 110.0])).expect("two bars");
        assert_eq!(movement.previous_close, 100.0);
        assert_eq!(movement.daily_change, 10.0);
        assert_eq!(movement.daily_change_percent, Some(10.0));
    }

    #[test]
    fn windows_look_back_by_sessions_and_fall_back_to_oldest() {
        let closes: Vec<f64> = (0..40).map(|day| 100.0 + day as f64).collect();
        let movement = price_movement(&bars(&closes)).expect("history");

        let by_window: Vec<(usize, f64)> = movement
            .changes
            .iter()
            .map(|change| (change.sessions, change.reference_close))
            .collect();
        // last close 139: 7 sessions back is 132, 30 back is 109, 90 falls back to 100
        assert_eq!(by_window, vec![(7, 132.0), (30, 109.0), (90, 100.0)]);
        let thirty = &movement.changes[1];
        let expected = (139.0 - 109.0) / 109.0 * 100.0;
        assert!((thirty.change_percent.expect("defined") - expected).abs() < 1e-9);
    }

    #[test]
    fn range_uses_highs_and_lows_when_present() {
        let mut history = bars(&[10.0, 12.0, 11.0]);
        history[1].high = Some(13.5);
        history[2].low = Some(9.5);
        let movement = price_movement(&history).expect("history");
        assert_eq!(movement.range_high, 13.5);
        assert_eq!(movement.range_low, 9.5);
    }

    #[test]
    fn volume_ratio_compares_last_to_average() {
        let movement = price_movement(&bars(&[1.0, 2.0, 3.0])).expect("history");
        assert_eq!(movement.average_volume, Some(2_000));
        assert_eq!(movement.volume_ratio, Some(1.5));
    }

    #[test]
    fn zero_reference_close_has_no_percentage() {
        let movement = price_movement(&bars(&[0.0, 5.0])).expect("history");
        assert_eq!(movement.daily_change_percent, None);
        assert_eq!(movement.daily_change, 5.0);
    }
}
