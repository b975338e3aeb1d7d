use std::collections::HashMap;

pub const MINUTES_PER_DAY: u32 = 1440;

/// Staged warnings before a toggle, in minutes.
pub const WARNING_SET: [u32; 5] = [10, 5, 3, 2, 1];

/// A recurring daily on/off window, optionally restricted to weekdays
/// (0 = Sunday) and overridable per day. Overnight windows have
/// `start > end`.
#[derive(Debug, Clone, Default)]
pub struct PvpWindow {
    pub start_minutes: u32,
    pub end_minutes: u32,
    pub days: Vec<u8>,
    pub day_overrides: HashMap<u8, (u32, u32)>,
}

impl PvpWindow {
    pub fn window_for(&self, weekday: u8) -> (u32, u32) {
        self.day_overrides
            .get(&weekday)
            .copied()
            .unwrap_or((self.start_minutes, self.end_minutes))
    }

    pub fn day_enabled(&self, weekday: u8) -> bool {
        self.days.is_empty() || self.days.contains(&(weekday % 7))
    }

    /// Whether `now` falls inside the window, including the tail of the
    /// previous day's overnight window.
    pub fn inside(&self, weekday: u8, now: u32) -> bool {
        if self.day_enabled(weekday) {
            let (start, end) = self.window_for(weekday);
            if start <= end {
                if now >= start && now < end {
                    return true;
                }
            } else if now >= start {
                return true;
            }
        }
        let prev = (weekday + 6) % 7;
        if self.day_enabled(prev) {
            let (start, end) = self.window_for(prev);
            if start > end && now < end {
                return true;
            }
        }
        false
    }

    /// Minutes until the next transition and the state to switch to.
    /// `None` when no enabled day carries a window.
    pub fn next_transition(&self, weekday: u8, now: u32) -> Option<(u32, bool)> {
        let (start, end) = self.window_for(weekday);
        if self.inside(weekday, now) {
            let minutes = if end > now {
                end - now
            } else {
                (MINUTES_PER_DAY - now) + end
            };
            return Some((minutes, false));
        }

        if self.days.is_empty() {
            let minutes = if start > now {
                start - now
            } else {
                (MINUTES_PER_DAY - now) + start
            };
            return Some((minutes, true));
        }

        for offset in 0..=7u32 {
            let day = ((weekday as u32 + offset) % 7) as u8;
            if !self.day_enabled(day) {
                continue;
            }
            let (day_start, _) = self.window_for(day);
            if offset == 0 {
                if now < day_start {
                    return Some((day_start - now, true));
                }
                continue;
            }
            return Some((offset * MINUTES_PER_DAY - now + day_start, true));
        }
        None
    }
}

/// The warnings actually issued for a countdown of `remaining` minutes: the
/// suffix of [`WARNING_SET`] that fits, prefixed by the exact remaining value
/// when it is not already the head.
pub fn warning_ladder(remaining: u32) -> Vec<u32> {
    let mut ladder: Vec<u32> = WARNING_SET
        .iter()
        .copied()
        .filter(|w| *w <= remaining)
        .collect();
    if ladder.first().copied() != Some(remaining) {
        ladder.insert(0, remaining);
    }
    ladder
}

#[cfg(test)]
mod test {
    use super::*;

    fn window(start: u32, end: u32) -> PvpWindow {
        PvpWindow {
            start_minutes: start,
            end_minutes: end,
            ..Default::default()
        }
    }

    #[test]
    fn simple_window_membership() {
        let w = window(1080, 1320); // 18:00-22:00
        assert!(!w.inside(1, 1079));
        assert!(w.inside(1, 1080));
        assert!(w.inside(1, 1319));
        assert!(!w.inside(1, 1320));
    }

    #[test]
    fn overnight_window_spans_midnight() {
        let w = window(1380, 120); // 23:00-02:00
        assert!(w.inside(2, 1380));
        assert!(w.inside(2, 1439));
        // past midnight, carried by the previous day's window
        assert!(w.inside(3, 0));
        assert!(w.inside(3, 119));
        assert!(!w.inside(3, 120));
        assert!(!w.inside(3, 720));
    }

    #[test]
    fn transition_when_outside_targets_on() {
        let w = window(1080, 1320);
        assert_eq!(w.next_transition(1, 1075), Some((5, true)));
        // after the window, wraps to tomorrow's start
        assert_eq!(w.next_transition(1, 1330), Some((1190, true)));
    }

    #[test]
    fn transition_when_inside_targets_off() {
        let w = window(1080, 1320);
        assert_eq!(w.next_transition(1, 1310), Some((10, false)));
        // overnight, end is tomorrow
        let w = window(1380, 120);
        assert_eq!(w.next_transition(1, 1400), Some((160, false)));
    }

    #[test]
    fn day_restricted_search_skips_disabled_days() {
        let mut w = window(1080, 1320);
        w.days = vec![5, 6]; // friday, saturday
        // monday (1), already past the start: next enabled day is friday
        let (minutes, on) = w.next_transition(1, 1200).unwrap();
        assert!(on);
        assert_eq!(minutes, 4 * 1440 - 1200 + 1080);
        // friday counts when the start is still ahead
        assert_eq!(w.next_transition(5, 900), Some((180, true)));
    }

    #[test]
    fn no_enabled_days_yields_no_transition() {
        let mut w = window(1080, 1320);
        w.days = vec![9]; // matches nothing
        assert_eq!(w.next_transition(1, 100), None);
    }

    #[test]
    fn per_day_override_wins() {
        let mut w = window(1080, 1320);
        w.day_overrides.insert(6, (600, 720));
        assert!(w.inside(6, 650));
        assert!(!w.inside(6, 1100));
        assert_eq!(w.next_transition(6, 590), Some((10, true)));
    }

    #[test]
    fn ladder_is_a_suffix_of_the_warning_set() {
        assert_eq!(warning_ladder(10), vec![10, 5, 3, 2, 1]);
        assert_eq!(warning_ladder(5), vec![5, 3, 2, 1]);
        assert_eq!(warning_ladder(1), vec![1]);
    }

    #[test]
    fn ladder_prepends_the_exact_remaining_value() {
        assert_eq!(warning_ladder(7), vec![7, 5, 3, 2, 1]);
        assert_eq!(warning_ladder(12), vec![12, 10, 5, 3, 2, 1]);
        assert_eq!(warning_ladder(0), vec![0]);
    }
}
